//! Database connection factory (C19). One `sqlx::Any` pool for the process lifetime: MySQL in
//! production, SQLite in tests and the zero-dependency standalone mode. `sqlx::Any` requires its
//! driver set installed exactly once before the first connection; [`connect`] does this, so
//! callers never have to remember it.

use std::sync::OnceLock;
use std::time::Duration;

use sqlx::any::{AnyPool, AnyPoolOptions};

use crate::config::env;
use crate::errors::ConfigError;

static POOL: OnceLock<AnyPool> = OnceLock::new();

/// Builds the `sqlx::Any` connection string from `VNPY_DATABASE_*` environment variables. SQLite
/// is selected by `VNPY_DATABASE_DRIVER=sqlite`, in which case `VNPY_DATABASE_DATABASE` is taken
/// as a filesystem path (or `:memory:`); anything else is treated as MySQL.
pub fn database_url_from_env() -> String {
    let driver = env::database_var_or("VNPY_DATABASE_DRIVER", "mysql");
    if driver.eq_ignore_ascii_case("sqlite") {
        let path = env::database_var_or("VNPY_DATABASE_DATABASE", ":memory:");
        return format!("sqlite://{path}");
    }
    let host = env::database_var_or("VNPY_DATABASE_HOST", "127.0.0.1");
    let port = env::database_var_or("VNPY_DATABASE_PORT", "3306");
    let user = env::database_var_or("VNPY_DATABASE_USER", "root");
    let password = env::database_var_or("VNPY_DATABASE_PASSWORD", "");
    let database = env::database_var_or("VNPY_DATABASE_DATABASE", "vnpy");
    format!("mysql://{user}:{password}@{host}:{port}/{database}")
}

/// Opens a fresh `sqlx::Any` pool against `url`, installing the `Any` driver set first. Exposed
/// directly (rather than only through [`connect_from_env`]) so tests can point at a hermetic
/// `tempfile`-backed SQLite database without touching the process environment.
pub async fn connect(url: &str, connect_timeout: Duration) -> anyhow::Result<AnyPool> {
    sqlx::any::install_default_drivers();
    let pool = AnyPoolOptions::new().max_connections(5).acquire_timeout(connect_timeout).connect(url).await?;
    Ok(pool)
}

/// Validates `VNPY_DATABASE_*` env vars, connects using [`database_url_from_env`], and stores the
/// pool in a process-wide singleton. Subsequent calls return the already-open pool and ignore
/// `connect_timeout` — the pool is opened once per process, per SPEC_FULL §5.
pub async fn connect_from_env(connect_timeout: Duration) -> anyhow::Result<&'static AnyPool> {
    if let Some(pool) = POOL.get() {
        return Ok(pool);
    }
    let missing = env::validate_database_env_vars();
    if !missing.is_empty() {
        return Err(ConfigError::MissingEnvVars(missing).into());
    }
    let pool = connect(&database_url_from_env(), connect_timeout).await?;
    Ok(POOL.get_or_init(|| pool))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlite_driver_produces_a_sqlite_url() {
        std::env::set_var("VNPY_DATABASE_DRIVER", "sqlite");
        std::env::set_var("VNPY_DATABASE_DATABASE", "/tmp/aegis-test.db");
        assert_eq!(database_url_from_env(), "sqlite:///tmp/aegis-test.db");
        std::env::remove_var("VNPY_DATABASE_DRIVER");
        std::env::remove_var("VNPY_DATABASE_DATABASE");
    }

    #[test]
    fn default_driver_produces_a_mysql_url() {
        std::env::remove_var("VNPY_DATABASE_DRIVER");
        std::env::remove_var("VNPY_DATABASE_HOST");
        std::env::remove_var("VNPY_DATABASE_DATABASE");
        let url = database_url_from_env();
        assert!(url.starts_with("mysql://"));
        assert!(url.contains("127.0.0.1:3306"));
    }

    #[tokio::test]
    async fn connect_opens_an_in_memory_sqlite_pool() {
        let pool = connect("sqlite::memory:", Duration::from_secs(5)).await.unwrap();
        sqlx::query("CREATE TABLE t (id INTEGER PRIMARY KEY)").execute(&pool).await.unwrap();
    }
}
