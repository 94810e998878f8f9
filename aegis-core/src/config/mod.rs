//! Configuration system (C26).
//!
//! Runtime TOML config, loaded once at worker startup and passed by value into every component
//! constructor — no global `SETTINGS`. Mirrors `bog-core/src/config/mod.rs`'s "single `Config`
//! struct assembled from a TOML file" approach, minus any compile-time-feature tier
//! (this domain has no hot path that benefits from const-propagated risk limits).

pub mod env;
pub mod types;

pub use types::*;

use crate::errors::ConfigError;

impl Config {
    /// Parses a TOML config file's contents. Database connection fields are expected to be
    /// overridden by `VNPY_DATABASE_*` environment variables at the call site (see
    /// [`env::validate_database_env_vars`]); this function only handles the TOML document.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|source| ConfigError::ParseFailure {
            path: "<string>".to_string(),
            source,
        })
    }

    pub fn from_toml_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::InvalidValue {
            field: "config path".to_string(),
            reason: format!("{}: {e}", path.display()),
        })?;
        let mut parsed: Self = toml::from_str(&contents).map_err(|source| ConfigError::ParseFailure {
            path: path.display().to_string(),
            source,
        })?;
        parsed.apply_database_env_overrides();
        Ok(parsed)
    }

    /// Applies the `VNPY_DATABASE_*` environment variables over the TOML defaults, per
    /// SPEC_FULL §6. Call sites that construct `Config` directly in tests can skip this.
    pub fn apply_database_env_overrides(&mut self) {
        if let Ok(driver) = std::env::var("VNPY_DATABASE_DRIVER") {
            self.database.driver = driver;
        }
        if let Ok(host) = std::env::var("VNPY_DATABASE_HOST") {
            self.database.host = Some(host);
        }
        if let Ok(port) = std::env::var("VNPY_DATABASE_PORT") {
            if let Ok(port) = port.parse() {
                self.database.port = port;
            }
        }
        if let Ok(database) = std::env::var("VNPY_DATABASE_DATABASE") {
            self.database.database = Some(database);
        }
        if let Ok(user) = std::env::var("VNPY_DATABASE_USER") {
            self.database.user = Some(user);
        }
        if let Ok(password) = std::env::var("VNPY_DATABASE_PASSWORD") {
            self.database.password = Some(password);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [database]
        driver = "mysql"

        [gateway]
        broker_name = "ctp"

        [risk.position]
        delta = "10"
        gamma = "5"
        vega = "1000"
        theta = "1000"

        [risk.portfolio]
        delta = "50"
        gamma = "20"
        vega = "5000"
        theta = "5000"

        [scheduler]
        iceberg_batch_size = "30"
        classic_iceberg_per_order_volume = "10"
        timed_split_per_order_volume = "10"
        timed_split_interval_seconds = 30
        twap_num_slices = 5
        twap_time_window_seconds = 300

        [hedging]
        hedge_instrument_delta_per_unit = "1"
        hedge_instrument_multiplier = "10"

        [sizing]
        global_daily_open_cap = 20
        per_symbol_daily_open_cap = 5
        max_concurrent_positions = 10

        [greeks]

        [supervisor]
        sessions = []
    "#;

    #[test]
    fn parses_minimal_config_with_defaults() {
        let cfg = Config::from_toml_str(MINIMAL).expect("parses");
        assert_eq!(cfg.database.port, 3306);
        assert_eq!(cfg.database.keep_days, 30);
        assert!(cfg.risk.count_manual_opens_toward_daily_cap);
        assert_eq!(cfg.supervisor.max_consecutive_restarts, 10);
    }

    #[test]
    fn rejects_malformed_toml() {
        let err = Config::from_toml_str("not valid [[[ toml").unwrap_err();
        assert!(matches!(err, ConfigError::ParseFailure { .. }));
    }
}
