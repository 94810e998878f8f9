//! Common CLI and logging bootstrap for both binaries.
//!
//! Grounded on `bog-bins/src/common.rs`'s `CommonArgs`/`init_logging` split, generalized to this
//! domain's args (strategy name/variant, config path) and to the two logging shapes SPEC_FULL
//! §C25 asks for (human-readable for local development, JSON for production log shipping) rather
//! than a single `fmt::layer()`.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Arguments shared by `supervisor` and `worker`.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about)]
pub struct CommonArgs {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "config/strategy.toml")]
    pub config: std::path::PathBuf,

    /// Strategy name, used to scope persisted snapshots (`strategy_state.strategy_name`).
    #[arg(long, default_value = "VolStrategy")]
    pub strategy_name: String,

    /// Named instance of the strategy (scopes monitor rows), per SPEC_FULL's "variant" glossary
    /// entry.
    #[arg(long, default_value = "default")]
    pub variant: String,

    /// Log level, used when `RUST_LOG` is unset.
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    /// Emit structured JSON logs instead of human-readable ones (production log shipping).
    #[arg(long)]
    pub json_logs: bool,
}

/// Initializes `tracing`, honoring `RUST_LOG` over `level` and switching between the
/// human-readable and JSON formatters per `json`.
pub fn init_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;

    if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_target(true))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(false))
            .with(filter)
            .init();
    }

    Ok(())
}
