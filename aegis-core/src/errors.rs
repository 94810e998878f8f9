//! Domain error taxonomy (C27).
//!
//! Three propagation classes, matching SPEC_FULL §7:
//!
//! - [`ConfigError`] and [`CorruptionError`] are fail-fast: they bubble up through `anyhow::Result`
//!   to the binary boundary (supervisor/worker `main`) and abort the process.
//! - [`ArchiveNotFound`] is not an error at all — it is the "not found" arm of [`LoadOutcome`],
//!   returned by the persistence repository when a strategy has never been saved.
//! - [`EngineError`] covers everything the Strategy Engine is expected to catch, log, and continue
//!   past (validation failures, gateway hiccups, auto-save failures). Nothing in this crate panics
//!   or unwraps outside test code.

use std::fmt;

/// Fail-fast configuration problems: missing environment variables, malformed TOML, invalid
/// combinations of values. Always propagates to the supervisor.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable(s): {0:?}")]
    MissingEnvVars(Vec<String>),

    #[error("failed to parse config file {path}: {source}")]
    ParseFailure {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid config value for `{field}`: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// The latest `strategy_state` row for a strategy exists but its `snapshot_json` does not parse,
/// or parses but is missing `schema_version`. Per SPEC_FULL §7 / S6, this is never auto-recovered.
#[derive(Debug, thiserror::Error)]
#[error("corrupted snapshot for strategy `{strategy_name}`: {source}")]
pub struct CorruptionError {
    pub strategy_name: String,
    #[source]
    pub source: serde_json::Error,
}

impl CorruptionError {
    pub fn new(strategy_name: impl Into<String>, source: serde_json::Error) -> Self {
        Self {
            strategy_name: strategy_name.into(),
            source,
        }
    }
}

/// Distinct "not found" marker — a strategy with no saved snapshot is normal, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveNotFound {
    pub strategy_name: String,
}

impl fmt::Display for ArchiveNotFound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no saved snapshot for strategy `{}`", self.strategy_name)
    }
}

/// Outcome of a snapshot load: success, no archive yet, or corruption.
#[derive(Debug)]
pub enum LoadOutcome<T> {
    Loaded(T),
    NotFound(ArchiveNotFound),
}

/// Per-bar runtime errors the Strategy Engine catches at its boundary, logs with context, and
/// continues past. These are never propagated to the supervisor.
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum EngineError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("liquidity gate rejected order: {0}")]
    LiquidityGate(String),

    #[error("portfolio risk check blocked the trade: {0:?}")]
    RiskBlocked(Vec<String>),

    #[error("gateway call failed: {0}")]
    Gateway(String),

    #[error("auto-save failed: {0}")]
    AutoSaveFailed(String),

    #[error("selector produced no candidate")]
    NoCandidate,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_lists_missing_vars() {
        let err = ConfigError::MissingEnvVars(vec!["VNPY_DATABASE_DRIVER".to_string()]);
        let msg = format!("{err}");
        assert!(msg.contains("VNPY_DATABASE_DRIVER"));
    }

    #[test]
    fn corruption_error_contains_strategy_name() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err = CorruptionError::new("VolStrategy", json_err);
        let msg = format!("{err}");
        assert!(msg.contains("VolStrategy"));
    }

    #[test]
    fn archive_not_found_display() {
        let e = ArchiveNotFound {
            strategy_name: "VolStrategy".to_string(),
        };
        assert!(format!("{e}").contains("VolStrategy"));
    }
}
