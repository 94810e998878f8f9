//! Strategy-state repository (C18): append-only `strategy_state` table, latest-row-wins reads,
//! per SPEC_FULL §6's relational schema and §8 scenarios S5/S6.

use chrono::Utc;
use sqlx::any::AnyPool;
use sqlx::Row;

use crate::errors::{ArchiveNotFound, CorruptionError, LoadOutcome};

use super::migrations::migrate;
use super::serializer::{decode_snapshot, encode_snapshot, verify_integrity, StrategyStateSnapshot, CURRENT_SCHEMA_VERSION};

/// Owns the `strategy_state` table. One row per save; `load` always returns the most recent row
/// for the strategy, so history accumulates and old rows are reclaimed only by [`Self::cleanup`].
#[derive(Clone)]
pub struct StateRepository {
    pool: AnyPool,
}

impl StateRepository {
    pub fn new(pool: AnyPool) -> Self {
        Self { pool }
    }

    /// Creates `strategy_state` if it doesn't already exist. Idempotent; safe to call on every
    /// worker startup.
    pub async fn ensure_schema(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS strategy_state (\
                id INTEGER PRIMARY KEY AUTOINCREMENT, \
                strategy_name TEXT NOT NULL, \
                snapshot_json TEXT NOT NULL, \
                schema_version INTEGER NOT NULL, \
                saved_at TEXT NOT NULL\
            )",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_strategy_state_name_saved_at ON strategy_state (strategy_name, saved_at)")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Appends a new row. Never updates or deletes an existing one — the archive is the audit
    /// trail, not just a cache.
    pub async fn save(&self, strategy_name: &str, snapshot: &StrategyStateSnapshot) -> Result<(), sqlx::Error> {
        let payload = encode_snapshot(snapshot).map_err(|e| sqlx::Error::Encode(Box::new(e)))?;
        let saved_at = snapshot.saved_at.to_rfc3339();
        sqlx::query("INSERT INTO strategy_state (strategy_name, snapshot_json, schema_version, saved_at) VALUES (?, ?, ?, ?)")
            .bind(strategy_name)
            .bind(payload.to_string())
            .bind(snapshot.schema_version as i64)
            .bind(saved_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Loads the most recently saved snapshot for `strategy_name`. Testable property: S5 (no row
    /// exists → [`ArchiveNotFound`]), S6 (row exists but its JSON is unparseable or fails integrity
    /// verification → [`CorruptionError`] naming the strategy and wrapping the parse error).
    pub async fn load(&self, strategy_name: &str) -> Result<LoadOutcome<StrategyStateSnapshot>, sqlx::Error> {
        let row = sqlx::query("SELECT snapshot_json, schema_version FROM strategy_state WHERE strategy_name = ? ORDER BY saved_at DESC LIMIT 1")
            .bind(strategy_name)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(LoadOutcome::NotFound(ArchiveNotFound { strategy_name: strategy_name.to_string() }));
        };

        let raw: String = row.try_get("snapshot_json")?;
        let stored_version: i64 = row.try_get("schema_version")?;

        if !verify_integrity(&raw) {
            return Err(to_sqlx_error(CorruptionError::new(strategy_name, parse_error(&raw))));
        }

        let value: serde_json::Value = match serde_json::from_str(&raw) {
            Ok(v) => v,
            Err(source) => return Err(to_sqlx_error(CorruptionError::new(strategy_name, source))),
        };
        let migrated = match migrate(value, stored_version as u32) {
            Ok(v) => v,
            Err(source) => return Err(to_sqlx_error(CorruptionError::new(strategy_name, parse_error_from_message(&source.to_string())))),
        };
        match decode_snapshot(&migrated) {
            Ok(snapshot) => Ok(LoadOutcome::Loaded(snapshot)),
            Err(source) => Err(to_sqlx_error(CorruptionError::new(strategy_name, source))),
        }
    }

    /// Deletes rows for `strategy_name` saved more than `keep_days` ago, always leaving at least
    /// the single most recent row untouched even if it is older than the retention window.
    pub async fn cleanup(&self, strategy_name: &str, keep_days: i64) -> Result<u64, sqlx::Error> {
        let cutoff = (Utc::now() - chrono::Duration::days(keep_days)).to_rfc3339();
        let result = sqlx::query(
            "DELETE FROM strategy_state WHERE strategy_name = ? AND saved_at < ? \
             AND id NOT IN (SELECT id FROM strategy_state WHERE strategy_name = ? ORDER BY saved_at DESC LIMIT 1)",
        )
        .bind(strategy_name)
        .bind(cutoff)
        .bind(strategy_name)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

fn parse_error(raw: &str) -> serde_json::Error {
    serde_json::from_str::<serde_json::Value>(raw).unwrap_err()
}

fn parse_error_from_message(message: &str) -> serde_json::Error {
    <serde_json::Error as serde::de::Error>::custom(message.to_string())
}

fn to_sqlx_error(err: CorruptionError) -> sqlx::Error {
    sqlx::Error::Decode(Box::new(err))
}
