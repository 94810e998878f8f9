//! Schema migration chain for persisted snapshots (C17), per SPEC_FULL §9's design note: once a
//! migration function ships it never changes, so replaying it against an archived snapshot always
//! reproduces the same bytes it produced the day it ran. New migrations are appended to
//! [`MIGRATIONS`]; existing entries are never edited or removed.

use serde_json::Value;
use thiserror::Error;

use super::serializer::CURRENT_SCHEMA_VERSION;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MigrationError {
    #[error("snapshot schema_version {found} is newer than this build supports ({supported})")]
    FutureSchemaVersion { found: u32, supported: u32 },
}

/// `MIGRATIONS[i]` upgrades a raw snapshot from schema version `i + 1` to `i + 2`.
type Migration = fn(Value) -> Value;

/// Schema version 1 is the only version this crate has ever written, so the chain is empty. The
/// first breaking change to [`crate::persistence::serializer`]'s JSON shape appends a function
/// here rather than touching the decoder directly.
const MIGRATIONS: &[Migration] = &[];

/// Applies every migration between `from_version` and [`CURRENT_SCHEMA_VERSION`] in order.
/// Rejects a snapshot from a newer build than this one rather than guessing at a downgrade.
pub fn migrate(value: Value, from_version: u32) -> Result<Value, MigrationError> {
    if from_version > CURRENT_SCHEMA_VERSION {
        return Err(MigrationError::FutureSchemaVersion { found: from_version, supported: CURRENT_SCHEMA_VERSION });
    }
    let mut current = value;
    let start = from_version.saturating_sub(1) as usize;
    for migration in &MIGRATIONS[start.min(MIGRATIONS.len())..] {
        current = migration(current);
    }
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn migrating_from_the_current_version_is_a_no_op() {
        let value = json!({"schema_version": CURRENT_SCHEMA_VERSION, "x": 1});
        let migrated = migrate(value.clone(), CURRENT_SCHEMA_VERSION).unwrap();
        assert_eq!(migrated, value);
    }

    #[test]
    fn a_snapshot_from_a_newer_build_is_rejected() {
        let err = migrate(json!({}), CURRENT_SCHEMA_VERSION + 1).unwrap_err();
        assert!(matches!(err, MigrationError::FutureSchemaVersion { .. }));
    }
}
