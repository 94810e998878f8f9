//! Persistence (C17, C18, C19, C24): typed-marker JSON snapshots, the relational archive that
//! stores them, the connection factory that opens it, and the monitor tables the dashboard reads.

pub mod db;
pub mod migrations;
pub mod monitor;
pub mod repository;
pub mod serializer;

pub use migrations::{migrate, MigrationError};
pub use repository::StateRepository;
pub use serializer::{decode_snapshot, encode_snapshot, verify_integrity, StrategyStateSnapshot, CURRENT_SCHEMA_VERSION};
