//! Instrument and Position aggregates (C13, C14): owned exclusively by the strategy engine.

pub mod instrument;
pub mod position;

pub use instrument::{InstrumentAggregate, InstrumentError, SymbolState};
pub use position::{ExternalPosition, PositionAggregate, PositionError, PositionRecord, TrackedOrder, Trade};
