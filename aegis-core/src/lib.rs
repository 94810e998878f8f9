//! Domain logic and orchestration for a live options-and-futures trading engine: bar pipeline,
//! instrument/position aggregates, signal/sizing/selection, advanced order scheduling, hedging,
//! Greeks, persistence, and the strategy engine that wires them together. The broker connection,
//! the relational server, and the process supervisor itself live in `aegis-runtime`; this crate
//! is pure domain logic plus the ports those things implement.

pub mod aggregates;
pub mod bar_pipeline;
pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod execution;
pub mod gateway;
pub mod greeks;
pub mod hedging;
pub mod indicators;
pub mod persistence;
pub mod resilience;
pub mod risk;
pub mod selectors;
pub mod signals;
pub mod sizing;
pub mod strategy_engine;
pub mod vol_surface;

pub use errors::EngineError;
pub use events::{DomainEvent, EventBus};
pub use gateway::Gateway;
pub use strategy_engine::{ServiceBundle, StrategyEngine, StrategyEngineConfig};
