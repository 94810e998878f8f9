//! Resilience primitives shared by the supervisor (C20) and gateway reconnect logic.

pub mod backoff;

pub use backoff::{BackoffConfig, ExponentialBackoff};
