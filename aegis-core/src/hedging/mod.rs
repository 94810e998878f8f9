//! Delta hedging and Gamma scalping (C11, C12).
//!
//! Both read their thresholds from [`crate::config::HedgingConfig`] ("missing keys fall back to
//! defaults" per SPEC_FULL §4.11, already enforced by that struct's `#[serde(default = "...")]`
//! fields) and produce a plain hedge instruction rather than touching the gateway themselves —
//! same no-I/O-in-the-domain shape as the scheduler and smart executor.

pub mod delta;
pub mod gamma;

pub use delta::{compute_delta_hedge, HedgeInstruction};
pub use gamma::{compute_gamma_scalp, GammaScalpError};
