//! Gamma scalping (C12): trade the underlying against a long-Gamma book to harvest realized
//! variance, rebalancing Delta back toward zero once it drifts past a threshold.

use rust_decimal::Decimal;

use crate::config::HedgingConfig;
use crate::hedging::delta::{compute_delta_hedge, HedgeInstruction};

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum GammaScalpError {
    #[error("gamma scalping requires a positive portfolio gamma, got {0}")]
    NonPositiveGamma(Decimal),
}

/// Computes the rebalancing trade for a long-Gamma book, per SPEC_FULL §4.11 / testable
/// property 9. Refuses outright when `portfolio_gamma <= 0` — scalping a short-Gamma book
/// loses money on every rebalance, so this is a hard guard rather than a tunable.
///
/// Otherwise, rebalances Delta to zero once `|portfolio_delta|` exceeds
/// `config.gamma_scalp_rebalance_threshold`; within the threshold, returns `None`.
pub fn compute_gamma_scalp(
    portfolio_delta: Decimal,
    portfolio_gamma: Decimal,
    config: &HedgingConfig,
) -> Result<Option<HedgeInstruction>, GammaScalpError> {
    if portfolio_gamma <= Decimal::ZERO {
        return Err(GammaScalpError::NonPositiveGamma(portfolio_gamma));
    }

    if portfolio_delta.abs() <= config.gamma_scalp_rebalance_threshold {
        return Ok(None);
    }

    let rebalance_config = HedgingConfig {
        target_delta: Decimal::ZERO,
        hedging_band: Decimal::ZERO,
        ..config.clone()
    };
    Ok(compute_delta_hedge(portfolio_delta, &rebalance_config))
}
