//! Delta hedging (C11): nudge the portfolio back to a target Delta with whole units of a hedge
//! instrument (typically the underlying future).

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::config::HedgingConfig;
use crate::core::Direction;

/// A hedge to dispatch: `volume` whole units of the hedge instrument, in `direction`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HedgeInstruction {
    pub direction: Direction,
    pub volume: Decimal,
}

/// Computes the hedge instruction that drives the portfolio's Delta closest to
/// `config.target_delta`, per SPEC_FULL §4.11.
///
/// No-op (returns `None`) when the portfolio is already within `config.hedging_band` of target,
/// or when the nearest whole-unit hedge quantity rounds to zero.
pub fn compute_delta_hedge(portfolio_delta: Decimal, config: &HedgingConfig) -> Option<HedgeInstruction> {
    let residual = config.target_delta - portfolio_delta;
    if residual.abs() <= config.hedging_band {
        return None;
    }

    let delta_per_unit = config.hedge_instrument_delta_per_unit * config.hedge_instrument_multiplier;
    if delta_per_unit == Decimal::ZERO {
        return None;
    }

    let units = (residual / delta_per_unit).to_f64().unwrap_or(0.0).round();
    if units == 0.0 {
        return None;
    }

    let direction = if units > 0.0 { Direction::Long } else { Direction::Short };
    Some(HedgeInstruction {
        direction,
        volume: Decimal::from(units.abs() as i64),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HedgingConfig;
    use rust_decimal_macros::dec;

    fn config() -> HedgingConfig {
        HedgingConfig {
            target_delta: Decimal::ZERO,
            hedging_band: dec!(5),
            gamma_scalp_rebalance_threshold: dec!(10),
            hedge_instrument_delta_per_unit: dec!(1),
            hedge_instrument_multiplier: dec!(10),
        }
    }

    #[test]
    fn within_band_is_a_no_op() {
        assert!(compute_delta_hedge(dec!(3), &config()).is_none());
        assert!(compute_delta_hedge(dec!(-5), &config()).is_none());
    }

    #[test]
    fn outside_band_hedges_toward_target() {
        let hedge = compute_delta_hedge(dec!(47), &config()).unwrap();
        assert_eq!(hedge.direction, Direction::Short);
        assert_eq!(hedge.volume, dec!(5));
    }

    #[test]
    fn negative_residual_hedges_long() {
        let hedge = compute_delta_hedge(dec!(-53), &config()).unwrap();
        assert_eq!(hedge.direction, Direction::Long);
        assert_eq!(hedge.volume, dec!(5));
    }

    #[test]
    fn zero_rounded_units_produce_no_instruction() {
        // residual = 6, delta_per_unit = 10, band = 5 -> outside band but rounds to 1 unit, not 0.
        // Use a case where the unit size swamps a small residual past the band.
        let config = HedgingConfig {
            hedging_band: dec!(0),
            hedge_instrument_delta_per_unit: dec!(1),
            hedge_instrument_multiplier: dec!(100),
            ..config()
        };
        assert!(compute_delta_hedge(dec!(4), &config).is_none());
    }

    #[test]
    fn hedge_qty_drives_residual_within_half_a_unit_of_target() {
        let config = config();
        let delta_per_unit = config.hedge_instrument_delta_per_unit * config.hedge_instrument_multiplier;
        for raw in [dec!(47), dec!(-53), dec!(100), dec!(-12), dec!(6)] {
            if let Some(hedge) = compute_delta_hedge(raw, &config) {
                let signed_volume = match hedge.direction {
                    Direction::Long => hedge.volume,
                    Direction::Short => -hedge.volume,
                };
                let residual = (raw + signed_volume * delta_per_unit - config.target_delta).abs();
                assert!(residual <= delta_per_unit / dec!(2) + dec!(1e-9));
            }
        }
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        /// Property 8: for any portfolio delta and any (positive) hedge-instrument sizing, the
        /// produced hedge quantity (if any) drives the residual to within half a hedge unit of
        /// target, and `None` is only ever returned when the input was already within band or the
        /// rounded quantity is genuinely zero.
        #[test]
        fn prop_delta_hedge_drives_residual_within_half_unit() {
            proptest!(|(
                portfolio_delta in -2000.0..2000.0_f64,
                band in 0.0..50.0_f64,
                delta_per_unit in 0.1..5.0_f64,
                multiplier in 1.0..50.0_f64,
            )| {
                let config = HedgingConfig {
                    target_delta: Decimal::ZERO,
                    hedging_band: Decimal::from_f64_retain(band).unwrap(),
                    gamma_scalp_rebalance_threshold: dec!(10),
                    hedge_instrument_delta_per_unit: Decimal::from_f64_retain(delta_per_unit).unwrap(),
                    hedge_instrument_multiplier: Decimal::from_f64_retain(multiplier).unwrap(),
                };
                let raw = Decimal::from_f64_retain(portfolio_delta).unwrap();
                let unit = config.hedge_instrument_delta_per_unit * config.hedge_instrument_multiplier;

                if let Some(hedge) = compute_delta_hedge(raw, &config) {
                    prop_assert!(hedge.volume > Decimal::ZERO);
                    let signed_volume = match hedge.direction {
                        Direction::Long => hedge.volume,
                        Direction::Short => -hedge.volume,
                    };
                    let residual = (raw + signed_volume * unit - config.target_delta).abs();
                    prop_assert!(residual <= unit / dec!(2) + dec!(1e-6));
                }
            });
        }
    }
}
