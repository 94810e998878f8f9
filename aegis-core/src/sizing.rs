//! Position sizing & daily limits (C7).

use rust_decimal::Decimal;

use crate::aggregates::position::{PositionAggregate, PositionRecord};
use crate::config::SizingConfig;
use crate::core::VtSymbol;

/// An account snapshot sufficient for the margin check in [`calculate_open_volume`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccountSnapshot {
    pub balance: Decimal,
    pub free_margin: Decimal,
}

pub trait PositionSizer: Send + Sync {
    fn calculate_open_volume(
        &self,
        desired: Decimal,
        vt_symbol: &VtSymbol,
        positions: &PositionAggregate,
        account: &AccountSnapshot,
        config: &SizingConfig,
    ) -> Decimal;

    fn calculate_exit_volume(&self, desired: Decimal, position: &PositionRecord) -> Decimal;
}

/// The default sizer described in SPEC_FULL §4.7: global cap, per-symbol cap, max concurrent
/// positions, then a free-margin check, all of which must pass or the open volume is zero.
#[derive(Debug, Default)]
pub struct DefaultPositionSizer;

impl PositionSizer for DefaultPositionSizer {
    fn calculate_open_volume(
        &self,
        desired: Decimal,
        vt_symbol: &VtSymbol,
        positions: &PositionAggregate,
        account: &AccountSnapshot,
        config: &SizingConfig,
    ) -> Decimal {
        if desired <= Decimal::ZERO {
            return Decimal::ZERO;
        }

        let global_cap = Decimal::from(config.global_daily_open_cap);
        let per_symbol_cap = Decimal::from(config.per_symbol_daily_open_cap);
        if !positions.check_open_limit(vt_symbol, desired, global_cap, per_symbol_cap) {
            return Decimal::ZERO;
        }

        let open_position_count = positions
            .get_positions_by_underlying(vt_symbol)
            .iter()
            .filter(|p| p.volume > Decimal::ZERO)
            .count();
        if open_position_count as u32 >= config.max_concurrent_positions {
            return Decimal::ZERO;
        }

        let required_margin = config.position_ratio * account.balance;
        if account.free_margin < required_margin {
            return Decimal::ZERO;
        }

        desired
    }

    fn calculate_exit_volume(&self, desired: Decimal, position: &PositionRecord) -> Decimal {
        let available = position.volume - position.pending_close_volume;
        desired.min(available.max(Decimal::ZERO))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Direction;
    use rust_decimal_macros::dec;

    fn config() -> SizingConfig {
        SizingConfig {
            global_daily_open_cap: 20,
            per_symbol_daily_open_cap: 5,
            max_concurrent_positions: 2,
            position_ratio: dec!(0.1),
        }
    }

    fn symbol() -> VtSymbol {
        VtSymbol::new("rb2505.SHFE")
    }

    #[test]
    fn returns_zero_when_per_symbol_cap_would_be_exceeded() {
        let mut positions = PositionAggregate::new();
        positions.on_new_trading_day(chrono::NaiveDate::from_ymd_opt(2025, 1, 10).unwrap());
        positions.record_open_usage(symbol(), dec!(4));

        let sizer = DefaultPositionSizer;
        let account = AccountSnapshot { balance: dec!(100000), free_margin: dec!(50000) };
        let volume = sizer.calculate_open_volume(dec!(2), &symbol(), &positions, &account, &config());
        assert_eq!(volume, Decimal::ZERO);
    }

    #[test]
    fn returns_zero_when_margin_insufficient() {
        let positions = PositionAggregate::new();
        let sizer = DefaultPositionSizer;
        let account = AccountSnapshot { balance: dec!(100000), free_margin: dec!(1000) };
        let volume = sizer.calculate_open_volume(dec!(2), &symbol(), &positions, &account, &config());
        assert_eq!(volume, Decimal::ZERO);
    }

    #[test]
    fn approves_when_all_checks_pass() {
        let positions = PositionAggregate::new();
        let sizer = DefaultPositionSizer;
        let account = AccountSnapshot { balance: dec!(100000), free_margin: dec!(50000) };
        let volume = sizer.calculate_open_volume(dec!(2), &symbol(), &positions, &account, &config());
        assert_eq!(volume, dec!(2));
    }

    #[test]
    fn exit_volume_clamps_to_available_minus_pending_close() {
        let sizer = DefaultPositionSizer;
        let position = PositionRecord {
            vt_symbol: symbol(),
            direction: Direction::Long,
            volume: dec!(10),
            pending_close_volume: dec!(3),
        };
        assert_eq!(sizer.calculate_exit_volume(dec!(20), &position), dec!(7));
        assert_eq!(sizer.calculate_exit_volume(dec!(5), &position), dec!(5));
    }
}
