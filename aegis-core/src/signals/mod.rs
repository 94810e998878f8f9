//! Signal service port (C4): maps indicator state to an open-vocabulary signal string. The core
//! neither parses nor validates these strings (SPEC_FULL §9) — it only tags positions and events
//! with whatever the strategy's implementation returns.

use crate::aggregates::instrument::InstrumentAggregate;
use crate::aggregates::position::PositionRecord;

pub trait SignalService: Send + Sync {
    fn check_open_signal(&self, instrument: &InstrumentAggregate, vt_symbol: &crate::core::VtSymbol) -> Option<String>;
    fn check_close_signal(
        &self,
        instrument: &InstrumentAggregate,
        vt_symbol: &crate::core::VtSymbol,
        position: &PositionRecord,
    ) -> Option<String>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::VtSymbol;
    use crate::indicators::IndicatorValue;
    use rust_decimal_macros::dec;

    struct ThresholdSignal;
    impl SignalService for ThresholdSignal {
        fn check_open_signal(&self, instrument: &InstrumentAggregate, vt_symbol: &VtSymbol) -> Option<String> {
            let above = instrument
                .indicators(vt_symbol)?
                .get("above_prev")?
                .as_bool()?;
            above.then(|| "momentum_breakout".to_string())
        }

        fn check_close_signal(
            &self,
            instrument: &InstrumentAggregate,
            vt_symbol: &VtSymbol,
            _position: &PositionRecord,
        ) -> Option<String> {
            let below = !instrument.indicators(vt_symbol)?.get("above_prev")?.as_bool()?;
            below.then(|| "momentum_exhausted".to_string())
        }
    }

    #[test]
    fn open_signal_fires_on_flagged_indicator() {
        let mut instrument = InstrumentAggregate::new("rb2505.SHFE");
        let symbol = VtSymbol::new("rb2505.SHFE");
        instrument.indicators_mut(&symbol).insert("above_prev".to_string(), IndicatorValue::Boolean(true));

        let signal = ThresholdSignal;
        assert_eq!(signal.check_open_signal(&instrument, &symbol), Some("momentum_breakout".to_string()));
    }

    #[test]
    fn no_signal_returns_none() {
        let mut instrument = InstrumentAggregate::new("rb2505.SHFE");
        let symbol = VtSymbol::new("rb2505.SHFE");
        instrument.indicators_mut(&symbol).insert("above_prev".to_string(), IndicatorValue::Boolean(false));

        let signal = ThresholdSignal;
        assert_eq!(signal.check_open_signal(&instrument, &symbol), None);

        let position = PositionRecord {
            vt_symbol: symbol.clone(),
            direction: crate::core::Direction::Long,
            volume: dec!(5),
            pending_close_volume: dec!(0),
        };
        assert_eq!(
            signal.check_close_signal(&instrument, &symbol, &position),
            Some("momentum_exhausted".to_string())
        );
    }
}
