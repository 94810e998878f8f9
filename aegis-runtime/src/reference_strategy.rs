//! A minimal indicator/signal pair the `worker` binary plugs into
//! `aegis_core::strategy_engine::ServiceBundle` out of the box, so the binary is runnable without
//! first writing a strategy. Generalizes the `LastCloseIndicator`/`AboveAverageIndicator` and
//! `ThresholdSignal` fixtures from `aegis-core`'s own `indicators`/`signals` module tests into a
//! small moving-average crossover: a real deployment supplies its own
//! `IndicatorService`/`SignalService` implementations and never touches this module.

use rust_decimal::Decimal;

use aegis_core::aggregates::instrument::InstrumentAggregate;
use aegis_core::aggregates::position::PositionRecord;
use aegis_core::core::{Bar, VtSymbol};
use aegis_core::indicators::{IndicatorService, IndicatorValue};
use aegis_core::signals::SignalService;

const SMA_NAME: &str = "sma";
const ABOVE_SMA_NAME: &str = "above_sma";

/// Writes a simple moving average of the last `window` closes, plus whether the current close is
/// above it, into the instrument's indicator map.
pub struct SimpleMovingAverageIndicator {
    pub window: usize,
}

impl IndicatorService for SimpleMovingAverageIndicator {
    fn calculate_bar(&self, instrument: &mut InstrumentAggregate, vt_symbol: &VtSymbol, bar: &Bar) {
        let history = instrument.get_bar_history(vt_symbol, self.window);
        if history.is_empty() {
            return;
        }
        let sum: Decimal = history.iter().map(|b| b.close).sum();
        let sma = sum / Decimal::from(history.len());
        let above = bar.close > sma;

        let indicators = instrument.indicators_mut(vt_symbol);
        indicators.insert(SMA_NAME.to_string(), IndicatorValue::Number(sma));
        indicators.insert(ABOVE_SMA_NAME.to_string(), IndicatorValue::Boolean(above));
    }
}

/// Opens on an upward crossover of the moving average, closes on a downward one. The emitted
/// signal strings are this implementation's private vocabulary (SPEC_FULL §9: "keep as opaque
/// strings; do not model as closed enum") — the core never inspects them.
pub struct MovingAverageCrossoverSignal;

impl SignalService for MovingAverageCrossoverSignal {
    fn check_open_signal(&self, instrument: &InstrumentAggregate, vt_symbol: &VtSymbol) -> Option<String> {
        let above = instrument.indicators(vt_symbol)?.get(ABOVE_SMA_NAME)?.as_bool()?;
        above.then(|| "sma_crossover_long".to_string())
    }

    fn check_close_signal(&self, instrument: &InstrumentAggregate, vt_symbol: &VtSymbol, _position: &PositionRecord) -> Option<String> {
        let above = instrument.indicators(vt_symbol)?.get(ABOVE_SMA_NAME)?.as_bool()?;
        (!above).then(|| "sma_crossover_exit".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_core::core::VtSymbol;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn bar(symbol: &str, close: Decimal, minutes_offset: i64) -> Bar {
        Bar::new(symbol, Utc::now() + chrono::Duration::minutes(minutes_offset), 1, close, close, close, close, dec!(10))
    }

    #[test]
    fn crossover_signal_fires_once_close_clears_the_average() {
        let symbol = VtSymbol::from("rb2505.SHFE");
        let mut instrument = InstrumentAggregate::new("rb2505.SHFE");
        let sma = SimpleMovingAverageIndicator { window: 3 };
        let signal = MovingAverageCrossoverSignal;

        for (i, close) in [dec!(100), dec!(100), dec!(100)].into_iter().enumerate() {
            let bar = bar("rb2505.SHFE", close, i as i64);
            instrument.append_bar(&symbol, bar.clone()).unwrap();
            sma.calculate_bar(&mut instrument, &symbol, &bar);
        }
        assert_eq!(signal.check_open_signal(&instrument, &symbol), None);

        let breakout = bar("rb2505.SHFE", dec!(110), 3);
        instrument.append_bar(&symbol, breakout.clone()).unwrap();
        sma.calculate_bar(&mut instrument, &symbol, &breakout);
        assert_eq!(signal.check_open_signal(&instrument, &symbol), Some("sma_crossover_long".to_string()));
    }
}
