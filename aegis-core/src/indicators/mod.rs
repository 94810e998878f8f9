//! Indicator service port (C3).
//!
//! Concrete indicator logic is supplied by strategy code, not the core (SPEC_FULL §9 "pluggable
//! services"); this module only defines the capability interface and the open-valued dictionary
//! indicators are written into.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::aggregates::instrument::InstrumentAggregate;
use crate::core::{Bar, VtSymbol};

/// A tagged union standing in for "whatever type this indicator naturally produces" — the
/// re-architecture of the original's dynamically-typed indicator dict (SPEC_FULL §9).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum IndicatorValue {
    Number(Decimal),
    Series(Vec<Decimal>),
    Text(String),
    Boolean(bool),
}

impl IndicatorValue {
    pub fn as_number(&self) -> Option<Decimal> {
        match self {
            IndicatorValue::Number(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_series(&self) -> Option<&[Decimal]> {
        match self {
            IndicatorValue::Series(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            IndicatorValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }
}

pub type IndicatorMap = HashMap<String, IndicatorValue>;

/// One computation step invoked for every updated instrument, every window bar (SPEC_FULL §4.3).
/// Implementations write their results into the instrument's indicator map by name, addressed
/// through `vt_symbol` since the aggregate holds many symbols; the core never reads or validates
/// the values it stores.
pub trait IndicatorService: Send + Sync {
    fn calculate_bar(&self, instrument: &mut InstrumentAggregate, vt_symbol: &VtSymbol, bar: &Bar);
}

/// A registry-style composite that runs a fixed ordered list of indicators, for strategies that
/// compose several independent calculations per bar.
#[derive(Default)]
pub struct IndicatorChain {
    steps: Vec<Box<dyn IndicatorService>>,
}

impl IndicatorChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, step: Box<dyn IndicatorService>) -> &mut Self {
        self.steps.push(step);
        self
    }
}

impl IndicatorService for IndicatorChain {
    fn calculate_bar(&self, instrument: &mut InstrumentAggregate, vt_symbol: &VtSymbol, bar: &Bar) {
        for step in &self.steps {
            step.calculate_bar(instrument, vt_symbol, bar);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    struct LastCloseIndicator;
    impl IndicatorService for LastCloseIndicator {
        fn calculate_bar(&self, instrument: &mut InstrumentAggregate, vt_symbol: &VtSymbol, bar: &Bar) {
            instrument
                .indicators_mut(vt_symbol)
                .insert("last_close".to_string(), IndicatorValue::Number(bar.close));
        }
    }

    struct AboveAverageIndicator;
    impl IndicatorService for AboveAverageIndicator {
        fn calculate_bar(&self, instrument: &mut InstrumentAggregate, vt_symbol: &VtSymbol, bar: &Bar) {
            let above = instrument
                .indicators(vt_symbol)
                .and_then(|m| m.get("last_close"))
                .and_then(IndicatorValue::as_number)
                .map(|prev| bar.close >= prev)
                .unwrap_or(false);
            instrument
                .indicators_mut(vt_symbol)
                .insert("above_prev".to_string(), IndicatorValue::Boolean(above));
        }
    }

    #[test]
    fn chain_runs_steps_in_order_and_later_steps_see_earlier_writes() {
        let mut chain = IndicatorChain::new();
        chain.push(Box::new(LastCloseIndicator)).push(Box::new(AboveAverageIndicator));

        let mut instrument = InstrumentAggregate::new("rb2505.SHFE");
        let symbol = VtSymbol::new("rb2505.SHFE");
        let bar = Bar::new("rb2505.SHFE", Utc::now(), 1, dec!(100), dec!(101), dec!(99), dec!(100), dec!(10));
        chain.calculate_bar(&mut instrument, &symbol, &bar);

        assert_eq!(instrument.indicators(&symbol).unwrap().get("last_close").unwrap().as_number(), Some(dec!(100)));
        assert_eq!(instrument.indicators(&symbol).unwrap().get("above_prev").unwrap().as_bool(), Some(true));
    }
}
