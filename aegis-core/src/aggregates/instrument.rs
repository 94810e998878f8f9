//! Instrument Aggregate (C13): per-symbol bar history, indicator dict, and the product →
//! active-contract map.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::{Bar, VtSymbol};
use crate::indicators::IndicatorMap;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InstrumentError {
    #[error("bar datetime {new} is not strictly after the last appended bar datetime {last}")]
    NonMonotonicBar { last: DateTime<Utc>, new: DateTime<Utc> },
}

/// A single symbol's market history and derived state. Bars are kept in a ring so memory stays
/// bounded; `ring_capacity` governs how many are retained (oldest dropped first).
#[derive(Debug, Clone)]
pub struct SymbolState {
    bars: std::collections::VecDeque<Bar>,
    ring_capacity: usize,
    pub indicators: IndicatorMap,
}

impl SymbolState {
    fn new(ring_capacity: usize) -> Self {
        Self {
            bars: std::collections::VecDeque::with_capacity(ring_capacity),
            ring_capacity,
            indicators: IndicatorMap::new(),
        }
    }

    fn append_bar(&mut self, bar: Bar) -> Result<(), InstrumentError> {
        if let Some(last) = self.bars.back() {
            if bar.datetime <= last.datetime {
                return Err(InstrumentError::NonMonotonicBar { last: last.datetime, new: bar.datetime });
            }
        }
        if self.bars.len() == self.ring_capacity {
            self.bars.pop_front();
        }
        self.bars.push_back(bar);
        Ok(())
    }

    fn latest_price(&self) -> Option<Decimal> {
        self.bars.back().map(|b| b.close)
    }

    fn history(&self, n: usize) -> Vec<Bar> {
        let len = self.bars.len();
        let skip = len.saturating_sub(n);
        self.bars.iter().skip(skip).cloned().collect()
    }
}

/// Aggregate root for market data: one [`SymbolState`] per `vt_symbol`, plus the active-contract
/// map maintained by rollover (SPEC_FULL §4.4, §4.12 step 3). Owned exclusively by the strategy
/// engine; other components see it only through these query methods.
#[derive(Debug, Default)]
pub struct InstrumentAggregate {
    symbols: HashMap<VtSymbol, SymbolState>,
    active_contracts: HashMap<String, VtSymbol>,
    ring_capacity: usize,
}

const DEFAULT_RING_CAPACITY: usize = 500;

impl InstrumentAggregate {
    pub fn new(_seed_symbol: impl Into<String>) -> Self {
        Self::with_ring_capacity(DEFAULT_RING_CAPACITY)
    }

    pub fn with_ring_capacity(ring_capacity: usize) -> Self {
        Self {
            symbols: HashMap::new(),
            active_contracts: HashMap::new(),
            ring_capacity,
        }
    }

    pub fn get_or_create(&mut self, vt_symbol: &VtSymbol) -> &mut SymbolState {
        let capacity = self.ring_capacity;
        self.symbols.entry(vt_symbol.clone()).or_insert_with(|| SymbolState::new(capacity))
    }

    pub fn append_bar(&mut self, vt_symbol: &VtSymbol, bar: Bar) -> Result<(), InstrumentError> {
        self.get_or_create(vt_symbol).append_bar(bar)
    }

    pub fn get_bar_history(&self, vt_symbol: &VtSymbol, n: usize) -> Vec<Bar> {
        self.symbols.get(vt_symbol).map(|s| s.history(n)).unwrap_or_default()
    }

    pub fn get_latest_price(&self, vt_symbol: &VtSymbol) -> Option<Decimal> {
        self.symbols.get(vt_symbol).and_then(|s| s.latest_price())
    }

    pub fn has_enough_data(&self, vt_symbol: &VtSymbol, min_len: usize) -> bool {
        self.symbols.get(vt_symbol).map(|s| s.bars.len() >= min_len).unwrap_or(false)
    }

    pub fn set_active_contract(&mut self, product: impl Into<String>, vt_symbol: VtSymbol) {
        self.active_contracts.insert(product.into(), vt_symbol);
    }

    pub fn get_active_contract(&self, product: &str) -> Option<&VtSymbol> {
        self.active_contracts.get(product)
    }

    pub fn get_all_active_contracts(&self) -> &HashMap<String, VtSymbol> {
        &self.active_contracts
    }

    pub fn indicators_mut(&mut self, vt_symbol: &VtSymbol) -> &mut IndicatorMap {
        &mut self.get_or_create(vt_symbol).indicators
    }

    pub fn indicators(&self, vt_symbol: &VtSymbol) -> Option<&IndicatorMap> {
        self.symbols.get(vt_symbol).map(|s| &s.indicators)
    }

    pub fn known_symbols(&self) -> impl Iterator<Item = &VtSymbol> {
        self.symbols.keys()
    }

    pub fn snapshot(&self) -> InstrumentAggregateSnapshot {
        InstrumentAggregateSnapshot {
            ring_capacity: self.ring_capacity,
            symbols: self
                .symbols
                .iter()
                .map(|(symbol, state)| (symbol.as_str().to_string(), state.snapshot()))
                .collect(),
            active_contracts: self
                .active_contracts
                .iter()
                .map(|(product, symbol)| (product.clone(), symbol.as_str().to_string()))
                .collect(),
        }
    }

    pub fn restore(snapshot: InstrumentAggregateSnapshot) -> Self {
        Self {
            symbols: snapshot
                .symbols
                .into_iter()
                .map(|(symbol, state)| (VtSymbol::new(symbol), SymbolState::restore(state, snapshot.ring_capacity)))
                .collect(),
            active_contracts: snapshot
                .active_contracts
                .into_iter()
                .map(|(product, symbol)| (product, VtSymbol::new(symbol)))
                .collect(),
            ring_capacity: snapshot.ring_capacity,
        }
    }
}

/// Plain-data projection of [`SymbolState`] for persistence (C17).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SymbolStateSnapshot {
    pub bars: Vec<Bar>,
    pub indicators: IndicatorMap,
}

impl SymbolState {
    fn snapshot(&self) -> SymbolStateSnapshot {
        SymbolStateSnapshot { bars: self.bars.iter().cloned().collect(), indicators: self.indicators.clone() }
    }

    fn restore(snapshot: SymbolStateSnapshot, ring_capacity: usize) -> Self {
        let mut bars = std::collections::VecDeque::with_capacity(ring_capacity.max(snapshot.bars.len()));
        bars.extend(snapshot.bars);
        Self { bars, ring_capacity, indicators: snapshot.indicators }
    }
}

/// Plain-data projection of [`InstrumentAggregate`] for persistence (C17).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstrumentAggregateSnapshot {
    pub ring_capacity: usize,
    pub symbols: HashMap<String, SymbolStateSnapshot>,
    pub active_contracts: HashMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn bar_at(symbol: &str, minute: i64) -> Bar {
        let dt = Utc::now() + chrono::Duration::minutes(minute);
        Bar::new(symbol, dt, 1, dec!(100), dec!(101), dec!(99), dec!(100), dec!(10))
    }

    #[test]
    fn append_bar_enforces_strict_monotonicity() {
        let symbol = VtSymbol::new("rb2505.SHFE");
        let mut agg = InstrumentAggregate::new("rb2505.SHFE");
        agg.append_bar(&symbol, bar_at("rb2505.SHFE", 1)).unwrap();

        let dup = bar_at("rb2505.SHFE", 1);
        let err = agg.append_bar(&symbol, dup).unwrap_err();
        assert!(matches!(err, InstrumentError::NonMonotonicBar { .. }));

        let earlier = bar_at("rb2505.SHFE", 0);
        assert!(agg.append_bar(&symbol, earlier).is_err());
    }

    #[test]
    fn ring_buffer_drops_oldest_bar_past_capacity() {
        let symbol = VtSymbol::new("rb2505.SHFE");
        let mut agg = InstrumentAggregate::with_ring_capacity(3);
        for i in 0..5 {
            agg.append_bar(&symbol, bar_at("rb2505.SHFE", i)).unwrap();
        }
        let history = agg.get_bar_history(&symbol, 10);
        assert_eq!(history.len(), 3);
    }

    #[test]
    fn active_contract_map_tracks_one_symbol_per_product() {
        let mut agg = InstrumentAggregate::new("seed");
        agg.set_active_contract("rb", VtSymbol::new("rb2505.SHFE"));
        assert_eq!(agg.get_active_contract("rb"), Some(&VtSymbol::new("rb2505.SHFE")));
        agg.set_active_contract("rb", VtSymbol::new("rb2509.SHFE"));
        assert_eq!(agg.get_active_contract("rb"), Some(&VtSymbol::new("rb2509.SHFE")));
        assert_eq!(agg.get_all_active_contracts().len(), 1);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        /// Property 1 (SPEC_FULL §8): of any sequence of offsets fed to `append_bar`, only those
        /// that land strictly after the previous accepted bar are ever retained, so the surviving
        /// history is always strictly increasing regardless of how the caller ordered its input.
        #[test]
        fn prop_accepted_bars_are_strictly_monotonic() {
            proptest!(|(offsets in prop::collection::vec(-5i64..50i64, 1..60))| {
                let symbol = VtSymbol::new("rb2505.SHFE");
                let mut agg = InstrumentAggregate::with_ring_capacity(1000);
                let base = DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z").unwrap().with_timezone(&Utc);

                for offset in offsets {
                    let dt = base + chrono::Duration::minutes(offset);
                    let bar = Bar::new("rb2505.SHFE", dt, 1, dec!(100), dec!(101), dec!(99), dec!(100), dec!(10));
                    let _ = agg.append_bar(&symbol, bar);
                }

                let history = agg.get_bar_history(&symbol, 1000);
                for pair in history.windows(2) {
                    prop_assert!(pair[0].datetime < pair[1].datetime);
                }
            });
        }

        /// Property 14: after any sequence of `set_active_contract` calls across any products, at
        /// most one `vt_symbol` is active per product (last write wins, no product ever maps to
        /// more than one entry in the map).
        #[test]
        fn prop_active_contract_map_stays_unique_per_product() {
            proptest!(|(calls in prop::collection::vec((0usize..4, 0usize..6), 1..40))| {
                let mut agg = InstrumentAggregate::new("seed");
                let products = ["rb", "cu", "au", "ag"];
                let mut expected = HashMap::new();

                for (product_idx, symbol_idx) in calls {
                    let product = products[product_idx];
                    let symbol = VtSymbol::new(format!("sym{}.EXCH", symbol_idx));
                    agg.set_active_contract(product, symbol.clone());
                    expected.insert(product.to_string(), symbol);
                }

                prop_assert_eq!(agg.get_all_active_contracts().len(), expected.len());
                for (product, symbol) in &expected {
                    prop_assert_eq!(agg.get_active_contract(product), Some(symbol));
                }
            });
        }
    }
}
