//! Bar pipeline (C15): assembles window bars from 1-minute bars or ticks.
//!
//! Downstream (the strategy engine, C16) never sees a partial window: bars are buffered per
//! symbol until their window closes, and — for multiple subscribed symbols — held back until
//! every subscribed symbol's bar for that window has arrived, so a single callback delivers a
//! consistent cross-symbol snapshot (the "multi-symbol barrier" of SPEC_FULL §4.2).

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;

use crate::core::{Bar, Tick};

#[derive(Debug, Clone)]
struct WindowAccumulator {
    window_index: i64,
    vt_symbol: String,
    open: Decimal,
    high: Decimal,
    low: Decimal,
    close: Decimal,
    volume: Decimal,
    open_interest: Decimal,
}

impl WindowAccumulator {
    fn start(window_index: i64, bar: &Bar) -> Self {
        Self {
            window_index,
            vt_symbol: bar.vt_symbol.clone(),
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: bar.volume,
            open_interest: bar.open_interest,
        }
    }

    fn accumulate(&mut self, bar: &Bar) {
        self.high = self.high.max(bar.high);
        self.low = self.low.min(bar.low);
        self.close = bar.close;
        self.volume += bar.volume;
        self.open_interest = bar.open_interest;
    }

    fn finish(&self, bar_window: u32, interval_minutes: u32) -> Bar {
        let close_minute = (self.window_index + 1) * i64::from(bar_window);
        let datetime = minute_index_to_datetime(close_minute);
        Bar {
            vt_symbol: self.vt_symbol.clone(),
            datetime,
            interval_minutes,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
            open_interest: self.open_interest,
        }
    }
}

fn minute_index_to_datetime(total_minutes: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(total_minutes * 60, 0).single().expect("minute index in range")
}

fn window_index(datetime: DateTime<Utc>, bar_window: u32) -> i64 {
    let total_minutes = datetime.timestamp().div_euclid(60);
    total_minutes.div_euclid(i64::from(bar_window))
}

/// The default cap on how many distinct windows may sit in `pending` waiting for a stalled
/// symbol, before the oldest is dropped. At one window per bar_window-minutes, this covers
/// several hours of staleness on a typical 1-5 minute bar_window before data is discarded.
const DEFAULT_MAX_PENDING_WINDOWS: usize = 64;

/// Builds fixed-width window bars from a stream of 1-minute bars (or ticks), one accumulator per
/// subscribed symbol, gated by a multi-symbol barrier.
pub struct BarPipeline {
    bar_window: u32,
    max_pending_windows: usize,
    subscribed: HashSet<String>,
    accumulators: HashMap<String, WindowAccumulator>,
    tick_accumulators: HashMap<String, WindowAccumulator>,
    pending: HashMap<i64, HashMap<String, Bar>>,
}

impl BarPipeline {
    pub fn new(bar_window: u32) -> Self {
        Self::with_max_pending_windows(bar_window, DEFAULT_MAX_PENDING_WINDOWS)
    }

    /// Same as [`Self::new`], but with an explicit cap (SPEC_FULL §4.2 / spec.md "MUST NOT buffer
    /// bars past a configurable limit") on how many windows `pending` may hold while waiting on a
    /// stalled subscribed symbol. Once a window beyond the cap would be added, the oldest pending
    /// window is dropped (and logged) instead of growing without bound.
    pub fn with_max_pending_windows(bar_window: u32, max_pending_windows: usize) -> Self {
        assert!(bar_window >= 1, "bar_window must be at least 1 minute");
        assert!(max_pending_windows >= 1, "max_pending_windows must be at least 1");
        Self {
            bar_window,
            max_pending_windows,
            subscribed: HashSet::new(),
            accumulators: HashMap::new(),
            tick_accumulators: HashMap::new(),
            pending: HashMap::new(),
        }
    }

    pub fn subscribe(&mut self, vt_symbol: impl Into<String>) {
        self.subscribed.insert(vt_symbol.into());
    }

    pub fn unsubscribe(&mut self, vt_symbol: &str) {
        self.subscribed.remove(vt_symbol);
        self.accumulators.remove(vt_symbol);
        self.tick_accumulators.remove(vt_symbol);
    }

    pub fn is_bypassed(&self) -> bool {
        self.bar_window == 1
    }

    /// Feeds one 1-minute bar in. Returns the window dict(s) that closed as a result — usually
    /// zero or one, but a late-arriving bar that jumps more than one window ahead can flush
    /// several at once.
    pub fn handle_bars(&mut self, bars: &[Bar]) -> Vec<(DateTime<Utc>, HashMap<String, Bar>)> {
        if self.is_bypassed() {
            return bars
                .iter()
                .map(|bar| {
                    let mut dict = HashMap::new();
                    dict.insert(bar.vt_symbol.clone(), bar.clone());
                    (bar.datetime, dict)
                })
                .collect();
        }

        for bar in bars {
            self.ingest(bar);
        }
        self.drain_ready()
    }

    /// Feeds a single tick in, synthesizing a running 1-minute bar and delegating to the same
    /// windowing logic as [`Self::handle_bars`] once that minute closes.
    pub fn handle_tick(&mut self, tick: &Tick) -> Vec<(DateTime<Utc>, HashMap<String, Bar>)> {
        let minute_index = tick.datetime.timestamp().div_euclid(60);
        let closed_minute_bar = match self.tick_accumulators.get_mut(&tick.vt_symbol) {
            Some(acc) if acc.window_index == minute_index => {
                acc.high = acc.high.max(tick.last_price);
                acc.low = acc.low.min(tick.last_price);
                acc.close = tick.last_price;
                acc.volume += tick.volume;
                None
            }
            Some(acc) => {
                let finished = acc.finish(1, 1);
                *acc = minute_seed(minute_index, tick);
                Some(finished)
            }
            None => {
                self.tick_accumulators.insert(tick.vt_symbol.clone(), minute_seed(minute_index, tick));
                None
            }
        };

        match closed_minute_bar {
            Some(bar) => self.handle_bars(&[bar]),
            None => Vec::new(),
        }
    }

    fn ingest(&mut self, bar: &Bar) {
        let idx = window_index(bar.datetime, self.bar_window);
        match self.accumulators.get_mut(&bar.vt_symbol) {
            Some(acc) if acc.window_index == idx => acc.accumulate(bar),
            Some(acc) => {
                let finished = acc.finish(self.bar_window, self.bar_window);
                self.pending.entry(acc.window_index).or_default().insert(bar.vt_symbol.clone(), finished);
                self.accumulators.insert(bar.vt_symbol.clone(), WindowAccumulator::start(idx, bar));
                self.evict_stale_windows();
            }
            None => {
                self.accumulators.insert(bar.vt_symbol.clone(), WindowAccumulator::start(idx, bar));
            }
        }
    }

    /// Drops the oldest pending window(s) once `pending` exceeds `max_pending_windows`. A window
    /// only ever sits here waiting on a stalled subscribed symbol that never reports, so this is
    /// the multi-symbol barrier's only way to shed a symbol that stopped producing bars.
    fn evict_stale_windows(&mut self) {
        while self.pending.len() > self.max_pending_windows {
            let Some(&oldest_idx) = self.pending.keys().min() else { break };
            if let Some(dropped) = self.pending.remove(&oldest_idx) {
                tracing::warn!(
                    window_index = oldest_idx,
                    symbols_present = ?dropped.keys().collect::<Vec<_>>(),
                    max_pending_windows = self.max_pending_windows,
                    "dropping stale bar window past the pending-window cap; a subscribed symbol stalled"
                );
            }
        }
    }

    fn drain_ready(&mut self) -> Vec<(DateTime<Utc>, HashMap<String, Bar>)> {
        let mut ready_indices: Vec<i64> = self
            .pending
            .iter()
            .filter(|(_, dict)| self.subscribed.is_empty() || self.subscribed.iter().all(|s| dict.contains_key(s)))
            .map(|(idx, _)| *idx)
            .collect();
        ready_indices.sort_unstable();

        ready_indices
            .into_iter()
            .map(|idx| {
                let dict = self.pending.remove(&idx).unwrap();
                let datetime = minute_index_to_datetime((idx + 1) * i64::from(self.bar_window));
                (datetime, dict)
            })
            .collect()
    }
}

fn minute_seed(window_index: i64, tick: &Tick) -> WindowAccumulator {
    WindowAccumulator {
        window_index,
        vt_symbol: tick.vt_symbol.clone(),
        open: tick.last_price,
        high: tick.last_price,
        low: tick.last_price,
        close: tick.last_price,
        volume: tick.volume,
        open_interest: Decimal::ZERO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn minute_bar(symbol: &str, minute: i64, price: Decimal) -> Bar {
        Bar {
            vt_symbol: symbol.to_string(),
            datetime: minute_index_to_datetime(minute),
            interval_minutes: 1,
            open: price,
            high: price,
            low: price,
            close: price,
            volume: dec!(1),
            open_interest: Decimal::ZERO,
        }
    }

    #[test]
    fn bar_window_one_bypasses_aggregation() {
        let mut pipeline = BarPipeline::new(1);
        let bar = minute_bar("rb2501.SHFE", 100, dec!(3500));
        let out = pipeline.handle_bars(&[bar.clone()]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].1.get("rb2501.SHFE").unwrap(), &bar);
    }

    #[test]
    fn aggregates_bar_window_minutes_before_emitting() {
        let mut pipeline = BarPipeline::new(5);
        pipeline.subscribe("rb2501.SHFE");

        // window [100,105) closes once a bar lands in window [105,110).
        for (minute, price) in [(100, dec!(10)), (101, dec!(12)), (102, dec!(9)), (103, dec!(11)), (104, dec!(11.5))] {
            assert!(pipeline.handle_bars(&[minute_bar("rb2501.SHFE", minute, price)]).is_empty());
        }
        let out = pipeline.handle_bars(&[minute_bar("rb2501.SHFE", 105, dec!(13))]);
        assert_eq!(out.len(), 1);
        let window_bar = out[0].1.get("rb2501.SHFE").unwrap();
        assert_eq!(window_bar.open, dec!(10));
        assert_eq!(window_bar.high, dec!(12));
        assert_eq!(window_bar.low, dec!(9));
        assert_eq!(window_bar.close, dec!(11.5));
        assert_eq!(window_bar.volume, dec!(5));
    }

    #[test]
    fn multi_symbol_barrier_waits_for_every_subscribed_symbol() {
        let mut pipeline = BarPipeline::new(2);
        pipeline.subscribe("a");
        pipeline.subscribe("b");

        assert!(pipeline.handle_bars(&[minute_bar("a", 10, dec!(1))]).is_empty());
        assert!(pipeline.handle_bars(&[minute_bar("a", 11, dec!(1))]).is_empty());
        // "a"'s window closes but "b" hasn't reported anything for this window yet.
        let out = pipeline.handle_bars(&[minute_bar("a", 12, dec!(1))]);
        assert!(out.is_empty());

        assert!(pipeline.handle_bars(&[minute_bar("b", 10, dec!(2))]).is_empty());
        let out = pipeline.handle_bars(&[minute_bar("b", 12, dec!(2))]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].1.len(), 2);
        assert!(out[0].1.contains_key("a") && out[0].1.contains_key("b"));
    }

    #[test]
    fn stalled_symbol_does_not_grow_pending_past_the_configured_cap() {
        // "b" never reports, so every one of "a"'s closed windows piles up in `pending` waiting
        // on the barrier; once the cap is hit the oldest pending windows must be dropped rather
        // than accumulating forever.
        let mut pipeline = BarPipeline::with_max_pending_windows(2, 3);
        pipeline.subscribe("a");
        pipeline.subscribe("b");

        for minute in (10..200).step_by(2) {
            pipeline.handle_bars(&[minute_bar("a", minute, dec!(1))]);
        }

        assert!(pipeline.pending.len() <= 3);
    }

    #[test]
    fn ticks_synthesize_minute_bars_before_windowing() {
        let mut pipeline = BarPipeline::new(1);
        let base = minute_index_to_datetime(1_000_000);
        let tick_a = Tick {
            vt_symbol: "rb2501.SHFE".into(),
            datetime: base,
            last_price: dec!(3500),
            volume: dec!(1),
            bid_price_1: dec!(3499),
            bid_volume_1: dec!(5),
            ask_price_1: dec!(3501),
            ask_volume_1: dec!(5),
        };
        assert!(pipeline.handle_tick(&tick_a).is_empty());

        let mut tick_b = tick_a.clone();
        tick_b.datetime = base + chrono::Duration::minutes(1);
        tick_b.last_price = dec!(3510);
        let out = pipeline.handle_tick(&tick_b);
        assert_eq!(out.len(), 1);
        let closed = out[0].1.get("rb2501.SHFE").unwrap();
        assert_eq!(closed.close, dec!(3500));
    }
}
