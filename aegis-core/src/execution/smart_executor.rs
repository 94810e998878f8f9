//! Smart order executor (C9): adaptive pricing, tick rounding, and timeout/retry orchestration
//! wrapping [`super::order_fsm::ManagedOrder`].
//!
//! Grounded on `bog-core/src/execution/simulated.rs`'s `apply_slippage(price, side)` for the
//! adaptive-price bias and `bog-core/src/risk/pre_trade.rs`'s tick-validity remainder check for
//! rounding. Like the order FSM it wraps, this does no I/O itself — it hands the caller a price to
//! send and reacts to fill/timeout/cancel notifications the caller feeds back in.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::core::{Direction, VtOrderId};
use crate::events::DomainEvent;
use crate::execution::order_fsm::{ManagedOrder, ManagedOrderState};

/// Which side of the book an order is aggressing toward, independent of long/short: a long buy
/// and a short sell-to-close are both "aggressive" in the sense of paying up to get filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdaptiveSide {
    Buy,
    Sell,
}

impl From<Direction> for AdaptiveSide {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::Long => AdaptiveSide::Buy,
            Direction::Short => AdaptiveSide::Sell,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmartExecutorConfig {
    pub slippage_ticks: u32,
    pub pricetick: Decimal,
    pub order_timeout: chrono::Duration,
    pub max_retries: u32,
}

/// Biases `reference` toward the taker side by up to `slippage_ticks`, per SPEC_FULL §4.9(a): a
/// buy pays up, a sell gives up, each by at most the configured number of ticks.
pub fn adaptive_price(side: AdaptiveSide, reference: Decimal, pricetick: Decimal, slippage_ticks: u32) -> Decimal {
    let budget = pricetick * Decimal::from(slippage_ticks);
    match side {
        AdaptiveSide::Buy => reference + budget,
        AdaptiveSide::Sell => reference - budget,
    }
}

/// Rounds `price` to the nearest valid `pricetick`, breaking ties (and rounding direction when
/// the price falls between two ticks) toward the side that makes the order more likely to cross:
/// a buy rounds up, a sell rounds down.
pub fn round_to_tick(side: AdaptiveSide, price: Decimal, pricetick: Decimal) -> Decimal {
    if pricetick <= Decimal::ZERO {
        return price;
    }
    let ticks = price / pricetick;
    let rounded_ticks = match side {
        AdaptiveSide::Buy => ticks.ceil(),
        AdaptiveSide::Sell => ticks.floor(),
    };
    rounded_ticks * pricetick
}

/// Tracks every in-flight managed order and drives its lifecycle. Owned by the strategy engine;
/// never shared across threads (SPEC_FULL §5's single-threaded-cooperative model).
#[derive(Debug, Default)]
pub struct SmartExecutor {
    orders: HashMap<VtOrderId, ManagedOrder>,
}

impl SmartExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Computes the limit price to send for a fresh (or retried) submission.
    pub fn compute_price(&self, config: &SmartExecutorConfig, side: AdaptiveSide, reference: Decimal) -> Decimal {
        let biased = adaptive_price(side, reference, config.pricetick, config.slippage_ticks);
        round_to_tick(side, biased, config.pricetick)
    }

    /// Registers a newly-sent order for timeout tracking.
    pub fn register(&mut self, vt_orderid: VtOrderId, price: Decimal, sent_at: DateTime<Utc>, timeout: chrono::Duration) {
        self.orders.insert(vt_orderid.clone(), ManagedOrder::new(vt_orderid, price, sent_at, timeout));
    }

    pub fn on_fill(&mut self, vt_orderid: &VtOrderId) {
        if let Some(order) = self.orders.get_mut(vt_orderid) {
            order.on_fill();
        }
    }

    pub fn on_broker_cancel_or_reject(&mut self, vt_orderid: &VtOrderId) {
        if let Some(order) = self.orders.get_mut(vt_orderid) {
            order.on_broker_cancel_or_reject();
        }
    }

    /// Checked on every timer tick (≥ 1 Hz per SPEC_FULL §5). Returns one `OrderTimeoutEvent` per
    /// order that just crossed its deadline.
    pub fn check_timeouts(&mut self, now: DateTime<Utc>) -> Vec<DomainEvent> {
        self.orders.values_mut().filter_map(|order| order.check_timeout(now)).collect()
    }

    /// Attempts to retry every order currently `TimedOut`, using `reference_price` as the quote
    /// to re-bias from. Returns `(vt_orderid, new_price)` for orders to resubmit, and emits
    /// `OrderRetryExhaustedEvent` for orders that have used up their retries.
    pub fn retry_timed_out(
        &mut self,
        config: &SmartExecutorConfig,
        side: AdaptiveSide,
        reference_price: Decimal,
        now: DateTime<Utc>,
    ) -> (Vec<(VtOrderId, Decimal)>, Vec<DomainEvent>) {
        let mut resubmits = Vec::new();
        let mut events = Vec::new();
        for order in self.orders.values_mut() {
            if order.state != ManagedOrderState::TimedOut {
                continue;
            }
            let new_price = self.compute_price_static(config, side, reference_price);
            match order.attempt_retry(config.max_retries, new_price, now, config.order_timeout) {
                Ok(price) => resubmits.push((order.vt_orderid.clone(), price)),
                Err(event) => events.push(event),
            }
        }
        (resubmits, events)
    }

    fn compute_price_static(&self, config: &SmartExecutorConfig, side: AdaptiveSide, reference: Decimal) -> Decimal {
        let biased = adaptive_price(side, reference, config.pricetick, config.slippage_ticks);
        round_to_tick(side, biased, config.pricetick)
    }

    /// Drops terminal orders (filled, exhausted, cancelled) from tracking; call periodically so
    /// the map doesn't grow unbounded across a trading day.
    pub fn sweep_terminal(&mut self) {
        self.orders.retain(|_, order| !order.state.is_terminal());
    }

    pub fn get(&self, vt_orderid: &VtOrderId) -> Option<&ManagedOrder> {
        self.orders.get(vt_orderid)
    }

    pub fn pending_count(&self) -> usize {
        self.orders.values().filter(|o| !o.state.is_terminal()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn adaptive_price_pays_up_on_buy_and_gives_up_on_sell() {
        assert_eq!(adaptive_price(AdaptiveSide::Buy, dec!(100), dec!(1), 3), dec!(103));
        assert_eq!(adaptive_price(AdaptiveSide::Sell, dec!(100), dec!(1), 3), dec!(97));
    }

    #[test]
    fn tick_rounding_is_direction_aware() {
        assert_eq!(round_to_tick(AdaptiveSide::Buy, dec!(100.3), dec!(0.5)), dec!(100.5));
        assert_eq!(round_to_tick(AdaptiveSide::Sell, dec!(100.3), dec!(0.5)), dec!(100.0));
    }

    #[test]
    fn timeout_and_retry_roundtrip_through_executor() {
        let config = SmartExecutorConfig { slippage_ticks: 2, pricetick: dec!(1), order_timeout: chrono::Duration::seconds(5), max_retries: 1 };
        let mut executor = SmartExecutor::new();
        let now = Utc::now();
        let price = executor.compute_price(&config, AdaptiveSide::Buy, dec!(100));
        assert_eq!(price, dec!(102));

        let id = VtOrderId::new("1");
        executor.register(id.clone(), price, now, config.order_timeout);

        let later = now + chrono::Duration::seconds(6);
        let events = executor.check_timeouts(later);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], DomainEvent::OrderTimeout { .. }));

        let (resubmits, retry_events) = executor.retry_timed_out(&config, AdaptiveSide::Buy, dec!(101), later);
        assert_eq!(resubmits.len(), 1);
        assert!(retry_events.is_empty());
        assert_eq!(resubmits[0].0, id);

        executor.on_fill(&id);
        assert_eq!(executor.pending_count(), 0);
    }
}
