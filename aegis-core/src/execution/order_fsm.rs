//! Managed-order lifecycle state machine (C9), run as a runtime enum rather than a
//! compile-time typestate (generic-parameter states) because retries
//! need to loop back into `Submitted` at runtime with a new price, which a typestate can't express
//! without re-instantiating the whole chain.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::core::VtOrderId;
use crate::events::DomainEvent;

#[derive(Debug, Clone, PartialEq)]
pub enum ManagedOrderState {
    Submitted,
    TimedOut,
    Retrying { retry_count: u32 },
    Filled,
    Exhausted { retry_count: u32 },
    Cancelled,
}

impl ManagedOrderState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ManagedOrderState::Filled | ManagedOrderState::Exhausted { .. } | ManagedOrderState::Cancelled)
    }
}

/// One broker order tracked end-to-end by the smart executor.
#[derive(Debug, Clone, PartialEq)]
pub struct ManagedOrder {
    pub vt_orderid: VtOrderId,
    pub sent_at: DateTime<Utc>,
    pub original_price: Decimal,
    pub retry_count: u32,
    pub timeout_deadline: DateTime<Utc>,
    pub state: ManagedOrderState,
}

impl ManagedOrder {
    pub fn new(vt_orderid: VtOrderId, price: Decimal, sent_at: DateTime<Utc>, timeout: chrono::Duration) -> Self {
        Self {
            vt_orderid,
            sent_at,
            original_price: price,
            retry_count: 0,
            timeout_deadline: sent_at + timeout,
            state: ManagedOrderState::Submitted,
        }
    }

    pub fn on_fill(&mut self) {
        self.state = ManagedOrderState::Filled;
    }

    pub fn on_broker_cancel_or_reject(&mut self) {
        self.state = ManagedOrderState::Cancelled;
    }

    /// Checked on every timer tick (SPEC_FULL §5, "≥ 1 Hz"). Transitions to `TimedOut` and emits
    /// `OrderTimeoutEvent` once, the first time `now` passes the deadline while still submitted.
    pub fn check_timeout(&mut self, now: DateTime<Utc>) -> Option<DomainEvent> {
        if self.state == ManagedOrderState::Submitted && now >= self.timeout_deadline {
            self.state = ManagedOrderState::TimedOut;
            return Some(DomainEvent::OrderTimeout { vt_orderid: self.vt_orderid.clone(), retry_count: self.retry_count, at: now });
        }
        None
    }

    /// Attempts a retry after timeout. Returns `Some(new_price)` the caller should re-submit
    /// with (the executor computes it via adaptive pricing), or emits `OrderRetryExhaustedEvent`
    /// and transitions to the terminal `Exhausted` state when retries are used up.
    pub fn attempt_retry(&mut self, max_retries: u32, new_price: Decimal, now: DateTime<Utc>, timeout: chrono::Duration) -> Result<Decimal, DomainEvent> {
        if self.retry_count >= max_retries {
            self.state = ManagedOrderState::Exhausted { retry_count: self.retry_count };
            return Err(DomainEvent::OrderRetryExhausted { vt_orderid: self.vt_orderid.clone(), retry_count: self.retry_count, at: now });
        }
        self.retry_count += 1;
        self.state = ManagedOrderState::Retrying { retry_count: self.retry_count };
        self.sent_at = now;
        self.timeout_deadline = now + timeout;
        self.original_price = new_price;
        self.state = ManagedOrderState::Submitted;
        Ok(new_price)
    }
}
