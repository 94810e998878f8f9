//! Typed domain events and the in-process synchronous event bus (C23).
//!
//! A closed severity/category enum carried inside a flat struct, generalized here to an open set
//! of domain facts. Delivery is synchronous on the
//! publisher's stack, per SPEC_FULL §5 — there is no cross-thread queue here, only a registry of
//! subscriber closures guarded by `parking_lot::Mutex` so `publish` can be called from `&self`
//! contexts without threading `&mut` through every component that might raise an event.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core::{Direction, VtOrderId, VtSymbol};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DomainEvent {
    ManualCloseDetected {
        vt_symbol: VtSymbol,
        direction: Direction,
        expected_volume: Decimal,
        reported_volume: Decimal,
        at: DateTime<Utc>,
    },
    ManualOpenDetected {
        vt_symbol: VtSymbol,
        direction: Direction,
        expected_volume: Decimal,
        reported_volume: Decimal,
        at: DateTime<Utc>,
    },
    RolloverOccurred {
        product: String,
        old_symbol: Option<VtSymbol>,
        new_symbol: VtSymbol,
        at: DateTime<Utc>,
    },
    OrderTimeout {
        vt_orderid: VtOrderId,
        retry_count: u32,
        at: DateTime<Utc>,
    },
    OrderRetryExhausted {
        vt_orderid: VtOrderId,
        retry_count: u32,
        at: DateTime<Utc>,
    },
    AdvancedOrderCompleted {
        advanced_id: crate::core::AdvancedOrderId,
        at: DateTime<Utc>,
    },
    AdvancedOrderCancelled {
        advanced_id: crate::core::AdvancedOrderId,
        unscheduled_children: usize,
        at: DateTime<Utc>,
    },
    GreeksRiskBreach {
        scope: RiskScope,
        vt_symbol: Option<VtSymbol>,
        breached_fields: Vec<String>,
        at: DateTime<Utc>,
    },
    GreeksRiskCleared {
        scope: RiskScope,
        vt_symbol: Option<VtSymbol>,
        at: DateTime<Utc>,
    },
    AutoSaveFailed {
        strategy_name: String,
        reason: String,
        at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskScope {
    Position,
    Portfolio,
}

impl DomainEvent {
    pub fn at(&self) -> DateTime<Utc> {
        match self {
            DomainEvent::ManualCloseDetected { at, .. }
            | DomainEvent::ManualOpenDetected { at, .. }
            | DomainEvent::RolloverOccurred { at, .. }
            | DomainEvent::OrderTimeout { at, .. }
            | DomainEvent::OrderRetryExhausted { at, .. }
            | DomainEvent::AdvancedOrderCompleted { at, .. }
            | DomainEvent::AdvancedOrderCancelled { at, .. }
            | DomainEvent::GreeksRiskBreach { at, .. }
            | DomainEvent::GreeksRiskCleared { at, .. }
            | DomainEvent::AutoSaveFailed { at, .. } => *at,
        }
    }
}

type Subscriber = Box<dyn Fn(&DomainEvent) + Send + Sync>;

/// In-process pub/sub. Subscribers are invoked in registration order, synchronously, on the
/// publisher's call stack.
#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<Subscriber>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, handler: F)
    where
        F: Fn(&DomainEvent) + Send + Sync + 'static,
    {
        self.subscribers.lock().push(Box::new(handler));
    }

    pub fn publish(&self, event: &DomainEvent) {
        for subscriber in self.subscribers.lock().iter() {
            subscriber(event);
        }
    }

    pub fn publish_all(&self, events: &[DomainEvent]) {
        for event in events {
            self.publish(event);
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscribers.lock().len())
            .finish()
    }
}
