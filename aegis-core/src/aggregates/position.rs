//! Position Aggregate (C14): positions, pending orders, manual-intervention detection, and daily
//! open-volume counters. Reconciliation compares the
//! broker's reported truth against what the strategy expects from its own tracked fills, and
//! raise a domain event for anything unexplained rather than silently trusting either side.

use std::collections::HashMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::{Direction, Offset, OrderStatus, VtOrderId, VtSymbol};
use crate::events::DomainEvent;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PositionError {
    #[error("no tracked order with id {0}")]
    UnknownOrder(VtOrderId),
    #[error("traded volume {traded} exceeds order volume {volume} for order {vt_orderid}")]
    OverTraded { vt_orderid: VtOrderId, traded: Decimal, volume: Decimal },
    #[error("order {0} is already in a terminal state and cannot be updated")]
    AlreadyTerminal(VtOrderId),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedOrder {
    pub vt_orderid: VtOrderId,
    pub vt_symbol: VtSymbol,
    pub direction: Direction,
    pub offset: Offset,
    pub volume: Decimal,
    pub traded: Decimal,
    pub status: OrderStatus,
    pub price: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trade {
    pub volume: Decimal,
    pub price: Decimal,
}

/// A broker-reported position, used as the source of truth in [`PositionAggregate::reconcile_external_position`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExternalPosition {
    pub vt_symbol: VtSymbol,
    pub direction: Direction,
    pub volume: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct PositionKey {
    vt_symbol: VtSymbol,
    direction: Direction,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionRecord {
    pub vt_symbol: VtSymbol,
    pub direction: Direction,
    pub volume: Decimal,
    pub pending_close_volume: Decimal,
}

#[derive(Debug, Default)]
pub struct PositionAggregate {
    positions: HashMap<PositionKey, PositionRecord>,
    pending_orders: HashMap<VtOrderId, TrackedOrder>,
    daily_open_volume_by_symbol: HashMap<VtSymbol, Decimal>,
    global_daily_open_volume: Decimal,
    last_trading_date: Option<NaiveDate>,
    pending_events: Vec<DomainEvent>,
}

impl PositionAggregate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_position(&mut self, vt_symbol: VtSymbol, direction: Direction, volume: Decimal) {
        let key = PositionKey { vt_symbol: vt_symbol.clone(), direction };
        self.positions
            .entry(key)
            .and_modify(|p| p.volume = volume)
            .or_insert(PositionRecord { vt_symbol, direction, volume, pending_close_volume: Decimal::ZERO });
    }

    pub fn record_order_submitted(&mut self, order: TrackedOrder) {
        if order.offset != Offset::Open {
            if let Some(position) = self.position_mut(&order.vt_symbol, order.direction.opposite()) {
                position.pending_close_volume += order.volume;
            }
        }
        self.pending_orders.insert(order.vt_orderid.clone(), order);
    }

    pub fn apply_order_update(&mut self, update: TrackedOrder) -> Result<(), PositionError> {
        let existing = self
            .pending_orders
            .get(&update.vt_orderid)
            .ok_or_else(|| PositionError::UnknownOrder(update.vt_orderid.clone()))?;
        if existing.status.is_terminal() {
            return Err(PositionError::AlreadyTerminal(update.vt_orderid.clone()));
        }
        if update.traded > update.volume {
            return Err(PositionError::OverTraded {
                vt_orderid: update.vt_orderid.clone(),
                traded: update.traded,
                volume: update.volume,
            });
        }

        let is_close = update.offset != Offset::Open;
        let is_terminal = update.status.is_terminal();
        let vt_symbol = update.vt_symbol.clone();
        let closing_direction = update.direction.opposite();
        let volume = update.volume;

        self.pending_orders.insert(update.vt_orderid.clone(), update);

        if is_close && is_terminal {
            if let Some(position) = self.position_mut(&vt_symbol, closing_direction) {
                position.pending_close_volume = (position.pending_close_volume - volume).max(Decimal::ZERO);
            }
        }
        if is_terminal {
            self.pending_orders.retain(|_, o| !o.status.is_terminal());
        }
        Ok(())
    }

    /// Applies a fill to the tracked order and updates position volume accordingly.
    pub fn apply_trade(&mut self, vt_orderid: &VtOrderId, trade: Trade) -> Result<(), PositionError> {
        let order = self
            .pending_orders
            .get_mut(vt_orderid)
            .ok_or_else(|| PositionError::UnknownOrder(vt_orderid.clone()))?;
        let new_traded = order.traded + trade.volume;
        if new_traded > order.volume {
            return Err(PositionError::OverTraded {
                vt_orderid: vt_orderid.clone(),
                traded: new_traded,
                volume: order.volume,
            });
        }
        order.traded = new_traded;
        let (vt_symbol, direction, offset) = (order.vt_symbol.clone(), order.direction, order.offset);

        let position_direction = if offset == Offset::Open { direction } else { direction.opposite() };
        let key = PositionKey { vt_symbol: vt_symbol.clone(), direction: position_direction };
        let entry = self.positions.entry(key).or_insert(PositionRecord {
            vt_symbol,
            direction: position_direction,
            volume: Decimal::ZERO,
            pending_close_volume: Decimal::ZERO,
        });

        if offset == Offset::Open {
            entry.volume += trade.volume;
        } else {
            entry.volume = (entry.volume - trade.volume).max(Decimal::ZERO);
        }
        Ok(())
    }

    /// Compares broker-reported volume against the volume this aggregate expects (tracked
    /// position volume). An unexplained decrease raises `ManualCloseDetected`; an unexplained
    /// increase raises `ManualOpenDetected`. Equal volumes are a no-op.
    ///
    /// `count_toward_cap` is `config.risk.count_manual_opens_toward_daily_cap` (SPEC_FULL §9.1):
    /// when `true`, a manually-detected open consumes the daily open cap exactly as if the engine
    /// itself had opened it, so a trader opening positions outside the strategy can't bypass the
    /// daily volume limit.
    pub fn reconcile_external_position(&mut self, reported: ExternalPosition, count_toward_cap: bool) {
        let expected = self
            .positions
            .get(&PositionKey { vt_symbol: reported.vt_symbol.clone(), direction: reported.direction })
            .map(|p| p.volume)
            .unwrap_or(Decimal::ZERO);

        if reported.volume == expected {
            return;
        }

        let at = current_timestamp();
        if reported.volume < expected {
            self.pending_events.push(DomainEvent::ManualCloseDetected {
                vt_symbol: reported.vt_symbol.clone(),
                direction: reported.direction,
                expected_volume: expected,
                reported_volume: reported.volume,
                at,
            });
        } else {
            self.pending_events.push(DomainEvent::ManualOpenDetected {
                vt_symbol: reported.vt_symbol.clone(),
                direction: reported.direction,
                expected_volume: expected,
                reported_volume: reported.volume,
                at,
            });
            if count_toward_cap {
                self.record_open_usage(reported.vt_symbol.clone(), reported.volume - expected);
            }
        }

        self.create_position(reported.vt_symbol, reported.direction, reported.volume);
    }

    pub fn get_positions_by_underlying(&self, vt_symbol: &VtSymbol) -> Vec<&PositionRecord> {
        self.positions.values().filter(|p| &p.vt_symbol == vt_symbol).collect()
    }

    /// Looks up a still-pending order's full tracked state by id. `None` once the order has
    /// gone terminal and been swept, or if `vt_orderid` was never submitted.
    pub fn get_pending_order(&self, vt_orderid: &VtOrderId) -> Option<&TrackedOrder> {
        self.pending_orders.get(vt_orderid)
    }

    pub fn has_pending_close(&self, vt_symbol: &VtSymbol, direction: Direction) -> bool {
        self.position_ref(vt_symbol, direction).map(|p| p.pending_close_volume > Decimal::ZERO).unwrap_or(false)
    }

    /// Records volume opened today against both the per-symbol and global daily counters.
    /// Called unconditionally for engine-initiated opens, and from
    /// [`Self::reconcile_external_position`] for manually-detected ones when the caller's
    /// `count_toward_cap` flag says to.
    pub fn record_open_usage(&mut self, vt_symbol: VtSymbol, volume: Decimal) {
        *self.daily_open_volume_by_symbol.entry(vt_symbol).or_insert(Decimal::ZERO) += volume;
        self.global_daily_open_volume += volume;
    }

    pub fn check_open_limit(&self, vt_symbol: &VtSymbol, volume_wanted: Decimal, global_cap: Decimal, per_symbol_cap: Decimal) -> bool {
        if volume_wanted <= Decimal::ZERO {
            return false;
        }
        let symbol_used = self.daily_open_volume_by_symbol.get(vt_symbol).copied().unwrap_or(Decimal::ZERO);
        self.global_daily_open_volume + volume_wanted <= global_cap
            && symbol_used + volume_wanted <= per_symbol_cap
    }

    /// Resets daily counters when `date` differs from the last trading date seen. Idempotent
    /// within the same date.
    pub fn on_new_trading_day(&mut self, date: NaiveDate) {
        if self.last_trading_date == Some(date) {
            return;
        }
        self.last_trading_date = Some(date);
        self.daily_open_volume_by_symbol.clear();
        self.global_daily_open_volume = Decimal::ZERO;
    }

    pub fn pop_domain_events(&mut self) -> Vec<DomainEvent> {
        std::mem::take(&mut self.pending_events)
    }

    pub fn global_daily_open_volume(&self) -> Decimal {
        self.global_daily_open_volume
    }

    pub fn daily_open_volume_for(&self, vt_symbol: &VtSymbol) -> Decimal {
        self.daily_open_volume_by_symbol.get(vt_symbol).copied().unwrap_or(Decimal::ZERO)
    }

    fn position_ref(&self, vt_symbol: &VtSymbol, direction: Direction) -> Option<&PositionRecord> {
        self.positions.get(&PositionKey { vt_symbol: vt_symbol.clone(), direction })
    }

    fn position_mut(&mut self, vt_symbol: &VtSymbol, direction: Direction) -> Option<&mut PositionRecord> {
        self.positions.get_mut(&PositionKey { vt_symbol: vt_symbol.clone(), direction })
    }
}

fn current_timestamp() -> chrono::DateTime<chrono::Utc> {
    chrono::Utc::now()
}

/// Plain-data projection of [`PositionAggregate`] for persistence (C17). Holds everything needed
/// to reconstruct the aggregate exactly, modulo in-flight pending domain events (never persisted —
/// they are drained and published every bar, per SPEC_FULL §4.12 step 6).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PositionAggregateSnapshot {
    pub positions: Vec<PositionRecord>,
    pub pending_orders: Vec<TrackedOrder>,
    pub daily_open_volume_by_symbol: HashMap<String, Decimal>,
    pub global_daily_open_volume: Decimal,
    pub last_trading_date: Option<NaiveDate>,
}

impl PositionAggregate {
    pub fn snapshot(&self) -> PositionAggregateSnapshot {
        PositionAggregateSnapshot {
            positions: self.positions.values().copied().collect(),
            pending_orders: self.pending_orders.values().cloned().collect(),
            daily_open_volume_by_symbol: self
                .daily_open_volume_by_symbol
                .iter()
                .map(|(symbol, volume)| (symbol.as_str().to_string(), *volume))
                .collect(),
            global_daily_open_volume: self.global_daily_open_volume,
            last_trading_date: self.last_trading_date,
        }
    }

    pub fn restore(snapshot: PositionAggregateSnapshot) -> Self {
        let mut aggregate = Self::new();
        for position in snapshot.positions {
            let key = PositionKey { vt_symbol: position.vt_symbol.clone(), direction: position.direction };
            aggregate.positions.insert(key, position);
        }
        for order in snapshot.pending_orders {
            aggregate.pending_orders.insert(order.vt_orderid.clone(), order);
        }
        aggregate.daily_open_volume_by_symbol = snapshot
            .daily_open_volume_by_symbol
            .into_iter()
            .map(|(symbol, volume)| (VtSymbol::new(symbol), volume))
            .collect();
        aggregate.global_daily_open_volume = snapshot.global_daily_open_volume;
        aggregate.last_trading_date = snapshot.last_trading_date;
        aggregate
    }
}
