//! Advanced order scheduler (C10): splits a parent order into a sequence of children under one
//! of six algorithms, gating release either on prior-child fills (iceberg family) or on
//! wall-clock schedule (everything else).
//!
//! Grounded on SPEC_FULL §4.10 and `bog-core/src/risk/pre_trade.rs`'s validation-rejects idiom
//! (a closed rejection enum rather than stringly-typed errors); jitter and per-child price offset
//! use `rand`, the same crate the restart-backoff jitter elsewhere in this codebase uses.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::core::{AdvancedOrderId, Direction, Offset, VtOrderId, VtSymbol};
use crate::events::DomainEvent;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SchedulerError {
    #[error("total volume must be positive, got {0}")]
    NonPositiveTotal(Decimal),
    #[error("split size must be positive, got {0}")]
    NonPositiveSplitSize(Decimal),
    #[error("time window must be positive, got {0} seconds")]
    NonPositiveTimeWindow(i64),
    #[error("randomization ratio must be within [0, 1], got {0}")]
    RandomizationRatioOutOfRange(Decimal),
    #[error("volume profile must not be empty")]
    EmptyVolumeProfile,
    #[error("volume profile weights must sum to 1, got {0}")]
    VolumeProfileDoesNotSumToOne(Decimal),
    #[error("no advanced order with id {0}")]
    UnknownOrder(AdvancedOrderId),
    #[error("no pending child with vt_orderid {0}")]
    UnknownChild(VtOrderId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildOrderStatus {
    Pending,
    Sent,
    Filled,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChildOrder {
    pub sequence: usize,
    pub volume: Decimal,
    pub price_offset_ticks: i32,
    /// `None` for iceberg-family children, which are gated on the previous child's fill rather
    /// than a clock; `Some(t)` for every other algorithm.
    pub scheduled_at: Option<DateTime<Utc>>,
    pub status: ChildOrderStatus,
    pub vt_orderid: Option<VtOrderId>,
    pub filled_volume: Decimal,
}

impl ChildOrder {
    fn is_ready(&self, sequential: bool, preceding_filled: bool, now: DateTime<Utc>) -> bool {
        if self.status != ChildOrderStatus::Pending {
            return false;
        }
        if sequential {
            return preceding_filled;
        }
        self.scheduled_at.map(|t| now >= t).unwrap_or(true)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvancedOrderType {
    Iceberg,
    ClassicIceberg,
    TimedSplit,
    Twap,
    EnhancedTwap,
    Vwap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvancedOrderStatus {
    Active,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AdvancedOrder {
    pub id: AdvancedOrderId,
    pub order_type: AdvancedOrderType,
    pub vt_symbol: VtSymbol,
    pub direction: Direction,
    pub offset: Offset,
    pub total_volume: Decimal,
    pub children: Vec<ChildOrder>,
    pub status: AdvancedOrderStatus,
    sequential: bool,
}

impl AdvancedOrder {
    fn preceding_filled(&self, sequence: usize) -> bool {
        sequence == 0 || self.children[..sequence].iter().all(|c| c.status == ChildOrderStatus::Filled)
    }
}

/// Splits `total` into children of size `split_size`, the last absorbing the remainder.
fn equal_split_with_remainder(total: Decimal, split_size: Decimal) -> Vec<Decimal> {
    let mut remaining = total;
    let mut sizes = Vec::new();
    while remaining > split_size {
        sizes.push(split_size);
        remaining -= split_size;
    }
    sizes.push(remaining);
    sizes
}

fn validate_positive(total: Decimal) -> Result<(), SchedulerError> {
    if total <= Decimal::ZERO {
        return Err(SchedulerError::NonPositiveTotal(total));
    }
    Ok(())
}

fn validate_split_size(size: Decimal) -> Result<(), SchedulerError> {
    if size <= Decimal::ZERO {
        return Err(SchedulerError::NonPositiveSplitSize(size));
    }
    Ok(())
}

/// Tracks every advanced (parent) order and its children. Owned by the strategy engine, invoked
/// once per bar / once per timer tick; never shared across threads.
#[derive(Debug, Default)]
pub struct Scheduler {
    orders: HashMap<AdvancedOrderId, AdvancedOrder>,
    next_id: u64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn fresh_id(&mut self) -> AdvancedOrderId {
        self.next_id += 1;
        AdvancedOrderId::new(format!("adv-{}", self.next_id))
    }

    pub fn submit_iceberg(
        &mut self,
        vt_symbol: VtSymbol,
        direction: Direction,
        offset: Offset,
        total: Decimal,
        batch_size: Decimal,
    ) -> Result<AdvancedOrderId, SchedulerError> {
        validate_positive(total)?;
        validate_split_size(batch_size)?;

        let children = equal_split_with_remainder(total, batch_size)
            .into_iter()
            .enumerate()
            .map(|(sequence, volume)| ChildOrder {
                sequence,
                volume,
                price_offset_ticks: 0,
                scheduled_at: None,
                status: ChildOrderStatus::Pending,
                vt_orderid: None,
                filled_volume: Decimal::ZERO,
            })
            .collect();

        let id = self.fresh_id();
        self.orders.insert(
            id.clone(),
            AdvancedOrder {
                id: id.clone(),
                order_type: AdvancedOrderType::Iceberg,
                vt_symbol,
                direction,
                offset,
                total_volume: total,
                children,
                status: AdvancedOrderStatus::Active,
                sequential: true,
            },
        );
        Ok(id)
    }

    pub fn submit_classic_iceberg(
        &mut self,
        vt_symbol: VtSymbol,
        direction: Direction,
        offset: Offset,
        total: Decimal,
        per_order_volume: Decimal,
        randomization_ratio: Decimal,
        price_offset_ticks: u32,
    ) -> Result<AdvancedOrderId, SchedulerError> {
        validate_positive(total)?;
        validate_split_size(per_order_volume)?;
        if randomization_ratio < Decimal::ZERO || randomization_ratio > Decimal::ONE {
            return Err(SchedulerError::RandomizationRatioOutOfRange(randomization_ratio));
        }

        let mut rng = rand::thread_rng();
        let lower = (Decimal::ONE - randomization_ratio).to_f64().unwrap_or(1.0);
        let upper = (Decimal::ONE + randomization_ratio).to_f64().unwrap_or(1.0);

        let mut remaining = total;
        let mut sizes = Vec::new();
        while remaining > per_order_volume {
            let jitter_factor = if randomization_ratio == Decimal::ZERO { 1.0 } else { rng.gen_range(lower..=upper) };
            let jitter = Decimal::try_from(jitter_factor).unwrap_or(Decimal::ONE);
            let candidate = (per_order_volume * jitter).max(Decimal::ZERO);
            let size = if candidate <= Decimal::ZERO || candidate >= remaining { per_order_volume.min(remaining) } else { candidate };
            sizes.push(size);
            remaining -= size;
        }
        if remaining > Decimal::ZERO {
            sizes.push(remaining);
        }

        let children = sizes
            .into_iter()
            .enumerate()
            .map(|(sequence, volume)| {
                let offset_ticks = if price_offset_ticks == 0 {
                    0
                } else {
                    rng.gen_range(-(price_offset_ticks as i32)..=(price_offset_ticks as i32))
                };
                ChildOrder {
                    sequence,
                    volume,
                    price_offset_ticks: offset_ticks,
                    scheduled_at: None,
                    status: ChildOrderStatus::Pending,
                    vt_orderid: None,
                    filled_volume: Decimal::ZERO,
                }
            })
            .collect();

        let id = self.fresh_id();
        self.orders.insert(
            id.clone(),
            AdvancedOrder {
                id: id.clone(),
                order_type: AdvancedOrderType::ClassicIceberg,
                vt_symbol,
                direction,
                offset,
                total_volume: total,
                children,
                status: AdvancedOrderStatus::Active,
                sequential: true,
            },
        );
        Ok(id)
    }

    pub fn submit_timed_split(
        &mut self,
        vt_symbol: VtSymbol,
        direction: Direction,
        offset: Offset,
        total: Decimal,
        per_order_volume: Decimal,
        interval_seconds: i64,
        start: DateTime<Utc>,
    ) -> Result<AdvancedOrderId, SchedulerError> {
        validate_positive(total)?;
        validate_split_size(per_order_volume)?;
        if interval_seconds <= 0 {
            return Err(SchedulerError::NonPositiveTimeWindow(interval_seconds));
        }

        let children = equal_split_with_remainder(total, per_order_volume)
            .into_iter()
            .enumerate()
            .map(|(sequence, volume)| ChildOrder {
                sequence,
                volume,
                price_offset_ticks: 0,
                scheduled_at: Some(start + chrono::Duration::seconds(sequence as i64 * interval_seconds)),
                status: ChildOrderStatus::Pending,
                vt_orderid: None,
                filled_volume: Decimal::ZERO,
            })
            .collect();

        let id = self.fresh_id();
        self.orders.insert(
            id.clone(),
            AdvancedOrder {
                id: id.clone(),
                order_type: AdvancedOrderType::TimedSplit,
                vt_symbol,
                direction,
                offset,
                total_volume: total,
                children,
                status: AdvancedOrderStatus::Active,
                sequential: false,
            },
        );
        Ok(id)
    }

    fn submit_twap_like(
        &mut self,
        order_type: AdvancedOrderType,
        vt_symbol: VtSymbol,
        direction: Direction,
        offset: Offset,
        total: Decimal,
        num_slices: u32,
        time_window_seconds: i64,
        start: DateTime<Utc>,
    ) -> Result<AdvancedOrderId, SchedulerError> {
        validate_positive(total)?;
        if num_slices == 0 {
            return Err(SchedulerError::NonPositiveSplitSize(Decimal::ZERO));
        }
        if time_window_seconds <= 0 {
            return Err(SchedulerError::NonPositiveTimeWindow(time_window_seconds));
        }

        let slices = Decimal::from(num_slices);
        let base = (total / slices).trunc();
        let mut remainder = total - base * slices;
        let step_seconds = time_window_seconds / i64::from(num_slices);

        let children = (0..num_slices)
            .map(|i| {
                let mut volume = base;
                if i == num_slices - 1 {
                    volume += remainder;
                    remainder = Decimal::ZERO;
                }
                ChildOrder {
                    sequence: i as usize,
                    volume,
                    price_offset_ticks: 0,
                    scheduled_at: Some(start + chrono::Duration::seconds(i64::from(i) * step_seconds)),
                    status: ChildOrderStatus::Pending,
                    vt_orderid: None,
                    filled_volume: Decimal::ZERO,
                }
            })
            .collect();

        let id = self.fresh_id();
        self.orders.insert(
            id.clone(),
            AdvancedOrder {
                id: id.clone(),
                order_type,
                vt_symbol,
                direction,
                offset,
                total_volume: total,
                children,
                status: AdvancedOrderStatus::Active,
                sequential: false,
            },
        );
        Ok(id)
    }

    pub fn submit_twap(
        &mut self,
        vt_symbol: VtSymbol,
        direction: Direction,
        offset: Offset,
        total: Decimal,
        num_slices: u32,
        time_window_seconds: i64,
        start: DateTime<Utc>,
    ) -> Result<AdvancedOrderId, SchedulerError> {
        self.submit_twap_like(AdvancedOrderType::Twap, vt_symbol, direction, offset, total, num_slices, time_window_seconds, start)
    }

    pub fn submit_enhanced_twap(
        &mut self,
        vt_symbol: VtSymbol,
        direction: Direction,
        offset: Offset,
        total: Decimal,
        num_slices: u32,
        time_window_seconds: i64,
        start: DateTime<Utc>,
    ) -> Result<AdvancedOrderId, SchedulerError> {
        self.submit_twap_like(AdvancedOrderType::EnhancedTwap, vt_symbol, direction, offset, total, num_slices, time_window_seconds, start)
    }

    pub fn submit_vwap(
        &mut self,
        vt_symbol: VtSymbol,
        direction: Direction,
        offset: Offset,
        total: Decimal,
        volume_profile: Vec<Decimal>,
        time_window_seconds: i64,
        start: DateTime<Utc>,
    ) -> Result<AdvancedOrderId, SchedulerError> {
        validate_positive(total)?;
        if volume_profile.is_empty() {
            return Err(SchedulerError::EmptyVolumeProfile);
        }
        if time_window_seconds <= 0 {
            return Err(SchedulerError::NonPositiveTimeWindow(time_window_seconds));
        }
        let weight_sum: Decimal = volume_profile.iter().copied().sum();
        let tolerance = Decimal::new(1, 6);
        if (weight_sum - Decimal::ONE).abs() > tolerance {
            return Err(SchedulerError::VolumeProfileDoesNotSumToOne(weight_sum));
        }

        let num_slices = volume_profile.len() as u32;
        let step_seconds = time_window_seconds / i64::from(num_slices);
        let mut allocated = Vec::with_capacity(volume_profile.len());
        let mut running_total = Decimal::ZERO;
        for weight in &volume_profile {
            let volume = (total * weight).round_dp(0);
            allocated.push(volume);
            running_total += volume;
        }
        let error = total - running_total;
        if let Some((largest_idx, _)) = allocated.iter().enumerate().max_by_key(|(_, v)| **v) {
            allocated[largest_idx] += error;
        }

        let children = allocated
            .into_iter()
            .enumerate()
            .map(|(sequence, volume)| ChildOrder {
                sequence,
                volume,
                price_offset_ticks: 0,
                scheduled_at: Some(start + chrono::Duration::seconds(sequence as i64 * step_seconds)),
                status: ChildOrderStatus::Pending,
                vt_orderid: None,
                filled_volume: Decimal::ZERO,
            })
            .collect();

        let id = self.fresh_id();
        self.orders.insert(
            id.clone(),
            AdvancedOrder {
                id: id.clone(),
                order_type: AdvancedOrderType::Vwap,
                vt_symbol,
                direction,
                offset,
                total_volume: total,
                children,
                status: AdvancedOrderStatus::Active,
                sequential: false,
            },
        );
        Ok(id)
    }

    /// Every child, across every active advanced order, that is ready to be sent right now.
    pub fn get_pending_children(&self, now: DateTime<Utc>) -> Vec<(AdvancedOrderId, ChildOrder)> {
        let mut ready = Vec::new();
        for order in self.orders.values() {
            if order.status != AdvancedOrderStatus::Active {
                continue;
            }
            for child in &order.children {
                if child.is_ready(order.sequential, order.preceding_filled(child.sequence), now) {
                    ready.push((order.id.clone(), child.clone()));
                }
            }
        }
        ready
    }

    pub fn record_child_sent(&mut self, advanced_id: &AdvancedOrderId, sequence: usize, vt_orderid: VtOrderId) -> Result<(), SchedulerError> {
        let order = self.orders.get_mut(advanced_id).ok_or_else(|| SchedulerError::UnknownOrder(advanced_id.clone()))?;
        let child = order.children.get_mut(sequence).ok_or_else(|| SchedulerError::UnknownOrder(advanced_id.clone()))?;
        child.status = ChildOrderStatus::Sent;
        child.vt_orderid = Some(vt_orderid);
        Ok(())
    }

    /// Applies a fill to whichever child (in whichever advanced order) owns `vt_orderid`.
    /// Returns a completion event once every child of that parent has fully filled.
    pub fn on_child_filled(&mut self, vt_orderid: &VtOrderId, filled_volume: Decimal, now: DateTime<Utc>) -> Result<Option<DomainEvent>, SchedulerError> {
        for order in self.orders.values_mut() {
            if order.status != AdvancedOrderStatus::Active {
                continue;
            }
            if let Some(child) = order.children.iter_mut().find(|c| c.vt_orderid.as_ref() == Some(vt_orderid)) {
                child.filled_volume += filled_volume;
                if child.filled_volume >= child.volume {
                    child.status = ChildOrderStatus::Filled;
                }
                let all_filled = order.children.iter().all(|c| c.status == ChildOrderStatus::Filled);
                if all_filled {
                    order.status = AdvancedOrderStatus::Completed;
                    return Ok(Some(DomainEvent::AdvancedOrderCompleted { advanced_id: order.id.clone(), at: now }));
                }
                return Ok(None);
            }
        }
        Err(SchedulerError::UnknownChild(vt_orderid.clone()))
    }

    /// Marks every not-yet-sent child of `parent_id` as cancelled and returns their sequence
    /// numbers plus the domain event to publish. Already-sent children are left alone — the
    /// caller is responsible for cancelling those at the broker via the executor.
    pub fn cancel_order(&mut self, parent_id: &AdvancedOrderId, now: DateTime<Utc>) -> Result<(Vec<usize>, DomainEvent), SchedulerError> {
        let order = self.orders.get_mut(parent_id).ok_or_else(|| SchedulerError::UnknownOrder(parent_id.clone()))?;
        let mut unscheduled = Vec::new();
        for child in &mut order.children {
            if child.status == ChildOrderStatus::Pending {
                child.status = ChildOrderStatus::Cancelled;
                unscheduled.push(child.sequence);
            }
        }
        order.status = AdvancedOrderStatus::Cancelled;
        let event = DomainEvent::AdvancedOrderCancelled { advanced_id: order.id.clone(), unscheduled_children: unscheduled.len(), at: now };
        Ok((unscheduled, event))
    }

    pub fn get_order(&self, id: &AdvancedOrderId) -> Option<&AdvancedOrder> {
        self.orders.get(id)
    }
}
