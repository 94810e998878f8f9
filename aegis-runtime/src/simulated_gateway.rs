//! Paper-trading gateway adapter: an in-memory, instant-fill implementation of
//! [`aegis_core::Gateway`].
//!
//! Grounded on `bog-core/src/execution/simulated.rs`'s `SimulatedExecutor` (instant, pessimistic
//! fills at the requested price, an in-memory order table, fill events queued for the caller to
//! drain) generalized from a single-instrument fixed-point executor to the multi-symbol,
//! multi-account `Gateway` port this domain's worker drives. It is the default gateway the
//! `worker` binary wires up; a real deployment replaces it with a CTP-style adapter, which
//! SPEC_FULL §1 explicitly scopes out of the core.

use std::collections::HashMap;

use chrono::Utc;
use rust_decimal::Decimal;

use aegis_core::core::{Bar, Direction, Product, Tick, VtOrderId, VtQuoteId, VtSymbol};
use aegis_core::gateway::{
    AccountBalance, ContractInfo, Gateway, GatewayEvent, OrderRequest, PositionInfo, PositionMode, QuoteRequest,
};

/// A seeded contract's static terms, supplied at construction since the real exchange contract
/// table is outside this adapter's scope.
#[derive(Debug, Clone)]
pub struct SeedContract {
    pub vt_symbol: VtSymbol,
    pub product: Product,
    pub exchange: String,
    pub pricetick: Decimal,
    pub size: Decimal,
}

/// Instant-fill paper gateway: every `send_order` fills completely at the requested price on the
/// next `poll_events`, never rejects, and reports a fixed starting balance. No network I/O, no
/// broker session — "connected" is always `true` once constructed.
pub struct SimulatedGateway {
    contracts: HashMap<VtSymbol, ContractInfo>,
    last_ticks: HashMap<VtSymbol, Tick>,
    positions: HashMap<(VtSymbol, Direction), PositionInfo>,
    pending_events: Vec<GatewayEvent>,
    subscribed: Vec<VtSymbol>,
    next_order_seq: u64,
    balance: AccountBalance,
}

impl SimulatedGateway {
    pub fn new(contracts: Vec<SeedContract>, starting_balance: Decimal) -> Self {
        let contracts = contracts
            .into_iter()
            .map(|c| {
                (
                    c.vt_symbol.clone(),
                    ContractInfo { vt_symbol: c.vt_symbol, product: c.product, exchange: c.exchange, pricetick: c.pricetick, size: c.size },
                )
            })
            .collect();
        Self {
            contracts,
            last_ticks: HashMap::new(),
            positions: HashMap::new(),
            pending_events: Vec::new(),
            subscribed: Vec::new(),
            next_order_seq: 0,
            balance: AccountBalance { balance: starting_balance, available: starting_balance, frozen: Decimal::ZERO },
        }
    }

    /// Feeds a fresh tick into the simulator — normally called by the worker's market-data task
    /// once it has one (from a real feed in non-paper modes, or a replay source here); queues a
    /// `GatewayEvent::Tick` for the next `poll_events`.
    pub fn push_tick(&mut self, tick: Tick) {
        let symbol = VtSymbol::new(tick.vt_symbol.clone());
        self.last_ticks.insert(symbol, tick.clone());
        self.pending_events.push(GatewayEvent::Tick(tick));
    }

    fn fill(&mut self, request: &OrderRequest, vt_orderid: VtOrderId) {
        self.pending_events.push(GatewayEvent::OrderUpdate {
            vt_orderid: vt_orderid.clone(),
            status: aegis_core::core::OrderStatus::AllTraded,
            traded: request.volume,
        });
        self.pending_events.push(GatewayEvent::Trade {
            vt_orderid,
            vt_symbol: request.vt_symbol.clone(),
            direction: request.direction,
            offset: request.offset,
            price: request.price,
            volume: request.volume,
        });

        let key = (request.vt_symbol.clone(), request.direction);
        let entry = self.positions.entry(key).or_insert(PositionInfo {
            direction: request.direction,
            volume: Decimal::ZERO,
            yd_volume: Decimal::ZERO,
            price: request.price,
        });
        match request.offset {
            aegis_core::core::Offset::Open => entry.volume += request.volume,
            _ => entry.volume = (entry.volume - request.volume).max(Decimal::ZERO),
        }
        self.pending_events.push(GatewayEvent::PositionUpdate { vt_symbol: request.vt_symbol.clone(), position: *entry });
    }
}

impl Gateway for SimulatedGateway {
    fn subscribe(&mut self, vt_symbol: &VtSymbol) {
        if !self.subscribed.contains(vt_symbol) {
            self.subscribed.push(vt_symbol.clone());
        }
    }

    fn unsubscribe(&mut self, vt_symbol: &VtSymbol) {
        self.subscribed.retain(|s| s != vt_symbol);
    }

    fn send_order(&mut self, request: &OrderRequest) -> Vec<VtOrderId> {
        self.next_order_seq += 1;
        let vt_orderid = VtOrderId::new(format!("sim-{}", self.next_order_seq));
        self.fill(request, vt_orderid.clone());
        vec![vt_orderid]
    }

    fn cancel_order(&mut self, _vt_orderid: &VtOrderId) {
        // Fills are instant, so by the time a caller could cancel there is nothing pending.
    }

    fn cancel_all_orders(&mut self) {}

    fn convert_order_request(&self, request: &OrderRequest, mode: PositionMode) -> Vec<OrderRequest> {
        match mode {
            PositionMode::Net => vec![request.clone()],
            PositionMode::Lock => vec![request.clone()],
        }
    }

    fn send_quote(&mut self, _request: &QuoteRequest) -> Option<VtQuoteId> {
        self.next_order_seq += 1;
        Some(VtQuoteId::new(format!("sim-quote-{}", self.next_order_seq)))
    }

    fn cancel_quote(&mut self, _vt_quoteid: &VtQuoteId) {}

    fn get_tick(&self, vt_symbol: &VtSymbol) -> Option<Tick> {
        self.last_ticks.get(vt_symbol).cloned()
    }

    fn get_contract(&self, vt_symbol: &VtSymbol) -> Option<ContractInfo> {
        self.contracts.get(vt_symbol).cloned()
    }

    fn get_all_contracts(&self) -> Vec<ContractInfo> {
        self.contracts.values().cloned().collect()
    }

    fn get_contracts_by_product(&self, product: &Product) -> Vec<ContractInfo> {
        self.contracts.values().filter(|c| &c.product == product).cloned().collect()
    }

    fn get_contracts_by_exchange(&self, exchange: &str) -> Vec<ContractInfo> {
        self.contracts.values().filter(|c| c.exchange == exchange).cloned().collect()
    }

    fn get_balance(&self) -> Option<AccountBalance> {
        Some(self.balance)
    }

    fn get_position(&self, vt_symbol: &VtSymbol, direction: Direction) -> Option<PositionInfo> {
        self.positions.get(&(vt_symbol.clone(), direction)).copied()
    }

    fn get_all_positions(&self) -> Vec<(VtSymbol, PositionInfo)> {
        self.positions.iter().map(|((symbol, _), info)| (symbol.clone(), *info)).collect()
    }

    fn query_history(&self, _vt_symbol: &VtSymbol, _interval_minutes: u32, _start: chrono::DateTime<Utc>, _end: chrono::DateTime<Utc>) -> Vec<Bar> {
        // A paper gateway has no historical archive of its own; the worker's backfill step no-ops
        // against this adapter.
        Vec::new()
    }

    fn poll_events(&mut self) -> Vec<GatewayEvent> {
        std::mem::take(&mut self.pending_events)
    }

    fn is_connected(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_core::core::OrderType;
    use rust_decimal_macros::dec;

    fn contract() -> SeedContract {
        SeedContract {
            vt_symbol: VtSymbol::from("rb2505.SHFE"),
            product: Product::from("rb"),
            exchange: "SHFE".to_string(),
            pricetick: dec!(1),
            size: dec!(10),
        }
    }

    #[test]
    fn send_order_fills_instantly_and_updates_position() {
        let mut gw = SimulatedGateway::new(vec![contract()], dec!(1_000_000));
        let request = OrderRequest {
            vt_symbol: VtSymbol::from("rb2505.SHFE"),
            direction: Direction::Long,
            offset: aegis_core::core::Offset::Open,
            volume: dec!(3),
            price: dec!(3500),
            order_type: OrderType::Limit,
        };
        let ids = gw.send_order(&request);
        assert_eq!(ids.len(), 1);

        let events = gw.poll_events();
        assert_eq!(events.len(), 3); // OrderUpdate, Trade, PositionUpdate
        assert_eq!(gw.get_position(&request.vt_symbol, Direction::Long).unwrap().volume, dec!(3));
    }

    #[test]
    fn subscribe_then_unsubscribe_clears_the_symbol() {
        let mut gw = SimulatedGateway::new(vec![contract()], dec!(1_000_000));
        let symbol = VtSymbol::from("rb2505.SHFE");
        gw.subscribe(&symbol);
        assert!(gw.subscribed.contains(&symbol));
        gw.unsubscribe(&symbol);
        assert!(!gw.subscribed.contains(&symbol));
    }

    #[test]
    fn always_reports_connected() {
        let gw = SimulatedGateway::new(vec![], dec!(0));
        assert!(gw.is_connected());
    }
}
