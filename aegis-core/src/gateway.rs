//! Gateway port (C22): the uniform boundary between the domain and a broker session.
//!
//! Modeled as a plain `Send` trait rather than `async-trait` — the worker's single-threaded
//! `tokio` runtime (SPEC_FULL §5) drives the one broker connection serially, so there is never a
//! concurrent call to race against, and a sync trait keeps the domain free of an async runtime
//! dependency (`bog-core/src/strategy/mod.rs`'s `strategy::Strategy` port is sync
//! for the same reason: one caller, one connection, no need for `Future`s at this seam).
//! Every method degrades gracefully when the broker session is down: return empty/`None` and log,
//! never raise.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::core::{Bar, Direction, OrderType, Product, Tick, VtOrderId, VtQuoteId, VtSymbol};

/// A single order to submit, per SPEC_FULL §6's `send_order` contract.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub vt_symbol: VtSymbol,
    pub direction: Direction,
    pub offset: crate::core::Offset,
    pub volume: Decimal,
    pub price: Decimal,
    pub order_type: OrderType,
}

/// A two-sided quote to submit (market making / option writing).
#[derive(Debug, Clone, PartialEq)]
pub struct QuoteRequest {
    pub vt_symbol: VtSymbol,
    pub bid_price: Decimal,
    pub bid_volume: Decimal,
    pub ask_price: Decimal,
    pub ask_volume: Decimal,
}

/// Lock/net accounting mode used to split a close order across today's/yesterday's positions —
/// exchange-specific (SHFE/INE require the split; CFFEX/CZCE/DCE/CZCE don't).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum PositionMode {
    /// One position per (symbol, direction); no today/yesterday split needed.
    Net,
    /// Today's and yesterday's opens must be closed separately and in the cheaper order.
    Lock,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContractInfo {
    pub vt_symbol: VtSymbol,
    pub product: Product,
    pub exchange: String,
    pub pricetick: Decimal,
    pub size: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccountBalance {
    pub balance: Decimal,
    pub available: Decimal,
    pub frozen: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionInfo {
    pub direction: Direction,
    pub volume: Decimal,
    pub yd_volume: Decimal,
    pub price: Decimal,
}

/// Broker-originated events the gateway hands back to the strategy engine's event loop.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayEvent {
    Tick(Tick),
    OrderUpdate { vt_orderid: VtOrderId, status: crate::core::OrderStatus, traded: Decimal },
    Trade { vt_orderid: VtOrderId, vt_symbol: VtSymbol, direction: Direction, offset: crate::core::Offset, price: Decimal, volume: Decimal },
    PositionUpdate { vt_symbol: VtSymbol, position: PositionInfo },
    AccountUpdate(AccountBalance),
}

/// The broker session port. One implementation per broker; the domain never depends on a
/// concrete one.
pub trait Gateway: Send {
    fn subscribe(&mut self, vt_symbol: &VtSymbol);
    fn unsubscribe(&mut self, vt_symbol: &VtSymbol);

    /// Submits an order, returning the broker-assigned id(s) — normally one, but a converted
    /// request (see [`Gateway::convert_order_request`]) may fan out into several.
    fn send_order(&mut self, request: &OrderRequest) -> Vec<VtOrderId>;
    fn cancel_order(&mut self, vt_orderid: &VtOrderId);
    fn cancel_all_orders(&mut self);

    /// Splits a single logical close order into exchange-specific today/yesterday legs. Returns
    /// `[request]` unchanged under [`PositionMode::Net`].
    fn convert_order_request(&self, request: &OrderRequest, mode: PositionMode) -> Vec<OrderRequest>;

    fn send_quote(&mut self, request: &QuoteRequest) -> Option<VtQuoteId>;
    fn cancel_quote(&mut self, vt_quoteid: &VtQuoteId);

    fn get_tick(&self, vt_symbol: &VtSymbol) -> Option<Tick>;
    fn get_contract(&self, vt_symbol: &VtSymbol) -> Option<ContractInfo>;
    fn get_all_contracts(&self) -> Vec<ContractInfo>;
    fn get_contracts_by_product(&self, product: &Product) -> Vec<ContractInfo>;
    fn get_contracts_by_exchange(&self, exchange: &str) -> Vec<ContractInfo>;

    fn get_balance(&self) -> Option<AccountBalance>;
    fn get_position(&self, vt_symbol: &VtSymbol, direction: Direction) -> Option<PositionInfo>;
    fn get_all_positions(&self) -> Vec<(VtSymbol, PositionInfo)>;

    fn query_history(&self, vt_symbol: &VtSymbol, interval_minutes: u32, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<Bar>;

    /// Drains broker events accumulated since the last call. The worker's event loop polls this
    /// once per tick of its main select.
    fn poll_events(&mut self) -> Vec<GatewayEvent>;

    fn is_connected(&self) -> bool;
}
