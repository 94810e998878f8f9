//! Strategy engine (C16): the per-bar orchestrator that wires every domain component together.
//!
//! A single owning struct that drives one `process_tick`-shaped entry point through a fixed
//! pipeline, catching and logging recoverable errors so one bad bar never stops the next. Dispatch
//! here is through trait objects (`ServiceBundle`) rather than const generics: this engine runs one
//! strategy instance per worker process against a plugged-in indicator/signal/sizing/gateway
//! stack chosen at startup from `Config`, not monomorphized per strategy at compile time.

use std::collections::HashMap;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;

use crate::aggregates::instrument::InstrumentAggregate;
use crate::aggregates::position::{PositionAggregate, TrackedOrder};
use crate::bar_pipeline::BarPipeline;
use crate::config::{GreeksConfig, HedgingConfig, RiskThresholds, SchedulerDefaults, SizingConfig};
use crate::core::{Bar, Direction, Offset, OrderType, Tick, VtSymbol};
use crate::errors::EngineError;
use crate::events::{DomainEvent, EventBus, RiskScope};
use crate::execution::{AdaptiveSide, SmartExecutor, SmartExecutorConfig};
use crate::gateway::{Gateway, GatewayEvent, OrderRequest, PositionMode};
use crate::greeks::{self, Greeks};
use crate::hedging::{compute_delta_hedge, compute_gamma_scalp};
use crate::indicators::IndicatorService;
use crate::persistence::{StateRepository, StrategyStateSnapshot, CURRENT_SCHEMA_VERSION};
use crate::risk::{PortfolioGreeks, PortfolioRiskAggregator};
use crate::selectors::future_selector::{parse_expiry_yymm, select_dominant_future, FutureCandidate};
use crate::signals::SignalService;
use crate::sizing::{AccountSnapshot, PositionSizer};

/// The pluggable capability ports a concrete strategy deployment supplies at startup. Every field
/// is a trait object: the engine itself is agnostic to which indicator/signal/sizing logic or
/// which broker connection it is driving.
pub struct ServiceBundle {
    pub indicators: Box<dyn IndicatorService>,
    pub signals: Box<dyn SignalService>,
    pub sizer: Box<dyn PositionSizer>,
    pub gateway: Box<dyn Gateway>,
}

/// Everything the engine needs to know about a single running strategy instance besides the
/// pluggable services above — the typed half of `Config` (C26) that this module actually reads.
#[derive(Debug, Clone)]
pub struct StrategyEngineConfig {
    pub strategy_name: String,
    pub variant: String,
    pub risk: RiskThresholds,
    pub scheduler: SchedulerDefaults,
    pub hedging: HedgingConfig,
    pub sizing: SizingConfig,
    pub greeks: GreeksConfig,
    pub executor: SmartExecutorConfig,
    pub bar_window: u32,
    pub position_mode: PositionMode,
    /// Hedging runs every `hedge_every_n_bars` bars rather than on every bar, per the "slower
    /// cadence" requirement.
    pub hedge_every_n_bars: u32,
}

/// Per-instrument pricing inputs the engine needs to compute Greeks, supplied by the caller since
/// neither the instrument aggregate nor the indicator chain is required to carry option terms.
#[derive(Debug, Clone, Copy)]
pub struct OptionTerms {
    pub option_type: crate::core::OptionType,
    pub strike: Decimal,
    pub underlying_price: Decimal,
    pub time_to_expiry_years: Decimal,
    pub volume: Decimal,
    pub multiplier: Decimal,
    /// Implied volatility to price with. The engine does not look this up itself (the vol
    /// surface, when the strategy maintains one, is queried by the caller and the result fed
    /// in here) — it has no opinion on which smile point is the right one for a given bar.
    pub implied_vol: Decimal,
}

/// The per-bar, per-position, per-instrument orchestrator. Owns every domain aggregate and
/// service; the worker binary's event loop is a thin driver around [`StrategyEngine::on_bars`],
/// [`StrategyEngine::on_gateway_event`], and the auto-save/hedge cadence helpers.
pub struct StrategyEngine {
    config: StrategyEngineConfig,
    services: ServiceBundle,
    pub instruments: InstrumentAggregate,
    pub positions: PositionAggregate,
    pub risk: PortfolioRiskAggregator,
    pub scheduler: crate::execution::Scheduler,
    pub executor: SmartExecutor,
    pub bar_pipeline: BarPipeline,
    events: EventBus,
    last_rollover_date: Option<NaiveDate>,
    bars_since_hedge: u32,
    current_dt: DateTime<Utc>,
    last_portfolio_greeks: PortfolioGreeks,
    breached_bars_streak: u32,
}

impl StrategyEngine {
    pub fn new(config: StrategyEngineConfig, services: ServiceBundle, seed_symbol: &str) -> Self {
        tracing::info!(
            strategy_name = %config.strategy_name,
            variant = %config.variant,
            "initializing strategy engine"
        );
        let bar_window = config.bar_window;
        Self {
            risk: PortfolioRiskAggregator::new(config.risk.clone()),
            instruments: InstrumentAggregate::new(seed_symbol),
            positions: PositionAggregate::new(),
            scheduler: crate::execution::Scheduler::new(),
            executor: SmartExecutor::new(),
            bar_pipeline: BarPipeline::new(bar_window),
            events: EventBus::new(),
            last_rollover_date: None,
            bars_since_hedge: 0,
            current_dt: Utc::now(),
            last_portfolio_greeks: PortfolioGreeks::default(),
            breached_bars_streak: 0,
            config,
            services,
        }
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.events
    }

    /// Restores aggregates from a loaded snapshot, replacing whatever state `new` seeded.
    pub fn restore_from_snapshot(&mut self, snapshot: StrategyStateSnapshot) {
        self.instruments = InstrumentAggregate::restore(snapshot.target_aggregate);
        self.positions = PositionAggregate::restore(snapshot.position_aggregate);
        self.current_dt = snapshot.current_dt;
    }

    pub fn snapshot(&self, saved_at: DateTime<Utc>) -> StrategyStateSnapshot {
        StrategyStateSnapshot {
            schema_version: CURRENT_SCHEMA_VERSION,
            saved_at,
            target_aggregate: self.instruments.snapshot(),
            position_aggregate: self.positions.snapshot(),
            current_dt: self.current_dt,
        }
    }

    /// Persists the current snapshot. Failure is logged and converted into
    /// [`DomainEvent::AutoSaveFailed`] rather than propagated — the next tick tries again.
    pub async fn auto_save(&mut self, repository: &StateRepository) {
        let snapshot = self.snapshot(Utc::now());
        if let Err(err) = repository.save(&self.config.strategy_name, &snapshot).await {
            tracing::warn!(strategy_name = %self.config.strategy_name, error = %err, "auto-save failed");
            self.events.publish(&DomainEvent::AutoSaveFailed {
                strategy_name: self.config.strategy_name.clone(),
                reason: err.to_string(),
                at: Utc::now(),
            });
        }
    }

    /// Drives one incoming tick through the bar pipeline and, for every window bar it completes,
    /// through the full per-bar flow. Ticks that do not complete a window produce no engine
    /// activity beyond internal accumulation.
    pub fn on_tick(&mut self, tick: &Tick) {
        let windows = self.bar_pipeline.handle_tick(tick);
        for (window_dt, bars_by_symbol) in windows {
            self.run_window(window_dt, bars_by_symbol);
        }
    }

    /// Feeds already-closed bars (e.g. from `query_history` backfill) through the same barrier
    /// pipeline as live ticks.
    pub fn on_bars(&mut self, bars: &[Bar]) {
        let windows = self.bar_pipeline.handle_bars(bars);
        for (window_dt, bars_by_symbol) in windows {
            self.run_window(window_dt, bars_by_symbol);
        }
    }

    /// The per-window-bar flow from SPEC_FULL §4.12, steps 1–7.
    fn run_window(&mut self, window_dt: DateTime<Utc>, bars_by_symbol: HashMap<String, Bar>) {
        let span = tracing::info_span!("window_bar", bar_dt = %window_dt);
        let _guard = span.enter();

        self.current_dt = window_dt;
        self.positions.on_new_trading_day(window_dt.date_naive());

        let mut updated: Vec<VtSymbol> = Vec::with_capacity(bars_by_symbol.len());
        for (symbol, bar) in &bars_by_symbol {
            let vt_symbol = VtSymbol::new(symbol.clone());
            match self.instruments.append_bar(&vt_symbol, bar.clone()) {
                Ok(()) => updated.push(vt_symbol),
                Err(err) => {
                    tracing::warn!(vt_symbol = %vt_symbol, error = %err, "bar rejected by instrument aggregate");
                }
            }
        }

        for vt_symbol in &updated {
            if let Some(bar) = bars_by_symbol.get(vt_symbol.as_str()) {
                self.services.indicators.calculate_bar(&mut self.instruments, vt_symbol, bar);
            }
        }

        self.run_rollover_check(window_dt.date_naive());

        for vt_symbol in &updated {
            self.process_close_signals(vt_symbol);
        }
        for vt_symbol in &updated {
            self.process_open_signal(vt_symbol);
        }

        self.bars_since_hedge += 1;
        if self.bars_since_hedge >= self.config.hedge_every_n_bars.max(1) {
            self.bars_since_hedge = 0;
            self.run_hedging();
        }

        let pending = self.positions.pop_domain_events();
        self.events.publish_all(&pending);
    }

    /// Rollover check (step 3): idempotent per calendar day, keyed off the 14:50 trigger upstream
    /// (the worker only calls this path from window bars, and a day only transitions once).
    fn run_rollover_check(&mut self, today: NaiveDate) {
        if self.last_rollover_date == Some(today) {
            return;
        }
        self.last_rollover_date = Some(today);

        let mut by_product: HashMap<String, Vec<FutureCandidate>> = HashMap::new();
        for vt_symbol in self.instruments.known_symbols() {
            let product = vt_symbol.product_code();
            if let Some(expiry) = parse_expiry_yymm(vt_symbol, today.year()) {
                by_product.entry(product).or_default().push(FutureCandidate { vt_symbol: vt_symbol.clone(), expiry });
            }
        }

        let active_contracts: Vec<(String, VtSymbol)> =
            self.instruments.get_all_active_contracts().iter().map(|(p, s)| (p.clone(), s.clone())).collect();

        for (product, mut candidates) in by_product {
            candidates.sort_by_key(|c| c.expiry);
            let Some(dominant) = select_dominant_future(&candidates, today) else {
                continue;
            };
            let previous = active_contracts.iter().find(|(p, _)| p == &product).map(|(_, s)| s.clone());
            if previous.as_ref() == Some(&dominant.vt_symbol) {
                continue;
            }

            let new_symbol = dominant.vt_symbol.clone();
            if let Some(old_symbol) = &previous {
                self.bar_pipeline.unsubscribe(old_symbol.as_str());
                self.services.gateway.unsubscribe(old_symbol);
            }
            self.bar_pipeline.subscribe(new_symbol.as_str());
            self.services.gateway.subscribe(&new_symbol);
            self.instruments.set_active_contract(&product, new_symbol.clone());

            tracing::info!(product = %product, old_symbol = ?previous, new_symbol = %new_symbol, "rollover occurred");
            self.events.publish(&DomainEvent::RolloverOccurred {
                product,
                old_symbol: previous,
                new_symbol,
                at: Utc::now(),
            });
        }
    }

    /// Step 4: close-signal flow for every position owned by `vt_symbol`.
    fn process_close_signals(&mut self, vt_symbol: &VtSymbol) {
        let positions: Vec<_> = self.positions.get_positions_by_underlying(vt_symbol).into_iter().cloned().collect();
        for position in positions {
            if self.positions.has_pending_close(vt_symbol, position.direction) {
                continue;
            }
            let Some(_reason) = self.services.signals.check_close_signal(&self.instruments, vt_symbol, &position) else {
                continue;
            };

            if self.risk.portfolio_is_breached() {
                tracing::warn!(vt_symbol = %vt_symbol, "close signal fired but portfolio risk is breached; dispatching to flatten anyway");
            }

            let desired = position.volume - position.pending_close_volume;
            let volume = self.services.sizer.calculate_exit_volume(desired, &position);
            if volume <= Decimal::ZERO {
                continue;
            }

            self.dispatch_order(vt_symbol, position.direction.opposite(), Offset::Close, volume);
        }
    }

    /// Step 5: open-signal flow. Aborts the candidate (logs, does not raise) at any gate per
    /// §7's "validation errors: return empty/none, log, do not raise" policy.
    fn process_open_signal(&mut self, vt_symbol: &VtSymbol) {
        let Some(_reason) = self.services.signals.check_open_signal(&self.instruments, vt_symbol) else {
            return;
        };

        if self.open_signals_blocked_by_risk() {
            tracing::info!(
                vt_symbol = %vt_symbol,
                breached_bars_streak = self.breached_bars_streak,
                grace_window_bars = self.config.risk.grace_window_bars,
                "open signal suppressed: portfolio risk breached past the grace window"
            );
            return;
        }

        if self.instruments.get_latest_price(vt_symbol).is_none() {
            tracing::warn!(vt_symbol = %vt_symbol, "open signal fired but no price history yet");
            return;
        }

        let desired = Decimal::ONE;
        let account = AccountSnapshot {
            balance: self.services.gateway.get_balance().map(|b| b.balance).unwrap_or(Decimal::ZERO),
            free_margin: self.services.gateway.get_balance().map(|b| b.available).unwrap_or(Decimal::ZERO),
        };
        let global_cap = Decimal::from(self.config.sizing.global_daily_open_cap);
        let per_symbol_cap = Decimal::from(self.config.sizing.per_symbol_daily_open_cap);
        if !self.positions.check_open_limit(vt_symbol, desired, global_cap, per_symbol_cap) {
            tracing::info!(vt_symbol = %vt_symbol, "open signal suppressed: daily open cap reached");
            return;
        }

        let volume = self.services.sizer.calculate_open_volume(desired, vt_symbol, &self.positions, &account, &self.config.sizing);
        if volume <= Decimal::ZERO {
            tracing::info!(vt_symbol = %vt_symbol, "open signal suppressed: sizer returned zero volume");
            return;
        }

        self.positions.create_position(vt_symbol.clone(), Direction::Long, Decimal::ZERO);
        self.positions.record_open_usage(vt_symbol.clone(), volume);
        self.dispatch_order(vt_symbol, Direction::Long, Offset::Open, volume);
    }

    /// Computes a pre-trade Greeks/risk view for `vt_symbol` and records an edge-triggered
    /// position-level breach event if limits are crossed. Used ahead of both close and open
    /// dispatch whenever option terms are available.
    pub fn check_position_risk(&mut self, vt_symbol: &VtSymbol, terms: OptionTerms) -> Result<Greeks, EngineError> {
        let greeks = greeks::greeks(
            terms.option_type,
            terms.underlying_price,
            terms.strike,
            self.config.greeks.risk_free_rate,
            terms.implied_vol,
            terms.time_to_expiry_years,
        )
        .map_err(|e| EngineError::Validation(e.to_string()))?;

        let (check, event) = self.risk.check_position_risk_and_emit(vt_symbol, &greeks);
        if let Some(event) = event {
            self.events.publish(&event);
        }
        if !check.ok {
            return Err(EngineError::RiskBlocked(check.breached_fields));
        }
        Ok(greeks)
    }

    /// Aggregates portfolio Greeks across the supplied per-position figures and emits an
    /// edge-triggered portfolio breach/clear event. Called by the worker whenever a fresh set of
    /// per-position Greeks is available (typically once per window bar, after step 5).
    pub fn update_portfolio_risk(&mut self, per_position: &[(Decimal, Decimal, Greeks)]) {
        let (portfolio, events) = self.risk.aggregate_portfolio_greeks(per_position);
        self.last_portfolio_greeks = portfolio;
        self.breached_bars_streak = if self.risk.portfolio_is_breached() { self.breached_bars_streak + 1 } else { 0 };
        self.events.publish_all(&events);
    }

    /// Whether new opens should be refused this bar: a portfolio breach blocks immediately when
    /// `grace_window_bars` is `0` (the SPEC_FULL §9.1 default), or once the breach has persisted
    /// for more than `grace_window_bars` consecutive bars otherwise. Closes are never gated by
    /// this — `process_close_signals` only logs a breach, it still dispatches the flatten.
    fn open_signals_blocked_by_risk(&self) -> bool {
        self.risk.portfolio_is_breached() && self.breached_bars_streak > self.config.risk.grace_window_bars
    }

    /// Hedging cadence (step after the per-bar flow, every `hedge_every_n_bars` bars): recomputes
    /// delta hedge and gamma scalp instructions from the latest portfolio Greeks and dispatches
    /// whichever instrument the config designates as the hedge vehicle.
    fn run_hedging(&mut self) {
        let portfolio = self.last_portfolio_greeks;
        if let Some(instruction) = compute_delta_hedge(portfolio.delta, &self.config.hedging) {
            tracing::info!(direction = %instruction.direction, volume = %instruction.volume, "delta hedge instruction");
        }
        match compute_gamma_scalp(portfolio.delta, portfolio.gamma, &self.config.hedging) {
            Ok(Some(instruction)) => {
                tracing::info!(direction = %instruction.direction, volume = %instruction.volume, "gamma scalp instruction");
            }
            Ok(None) => {}
            Err(err) => tracing::debug!(error = %err, "gamma scalp skipped"),
        }
    }

    /// Sends an order through the smart executor and records it against the position aggregate.
    fn dispatch_order(&mut self, vt_symbol: &VtSymbol, direction: Direction, offset: Offset, volume: Decimal) {
        let side: AdaptiveSide = direction.into();
        let Some(reference) = self.instruments.get_latest_price(vt_symbol) else {
            tracing::warn!(vt_symbol = %vt_symbol, "cannot dispatch order: no reference price");
            return;
        };
        let price = self.executor.compute_price(&self.config.executor, side, reference);

        let request = OrderRequest {
            vt_symbol: vt_symbol.clone(),
            direction,
            offset,
            volume,
            price,
            order_type: OrderType::Limit,
        };
        let converted = self.services.gateway.convert_order_request(&request, self.config.position_mode);
        if converted.is_empty() {
            tracing::warn!(vt_symbol = %vt_symbol, "gateway produced no order requests for dispatch");
            return;
        }

        for leg in converted {
            let vt_orderids = self.services.gateway.send_order(&leg);
            let now = Utc::now();
            for vt_orderid in vt_orderids {
                self.executor.register(vt_orderid.clone(), leg.price, now, self.config.executor.order_timeout);
                self.positions.record_order_submitted(TrackedOrder {
                    vt_orderid,
                    vt_symbol: leg.vt_symbol.clone(),
                    direction: leg.direction,
                    offset: leg.offset,
                    volume: leg.volume,
                    traded: Decimal::ZERO,
                    status: crate::core::OrderStatus::Submitting,
                    price: leg.price,
                });
            }
        }
    }

    /// Consumes one event surfaced by the gateway's `poll_events`. This is the worker's only path
    /// for feeding broker state back into the aggregates, executor, and scheduler.
    pub fn on_gateway_event(&mut self, event: GatewayEvent) {
        match event {
            GatewayEvent::Tick(tick) => self.on_tick(&tick),
            GatewayEvent::OrderUpdate { vt_orderid, status, traded } => {
                let Some(existing) = self.positions.get_pending_order(&vt_orderid) else {
                    tracing::debug!(vt_orderid = %vt_orderid, "order update for an order the position aggregate no longer tracks");
                    return;
                };
                let update = TrackedOrder { traded, status, ..existing.clone() };

                if status.is_terminal() {
                    if status == crate::core::OrderStatus::AllTraded {
                        self.executor.on_fill(&vt_orderid);
                    } else {
                        self.executor.on_broker_cancel_or_reject(&vt_orderid);
                    }
                }
                if let Err(err) = self.positions.apply_order_update(update) {
                    tracing::debug!(vt_orderid = %vt_orderid, error = %err, "order update rejected by position aggregate");
                }
            }
            GatewayEvent::Trade { vt_orderid, volume, price, .. } => {
                let trade = crate::aggregates::position::Trade { volume, price };
                if let Err(err) = self.positions.apply_trade(&vt_orderid, trade) {
                    tracing::debug!(vt_orderid = %vt_orderid, error = %err, "trade rejected by position aggregate");
                }
                match self.scheduler.on_child_filled(&vt_orderid, volume, Utc::now()) {
                    Ok(Some(event)) => self.events.publish(&event),
                    Ok(None) => {}
                    Err(_) => {}
                }
            }
            GatewayEvent::PositionUpdate { vt_symbol, position } => {
                self.positions.reconcile_external_position(
                    crate::aggregates::position::ExternalPosition {
                        vt_symbol,
                        direction: position.direction,
                        volume: position.volume,
                    },
                    self.config.risk.count_manual_opens_toward_daily_cap,
                );
                let pending = self.positions.pop_domain_events();
                self.events.publish_all(&pending);
            }
            GatewayEvent::AccountUpdate(_) => {}
        }
    }

    /// Drains every event currently queued on the gateway and feeds each through
    /// [`Self::on_gateway_event`]. Callers should run this on a tight cadence (SPEC_FULL §5's
    /// gateway-poll tick) — it's the only path a running worker has to learn about fills, ticks,
    /// and broker-side position changes, since the gateway itself is not run on its own task.
    pub fn poll_gateway(&mut self) {
        for event in self.services.gateway.poll_events() {
            self.on_gateway_event(event);
        }
    }

    /// Checked on every tick of the ≥1 Hz timeout timer (§5's cancellation & timeouts clause):
    /// sweeps timed-out orders, retries them at an adaptive price, and drains any now-ready
    /// scheduler children.
    pub fn on_timeout_tick(&mut self, now: DateTime<Utc>) {
        let timeout_events = self.executor.check_timeouts(now);
        self.events.publish_all(&timeout_events);
        self.executor.sweep_terminal();

        let ready = self.scheduler.get_pending_children(now);
        for (advanced_id, child) in ready {
            let Some(order) = self.scheduler.get_order(&advanced_id) else { continue };
            let Some(reference) = self.instruments.get_latest_price(&order.vt_symbol) else {
                tracing::warn!(vt_symbol = %order.vt_symbol, "cannot send scheduled child: no reference price");
                continue;
            };
            let base_price = self.executor.compute_price(&self.config.executor, order.direction.into(), reference);
            let price = base_price + self.config.executor.pricetick * Decimal::from(child.price_offset_ticks);
            let request = OrderRequest {
                vt_symbol: order.vt_symbol.clone(),
                direction: order.direction,
                offset: order.offset,
                volume: child.volume,
                price,
                order_type: OrderType::Limit,
            };
            let vt_orderids = self.services.gateway.send_order(&request);
            if let Some(vt_orderid) = vt_orderids.into_iter().next() {
                if let Err(err) = self.scheduler.record_child_sent(&advanced_id, child.sequence, vt_orderid) {
                    tracing::debug!(error = %err, "failed to record scheduled child as sent");
                }
            }
        }
    }
}
