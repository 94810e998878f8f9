//! Typed configuration tree (C26).
//!
//! Shape follows `bog-core/src/config/types.rs`: one `Config` root, nested per-concern structs,
//! `#[serde(default = "...")]` wherever SPEC_FULL documents a fallback.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub gateway: GatewayConfig,
    pub risk: RiskThresholds,
    pub scheduler: SchedulerDefaults,
    pub hedging: HedgingConfig,
    pub sizing: SizingConfig,
    pub greeks: GreeksConfig,
    pub supervisor: SupervisorConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub strategy: StrategyRuntimeConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Connection parameters for the relational store (C19). In production these are overridden by
/// the `VNPY_DATABASE_*` environment variables per SPEC_FULL §6; the TOML values here are
/// defaults/documentation and what the test harness (C28) points at a temp SQLite file instead of.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub driver: String,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default = "default_db_port")]
    pub port: u16,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_keep_days")]
    pub keep_days: u32,
}

fn default_db_port() -> u16 {
    3306
}

fn default_connect_timeout_secs() -> u64 {
    5
}

fn default_keep_days() -> u32 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub broker_name: String,
    #[serde(default = "default_connect_timeout_secs_gw")]
    pub connect_timeout_secs: u64,
}

fn default_connect_timeout_secs_gw() -> u64 {
    60
}

/// Per-position and portfolio Greek limits (C8).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GreekLimits {
    pub delta: Decimal,
    pub gamma: Decimal,
    pub vega: Decimal,
    pub theta: Decimal,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RiskThresholds {
    pub position: GreekLimits,
    pub portfolio: GreekLimits,
    /// Whether a manually-opened position (detected by §4.1's reconciliation) still counts
    /// toward the day's open-volume cap. Locked-in default per SPEC_FULL §9.1: `true`.
    #[serde(default = "default_true")]
    pub count_manual_opens_toward_daily_cap: bool,
    /// Whether a portfolio Greek breach blocks new opens with no grace window (the SPEC_FULL
    /// §9.1 resolution) or only after `grace_window_bars` consecutive breached bars.
    #[serde(default)]
    pub grace_window_bars: u32,
}

fn default_true() -> bool {
    true
}

/// Defaults for the advanced order scheduler (C10). Individual `submit_*` calls can still pass
/// explicit parameters; these are what a caller gets when a field is omitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerDefaults {
    pub iceberg_batch_size: Decimal,
    pub classic_iceberg_per_order_volume: Decimal,
    #[serde(default = "default_randomization_ratio")]
    pub classic_iceberg_randomization_ratio: Decimal,
    #[serde(default = "default_price_offset_ticks")]
    pub classic_iceberg_price_offset_ticks: u32,
    pub timed_split_per_order_volume: Decimal,
    pub timed_split_interval_seconds: u64,
    pub twap_num_slices: u32,
    pub twap_time_window_seconds: u64,
}

fn default_randomization_ratio() -> Decimal {
    Decimal::new(2, 1) // 0.2
}

fn default_price_offset_ticks() -> u32 {
    2
}

/// Delta hedging / Gamma scalping configuration (C11/C12). "Missing keys fall back to
/// defaults" per SPEC_FULL §4.11.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HedgingConfig {
    #[serde(default = "default_target_delta")]
    pub target_delta: Decimal,
    #[serde(default = "default_hedging_band")]
    pub hedging_band: Decimal,
    #[serde(default = "default_rebalance_threshold")]
    pub gamma_scalp_rebalance_threshold: Decimal,
    pub hedge_instrument_delta_per_unit: Decimal,
    pub hedge_instrument_multiplier: Decimal,
}

fn default_target_delta() -> Decimal {
    Decimal::ZERO
}

fn default_hedging_band() -> Decimal {
    Decimal::new(5, 0) // 5
}

fn default_rebalance_threshold() -> Decimal {
    Decimal::new(10, 0) // 10
}

impl Default for HedgingConfig {
    fn default() -> Self {
        Self {
            target_delta: default_target_delta(),
            hedging_band: default_hedging_band(),
            gamma_scalp_rebalance_threshold: default_rebalance_threshold(),
            hedge_instrument_delta_per_unit: Decimal::ONE,
            hedge_instrument_multiplier: Decimal::ONE,
        }
    }
}

/// Position sizing and daily-limits configuration (C7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SizingConfig {
    pub global_daily_open_cap: u32,
    pub per_symbol_daily_open_cap: u32,
    pub max_concurrent_positions: u32,
    #[serde(default = "default_position_ratio")]
    pub position_ratio: Decimal,
}

fn default_position_ratio() -> Decimal {
    Decimal::new(1, 1) // 0.1
}

/// Numerical parameters for the Greeks/IV solver (C1).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GreeksConfig {
    #[serde(default = "default_risk_free_rate")]
    pub risk_free_rate: Decimal,
    #[serde(default = "default_iv_tolerance")]
    pub iv_tolerance: f64,
    #[serde(default = "default_iv_max_iterations")]
    pub iv_max_iterations: u32,
}

fn default_risk_free_rate() -> Decimal {
    Decimal::new(3, 2) // 0.03
}

fn default_iv_tolerance() -> f64 {
    1e-6
}

fn default_iv_max_iterations() -> u32 {
    100
}

impl Default for GreeksConfig {
    fn default() -> Self {
        Self {
            risk_free_rate: default_risk_free_rate(),
            iv_tolerance: default_iv_tolerance(),
            iv_max_iterations: default_iv_max_iterations(),
        }
    }
}

/// Smart executor configuration (C9), serde-friendly mirror of
/// [`crate::execution::SmartExecutorConfig`] — that type carries a `chrono::Duration` for the
/// timeout, which this config expresses as whole seconds instead.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ExecutorConfig {
    #[serde(default = "default_slippage_ticks")]
    pub slippage_ticks: u32,
    #[serde(default = "default_pricetick")]
    pub pricetick: Decimal,
    #[serde(default = "default_order_timeout_secs")]
    pub order_timeout_secs: i64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_slippage_ticks() -> u32 {
    2
}

fn default_pricetick() -> Decimal {
    Decimal::ONE
}

fn default_order_timeout_secs() -> i64 {
    10
}

fn default_max_retries() -> u32 {
    3
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            slippage_ticks: default_slippage_ticks(),
            pricetick: default_pricetick(),
            order_timeout_secs: default_order_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

impl ExecutorConfig {
    pub fn to_smart_executor_config(self) -> crate::execution::SmartExecutorConfig {
        crate::execution::SmartExecutorConfig {
            slippage_ticks: self.slippage_ticks,
            pricetick: self.pricetick,
            order_timeout: chrono::Duration::seconds(self.order_timeout_secs),
            max_retries: self.max_retries,
        }
    }
}

/// Per-run strategy engine parameters (C16) that are neither risk/scheduler/hedging/sizing/greeks
/// tuning nor connection details: the bar-pipeline window, the close-order accounting mode
/// (exchange-specific today/yesterday split), and the hedging cadence.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StrategyRuntimeConfig {
    #[serde(default = "default_bar_window")]
    pub bar_window: u32,
    #[serde(default = "default_position_mode")]
    pub position_mode: crate::gateway::PositionMode,
    #[serde(default = "default_hedge_every_n_bars")]
    pub hedge_every_n_bars: u32,
}

fn default_bar_window() -> u32 {
    1
}

fn default_position_mode() -> crate::gateway::PositionMode {
    crate::gateway::PositionMode::Net
}

fn default_hedge_every_n_bars() -> u32 {
    1
}

impl Default for StrategyRuntimeConfig {
    fn default() -> Self {
        Self {
            bar_window: default_bar_window(),
            position_mode: default_position_mode(),
            hedge_every_n_bars: default_hedge_every_n_bars(),
        }
    }
}

/// A daily HH:MM–HH:MM trading session window (C20 session gating).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SessionWindow {
    pub start_hour: u32,
    pub start_minute: u32,
    pub end_hour: u32,
    pub end_minute: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    pub sessions: Vec<SessionWindow>,
    #[serde(default = "default_initial_backoff_secs")]
    pub initial_backoff_secs: u64,
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,
    #[serde(default = "default_max_consecutive_restarts")]
    pub max_consecutive_restarts: u32,
    #[serde(default = "default_stable_uptime_secs")]
    pub stable_uptime_secs: u64,
}

fn default_initial_backoff_secs() -> u64 {
    5
}

fn default_max_backoff_secs() -> u64 {
    300
}

fn default_max_consecutive_restarts() -> u32 {
    10
}

fn default_stable_uptime_secs() -> u64 {
    3600
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}
