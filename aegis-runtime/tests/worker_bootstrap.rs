//! Integration test for the pieces `worker`'s `main` wires together: parse a config, open a
//! file-backed SQLite database (not `:memory:` — a real worker restart reopens the same file, and
//! `tempfile` gives us that without leaving junk behind), run a strategy engine against the paper
//! gateway for a few bars, save, and reload.

use aegis_core::config::Config;
use aegis_core::core::{Bar, VtSymbol};
use aegis_core::persistence::{monitor, StateRepository};
use aegis_core::sizing::DefaultPositionSizer;
use aegis_core::strategy_engine::{ServiceBundle, StrategyEngine, StrategyEngineConfig};
use aegis_runtime::reference_strategy::{MovingAverageCrossoverSignal, SimpleMovingAverageIndicator};
use aegis_runtime::session::is_in_session;
use aegis_runtime::simulated_gateway::{SeedContract, SimulatedGateway};
use chrono::{NaiveTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

const CONFIG_TOML: &str = r#"
    [database]
    driver = "sqlite"

    [gateway]
    broker_name = "paper"

    [risk.position]
    delta = "50"
    gamma = "20"
    vega = "2000"
    theta = "2000"

    [risk.portfolio]
    delta = "200"
    gamma = "80"
    vega = "10000"
    theta = "10000"

    [scheduler]
    iceberg_batch_size = "30"
    classic_iceberg_per_order_volume = "10"
    timed_split_per_order_volume = "10"
    timed_split_interval_seconds = 30
    twap_num_slices = 5
    twap_time_window_seconds = 300

    [hedging]
    hedge_instrument_delta_per_unit = "1"
    hedge_instrument_multiplier = "10"

    [sizing]
    global_daily_open_cap = 20
    per_symbol_daily_open_cap = 5
    max_concurrent_positions = 10

    [greeks]

    [executor]

    [strategy]

    [supervisor]
    sessions = [{ start_hour = 9, start_minute = 0, end_hour = 15, end_minute = 0 }]
"#;

fn bar(symbol: &str, close: Decimal, minutes_offset: i64) -> Bar {
    Bar::new(symbol, Utc::now() + chrono::Duration::minutes(minutes_offset), 1, close, close, close, close, dec!(10))
}

#[tokio::test]
async fn worker_bootstrap_runs_bars_saves_and_reloads() {
    let config = Config::from_toml_str(CONFIG_TOML).expect("config parses");

    let tmp_dir = tempfile::tempdir().expect("tempdir");
    let db_path = tmp_dir.path().join("aegis-test.db");
    let url = format!("sqlite://{}", db_path.display());
    let pool = aegis_core::persistence::db::connect(&url, std::time::Duration::from_secs(5)).await.expect("connect");

    let repository = StateRepository::new(pool.clone());
    repository.ensure_schema().await.expect("ensure_schema");
    monitor::ensure_schema(&pool).await.expect("monitor ensure_schema");

    let seed_symbol = "rb2505.SHFE";
    let gateway = Box::new(SimulatedGateway::new(
        vec![SeedContract {
            vt_symbol: VtSymbol::from(seed_symbol),
            product: aegis_core::core::Product::from("rb"),
            exchange: "SHFE".to_string(),
            pricetick: dec!(1),
            size: dec!(10),
        }],
        dec!(1_000_000),
    ));

    let services = ServiceBundle {
        indicators: Box::new(SimpleMovingAverageIndicator { window: 3 }),
        signals: Box::new(MovingAverageCrossoverSignal),
        sizer: Box::new(DefaultPositionSizer),
        gateway,
    };

    let engine_config = StrategyEngineConfig {
        strategy_name: "IntegrationTest".to_string(),
        variant: "default".to_string(),
        risk: config.risk,
        scheduler: config.scheduler.clone(),
        hedging: config.hedging.clone(),
        sizing: config.sizing.clone(),
        greeks: config.greeks,
        executor: config.executor.to_smart_executor_config(),
        bar_window: config.strategy.bar_window,
        position_mode: config.strategy.position_mode,
        hedge_every_n_bars: config.strategy.hedge_every_n_bars,
    };

    let mut engine = StrategyEngine::new(engine_config, services, seed_symbol);

    for (i, close) in [dec!(100), dec!(100), dec!(100), dec!(110)].into_iter().enumerate() {
        engine.on_bars(&[bar(seed_symbol, close, i as i64)]);
    }

    engine.auto_save(&repository).await;

    match repository.load("IntegrationTest").await.expect("load") {
        aegis_core::errors::LoadOutcome::Loaded(snapshot) => {
            assert_eq!(snapshot.schema_version, aegis_core::persistence::CURRENT_SCHEMA_VERSION);
        }
        aegis_core::errors::LoadOutcome::NotFound(_) => panic!("expected a saved snapshot after auto_save"),
    }
}

#[test]
fn configured_sessions_gate_worker_hours() {
    let config = Config::from_toml_str(CONFIG_TOML).expect("config parses");
    assert!(is_in_session(NaiveTime::from_hms_opt(10, 0, 0).unwrap(), &config.supervisor.sessions));
    assert!(!is_in_session(NaiveTime::from_hms_opt(20, 0, 0).unwrap(), &config.supervisor.sessions));
}
