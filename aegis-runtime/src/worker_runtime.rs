//! The worker's bootstrap-and-run logic (C21), factored out of the `worker` binary so the
//! supervisor's `standalone` mode (SPEC_FULL §6: "single process", as opposed to `daemon`'s
//! parent+child split) can run it in-process instead of spawning a second OS process for a mode
//! that explicitly asks not to have one.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use aegis_core::config::env::{validate_broker_env_vars, validate_database_env_vars};
use aegis_core::config::Config;
use aegis_core::errors::LoadOutcome;
use aegis_core::persistence::{db, monitor, StateRepository};
use aegis_core::strategy_engine::{ServiceBundle, StrategyEngine, StrategyEngineConfig};

use crate::reference_strategy::{MovingAverageCrossoverSignal, SimpleMovingAverageIndicator};
use crate::simulated_gateway::{SeedContract, SimulatedGateway};

/// Everything the worker needs that isn't already in the TOML config: the CLI-supplied identity
/// of this run and its bootstrap knobs.
#[derive(Debug, Clone)]
pub struct WorkerArgs {
    pub config_path: PathBuf,
    pub strategy_name: String,
    pub variant: String,
    pub seed_symbol: String,
    pub auto_save_interval_secs: u64,
}

fn build_engine_config(config: &Config, strategy_name: String, variant: String) -> StrategyEngineConfig {
    StrategyEngineConfig {
        strategy_name,
        variant,
        risk: config.risk,
        scheduler: config.scheduler.clone(),
        hedging: config.hedging.clone(),
        sizing: config.sizing.clone(),
        greeks: config.greeks,
        executor: config.executor.to_smart_executor_config(),
        bar_window: config.strategy.bar_window,
        position_mode: config.strategy.position_mode,
        hedge_every_n_bars: config.strategy.hedge_every_n_bars,
    }
}

/// Fails fast, per SPEC_FULL §7, if any required environment variable is unset. Broker vars are
/// validated too even though this binary's default gateway is the in-memory paper adapter: a real
/// deployment swapping in a broker adapter must not discover a missing credential only after the
/// worker is otherwise up and running.
fn validate_environment() -> Result<()> {
    let missing_db = validate_database_env_vars();
    if !missing_db.is_empty() {
        anyhow::bail!("missing required database environment variable(s): {missing_db:?}");
    }
    let missing_broker = validate_broker_env_vars();
    if !missing_broker.is_empty() {
        warn!(missing = ?missing_broker, "broker environment variables are unset; running with the paper-trading gateway only");
    }
    Ok(())
}

/// Connects, restores state, and runs the worker's event loop to completion (normal shutdown) or
/// error (fail-fast condition). Callers provide their own `tracing` subscriber beforehand.
pub async fn run(args: WorkerArgs) -> Result<()> {
    info!(strategy_name = %args.strategy_name, variant = %args.variant, "starting aegis worker");

    validate_environment().context("environment validation failed")?;

    let config = Config::from_toml_file(&args.config_path).context("failed to load configuration")?;

    let pool = db::connect_from_env(Duration::from_secs(config.database.connect_timeout_secs))
        .await
        .context("failed to connect to the state database")?;
    let repository = StateRepository::new(pool.clone());
    repository.ensure_schema().await.context("failed to ensure strategy_state schema")?;
    monitor::ensure_schema(pool).await.context("failed to ensure monitor schema")?;

    let gateway = Box::new(SimulatedGateway::new(
        vec![SeedContract {
            vt_symbol: aegis_core::core::VtSymbol::new(args.seed_symbol.clone()),
            product: aegis_core::core::Product::new(
                aegis_core::core::VtSymbol::new(args.seed_symbol.clone()).product_code(),
            ),
            exchange: "SHFE".to_string(),
            pricetick: config.executor.pricetick,
            size: rust_decimal::Decimal::TEN,
        }],
        rust_decimal::Decimal::from(1_000_000),
    ));

    let services = ServiceBundle {
        indicators: Box::new(SimpleMovingAverageIndicator { window: 20 }),
        signals: Box::new(MovingAverageCrossoverSignal),
        sizer: Box::new(aegis_core::sizing::DefaultPositionSizer),
        gateway,
    };

    let engine_config = build_engine_config(&config, args.strategy_name.clone(), args.variant.clone());
    let mut engine = StrategyEngine::new(engine_config, services, &args.seed_symbol);

    match repository.load(&args.strategy_name).await {
        Ok(LoadOutcome::Loaded(snapshot)) => {
            info!(schema_version = snapshot.schema_version, "restored strategy state from the last saved snapshot");
            engine.restore_from_snapshot(snapshot);
        }
        Ok(LoadOutcome::NotFound(_)) => {
            info!("no saved snapshot found; starting with empty state");
        }
        Err(err) => {
            // CorruptionError (or any other repository failure reading the archive) is fail-fast
            // per SPEC_FULL §7/S6 — the supervisor does not auto-recover a corrupted snapshot.
            return Err(err).context("failed to load strategy state snapshot");
        }
    }

    run_event_loop(
        &mut engine,
        &repository,
        &args.strategy_name,
        config.database.keep_days,
        Duration::from_secs(args.auto_save_interval_secs),
    )
    .await;

    info!("worker shutting down");
    Ok(())
}

/// The worker's single cooperative loop: a ≥1 Hz timeout sweep (SPEC_FULL §5), a gateway poll,
/// and the auto-save cadence, all driven from one `tokio::select!` until SIGINT arrives.
async fn run_event_loop(
    engine: &mut StrategyEngine,
    repository: &StateRepository,
    strategy_name: &str,
    keep_days: u32,
    auto_save_interval: Duration,
) {
    let mut timeout_tick = tokio::time::interval(Duration::from_millis(500));
    let mut gateway_poll = tokio::time::interval(Duration::from_millis(200));
    let mut auto_save_tick = tokio::time::interval(auto_save_interval);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("received shutdown signal");
                break;
            }
            _ = timeout_tick.tick() => {
                engine.on_timeout_tick(chrono::Utc::now());
            }
            _ = gateway_poll.tick() => {
                engine.poll_gateway();
            }
            _ = auto_save_tick.tick() => {
                engine.auto_save(repository).await;
            }
        }
    }

    engine.auto_save(repository).await;
    if let Err(err) = repository.cleanup(strategy_name, i64::from(keep_days)).await {
        error!(error = %err, "final cleanup pass failed (non-fatal)");
    }
}
