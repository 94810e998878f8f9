//! Supervisor process (C20): keeps the `worker` binary alive, backing off restarts after a crash
//! and gating whether it should be running at all against configured trading sessions.
//!
//! Grounded on `bog-bins/src/common.rs`'s CLI/logging bootstrap (shared via [`aegis_runtime::common`])
//! and SPEC_FULL §6: "daemon mode forks the worker, restarts it on exit with the documented
//! backoff sequence, resets the backoff after an hour of continuous uptime, and respects
//! configured trading sessions." `standalone` mode is the degenerate, non-respawning case used for
//! manual runs and CI smoke tests — it execs the worker once and propagates its exit code.

use std::process::Stdio;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::process::{Child, Command};
use tracing::{error, info, warn};

use aegis_core::config::Config;
use aegis_core::resilience::backoff::{BackoffConfig, ExponentialBackoff};
use aegis_runtime::common::{init_logging, CommonArgs};
use aegis_runtime::session;
use aegis_runtime::worker_runtime::{self, WorkerArgs};

#[derive(Parser, Debug)]
#[command(author, version, about = "Aegis strategy supervisor")]
struct Args {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Mode {
    /// Runs the worker once, in the foreground, with no restart loop.
    Standalone,
    /// Runs the worker under supervision: backoff-restart on crash, session-gated start/stop.
    Daemon,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.common.log_level, args.common.json_logs)?;

    let config = Config::from_toml_file(&args.common.config).context("failed to load configuration")?;

    match args.mode {
        Mode::Standalone => run_standalone(&args.common).await,
        Mode::Daemon => run_daemon(&args.common, &config).await,
    }
}

fn worker_command(common: &CommonArgs) -> Command {
    let mut cmd = Command::new(std::env::current_exe().ok().and_then(|p| p.parent().map(|d| d.join("worker"))).unwrap_or_else(|| "worker".into()));
    cmd.arg("--config").arg(&common.config);
    cmd.arg("--strategy-name").arg(&common.strategy_name);
    cmd.arg("--variant").arg(&common.variant);
    cmd.arg("--log-level").arg(&common.log_level);
    if common.json_logs {
        cmd.arg("--json-logs");
    }
    cmd.stdin(Stdio::null());
    cmd
}

/// Runs the worker's bootstrap-and-event-loop in this same process — no child, no supervision
/// loop. SPEC_FULL §6 describes `standalone` as the single-process mode, in contrast to
/// `daemon`'s parent+child split below.
async fn run_standalone(common: &CommonArgs) -> Result<()> {
    info!("starting worker in standalone mode");
    worker_runtime::run(WorkerArgs {
        config_path: common.config.clone(),
        strategy_name: common.strategy_name.clone(),
        variant: common.variant.clone(),
        seed_symbol: "rb2505.SHFE".to_string(),
        auto_save_interval_secs: 30,
    })
    .await
}

/// Supervises the worker under the documented restart policy. Runs until SIGINT/SIGTERM, at
/// which point the child is asked to exit and the supervisor follows it down.
async fn run_daemon(common: &CommonArgs, config: &Config) -> Result<()> {
    let backoff_config = BackoffConfig {
        initial_delay: Duration::from_secs(config.supervisor.initial_backoff_secs),
        max_delay: Duration::from_secs(config.supervisor.max_backoff_secs),
        multiplier: 2.0,
        max_retries: Some(config.supervisor.max_consecutive_restarts as usize),
        jitter_factor: 0.0,
    };
    let mut backoff = ExponentialBackoff::with_config(backoff_config);
    let stable_uptime = Duration::from_secs(config.supervisor.stable_uptime_secs);

    let mut child: Option<Child> = None;
    let mut started_at: Option<Instant> = None;
    let mut session_poll = tokio::time::interval(Duration::from_secs(5));
    let mut shutdown = build_shutdown_signal();

    loop {
        let in_session = session::is_now_in_session(chrono::Utc::now(), &config.supervisor.sessions);

        tokio::select! {
            biased;

            _ = shutdown.recv() => {
                info!("supervisor received shutdown signal");
                stop_child(&mut child).await;
                return Ok(());
            }

            _ = session_poll.tick() => {
                if !in_session {
                    if child.is_some() {
                        info!("trading session ended; stopping worker");
                        stop_child(&mut child).await;
                        started_at = None;
                    }
                    continue;
                }

                if child.is_none() {
                    if let Some(spawned) = spawn_child(common, &mut backoff).await {
                        child = Some(spawned);
                        started_at = Some(Instant::now());
                    }
                }
            }

            status = wait_on_child(&mut child), if child.is_some() => {
                let uptime = started_at.take().map(|t| t.elapsed()).unwrap_or_default();
                match status {
                    Ok(status) if status.success() => {
                        info!(?uptime, "worker exited cleanly; not restarting automatically");
                        return Ok(());
                    }
                    Ok(status) => {
                        warn!(?uptime, %status, "worker exited with a failure");
                    }
                    Err(err) => {
                        error!(error = %err, "failed to wait on worker process");
                    }
                }

                if uptime >= stable_uptime {
                    info!(?uptime, "worker ran long enough to be considered stable; resetting backoff");
                    backoff.reset();
                }

                match backoff.next_delay() {
                    Some(delay) => {
                        warn!(attempt = backoff.attempt_number(), delay_secs = delay.as_secs(), "restarting worker after backoff");
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        error!(max_restarts = config.supervisor.max_consecutive_restarts, "exhausted consecutive restart budget; giving up");
                        anyhow::bail!("worker crashed too many times in a row");
                    }
                }
            }
        }
    }
}

async fn spawn_child(common: &CommonArgs, backoff: &mut ExponentialBackoff) -> Option<Child> {
    match worker_command(common).spawn() {
        Ok(child) => {
            info!("spawned worker process");
            Some(child)
        }
        Err(err) => {
            error!(error = %err, "failed to spawn worker process");
            let _ = backoff.next_delay();
            None
        }
    }
}

async fn wait_on_child(child: &mut Option<Child>) -> std::io::Result<std::process::ExitStatus> {
    match child.as_mut() {
        Some(c) => {
            let status = c.wait().await;
            *child = None;
            status
        }
        None => std::future::pending().await,
    }
}

async fn stop_child(child: &mut Option<Child>) {
    if let Some(mut c) = child.take() {
        if let Err(err) = c.start_kill() {
            warn!(error = %err, "failed to signal worker process to stop");
        }
        let _ = c.wait().await;
    }
}

/// A channel that fires once on Ctrl-C (via the `ctrlc` crate)
/// and, on Unix, once on SIGTERM — the signal a process manager sends to ask this to stop.
fn build_shutdown_signal() -> tokio::sync::mpsc::Receiver<()> {
    let (tx, rx) = tokio::sync::mpsc::channel(1);

    let ctrlc_tx = tx.clone();
    if let Err(err) = ctrlc::set_handler(move || {
        let _ = ctrlc_tx.blocking_send(());
    }) {
        error!(error = %err, "failed to install Ctrl-C handler");
    }

    #[cfg(unix)]
    {
        tokio::spawn(async move {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut term) => {
                    term.recv().await;
                    let _ = tx.send(()).await;
                }
                Err(err) => {
                    error!(error = %err, "failed to install SIGTERM handler");
                }
            }
        });
    }

    rx
}
