//! Worker binary (C21): CLI entry point over [`aegis_runtime::worker_runtime::run`].
//!
//! Grounded on `bog-bins/src/bin/inventory_live.rs`'s binary shape (parse CLI, init logging, hand
//! off to the engine) — the bootstrap-and-event-loop logic itself lives in the library so the
//! supervisor's `standalone` mode can run it without spawning a second process.

use anyhow::Result;
use clap::Parser;

use aegis_runtime::common::{init_logging, CommonArgs};
use aegis_runtime::worker_runtime::{self, WorkerArgs};

#[derive(Parser, Debug)]
#[command(author, version, about = "Aegis strategy worker")]
struct Args {
    #[command(flatten)]
    common: CommonArgs,

    /// Seed instrument to bootstrap the instrument aggregate with before the first bar arrives.
    #[arg(long, default_value = "rb2505.SHFE")]
    seed_symbol: String,

    /// How often (seconds) to persist a snapshot of the running strategy state.
    #[arg(long, default_value_t = 30)]
    auto_save_interval_secs: u64,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.common.log_level, args.common.json_logs)?;

    worker_runtime::run(WorkerArgs {
        config_path: args.common.config,
        strategy_name: args.common.strategy_name,
        variant: args.common.variant,
        seed_symbol: args.seed_symbol,
        auto_save_interval_secs: args.auto_save_interval_secs,
    })
    .await
}
