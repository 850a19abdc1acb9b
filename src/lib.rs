// src/lib.rs

pub mod account;
pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod report;
pub mod store;
pub mod types;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::account::load_account_seeds;
use crate::cli::{CliArgs, Command};
use crate::config::{load_and_validate, ConfigFile};
use crate::engine::Executor;
use crate::store::{Account, StoreError, TaskStore};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - the task store and account sync
/// - route generation and the executor
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = load_and_validate(&args.config)
        .with_context(|| format!("loading config {}", args.config))?;

    match args.command {
        Command::Plan => {
            report::print_plan(&cfg)?;
            Ok(())
        }
        Command::Generate => generate(&cfg).await,
        Command::Run { once, max_passes } => {
            let max_passes = if once { Some(1) } else { max_passes };
            execute(&cfg, max_passes).await
        }
        Command::Routes => reporting(&cfg, ReportKind::Routes).await,
        Command::Stats => reporting(&cfg, ReportKind::Stats).await,
    }
}

/// Open the store, create the schema and sync the accounts file.
async fn prepare(cfg: &ConfigFile) -> Result<(TaskStore, Vec<Account>)> {
    let store = TaskStore::open(cfg.store_config())?;
    store.init_schema().await?;

    let seeds = load_account_seeds(&cfg.engine.accounts)?;
    if seeds.is_empty() {
        warn!(path = %cfg.engine.accounts.display(), "accounts file has no keys");
    }
    let accounts = store.sync_accounts(&seeds).await?;
    Ok((store, accounts))
}

fn executor(cfg: &ConfigFile, store: TaskStore) -> Result<Executor> {
    let executor = Executor::new(
        store,
        cfg.task_registry(),
        cfg.module_graph(),
        cfg.scheduler_config(),
    );
    executor.validate()?;
    Ok(executor)
}

async fn generate(cfg: &ConfigFile) -> Result<()> {
    let (store, accounts) = prepare(cfg).await?;
    let executor = executor(cfg, store)?;

    let summary = executor.generate_routes(&accounts).await;
    println!(
        "routes ready: {} / {} accounts",
        summary.routes.len(),
        accounts.len()
    );
    for (address, reason) in &summary.failures {
        println!("  failed: {address}: {reason}");
    }
    Ok(())
}

async fn execute(cfg: &ConfigFile, max_passes: Option<usize>) -> Result<()> {
    let (store, accounts) = prepare(cfg).await?;
    let cancel = CancellationToken::new();
    let executor = executor(cfg, store.clone())?.with_cancellation(cancel.clone());

    // Ctrl-C stops new batches; accounts already running finish their pass.
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            eprintln!("failed to listen for Ctrl+C: {e}");
            return;
        }
        info!("interrupt received; finishing running accounts");
        cancel.cancel();
    });

    let passes = executor.run_until_quiescent(&accounts, max_passes).await;
    let executed: usize = passes.iter().map(|p| p.executed).sum();
    let failed: usize = passes.iter().map(|p| p.failed).sum();
    info!(passes = passes.len(), executed, failed, "run finished");

    store.close();
    Ok(())
}

enum ReportKind {
    Routes,
    Stats,
}

async fn reporting(cfg: &ConfigFile, kind: ReportKind) -> Result<()> {
    let store = TaskStore::open(cfg.store_config())?;
    let result = match kind {
        ReportKind::Routes => report::print_routes(&store).await,
        ReportKind::Stats => report::print_stats(&store).await,
    };
    match result {
        Err(StoreError::NotInitialized(_)) => {
            println!("Database not initialized. Run `routeweave generate` first.");
            Ok(())
        }
        other => Ok(other?),
    }
}
