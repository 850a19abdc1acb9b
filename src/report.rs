// src/report.rs

//! Plain-text reports printed by the `plan`, `routes` and `stats` commands.

use crate::config::ConfigFile;
use crate::dag::compile_levels;
use crate::errors::Result;
use crate::store::{OutstandingTask, StoreResult, TaskStore};
use crate::types::TaskStatus;

pub fn print_plan(cfg: &ConfigFile) -> Result<()> {
    let graph = cfg.module_graph();
    let levels = compile_levels(graph.catalogue(), graph.dependency_map())?;

    println!("routeweave plan");
    println!("  threads = {}", cfg.engine.threads);
    println!("  max_attempts = {}", cfg.engine.max_attempts);
    println!("  shuffle = {}", cfg.engine.shuffle);
    if !cfg.always_run.is_empty() {
        println!("  always_run = {:?}", cfg.always_run);
    }
    if !cfg.critical.is_empty() {
        println!("  critical = {:?}", cfg.critical);
    }
    println!();

    for (index, level) in levels.iter().enumerate() {
        println!("level {index}:");
        for module in level {
            println!("  - {module}");
            let deps = graph.active_dependencies_of(module);
            if !deps.is_empty() {
                println!("      after: {deps:?}");
            }
        }
    }

    for (module, dep) in graph.dangling_dependencies() {
        println!("note: '{module}' depends on '{dep}', which is not configured");
    }
    Ok(())
}

pub async fn print_routes(store: &TaskStore) -> StoreResult<()> {
    let routes = store.route_stats().await?;
    if routes.is_empty() {
        println!("no routes yet");
        return Ok(());
    }

    for stats in routes {
        println!(
            "{} [{}] {}/{} done ({:.1}%), {} failed, {} pending",
            stats.route_id,
            stats.status,
            stats.success_tasks,
            stats.total_tasks,
            stats.completion_percentage(),
            stats.failed_tasks,
            stats.pending_tasks
        );
        let breakdown = store.route_breakdown(&stats.route_id).await?;
        for task in breakdown.tasks {
            let last = task
                .last_executed
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "never".to_string());
            print!(
                "    {:>3}. {:<28} {:<8} errors={} last={}",
                task.order_num, task.module_name, task.status, task.error_count, last
            );
            match task.error_message {
                Some(msg) if task.status == TaskStatus::Failed => println!(" error={msg}"),
                _ => println!(),
            }
        }
    }
    Ok(())
}

pub async fn print_stats(store: &TaskStore) -> StoreResult<()> {
    let (accounts, summary) = store.account_statistics().await?;

    for account in &accounts {
        println!(
            "{}: {:.1}% ({} ok, {} failed, {} pending)",
            account.address,
            account.percentage_completed,
            account.completed_tasks,
            account.failed_tasks,
            account.pending_tasks
        );
        if !account.outstanding.is_empty() {
            let labels: Vec<String> = account.outstanding.iter().map(outstanding_label).collect();
            println!("    outstanding: {}", labels.join(", "));
        }
    }

    println!();
    println!("accounts: {}", summary.total_accounts);
    println!("success:  {:.1}%", summary.success_percentage);
    println!("failed:   {:.1}%", summary.failed_percentage);
    println!("pending:  {:.1}%", summary.pending_percentage);
    if !summary.error_modules.is_empty() {
        println!("failing modules:");
        for stat in &summary.error_modules {
            println!("  {} ({} accounts)", stat.module_name, stat.failed_count);
        }
    }
    Ok(())
}

/// `module`, `module(error message)` or `module(error)`.
pub fn outstanding_label(task: &OutstandingTask) -> String {
    match (&task.status, &task.error_message) {
        (TaskStatus::Failed, Some(msg)) if !msg.is_empty() => format!("{}({msg})", task.module_name),
        (TaskStatus::Failed, _) => format!("{}(error)", task.module_name),
        _ => task.module_name.clone(),
    }
}
