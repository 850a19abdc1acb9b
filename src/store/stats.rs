// src/store/stats.rs

//! Read-only reporting over the task tables.
//!
//! These queries are best effort: on a database whose schema was never
//! created they fail with [`StoreError::NotInitialized`] so the caller can
//! print a hint instead of an SQLite error.

use std::collections::BTreeMap;

use rusqlite::{params, Connection};
use tracing::{debug, info};

use crate::types::{RouteStatus, TaskStatus};

use super::models::percentage;
use super::routes::{find_route, load_tasks};
use super::{
    AccountStatistics, ModuleFailureStat, OutstandingTask, RouteBreakdown, RouteStats,
    StoreError, StoreResult, SummaryStatistics, TaskStore,
};

const ROUTE_COUNTS: &str = "
SELECT r.id AS route_id,
       r.status AS status,
       COUNT(t.id) AS total_tasks,
       COALESCE(SUM(CASE WHEN t.status = 'success' THEN 1 ELSE 0 END), 0) AS success_tasks,
       COALESCE(SUM(CASE WHEN t.status = 'failed' THEN 1 ELSE 0 END), 0) AS failed_tasks,
       COALESCE(SUM(CASE WHEN t.status = 'pending' THEN 1 ELSE 0 END), 0) AS pending_tasks
FROM routes r
LEFT JOIN tasks t ON t.route_id = r.id";

impl TaskStore {
    /// Task counts of every route.
    pub async fn route_stats(&self) -> StoreResult<Vec<RouteStats>> {
        self.with_connection(|conn| {
            let sql = format!("{ROUTE_COUNTS} GROUP BY r.id ORDER BY r.id DESC");
            let mut stmt = conn.prepare(&sql)?;
            let stats = stmt
                .query_map([], route_stats_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(stats)
        })
        .await
    }

    /// Counts plus every task row of one route.
    pub async fn route_breakdown(&self, route_id: &str) -> StoreResult<RouteBreakdown> {
        let route_id = route_id.to_string();
        self.with_connection(move |conn| {
            if find_route(conn, &route_id)?.is_none() {
                return Err(StoreError::RouteNotFound(route_id));
            }
            let stats = counts_for_route(conn, &route_id)?;
            let tasks = load_tasks(conn, &route_id)?;
            Ok(RouteBreakdown { stats, tasks })
        })
        .await
    }

    /// Modules currently failed on at least one account, most failures first.
    pub async fn module_failures(&self) -> StoreResult<Vec<ModuleFailureStat>> {
        self.with_connection(|conn| module_failures(conn)).await
    }

    /// Per-account completion plus the global summary.
    ///
    /// Accounts are ordered by completion percentage, highest first.
    pub async fn account_statistics(
        &self,
    ) -> StoreResult<(Vec<AccountStatistics>, SummaryStatistics)> {
        self.with_connection(|conn| {
            let accounts = account_rows(conn)?;
            let error_modules = module_failures(conn)?;

            let total: u64 = accounts.iter().map(|a| a.total_tasks).sum();
            let completed: u64 = accounts.iter().map(|a| a.completed_tasks).sum();
            let failed: u64 = accounts.iter().map(|a| a.failed_tasks).sum();
            let pending: u64 = accounts.iter().map(|a| a.pending_tasks).sum();

            let summary = SummaryStatistics {
                total_accounts: accounts.len() as u64,
                success_percentage: percentage(completed, total),
                failed_percentage: percentage(failed, total),
                pending_percentage: percentage(pending, total),
                error_modules,
            };
            Ok((accounts, summary))
        })
        .await
    }

    /// Recompute a route's counts and set its status: `completed` once
    /// every task succeeded, `pending` otherwise.
    pub async fn refresh_route_status(&self, route_id: &str) -> StoreResult<RouteStats> {
        let route_id = route_id.to_string();
        self.transaction(move |tx| {
            if find_route(tx, &route_id)?.is_none() {
                return Err(StoreError::RouteNotFound(route_id));
            }
            let mut stats = counts_for_route(tx, &route_id)?;
            let status = if stats.total_tasks > 0 && stats.success_tasks == stats.total_tasks {
                RouteStatus::Completed
            } else {
                RouteStatus::Pending
            };

            if status != stats.status {
                tx.execute(
                    "UPDATE routes SET status = ?1 WHERE id = ?2",
                    params![status, route_id],
                )?;
                if status == RouteStatus::Completed {
                    info!(route_id = %route_id, "route completed");
                } else {
                    debug!(route_id = %route_id, status = %status, "route status updated");
                }
                stats.status = status;
            }
            Ok(stats)
        })
        .await
    }
}

fn route_stats_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RouteStats> {
    Ok(RouteStats {
        route_id: row.get("route_id")?,
        status: row.get("status")?,
        total_tasks: row.get("total_tasks")?,
        success_tasks: row.get("success_tasks")?,
        failed_tasks: row.get("failed_tasks")?,
        pending_tasks: row.get("pending_tasks")?,
    })
}

fn counts_for_route(conn: &Connection, route_id: &str) -> StoreResult<RouteStats> {
    let sql = format!("{ROUTE_COUNTS} WHERE r.id = ?1 GROUP BY r.id");
    Ok(conn.query_row(&sql, [route_id], route_stats_from_row)?)
}

fn module_failures(conn: &Connection) -> StoreResult<Vec<ModuleFailureStat>> {
    let mut stmt = conn.prepare(
        "SELECT t.module_name, a.address
         FROM tasks t
         JOIN routes r ON r.id = t.route_id
         JOIN accounts a ON a.id = r.account_id
         WHERE t.status = 'failed'
         ORDER BY t.module_name, a.address",
    )?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;

    let mut by_module: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for row in rows {
        let (module, address) = row?;
        by_module.entry(module).or_default().push(address);
    }

    let mut stats: Vec<ModuleFailureStat> = by_module
        .into_iter()
        .map(|(module_name, accounts_affected)| ModuleFailureStat {
            module_name,
            failed_count: accounts_affected.len() as u64,
            accounts_affected,
        })
        .collect();
    // Stable sort keeps alphabetical order among equal counts.
    stats.sort_by(|a, b| b.failed_count.cmp(&a.failed_count));
    Ok(stats)
}

fn account_rows(conn: &Connection) -> StoreResult<Vec<AccountStatistics>> {
    let mut stmt = conn.prepare(
        "SELECT a.address, t.module_name, t.status, t.error_message
         FROM accounts a
         LEFT JOIN routes r ON r.account_id = a.id
         LEFT JOIN tasks t ON t.route_id = r.id
         ORDER BY a.id, t.order_num, t.id",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, Option<String>>(1)?,
            row.get::<_, Option<TaskStatus>>(2)?,
            row.get::<_, Option<String>>(3)?,
        ))
    })?;

    let mut accounts: Vec<AccountStatistics> = Vec::new();
    for row in rows {
        let (address, module, status, error_message) = row?;
        if accounts.last().map(|a| a.address != address).unwrap_or(true) {
            accounts.push(AccountStatistics {
                address,
                total_tasks: 0,
                completed_tasks: 0,
                failed_tasks: 0,
                pending_tasks: 0,
                percentage_completed: 0.0,
                outstanding: Vec::new(),
            });
        }
        let (Some(module_name), Some(status)) = (module, status) else {
            continue;
        };
        let Some(account) = accounts.last_mut() else {
            continue;
        };

        account.total_tasks += 1;
        match status {
            TaskStatus::Success => account.completed_tasks += 1,
            TaskStatus::Failed => account.failed_tasks += 1,
            TaskStatus::Pending => account.pending_tasks += 1,
        }
        if status != TaskStatus::Success {
            account.outstanding.push(OutstandingTask {
                module_name,
                status,
                error_message,
            });
        }
    }

    for account in accounts.iter_mut() {
        account.percentage_completed = percentage(account.completed_tasks, account.total_tasks);
    }
    accounts.sort_by(|a, b| b.percentage_completed.total_cmp(&a.percentage_completed));
    Ok(accounts)
}
