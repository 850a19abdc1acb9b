// src/store/models.rs

//! Row types and reporting views of the task store.

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::Row;

use crate::account::normalize_private_key;
use crate::types::{ModuleName, RouteStatus, TaskOutcome, TaskStatus};

/// Input of the account sync step: only the key is authoritative.
///
/// `new` stores the key in canonical form (see [`normalize_private_key`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountSeed {
    pub private_key: String,
}

impl AccountSeed {
    pub fn new(private_key: impl Into<String>) -> Self {
        Self {
            private_key: normalize_private_key(&private_key.into()),
        }
    }
}

/// Persisted account. `address` is a cache of the key's derived address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: i64,
    pub private_key: String,
    pub address: String,
}

impl Account {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            private_key: row.get("private_key")?,
            address: row.get("address")?,
        })
    }

    /// Route id used for this account (routes are keyed by address).
    pub fn route_id(&self) -> &str {
        &self.address
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub id: String,
    pub account_id: i64,
    pub status: RouteStatus,
}

/// One `(account, module)` execution record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub id: i64,
    pub route_id: String,
    pub module_name: ModuleName,
    pub order_num: i64,
    pub status: TaskStatus,
    pub error_count: u32,
    pub last_executed: Option<DateTime<Utc>>,
    pub result: Option<String>,
    pub error_message: Option<String>,
}

impl Task {
    pub(crate) const COLUMNS: &'static str = "id, route_id, module_name, order_num, status, \
         error_count, last_executed, result, error_message";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            route_id: row.get("route_id")?,
            module_name: row.get("module_name")?,
            order_num: row.get("order_num")?,
            status: row.get("status")?,
            error_count: row.get::<_, Option<u32>>("error_count")?.unwrap_or(0),
            last_executed: row.get("last_executed")?,
            result: row.get("result")?,
            error_message: row.get("error_message")?,
        })
    }
}

/// A status change to persist for one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskUpdate {
    pub task_id: i64,
    pub status: TaskStatus,
    pub result: Option<String>,
    pub error: Option<String>,
}

impl TaskUpdate {
    /// Build the update that records `outcome`: success messages go to
    /// `result`, failure messages to `error`.
    pub fn from_outcome(task_id: i64, outcome: &TaskOutcome) -> Self {
        match outcome {
            TaskOutcome::Success(msg) => Self {
                task_id,
                status: TaskStatus::Success,
                result: Some(msg.clone()),
                error: None,
            },
            TaskOutcome::Failed(msg) => Self {
                task_id,
                status: TaskStatus::Failed,
                result: None,
                error: Some(msg.clone()),
            },
        }
    }
}

/// Aggregate task counts of one route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteStats {
    pub route_id: String,
    pub status: RouteStatus,
    pub total_tasks: u64,
    pub success_tasks: u64,
    pub failed_tasks: u64,
    pub pending_tasks: u64,
}

impl RouteStats {
    pub fn completion_percentage(&self) -> f64 {
        percentage(self.success_tasks, self.total_tasks)
    }
}

/// Route counts plus every task row, in route order.
#[derive(Debug, Clone)]
pub struct RouteBreakdown {
    pub stats: RouteStats,
    pub tasks: Vec<Task>,
}

/// A task of an account that has not succeeded yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutstandingTask {
    pub module_name: ModuleName,
    pub status: TaskStatus,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AccountStatistics {
    pub address: String,
    pub total_tasks: u64,
    pub completed_tasks: u64,
    pub failed_tasks: u64,
    pub pending_tasks: u64,
    pub percentage_completed: f64,
    pub outstanding: Vec<OutstandingTask>,
}

/// How many accounts currently have `module_name` in `failed` state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleFailureStat {
    pub module_name: ModuleName,
    pub failed_count: u64,
    pub accounts_affected: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SummaryStatistics {
    pub total_accounts: u64,
    pub success_percentage: f64,
    pub failed_percentage: f64,
    pub pending_percentage: f64,
    pub error_modules: Vec<ModuleFailureStat>,
}

pub(crate) fn percentage(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

impl ToSql for TaskStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

impl FromSql for TaskStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

impl ToSql for RouteStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

impl FromSql for RouteStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: String| FromSqlError::Other(e.into()))
    }
}
