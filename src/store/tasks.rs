// src/store/tasks.rs

//! Eligibility queries and outcome recording.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, trace, warn};

use crate::engine::{Eligibility, EligibilityPolicy};
use crate::types::TaskStatus;

use super::routes::{find_route, load_tasks};
use super::{StoreError, StoreResult, Task, TaskStore, TaskUpdate};

impl TaskStore {
    /// Tasks of `route_id` that may run now, in route order.
    pub async fn get_tasks_to_run(
        &self,
        route_id: &str,
        policy: &EligibilityPolicy,
    ) -> StoreResult<Vec<Task>> {
        self.get_tasks_to_run_at(route_id, policy, Utc::now()).await
    }

    /// Same as [`get_tasks_to_run`](Self::get_tasks_to_run) at an explicit
    /// point in time.
    ///
    /// A task is returned when the policy admits it and every task it
    /// depends on has succeeded. Fails with `RouteNotFound` when the route
    /// has not been created yet.
    pub async fn get_tasks_to_run_at(
        &self,
        route_id: &str,
        policy: &EligibilityPolicy,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<Task>> {
        let route_id = route_id.to_string();
        let policy = policy.clone();
        self.with_connection(move |conn| select_runnable(conn, &route_id, &policy, now))
            .await
    }

    /// Record one outcome in its own transaction.
    ///
    /// Returns `false` (after a warning) when the task no longer exists.
    pub async fn update_task_status(
        &self,
        task_id: i64,
        status: TaskStatus,
        result: Option<String>,
        error: Option<String>,
    ) -> StoreResult<bool> {
        self.update_task_status_at(task_id, status, result, error, Utc::now())
            .await
    }

    pub async fn update_task_status_at(
        &self,
        task_id: i64,
        status: TaskStatus,
        result: Option<String>,
        error: Option<String>,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let update = TaskUpdate {
            task_id,
            status,
            result,
            error,
        };
        let stale_after = self.stale_failure_window();
        self.transaction(move |tx| apply_task_update(tx, &update, now, stale_after))
            .await
    }

    /// Record several outcomes in one transaction; either all are written
    /// or none. Returns how many tasks existed and were updated.
    pub async fn update_task_statuses(&self, updates: &[TaskUpdate]) -> StoreResult<usize> {
        self.update_task_statuses_at(updates, Utc::now()).await
    }

    pub async fn update_task_statuses_at(
        &self,
        updates: &[TaskUpdate],
        now: DateTime<Utc>,
    ) -> StoreResult<usize> {
        let updates = updates.to_vec();
        let stale_after = self.stale_failure_window();
        self.transaction(move |tx| {
            let mut applied = 0;
            for update in &updates {
                if apply_task_update(tx, update, now, stale_after)? {
                    applied += 1;
                }
            }
            Ok(applied)
        })
        .await
    }
}

/// Write one outcome using `conn`, which may be a caller's transaction.
///
/// `error_count` becomes 0 on success. On failure it is incremented, or
/// restarted at 1 when the previous run is older than `stale_after`.
/// `last_executed` is set to `now` either way.
pub fn apply_task_update(
    conn: &Connection,
    update: &TaskUpdate,
    now: DateTime<Utc>,
    stale_after: Duration,
) -> StoreResult<bool> {
    let previous: Option<(u32, Option<DateTime<Utc>>)> = conn
        .query_row(
            "SELECT error_count, last_executed FROM tasks WHERE id = ?1",
            [update.task_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    let Some((error_count, last_executed)) = previous else {
        warn!(task_id = update.task_id, "task not found; status update skipped");
        return Ok(false);
    };

    let error_count = match update.status {
        TaskStatus::Failed => match last_executed {
            Some(last) if now - last >= stale_after => 1,
            _ => error_count.saturating_add(1),
        },
        TaskStatus::Success | TaskStatus::Pending => 0,
    };

    conn.execute(
        "UPDATE tasks
         SET status = ?1, result = ?2, error_message = ?3,
             error_count = ?4, last_executed = ?5
         WHERE id = ?6",
        params![
            update.status,
            update.result,
            update.error,
            error_count,
            now,
            update.task_id
        ],
    )?;

    trace!(
        task_id = update.task_id,
        status = %update.status,
        error_count,
        "task status updated"
    );
    Ok(true)
}

fn select_runnable(
    conn: &Connection,
    route_id: &str,
    policy: &EligibilityPolicy,
    now: DateTime<Utc>,
) -> StoreResult<Vec<Task>> {
    if find_route(conn, route_id)?.is_none() {
        return Err(StoreError::RouteNotFound(route_id.to_string()));
    }

    let tasks = load_tasks(conn, route_id)?;
    let dependencies = load_dependency_states(conn, route_id)?;

    let mut scheduled: HashSet<String> = HashSet::new();
    let mut runnable = Vec::new();

    for task in tasks {
        let eligibility = policy.evaluate(&task, now);
        if !eligibility.is_eligible() {
            log_excluded(&task, &eligibility, now);
            continue;
        }

        let unmet: Vec<&str> = dependencies
            .get(&task.id)
            .map(|deps| {
                deps.iter()
                    .filter(|(_, status)| *status != TaskStatus::Success)
                    .map(|(module, _)| module.as_str())
                    .collect()
            })
            .unwrap_or_default();
        if !unmet.is_empty() {
            debug!(
                route_id,
                module = %task.module_name,
                waiting_for = ?unmet,
                "task waiting for dependencies"
            );
            continue;
        }

        if scheduled.insert(task.module_name.clone()) {
            trace!(route_id, module = %task.module_name, ?eligibility, "task eligible");
            runnable.push(task);
        }
    }

    debug!(
        route_id,
        modules = ?runnable.iter().map(|t| t.module_name.as_str()).collect::<Vec<_>>(),
        "tasks to run"
    );
    Ok(runnable)
}

/// `task_id -> [(dependency module, dependency status)]` for one route.
fn load_dependency_states(
    conn: &Connection,
    route_id: &str,
) -> StoreResult<HashMap<i64, Vec<(String, TaskStatus)>>> {
    let mut stmt = conn.prepare(
        "SELECT d.task_id, dep.module_name, dep.status
         FROM task_dependencies d
         JOIN tasks t ON t.id = d.task_id
         JOIN tasks dep ON dep.id = d.dependency_id
         WHERE t.route_id = ?1",
    )?;
    let rows = stmt.query_map([route_id], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, TaskStatus>(2)?,
        ))
    })?;

    let mut states: HashMap<i64, Vec<(String, TaskStatus)>> = HashMap::new();
    for row in rows {
        let (task_id, module, status) = row?;
        states.entry(task_id).or_default().push((module, status));
    }
    Ok(states)
}

fn log_excluded(task: &Task, eligibility: &Eligibility, now: DateTime<Utc>) {
    match eligibility {
        Eligibility::Exhausted { retry_at } => {
            let wait = *retry_at - now;
            warn!(
                module = %task.module_name,
                route_id = %task.route_id,
                error_count = task.error_count,
                "exhausted attempts; retry in {}h {}m",
                wait.num_hours(),
                wait.num_minutes() % 60
            );
        }
        Eligibility::CoolingDown { remaining } => {
            debug!(
                module = %task.module_name,
                route_id = %task.route_id,
                "available in {} hours {} minutes",
                remaining.num_hours(),
                remaining.num_minutes() % 60
            );
        }
        _ => {
            trace!(module = %task.module_name, route_id = %task.route_id, ?eligibility, "task not eligible");
        }
    }
}
