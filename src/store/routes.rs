// src/store/routes.rs

//! Route materialisation.
//!
//! A route is keyed by its account's address and holds one task row per
//! module. Re-creating a route only appends modules it does not have yet;
//! existing rows keep their status and error count. Dependency edges are
//! rebuilt from the module-level map on every call.

use std::collections::{BTreeSet, HashMap};

use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::dag::{dedup_preserving_order, DependencyMap};
use crate::types::{ModuleName, RouteStatus};

use super::{Route, StoreError, StoreResult, Task, TaskStore};

impl TaskStore {
    /// Create or extend the route of `account_id` and return its id.
    ///
    /// `modules` is the compiled order; always-run modules missing from it
    /// are appended. All writes happen in one transaction.
    pub async fn create_route(
        &self,
        account_id: i64,
        modules: &[ModuleName],
        dependencies: &DependencyMap,
        always_run: &BTreeSet<ModuleName>,
    ) -> StoreResult<String> {
        let wanted =
            dedup_preserving_order(modules.iter().cloned().chain(always_run.iter().cloned()));
        let dependencies = dependencies.clone();

        self.transaction(move |tx| materialise_route(tx, account_id, &wanted, &dependencies))
            .await
    }

    pub async fn route_exists(&self, route_id: &str) -> StoreResult<bool> {
        let route_id = route_id.to_string();
        self.with_connection(move |conn| Ok(find_route(conn, &route_id)?.is_some()))
            .await
    }

    pub async fn get_route(&self, route_id: &str) -> StoreResult<Route> {
        let route_id = route_id.to_string();
        self.with_connection(move |conn| {
            find_route(conn, &route_id)?.ok_or(StoreError::RouteNotFound(route_id))
        })
        .await
    }

    /// Every task of a route, in route order.
    pub async fn get_all_tasks(&self, route_id: &str) -> StoreResult<Vec<Task>> {
        let route_id = route_id.to_string();
        self.with_connection(move |conn| load_tasks(conn, &route_id)).await
    }
}

fn route_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Route> {
    Ok(Route {
        id: row.get("id")?,
        account_id: row.get("account_id")?,
        status: row.get("status")?,
    })
}

pub(crate) fn find_route(conn: &Connection, route_id: &str) -> StoreResult<Option<Route>> {
    Ok(conn
        .query_row(
            "SELECT id, account_id, status FROM routes WHERE id = ?1",
            [route_id],
            route_from_row,
        )
        .optional()?)
}

pub(crate) fn load_tasks(conn: &Connection, route_id: &str) -> StoreResult<Vec<Task>> {
    let sql = format!(
        "SELECT {} FROM tasks WHERE route_id = ?1 ORDER BY order_num, id",
        Task::COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let tasks = stmt
        .query_map([route_id], Task::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(tasks)
}

fn materialise_route(
    conn: &Connection,
    account_id: i64,
    modules: &[ModuleName],
    dependencies: &DependencyMap,
) -> StoreResult<String> {
    let address: String = conn
        .query_row(
            "SELECT address FROM accounts WHERE id = ?1",
            [account_id],
            |row| row.get(0),
        )
        .optional()?
        .ok_or_else(|| StoreError::InvalidData(format!("account id {account_id} not found")))?;
    let route_id = address;

    let existing = find_route(conn, &route_id)?;
    if existing.is_none() {
        conn.execute(
            "INSERT INTO routes (id, account_id, status) VALUES (?1, ?2, ?3)",
            params![route_id, account_id, RouteStatus::Pending],
        )?;
    }

    let mut task_ids: HashMap<ModuleName, i64> = HashMap::new();
    let mut next_order: i64 = 0;
    {
        let mut stmt =
            conn.prepare("SELECT id, module_name, order_num FROM tasks WHERE route_id = ?1")?;
        let rows = stmt.query_map([&route_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?;
        for row in rows {
            let (id, module, order_num) = row?;
            next_order = next_order.max(order_num + 1);
            task_ids.insert(module, id);
        }
    }

    let mut appended = Vec::new();
    {
        let mut insert = conn.prepare(
            "INSERT INTO tasks (route_id, module_name, order_num) VALUES (?1, ?2, ?3)",
        )?;
        for module in modules {
            if task_ids.contains_key(module) {
                continue;
            }
            insert.execute(params![route_id, module, next_order])?;
            task_ids.insert(module.clone(), conn.last_insert_rowid());
            appended.push(module.as_str());
            next_order += 1;
        }
    }

    if existing.is_some() && !appended.is_empty() {
        conn.execute(
            "UPDATE routes SET status = ?1 WHERE id = ?2",
            params![RouteStatus::Pending, route_id],
        )?;
    }

    conn.execute(
        "DELETE FROM task_dependencies
         WHERE task_id IN (SELECT id FROM tasks WHERE route_id = ?1)",
        [&route_id],
    )?;

    let mut edges = 0usize;
    {
        let mut insert = conn.prepare(
            "INSERT OR IGNORE INTO task_dependencies (task_id, dependency_id) VALUES (?1, ?2)",
        )?;
        for (module, deps) in dependencies {
            let Some(task_id) = task_ids.get(module) else {
                continue;
            };
            for dep in deps {
                if dep == module {
                    continue;
                }
                if let Some(dep_id) = task_ids.get(dep) {
                    edges += insert.execute(params![task_id, dep_id])?;
                }
            }
        }
    }

    if existing.is_some() {
        debug!(
            route_id = %route_id,
            appended = ?appended,
            edges,
            "route regenerated"
        );
    } else {
        info!(
            route_id = %route_id,
            tasks = task_ids.len(),
            edges,
            "route created"
        );
    }

    Ok(route_id)
}
