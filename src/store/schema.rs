// src/store/schema.rs

use rusqlite::{Connection, OptionalExtension};
use tracing::info;

use super::{StoreResult, TaskStore};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS accounts (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    private_key TEXT NOT NULL UNIQUE,
    address     TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS routes (
    id         TEXT PRIMARY KEY,
    account_id INTEGER NOT NULL REFERENCES accounts(id),
    status     TEXT NOT NULL DEFAULT 'pending'
);

CREATE TABLE IF NOT EXISTS tasks (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    route_id      TEXT NOT NULL REFERENCES routes(id),
    module_name   TEXT NOT NULL,
    order_num     INTEGER NOT NULL,
    status        TEXT NOT NULL DEFAULT 'pending',
    error_count   INTEGER NOT NULL DEFAULT 0,
    last_executed TEXT,
    result        TEXT,
    error_message TEXT,
    UNIQUE (route_id, module_name)
);

CREATE TABLE IF NOT EXISTS task_dependencies (
    task_id       INTEGER NOT NULL REFERENCES tasks(id),
    dependency_id INTEGER NOT NULL REFERENCES tasks(id),
    PRIMARY KEY (task_id, dependency_id)
);

CREATE INDEX IF NOT EXISTS idx_tasks_route ON tasks(route_id);
CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status);
CREATE INDEX IF NOT EXISTS idx_tasks_route_status ON tasks(route_id, status);
CREATE INDEX IF NOT EXISTS idx_tasks_module_status ON tasks(module_name, status);
CREATE INDEX IF NOT EXISTS idx_tasks_last_executed ON tasks(last_executed);
";

const TABLES: [&str; 4] = ["accounts", "routes", "tasks", "task_dependencies"];

impl TaskStore {
    /// Create the tables and indexes if they do not exist yet.
    pub async fn init_schema(&self) -> StoreResult<()> {
        self.transaction(|tx| {
            tx.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;
        info!("task store schema ready");
        Ok(())
    }

    /// Whether every table of the schema exists.
    pub async fn is_initialized(&self) -> StoreResult<bool> {
        self.with_connection(|conn| tables_present(conn)).await
    }
}

fn tables_present(conn: &Connection) -> StoreResult<bool> {
    for table in TABLES {
        let found: Option<String> = conn
            .query_row(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [table],
                |row| row.get(0),
            )
            .optional()?;
        if found.is_none() {
            return Ok(false);
        }
    }
    Ok(true)
}
