// src/store/mod.rs

//! Durable state for accounts, routes and tasks.
//!
//! The store owns an `r2d2` pool of SQLite connections. Every connection
//! checkout first takes a permit from a semaphore sized to the pool, so an
//! exhausted pool makes callers wait instead of growing. SQLite work runs on
//! the blocking thread pool. Writes additionally take a store-wide lock so
//! that only one write transaction is open at a time under WAL.
//!
//! - [`schema`] creates tables and indexes.
//! - [`accounts`] syncs account rows from their private keys.
//! - [`routes`] materialises per-account routes and dependency edges.
//! - [`tasks`] answers "what runs next" and records outcomes.
//! - [`stats`] holds the read-only reporting queries.

pub mod accounts;
pub mod error;
pub mod models;
pub mod routes;
pub mod schema;
pub mod stats;
pub mod tasks;

use std::ops::{Deref, DerefMut};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

pub use error::{StoreError, StoreResult};
pub use models::{
    Account, AccountSeed, AccountStatistics, ModuleFailureStat, OutstandingTask, Route,
    RouteBreakdown, RouteStats, SummaryStatistics, Task, TaskUpdate,
};
pub use tasks::apply_task_update;

/// Connection settings of a [`TaskStore`].
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub path: PathBuf,
    /// Pool size; also the number of semaphore permits.
    pub pool_size: u32,
    pub busy_timeout: Duration,
    /// Checkout attempts before giving up with `ConnectionFailed`.
    pub max_retries: u32,
    pub retry_backoff: Duration,
    /// A failure older than this restarts its error count when rewritten.
    pub stale_failure_window: chrono::Duration,
}

impl StoreConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            pool_size: 4,
            busy_timeout: Duration::from_millis(10_000),
            max_retries: 3,
            retry_backoff: Duration::from_millis(500),
            stale_failure_window: chrono::Duration::hours(24),
        }
    }

    pub fn with_pool_size(mut self, pool_size: u32) -> Self {
        self.pool_size = pool_size.max(1);
        self
    }

    pub fn with_busy_timeout(mut self, busy_timeout: Duration) -> Self {
        self.busy_timeout = busy_timeout;
        self
    }

    pub fn with_retries(mut self, max_retries: u32, retry_backoff: Duration) -> Self {
        self.max_retries = max_retries.max(1);
        self.retry_backoff = retry_backoff;
        self
    }

    pub fn with_stale_failure_window(mut self, window: chrono::Duration) -> Self {
        self.stale_failure_window = window;
        self
    }
}

type SqlitePool = Pool<SqliteConnectionManager>;

/// A checked-out connection together with the permit that allowed it.
///
/// Dropping it returns the connection to the pool and releases the permit.
pub struct StoreConnection {
    conn: PooledConnection<SqliteConnectionManager>,
    _permit: OwnedSemaphorePermit,
}

impl Deref for StoreConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.conn
    }
}

impl DerefMut for StoreConnection {
    fn deref_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }
}

struct Inner {
    pool: SqlitePool,
    permits: Arc<Semaphore>,
    write_lock: Mutex<()>,
    config: StoreConfig,
}

/// Handle to the task store. Cloning is cheap and shares the pool.
#[derive(Clone)]
pub struct TaskStore {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for TaskStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskStore")
            .field("path", &self.inner.config.path)
            .field("pool_size", &self.inner.config.pool_size)
            .field("available", &self.available_connections())
            .finish()
    }
}

impl TaskStore {
    /// Open the pool. Failing to establish connections is fatal.
    pub fn open(config: StoreConfig) -> StoreResult<Self> {
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::ConnectionFailed {
                        attempts: 0,
                        reason: format!("creating {}: {e}", parent.display()),
                    }
                })?;
            }
        }

        let busy_timeout = config.busy_timeout;
        let manager = SqliteConnectionManager::file(&config.path).with_init(move |conn| {
            conn.busy_timeout(busy_timeout)?;
            conn.execute_batch(
                "PRAGMA journal_mode=WAL;
                 PRAGMA synchronous=NORMAL;
                 PRAGMA foreign_keys=ON;",
            )
        });

        let pool = Pool::builder()
            .max_size(config.pool_size)
            .connection_timeout(config.busy_timeout)
            .build(manager)?;

        info!(
            path = %config.path.display(),
            pool_size = config.pool_size,
            "task store opened"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                pool,
                permits: Arc::new(Semaphore::new(config.pool_size as usize)),
                write_lock: Mutex::new(()),
                config,
            }),
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// Free semaphore permits, i.e. connections that can be checked out now.
    pub fn available_connections(&self) -> usize {
        self.inner.permits.available_permits()
    }

    /// Stop handing out connections. Callers waiting for a permit, and any
    /// later call, fail with [`StoreError::Closed`].
    pub fn close(&self) {
        self.inner.permits.close();
        info!("task store closed");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.permits.is_closed()
    }

    /// Check out a connection, waiting for a permit if the pool is busy.
    pub async fn acquire(&self) -> StoreResult<StoreConnection> {
        let permit = Arc::clone(&self.inner.permits)
            .acquire_owned()
            .await
            .map_err(|_| StoreError::Closed)?;

        let pool = self.inner.pool.clone();
        let max_retries = self.inner.config.max_retries;
        let backoff = self.inner.config.retry_backoff;

        let conn = tokio::task::spawn_blocking(move || checkout(&pool, max_retries, backoff))
            .await
            .map_err(|e| StoreError::Join(e.to_string()))??;

        Ok(StoreConnection {
            conn,
            _permit: permit,
        })
    }

    /// Run `f` with a pooled connection on the blocking thread pool.
    pub async fn with_connection<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let mut conn = self.acquire().await?;
        tokio::task::spawn_blocking(move || f(&mut conn))
            .await
            .map_err(|e| StoreError::Join(e.to_string()))?
    }

    /// Run `f` inside one immediate write transaction under the store-wide
    /// write lock. The transaction commits when `f` returns `Ok` and rolls
    /// back otherwise.
    pub async fn transaction<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Transaction<'_>) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let _guard = self.inner.write_lock.lock().await;
        self.with_connection(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let value = f(&tx)?;
            tx.commit()?;
            Ok(value)
        })
        .await
    }

    pub(crate) fn stale_failure_window(&self) -> chrono::Duration {
        self.inner.config.stale_failure_window
    }
}

fn checkout(
    pool: &SqlitePool,
    max_retries: u32,
    backoff: Duration,
) -> StoreResult<PooledConnection<SqliteConnectionManager>> {
    let attempts = max_retries.max(1);
    let mut reason = String::new();

    for attempt in 1..=attempts {
        match pool.get() {
            Ok(conn) => {
                if attempt > 1 {
                    debug!(attempt, "connection checked out after retry");
                }
                return Ok(conn);
            }
            Err(err) => {
                warn!(attempt, max_retries = attempts, error = %err, "connection checkout failed");
                reason = err.to_string();
                if attempt < attempts {
                    std::thread::sleep(backoff);
                }
            }
        }
    }

    Err(StoreError::ConnectionFailed { attempts, reason })
}
