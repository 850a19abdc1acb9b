pub mod builders;
pub mod fake_task;

use std::sync::Once;

use routeweave::store::{Account, AccountSeed, StoreConfig, TaskStore};
use tempfile::TempDir;
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer() // print only for failing tests unless --nocapture
            .with_target(true)
            .init();
    });
}

/// Run a future with a 5-second timeout.
#[allow(dead_code)]
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(std::time::Duration::from_secs(5), f)
        .await
        .expect("Test timed out after 5 seconds")
}

/// Config of a store file inside `dir`.
pub fn store_config(dir: &TempDir) -> StoreConfig {
    StoreConfig::new(dir.path().join("routeweave.db"))
        .with_retries(1, std::time::Duration::from_millis(10))
}

/// Open a fresh file-backed store with the schema created.
///
/// Keep the returned `TempDir` alive for as long as the store is used.
pub async fn temp_store() -> (TempDir, TaskStore) {
    temp_store_with(|config| config).await
}

pub async fn temp_store_with<F>(adjust: F) -> (TempDir, TaskStore)
where
    F: FnOnce(StoreConfig) -> StoreConfig,
{
    let dir = tempfile::tempdir().expect("create temp dir");
    let store = TaskStore::open(adjust(store_config(&dir))).expect("open store");
    store.init_schema().await.expect("init schema");
    (dir, store)
}

/// A valid secp256k1 private key, distinct for every `index`.
pub fn test_key(index: u64) -> String {
    format!("0x{:064x}", index + 1)
}

/// Insert `count` accounts with keys from [`test_key`].
pub async fn seed_accounts(store: &TaskStore, count: u64) -> Vec<Account> {
    let seeds: Vec<AccountSeed> = (0..count).map(|i| AccountSeed::new(test_key(i))).collect();
    store.sync_accounts(&seeds).await.expect("sync accounts")
}

/// Make every insert of a `module` task fail, so route writes can be
/// interrupted halfway.
pub async fn reject_task_inserts(store: &TaskStore, module: &str) {
    let sql = format!(
        "CREATE TRIGGER reject_insert_{module} BEFORE INSERT ON tasks
         WHEN NEW.module_name = '{module}'
         BEGIN SELECT RAISE(ABORT, 'insert of {module} rejected'); END;"
    );
    install_trigger(store, sql).await;
    debug!(module, "task inserts will be rejected");
}

/// Make every task update that records `error_message` fail.
pub async fn reject_task_updates(store: &TaskStore, error_message: &str) {
    let sql = format!(
        "CREATE TRIGGER reject_update BEFORE UPDATE ON tasks
         WHEN NEW.error_message = '{error_message}'
         BEGIN SELECT RAISE(ABORT, 'update rejected'); END;"
    );
    install_trigger(store, sql).await;
    debug!(error_message, "task updates will be rejected");
}

async fn install_trigger(store: &TaskStore, sql: String) {
    store
        .with_connection(move |conn| {
            conn.execute_batch(&sql)?;
            Ok(())
        })
        .await
        .expect("install trigger");
}

/// Number of rows in `table`.
pub async fn count_rows(store: &TaskStore, table: &str) -> i64 {
    let sql = format!("SELECT COUNT(*) FROM {table}");
    store
        .with_connection(move |conn| Ok(conn.query_row(&sql, [], |row| row.get(0))?))
        .await
        .expect("count rows")
}
