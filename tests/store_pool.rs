// tests/store_pool.rs

mod common;
use crate::common::{init_tracing, store_config, temp_store_with, with_timeout};

use std::error::Error;
use std::time::Duration;

use tokio::time::timeout;

use routeweave::store::{StoreError, TaskStore};

type TestResult = Result<(), Box<dyn Error>>;

#[tokio::test]
async fn pool_of_n_serves_n_concurrent_callers() -> TestResult {
    init_tracing();
    let (_dir, store) = temp_store_with(|c| c.with_pool_size(3)).await;
    assert_eq!(store.available_connections(), 3);

    let mut handles = Vec::new();
    for _ in 0..3 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            let conn = store.acquire().await?;
            let one: i64 = conn.query_row("SELECT 1", [], |row| row.get(0))?;
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok::<_, StoreError>(one)
        }));
    }

    with_timeout(async {
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), 1);
        }
    })
    .await;
    assert_eq!(store.available_connections(), 3);
    Ok(())
}

#[tokio::test]
async fn caller_beyond_pool_size_waits_for_a_release() -> TestResult {
    let (_dir, store) = temp_store_with(|c| c.with_pool_size(2)).await;

    let first = store.acquire().await?;
    let second = store.acquire().await?;
    assert_eq!(store.available_connections(), 0);

    let waiter = {
        let store = store.clone();
        tokio::spawn(async move { store.acquire().await.map(|_| ()) })
    };

    // The extra caller is still blocked while both connections are held.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!waiter.is_finished());

    drop(first);
    with_timeout(waiter).await??;

    drop(second);
    assert_eq!(store.available_connections(), 2);
    Ok(())
}

#[tokio::test]
async fn blocked_acquire_times_out_rather_than_growing_the_pool() -> TestResult {
    let (_dir, store) = temp_store_with(|c| c.with_pool_size(1)).await;

    let held = store.acquire().await?;
    let attempt = timeout(Duration::from_millis(150), store.acquire()).await;
    assert!(attempt.is_err());
    drop(held);

    let conn = with_timeout(store.acquire()).await?;
    drop(conn);
    Ok(())
}

#[tokio::test]
async fn closed_store_refuses_connections() {
    let (_dir, store) = temp_store_with(|c| c).await;
    store.close();
    assert!(store.is_closed());
    assert!(matches!(store.acquire().await, Err(StoreError::Closed)));
    assert!(matches!(store.list_accounts().await, Err(StoreError::Closed)));
}

#[tokio::test]
async fn open_creates_missing_parent_directories() -> TestResult {
    let dir = tempfile::tempdir()?;
    let nested = dir.path().join("a/b/state.db");
    let config = store_config(&dir);
    let store = TaskStore::open(routeweave::store::StoreConfig {
        path: nested.clone(),
        ..config
    })?;
    store.init_schema().await?;
    assert!(nested.exists());
    Ok(())
}
