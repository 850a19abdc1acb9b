// tests/store_stats.rs

mod common;
use crate::common::{init_tracing, seed_accounts, store_config, temp_store};

use std::collections::BTreeSet;
use std::error::Error;

use routeweave::dag::DependencyMap;
use routeweave::report::outstanding_label;
use routeweave::store::{StoreError, TaskStore};
use routeweave::types::{RouteStatus, TaskStatus};

type TestResult = Result<(), Box<dyn Error>>;

fn modules(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

async fn set(store: &TaskStore, route: &str, module: &str, status: TaskStatus, msg: &str) {
    let task = store
        .get_all_tasks(route)
        .await
        .unwrap()
        .into_iter()
        .find(|t| t.module_name == module)
        .unwrap();
    let (result, error) = match status {
        TaskStatus::Failed => (None, Some(msg.to_string())),
        _ => (Some(msg.to_string()), None),
    };
    store
        .update_task_status(task.id, status, result, error)
        .await
        .unwrap();
}

#[tokio::test]
async fn reads_on_a_fresh_database_report_not_initialized() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let store = TaskStore::open(store_config(&dir))?;

    assert!(!store.is_initialized().await?);
    let err = store.route_stats().await.unwrap_err();
    assert!(err.is_not_initialized(), "unexpected error: {err}");
    assert!(matches!(
        store.account_statistics().await,
        Err(StoreError::NotInitialized(_))
    ));

    store.init_schema().await?;
    assert!(store.is_initialized().await?);
    assert!(store.route_stats().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn statistics_cover_accounts_routes_and_modules() -> TestResult {
    let (_dir, store) = temp_store().await;
    let accounts = seed_accounts(&store, 3).await;
    let catalogue = modules(&["profile", "faucet", "swap"]);

    for account in &accounts {
        store
            .create_route(account.id, &catalogue, &DependencyMap::new(), &BTreeSet::new())
            .await?;
    }
    let (a, b, c) = (&accounts[0].address, &accounts[1].address, &accounts[2].address);

    for module in ["profile", "faucet", "swap"] {
        set(&store, a, module, TaskStatus::Success, "ok").await;
    }
    set(&store, b, "profile", TaskStatus::Success, "ok").await;
    set(&store, b, "faucet", TaskStatus::Failed, "drained").await;
    set(&store, c, "faucet", TaskStatus::Failed, "drained").await;
    set(&store, c, "swap", TaskStatus::Failed, "").await;

    for account in &accounts {
        store.refresh_route_status(account.route_id()).await?;
    }

    let routes = store.route_stats().await?;
    assert_eq!(routes.len(), 3);
    let route_a = routes.iter().find(|r| &r.route_id == a).unwrap();
    assert_eq!(route_a.status, RouteStatus::Completed);
    assert_eq!(route_a.completion_percentage(), 100.0);
    let ids: Vec<&str> = routes.iter().map(|r| r.route_id.as_str()).collect();
    let mut sorted = ids.clone();
    sorted.sort_by(|x, y| y.cmp(x));
    assert_eq!(ids, sorted);

    let breakdown = store.route_breakdown(b).await?;
    assert_eq!(breakdown.stats.success_tasks, 1);
    assert_eq!(breakdown.stats.failed_tasks, 1);
    assert_eq!(breakdown.stats.pending_tasks, 1);
    assert_eq!(breakdown.tasks.len(), 3);

    let failures = store.module_failures().await?;
    assert_eq!(failures[0].module_name, "faucet");
    assert_eq!(failures[0].failed_count, 2);
    assert_eq!(failures[1].module_name, "swap");
    assert_eq!(failures[1].accounts_affected, vec![c.clone()]);

    let (per_account, summary) = store.account_statistics().await?;
    let order: Vec<&str> = per_account.iter().map(|s| s.address.as_str()).collect();
    assert_eq!(order, vec![a.as_str(), b.as_str(), c.as_str()]);
    assert_eq!(per_account[0].percentage_completed, 100.0);
    assert!(per_account[0].outstanding.is_empty());
    assert_eq!(per_account[1].completed_tasks, 1);
    assert_eq!(per_account[1].failed_tasks, 1);
    assert_eq!(per_account[1].pending_tasks, 1);

    let labels: Vec<String> = per_account[2].outstanding.iter().map(outstanding_label).collect();
    assert_eq!(labels, vec!["profile", "faucet(drained)", "swap(error)"]);

    assert_eq!(summary.total_accounts, 3);
    let total = summary.success_percentage + summary.failed_percentage + summary.pending_percentage;
    assert!((total - 100.0).abs() < 1e-9);
    assert!((summary.success_percentage - 4.0 / 9.0 * 100.0).abs() < 1e-9);
    assert_eq!(summary.error_modules, failures);
    Ok(())
}

#[tokio::test]
async fn breakdown_of_unknown_route_is_not_found() {
    let (_dir, store) = temp_store().await;
    assert!(store.route_breakdown("0xnone").await.unwrap_err().is_route_not_found());
    assert!(store.refresh_route_status("0xnone").await.unwrap_err().is_route_not_found());
}
