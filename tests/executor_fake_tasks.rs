// tests/executor_fake_tasks.rs

mod common;
use crate::common::builders::{quick_scheduler, CatalogueBuilder};
use crate::common::fake_task::{succeeding_registry, ExecutionLog, Script, ScriptedFactory};
use crate::common::{init_tracing, seed_accounts, temp_store, with_timeout};

use std::error::Error;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use routeweave::engine::Executor;
use routeweave::errors::EngineError;
use routeweave::exec::TaskRegistry;
use routeweave::types::{RouteStatus, TaskStatus};

type TestResult = Result<(), Box<dyn Error>>;

fn funding_graph() -> routeweave::dag::ModuleGraph {
    CatalogueBuilder::new()
        .module("profile")
        .module_after("faucet", &["profile"])
        .module_after("transfer", &["faucet"])
        .build()
}

#[tokio::test]
async fn dependency_chain_completes_over_successive_passes() -> TestResult {
    init_tracing();
    let (_dir, store) = temp_store().await;
    let accounts = seed_accounts(&store, 2).await;
    let log = ExecutionLog::new();

    let executor = Executor::new(
        store.clone(),
        succeeding_registry(&["profile", "faucet", "transfer"], &log),
        funding_graph(),
        quick_scheduler(2),
    );
    executor.validate()?;

    let passes = with_timeout(executor.run_until_quiescent(&accounts, None)).await;
    // One module unlocks per pass, then a final empty pass.
    assert_eq!(passes.len(), 4);
    assert!(passes.last().unwrap().is_quiescent());
    assert_eq!(passes[0].executed, 2);

    for account in &accounts {
        assert_eq!(
            log.modules_for(&account.address),
            vec!["profile", "faucet", "transfer"]
        );
        let route = store.get_route(account.route_id()).await?;
        assert_eq!(route.status, RouteStatus::Completed);
    }
    assert_eq!(executor.progress().processed(), 2);
    assert_eq!(executor.progress().total(), 2);
    Ok(())
}

#[tokio::test]
async fn errors_and_panics_are_recorded_as_failures() -> TestResult {
    let (_dir, store) = temp_store().await;
    let accounts = seed_accounts(&store, 1).await;
    let log = ExecutionLog::new();

    let graph = CatalogueBuilder::new()
        .module("explodes")
        .module("errors")
        .module("broken_build")
        .module("fine")
        .build();
    let mut registry = TaskRegistry::new();
    registry
        .register("explodes", ScriptedFactory::new("explodes", Script::Panic("boom".into()), log.clone()))
        .register("errors", ScriptedFactory::new("errors", Script::Error("rpc down".into()), log.clone()))
        .register(
            "broken_build",
            ScriptedFactory::new("broken_build", Script::FailBuild("no session".into()), log.clone()),
        )
        .register("fine", ScriptedFactory::succeeding("fine", log.clone()));

    let mut config = quick_scheduler(1);
    config.shuffle = false;
    let executor = Executor::new(store.clone(), registry, graph, config);

    let summary = with_timeout(executor.run_pass(&accounts)).await;
    assert_eq!(summary.executed, 4);
    assert_eq!(summary.failed, 3);
    assert_eq!(summary.succeeded, 1);

    let tasks = store.get_all_tasks(accounts[0].route_id()).await?;
    let by_name = |name: &str| tasks.iter().find(|t| t.module_name == name).unwrap().clone();

    let explodes = by_name("explodes");
    assert_eq!(explodes.status, TaskStatus::Failed);
    assert_eq!(explodes.error_count, 1);
    assert_eq!(explodes.error_message.as_deref(), Some("task panicked: boom"));

    assert_eq!(by_name("errors").error_message.as_deref(), Some("rpc down"));
    assert_eq!(by_name("broken_build").error_message.as_deref(), Some("no session"));
    assert_eq!(by_name("fine").status, TaskStatus::Success);
    assert_eq!(by_name("fine").result.as_deref(), Some("fine done"));

    // The body of a factory that failed to build never ran.
    assert_eq!(log.count_for("broken_build"), 0);
    Ok(())
}

#[tokio::test]
async fn critical_failure_skips_dependents_for_that_account_only() -> TestResult {
    let (_dir, store) = temp_store().await;
    let accounts = seed_accounts(&store, 2).await;
    let (dry, funded) = (&accounts[0], &accounts[1]);
    let log = ExecutionLog::new();

    let graph = CatalogueBuilder::new()
        .module("faucet")
        .module_after("transfer", &["faucet"])
        .module("profile")
        .build();
    let mut registry = TaskRegistry::new();
    registry
        .register(
            "faucet",
            ScriptedFactory::succeeding("faucet", log.clone())
                .for_account(&dry.address, Script::Fail("faucet empty".into())),
        )
        .register("transfer", ScriptedFactory::succeeding("transfer", log.clone()))
        .register("profile", ScriptedFactory::succeeding("profile", log.clone()));

    let mut config = quick_scheduler(2);
    config.shuffle = false;
    config.critical = ["faucet".to_string()].into_iter().collect();
    let executor = Executor::new(store.clone(), registry, graph, config);

    let summary = with_timeout(executor.run_pass(&accounts)).await;
    assert_eq!(summary.aborted, 1);

    let report = summary.report_for(&dry.address).unwrap();
    assert_eq!(report.aborted_by.as_deref(), Some("faucet"));
    assert_eq!(report.abandoned, vec!["profile".to_string()]);
    assert_eq!(log.modules_for(&dry.address), vec!["faucet"]);

    // Abandoned tasks stay untouched and eligible next pass.
    let tasks = store.get_all_tasks(dry.route_id()).await?;
    let profile = tasks.iter().find(|t| t.module_name == "profile").unwrap();
    assert_eq!(profile.status, TaskStatus::Pending);
    assert!(profile.last_executed.is_none());
    let transfer = tasks.iter().find(|t| t.module_name == "transfer").unwrap();
    assert!(transfer.last_executed.is_none());

    assert_eq!(log.modules_for(&funded.address), vec!["faucet", "profile"]);
    Ok(())
}

#[tokio::test]
async fn failing_module_is_retried_until_exhausted_then_quiesces() -> TestResult {
    let (_dir, store) = temp_store().await;
    let accounts = seed_accounts(&store, 1).await;
    let log = ExecutionLog::new();

    let graph = CatalogueBuilder::new().module("flaky").build();
    let mut registry = TaskRegistry::new();
    registry.register(
        "flaky",
        ScriptedFactory::new("flaky", Script::Fail("nope".into()), log.clone()),
    );

    let executor = Executor::new(store.clone(), registry, graph, quick_scheduler(1));
    let passes = with_timeout(executor.run_until_quiescent(&accounts, None)).await;

    assert_eq!(passes.len(), 4);
    assert_eq!(log.count_for("flaky"), 3);
    let task = store.get_all_tasks(accounts[0].route_id()).await?.remove(0);
    assert_eq!(task.error_count, 3);
    assert_eq!(task.status, TaskStatus::Failed);
    Ok(())
}

#[tokio::test]
async fn max_passes_caps_the_run() -> TestResult {
    let (_dir, store) = temp_store().await;
    let accounts = seed_accounts(&store, 1).await;
    let log = ExecutionLog::new();

    let executor = Executor::new(
        store,
        succeeding_registry(&["profile", "faucet", "transfer"], &log),
        funding_graph(),
        quick_scheduler(1),
    );
    let passes = with_timeout(executor.run_until_quiescent(&accounts, Some(1))).await;
    assert_eq!(passes.len(), 1);
    assert_eq!(log.modules_for(&accounts[0].address), vec!["profile"]);
    Ok(())
}

#[tokio::test]
async fn batches_never_exceed_the_thread_count() -> TestResult {
    let (_dir, store) = temp_store().await;
    let accounts = seed_accounts(&store, 5).await;
    let log = ExecutionLog::new();

    let graph = CatalogueBuilder::new().module("slow").build();
    let mut registry = TaskRegistry::new();
    registry.register(
        "slow",
        ScriptedFactory::new("slow", Script::Sleep(Duration::from_millis(100)), log.clone()),
    );
    let executor = Executor::new(store, registry, graph, quick_scheduler(2));
    assert_eq!(executor.available_slots(), 2);

    let runner = executor.clone();
    let accounts_for_run = accounts.clone();
    let handle = tokio::spawn(async move { runner.run_pass(&accounts_for_run).await });

    let mut min_slots = usize::MAX;
    while !handle.is_finished() {
        min_slots = min_slots.min(executor.available_slots());
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let summary = handle.await?;

    assert_eq!(summary.accounts, 5);
    assert_eq!(summary.executed, 5);
    assert_eq!(min_slots, 0);
    assert_eq!(executor.available_slots(), 2);
    Ok(())
}

#[tokio::test]
async fn cancellation_stops_new_batches() -> TestResult {
    let (_dir, store) = temp_store().await;
    let accounts = seed_accounts(&store, 4).await;
    let log = ExecutionLog::new();

    let graph = CatalogueBuilder::new().module("slow").build();
    let mut registry = TaskRegistry::new();
    registry.register(
        "slow",
        ScriptedFactory::new("slow", Script::Sleep(Duration::from_millis(200)), log.clone()),
    );
    let token = CancellationToken::new();
    let executor = Executor::new(store.clone(), registry, graph, quick_scheduler(2))
        .with_cancellation(token.clone());

    let runner = executor.clone();
    let accounts_for_run = accounts.clone();
    let handle = tokio::spawn(async move { runner.run_pass(&accounts_for_run).await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    token.cancel();
    let summary = with_timeout(handle).await?;

    assert!(summary.cancelled);
    // The first batch finished and persisted its outcomes.
    assert_eq!(summary.accounts, 2);
    assert_eq!(summary.succeeded, 2);
    for account in &accounts[..2] {
        let task = store.get_all_tasks(account.route_id()).await?.remove(0);
        assert_eq!(task.status, TaskStatus::Success);
    }
    assert!(!store.route_exists(accounts[3].route_id()).await?);
    Ok(())
}

#[tokio::test]
async fn unregistered_module_fails_validation_and_is_skipped_at_run_time() -> TestResult {
    let (_dir, store) = temp_store().await;
    let accounts = seed_accounts(&store, 1).await;
    let log = ExecutionLog::new();

    let graph = CatalogueBuilder::new().module("profile").module("ghost").build();
    let executor = Executor::new(
        store.clone(),
        succeeding_registry(&["profile"], &log),
        graph,
        quick_scheduler(1),
    );

    match executor.validate() {
        Err(EngineError::UnregisteredModule(missing)) => assert_eq!(missing, "ghost"),
        other => panic!("expected UnregisteredModule, got {other:?}"),
    }

    let summary = with_timeout(executor.run_pass(&accounts)).await;
    assert_eq!(summary.executed, 1);
    assert_eq!(summary.skipped, 1);
    let ghost = store
        .get_all_tasks(accounts[0].route_id())
        .await?
        .into_iter()
        .find(|t| t.module_name == "ghost")
        .unwrap();
    assert!(ghost.last_executed.is_none());
    Ok(())
}

#[tokio::test]
async fn generate_routes_creates_one_route_per_account() -> TestResult {
    let (_dir, store) = temp_store().await;
    let accounts = seed_accounts(&store, 3).await;
    let log = ExecutionLog::new();

    let executor = Executor::new(
        store.clone(),
        succeeding_registry(&["profile", "faucet", "transfer"], &log),
        funding_graph(),
        quick_scheduler(2),
    );
    let summary = executor.generate_routes(&accounts).await;
    assert!(summary.failures.is_empty());
    assert_eq!(summary.routes.len(), 3);

    for account in &accounts {
        let tasks = store.get_all_tasks(account.route_id()).await?;
        let names: Vec<&str> = tasks.iter().map(|t| t.module_name.as_str()).collect();
        assert_eq!(names, vec!["profile", "faucet", "transfer"]);
    }
    assert!(log.is_empty());
    Ok(())
}

#[tokio::test]
async fn cyclic_catalogue_is_a_route_failure() -> TestResult {
    let (_dir, store) = temp_store().await;
    let accounts = seed_accounts(&store, 1).await;
    let log = ExecutionLog::new();
    let graph = CatalogueBuilder::new()
        .module_after("a", &["b"])
        .module_after("b", &["a"])
        .build();

    let executor = Executor::new(
        store.clone(),
        succeeding_registry(&["a", "b"], &log),
        graph,
        quick_scheduler(1),
    );
    let summary = with_timeout(executor.run_pass(&accounts)).await;
    assert_eq!(summary.route_failures, 1);
    assert!(summary.is_quiescent());
    assert!(!store.route_exists(accounts[0].route_id()).await?);
    Ok(())
}
