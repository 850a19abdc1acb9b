// src/engine/executor.rs

//! Async shell around [`AccountPass`].
//!
//! The executor owns no scheduling logic of its own: for every account it
//! feeds the pure pass state machine with the results of store calls and
//! task runs until the pass reports `Finish`. Accounts are processed in
//! batches of `threads`, all accounts of a batch concurrently, with a
//! semaphore bounding how many are in flight at once.

use std::any::Any;
use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::dag::{compile, ModuleGraph};
use crate::errors::Result;
use crate::exec::TaskRegistry;
use crate::store::{Account, StoreError, Task, TaskStore, TaskUpdate};
use crate::types::TaskOutcome;

use super::pass::{AccountPass, AccountReport, PassCommand, PassEvent};
use super::{EligibilityPolicy, Progress, SchedulerConfig};

/// Aggregate result of one scheduling pass over all accounts.
#[derive(Debug, Clone, Default)]
pub struct PassSummary {
    pub accounts: usize,
    pub executed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Accounts whose pass was cut short by a critical failure.
    pub aborted: usize,
    pub route_failures: usize,
    /// Accounts whose pass ended on a store error.
    pub errors: usize,
    /// Batches were left unstarted because of cancellation.
    pub cancelled: bool,
    pub reports: Vec<AccountReport>,
}

impl PassSummary {
    fn absorb(&mut self, report: AccountReport) {
        self.accounts += 1;
        self.executed += report.executed.len();
        self.succeeded += report.succeeded();
        self.failed += report.failed();
        self.skipped += report.skipped.len();
        if report.aborted_by.is_some() {
            self.aborted += 1;
        }
        if report.route_failure.is_some() {
            self.route_failures += 1;
        }
        if report.error.is_some() {
            self.errors += 1;
        }
        self.reports.push(report);
    }

    /// Nothing ran in this pass.
    pub fn is_quiescent(&self) -> bool {
        self.executed == 0
    }

    pub fn report_for(&self, address: &str) -> Option<&AccountReport> {
        self.reports.iter().find(|r| r.address == address)
    }
}

/// Result of creating or regenerating routes.
#[derive(Debug, Clone, Default)]
pub struct GenerateSummary {
    pub routes: Vec<String>,
    /// `(address, reason)` of accounts whose route could not be created.
    pub failures: Vec<(String, String)>,
}

#[derive(Clone)]
pub struct Executor {
    store: TaskStore,
    registry: Arc<TaskRegistry>,
    graph: Arc<ModuleGraph>,
    config: Arc<SchedulerConfig>,
    policy: Arc<EligibilityPolicy>,
    permits: Arc<Semaphore>,
    cancel: CancellationToken,
    progress: Arc<Progress>,
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("threads", &self.config.threads)
            .field("modules", &self.graph.len())
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl Executor {
    pub fn new(
        store: TaskStore,
        registry: TaskRegistry,
        graph: ModuleGraph,
        config: SchedulerConfig,
    ) -> Self {
        let threads = config.threads.max(1);
        let policy = config.eligibility_policy();
        Self {
            store,
            registry: Arc::new(registry),
            graph: Arc::new(graph),
            config: Arc::new(config),
            policy: Arc::new(policy),
            permits: Arc::new(Semaphore::new(threads)),
            cancel: CancellationToken::new(),
            progress: Arc::new(Progress::default()),
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn progress(&self) -> &Progress {
        &self.progress
    }

    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Accounts that can run right now; equals `threads` when idle.
    pub fn available_slots(&self) -> usize {
        self.permits.available_permits()
    }

    /// Fail when a catalogue module has no registered task.
    pub fn validate(&self) -> Result<()> {
        self.registry.validate(&self.graph)
    }

    /// Compile the catalogue and create or extend the route of `account`.
    pub async fn create_route(&self, account: &Account) -> Result<String> {
        let order = compile(
            self.graph.catalogue(),
            self.graph.dependency_map(),
            self.config.shuffle,
        )?;
        let route_id = self
            .store
            .create_route(
                account.id,
                &order,
                self.graph.dependency_map(),
                &self.config.always_run,
            )
            .await?;
        Ok(route_id)
    }

    /// Create or regenerate the route of every account.
    pub async fn generate_routes(&self, accounts: &[Account]) -> GenerateSummary {
        let mut set = JoinSet::new();
        for account in accounts {
            let this = self.clone();
            let account = account.clone();
            set.spawn(async move {
                let _permit = this.permits.clone().acquire_owned().await;
                let result = this.create_route(&account).await;
                (account.address, result)
            });
        }

        let mut summary = GenerateSummary::default();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((address, Ok(route_id))) => {
                    info!(account = %address, "route ready");
                    summary.routes.push(route_id);
                }
                Ok((address, Err(err))) => {
                    error!(account = %address, error = %err, "failed to create route");
                    summary.failures.push((address, err.to_string()));
                }
                Err(err) => error!(error = %err, "route generation task failed"),
            }
        }
        summary.routes.sort();
        summary
    }

    /// Run one scheduling pass over `accounts`.
    pub async fn run_pass(&self, accounts: &[Account]) -> PassSummary {
        let threads = self.config.threads.max(1);
        self.progress.reset(accounts.len());
        let mut summary = PassSummary::default();

        for (index, batch) in accounts.chunks(threads).enumerate() {
            if self.cancel.is_cancelled() {
                info!("cancellation requested; no further batches started");
                summary.cancelled = true;
                break;
            }
            if index > 0 && !self.config.batch_pause.is_zero() {
                tokio::select! {
                    _ = self.cancel.cancelled() => {
                        info!("cancellation requested; no further batches started");
                        summary.cancelled = true;
                        break;
                    }
                    _ = tokio::time::sleep(self.config.batch_pause) => {}
                }
            }

            debug!(batch = index, size = batch.len(), "starting account batch");
            let mut set = JoinSet::new();
            for account in batch {
                let this = self.clone();
                let account = account.clone();
                set.spawn(async move { this.process_account(account).await });
            }

            while let Some(joined) = set.join_next().await {
                match joined {
                    Ok(report) => summary.absorb(report),
                    Err(err) => error!(error = %err, "account task failed"),
                }
            }
        }

        info!(
            accounts = summary.accounts,
            executed = summary.executed,
            succeeded = summary.succeeded,
            failed = summary.failed,
            aborted = summary.aborted,
            "scheduling pass finished"
        );
        summary
    }

    /// Repeat passes until one executes nothing, `max_passes` is reached,
    /// or cancellation is requested.
    pub async fn run_until_quiescent(
        &self,
        accounts: &[Account],
        max_passes: Option<usize>,
    ) -> Vec<PassSummary> {
        let mut passes = Vec::new();
        loop {
            let summary = self.run_pass(accounts).await;
            let stop = summary.is_quiescent() || summary.cancelled || self.cancel.is_cancelled();
            passes.push(summary);

            if stop {
                break;
            }
            if max_passes.is_some_and(|max| passes.len() >= max) {
                info!(passes = passes.len(), "pass limit reached");
                break;
            }
        }
        info!(passes = passes.len(), "scheduler quiescent");
        passes
    }

    async fn process_account(self, account: Account) -> AccountReport {
        let mut pass = AccountPass::new(account.address.clone(), self.config.critical.clone());

        // `permits` is never closed, so acquiring only waits for a slot.
        let _slot = self.permits.clone().acquire_owned().await;

        info!(account = %account.address, "processing route");
        let mut commands: VecDeque<PassCommand> = pass.start().into();

        while let Some(command) = commands.pop_front() {
            let event = match command {
                PassCommand::EnsureRoute => match self.ensure_route(&account).await {
                    Ok(()) => PassEvent::RouteEnsured,
                    Err(err) => {
                        error!(account = %account.address, error = %err, "failed to create route");
                        PassEvent::RouteFailed(err.to_string())
                    }
                },
                PassCommand::FetchTasks => {
                    match self
                        .store
                        .get_tasks_to_run(account.route_id(), &self.policy)
                        .await
                    {
                        Ok(tasks) => PassEvent::TasksFetched(tasks),
                        Err(err) => {
                            error!(account = %account.address, error = %err, "failed to fetch tasks");
                            PassEvent::FetchFailed(err.to_string())
                        }
                    }
                }
                PassCommand::Pause => {
                    let delay = self
                        .config
                        .delay_between_tasks
                        .sample(&mut rand::thread_rng());
                    if !delay.is_zero() {
                        debug!(account = %account.address, delay_ms = delay.as_millis() as u64, "sleeping between tasks");
                        tokio::time::sleep(delay).await;
                    }
                    continue;
                }
                PassCommand::RunTask(task) => self.execute_task(&account, &task).await,
                PassCommand::Persist { task, outcome } => {
                    self.persist(&account, &task, &outcome).await
                }
                PassCommand::Finish => break,
            };
            commands.extend(pass.step(event));
        }

        let report = pass.into_report();
        if report.route_failure.is_none() {
            match self.store.refresh_route_status(account.route_id()).await {
                Ok(stats) => debug!(
                    account = %account.address,
                    success = stats.success_tasks,
                    failed = stats.failed_tasks,
                    pending = stats.pending_tasks,
                    "route statistics updated"
                ),
                Err(err) => warn!(account = %account.address, error = %err, "failed to update route statistics"),
            }
        }

        let processed = self.progress.increment();
        info!(
            "processed accounts: {}/{}",
            processed,
            self.progress.total()
        );
        report
    }

    async fn ensure_route(&self, account: &Account) -> Result<()> {
        if self.store.route_exists(account.route_id()).await? {
            return Ok(());
        }
        info!(account = %account.address, "creating route");
        self.create_route(account).await?;
        Ok(())
    }

    async fn execute_task(&self, account: &Account, task: &Task) -> PassEvent {
        let Some(factory) = self.registry.get(&task.module_name) else {
            return PassEvent::TaskSkipped(format!(
                "module '{}' has no registered task",
                task.module_name
            ));
        };

        let delay = self
            .config
            .delay_before_start
            .sample(&mut rand::thread_rng());
        if !delay.is_zero() {
            debug!(account = %account.address, module = %task.module_name, delay_ms = delay.as_millis() as u64, "delay before start");
            tokio::time::sleep(delay).await;
        }

        info!(account = %account.address, module = %task.module_name, "executing task");

        let mut runner = match factory.build(account) {
            Ok(runner) => runner,
            Err(err) => {
                return PassEvent::TaskFinished(TaskOutcome::Failed(format!("{err:#}")));
            }
        };

        let outcome = match tokio::spawn(async move { runner.run().await }).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(err)) => TaskOutcome::Failed(format!("{err:#}")),
            Err(join) if join.is_panic() => TaskOutcome::Failed(panic_message(join.into_panic())),
            Err(join) => TaskOutcome::Failed(join.to_string()),
        };

        if outcome.is_success() {
            info!(account = %account.address, module = %task.module_name, message = %outcome.message(), "task succeeded");
        } else {
            warn!(account = %account.address, module = %task.module_name, error = %outcome.message(), "task failed");
        }
        PassEvent::TaskFinished(outcome)
    }

    async fn persist(&self, account: &Account, task: &Task, outcome: &TaskOutcome) -> PassEvent {
        let update = TaskUpdate::from_outcome(task.id, outcome);
        match self
            .store
            .update_task_status(update.task_id, update.status, update.result, update.error)
            .await
        {
            Ok(_) => PassEvent::Persisted,
            Err(err) => {
                error!(
                    account = %account.address,
                    module = %task.module_name,
                    error = %err,
                    "failed to persist task outcome"
                );
                PassEvent::PersistFailed(describe_store_error(&err))
            }
        }
    }
}

fn describe_store_error(err: &StoreError) -> String {
    format!("persisting outcome: {err}")
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("task panicked: {msg}")
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("task panicked: {msg}")
    } else {
        "task panicked".to_string()
    }
}
