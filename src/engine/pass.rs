// src/engine/pass.rs

//! Pure per-account pass state machine.
//!
//! One [`AccountPass`] walks a single account through
//! `Idle -> RouteEnsured -> TasksFetched -> Executing(i) -> Persisting(i) ->
//! ... -> Done`. Feeding it [`PassEvent`]s yields the [`PassCommand`]s the
//! async executor has to perform next. Nothing here touches Tokio, the
//! store, or the clock, so every transition can be tested directly.

use std::collections::BTreeSet;

use tracing::{debug, warn};

use crate::store::Task;
use crate::types::{ModuleName, TaskOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassPhase {
    Idle,
    RouteEnsured,
    TasksFetched,
    Executing(usize),
    Persisting(usize),
    Done,
}

/// Something the executor observed while carrying out a command.
#[derive(Debug, Clone)]
pub enum PassEvent {
    RouteEnsured,
    RouteFailed(String),
    TasksFetched(Vec<Task>),
    FetchFailed(String),
    TaskFinished(TaskOutcome),
    /// The task could not be started (no runner registered); nothing is
    /// persisted for it.
    TaskSkipped(String),
    Persisted,
    PersistFailed(String),
}

/// Work the executor has to do for this account.
#[derive(Debug, Clone, PartialEq)]
pub enum PassCommand {
    EnsureRoute,
    FetchTasks,
    /// Jittered pause between two tasks.
    Pause,
    RunTask(Task),
    Persist { task: Task, outcome: TaskOutcome },
    Finish,
}

/// Summary of one account's pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccountReport {
    pub address: String,
    pub executed: Vec<(ModuleName, TaskOutcome)>,
    pub skipped: Vec<ModuleName>,
    /// Critical module whose failure ended the pass early.
    pub aborted_by: Option<ModuleName>,
    /// Eligible tasks that were not attempted because of an abort.
    pub abandoned: Vec<ModuleName>,
    pub route_failure: Option<String>,
    /// Store failure that ended the pass.
    pub error: Option<String>,
}

impl AccountReport {
    pub fn succeeded(&self) -> usize {
        self.executed.iter().filter(|(_, o)| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.executed.len() - self.succeeded()
    }
}

#[derive(Debug)]
pub struct AccountPass {
    phase: PassPhase,
    critical: BTreeSet<ModuleName>,
    tasks: Vec<Task>,
    pending_outcome: Option<TaskOutcome>,
    report: AccountReport,
}

impl AccountPass {
    pub fn new(address: impl Into<String>, critical: BTreeSet<ModuleName>) -> Self {
        Self {
            phase: PassPhase::Idle,
            critical,
            tasks: Vec::new(),
            pending_outcome: None,
            report: AccountReport {
                address: address.into(),
                ..AccountReport::default()
            },
        }
    }

    pub fn phase(&self) -> PassPhase {
        self.phase
    }

    pub fn is_done(&self) -> bool {
        self.phase == PassPhase::Done
    }

    pub fn report(&self) -> &AccountReport {
        &self.report
    }

    pub fn into_report(self) -> AccountReport {
        self.report
    }

    /// First command of the pass.
    pub fn start(&mut self) -> Vec<PassCommand> {
        if self.phase != PassPhase::Idle {
            return Vec::new();
        }
        vec![PassCommand::EnsureRoute]
    }

    pub fn step(&mut self, event: PassEvent) -> Vec<PassCommand> {
        match (self.phase, event) {
            (PassPhase::Idle, PassEvent::RouteEnsured) => {
                self.phase = PassPhase::RouteEnsured;
                vec![PassCommand::FetchTasks]
            }
            (PassPhase::Idle, PassEvent::RouteFailed(reason)) => {
                self.report.route_failure = Some(reason);
                self.finish()
            }
            (PassPhase::RouteEnsured, PassEvent::TasksFetched(tasks)) => {
                self.phase = PassPhase::TasksFetched;
                self.tasks = tasks;
                if self.tasks.is_empty() {
                    debug!(account = %self.report.address, "no eligible tasks");
                    return self.finish();
                }
                self.run(0)
            }
            (PassPhase::RouteEnsured, PassEvent::FetchFailed(reason)) => {
                self.report.error = Some(reason);
                self.finish()
            }
            (PassPhase::Executing(i), PassEvent::TaskFinished(outcome)) => {
                self.phase = PassPhase::Persisting(i);
                self.pending_outcome = Some(outcome.clone());
                vec![PassCommand::Persist {
                    task: self.tasks[i].clone(),
                    outcome,
                }]
            }
            (PassPhase::Executing(i), PassEvent::TaskSkipped(reason)) => {
                let module = self.tasks[i].module_name.clone();
                warn!(account = %self.report.address, module = %module, %reason, "task skipped");
                self.report.skipped.push(module);
                self.advance(i, false)
            }
            (PassPhase::Persisting(i), PassEvent::Persisted) => {
                self.advance(i, true)
            }
            (PassPhase::Persisting(i), PassEvent::PersistFailed(reason)) => {
                if let Some(outcome) = self.pending_outcome.take() {
                    self.record(i, outcome);
                }
                self.report.error = Some(reason);
                self.finish()
            }
            (phase, event) => {
                warn!(?phase, ?event, "unexpected event for account pass; ignored");
                Vec::new()
            }
        }
    }

    /// Record the outcome of task `i`; returns true when it is a critical
    /// failure.
    fn record(&mut self, i: usize, outcome: TaskOutcome) -> bool {
        let module = self.tasks[i].module_name.clone();
        let abort = !outcome.is_success() && self.critical.contains(&module);
        self.report.executed.push((module, outcome));
        abort
    }

    fn advance(&mut self, i: usize, persisted: bool) -> Vec<PassCommand> {
        if persisted {
            if let Some(outcome) = self.pending_outcome.take() {
                if self.record(i, outcome) {
                    return self.abort(i);
                }
            }
        }

        let next = i + 1;
        if next >= self.tasks.len() {
            return self.finish();
        }
        let mut commands = Vec::new();
        if persisted {
            commands.push(PassCommand::Pause);
        }
        commands.extend(self.run(next));
        commands
    }

    fn abort(&mut self, i: usize) -> Vec<PassCommand> {
        let module = self.tasks[i].module_name.clone();
        self.report.abandoned = self.tasks[i + 1..]
            .iter()
            .map(|t| t.module_name.clone())
            .collect();
        warn!(
            account = %self.report.address,
            module = %module,
            abandoned = ?self.report.abandoned,
            "critical module failed; pass interrupted"
        );
        self.report.aborted_by = Some(module);
        self.finish()
    }

    fn run(&mut self, i: usize) -> Vec<PassCommand> {
        self.phase = PassPhase::Executing(i);
        vec![PassCommand::RunTask(self.tasks[i].clone())]
    }

    fn finish(&mut self) -> Vec<PassCommand> {
        self.phase = PassPhase::Done;
        vec![PassCommand::Finish]
    }
}
