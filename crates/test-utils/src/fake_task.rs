#![allow(dead_code)]

//! Scripted task factories that record what ran instead of spawning
//! processes.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use routeweave::exec::{TaskFactory, TaskRegistry, TaskRunner};
use routeweave::store::Account;
use routeweave::types::TaskOutcome;
use tracing::debug;

/// What a scripted task does when it runs.
#[derive(Debug, Clone)]
pub enum Script {
    Succeed(String),
    Fail(String),
    /// `run()` returns `Err`.
    Error(String),
    Panic(String),
    /// `build()` fails before the body runs.
    FailBuild(String),
    /// Sleep, then succeed.
    Sleep(Duration),
}

/// One recorded execution: `(module, account address)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    pub module: String,
    pub address: String,
}

/// Shared log of every task body that started.
#[derive(Debug, Clone, Default)]
pub struct ExecutionLog {
    entries: Arc<Mutex<Vec<Execution>>>,
}

impl ExecutionLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, module: &str, address: &str) {
        self.entries.lock().unwrap().push(Execution {
            module: module.to_string(),
            address: address.to_string(),
        });
    }

    pub fn entries(&self) -> Vec<Execution> {
        self.entries.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Modules run for `address`, in execution order.
    pub fn modules_for(&self, address: &str) -> Vec<String> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.address == address)
            .map(|e| e.module.clone())
            .collect()
    }

    pub fn count_for(&self, module: &str) -> usize {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.module == module)
            .count()
    }
}

/// Factory of one module with a default script and per-account overrides.
#[derive(Clone)]
pub struct ScriptedFactory {
    module: String,
    default: Script,
    per_account: HashMap<String, Script>,
    log: ExecutionLog,
}

impl ScriptedFactory {
    pub fn new(module: &str, default: Script, log: ExecutionLog) -> Self {
        Self {
            module: module.to_string(),
            default,
            per_account: HashMap::new(),
            log,
        }
    }

    pub fn succeeding(module: &str, log: ExecutionLog) -> Self {
        Self::new(module, Script::Succeed(format!("{module} done")), log)
    }

    pub fn for_account(mut self, address: &str, script: Script) -> Self {
        self.per_account.insert(address.to_string(), script);
        self
    }

    fn script_for(&self, address: &str) -> Script {
        self.per_account
            .get(address)
            .cloned()
            .unwrap_or_else(|| self.default.clone())
    }
}

impl TaskFactory for ScriptedFactory {
    fn build(&self, account: &Account) -> anyhow::Result<Box<dyn TaskRunner>> {
        let script = self.script_for(&account.address);
        if let Script::FailBuild(msg) = &script {
            anyhow::bail!("{msg}");
        }
        Ok(Box::new(ScriptedTask {
            module: self.module.clone(),
            address: account.address.clone(),
            script,
            log: self.log.clone(),
        }))
    }
}

struct ScriptedTask {
    module: String,
    address: String,
    script: Script,
    log: ExecutionLog,
}

impl TaskRunner for ScriptedTask {
    fn run(&mut self) -> Pin<Box<dyn Future<Output = anyhow::Result<TaskOutcome>> + Send + '_>> {
        Box::pin(async move {
            debug!(module = %self.module, account = %self.address, script = ?self.script, "scripted task");
            self.log.record(&self.module, &self.address);
            match &self.script {
                Script::Succeed(msg) => Ok(TaskOutcome::Success(msg.clone())),
                Script::Fail(msg) => Ok(TaskOutcome::Failed(msg.clone())),
                Script::Error(msg) => Err(anyhow::anyhow!("{msg}")),
                Script::Panic(msg) => panic!("{msg}"),
                Script::FailBuild(msg) => Err(anyhow::anyhow!("{msg}")),
                Script::Sleep(delay) => {
                    tokio::time::sleep(*delay).await;
                    Ok(TaskOutcome::Success("slept".to_string()))
                }
            }
        })
    }
}

/// Registry where every module in `modules` succeeds.
pub fn succeeding_registry(modules: &[&str], log: &ExecutionLog) -> TaskRegistry {
    let mut registry = TaskRegistry::new();
    for module in modules {
        registry.register(*module, ScriptedFactory::succeeding(module, log.clone()));
    }
    registry
}
