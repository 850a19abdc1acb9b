// src/exec/backend.rs

//! Task runner contract and the static module registry.
//!
//! A [`TaskFactory`] is registered per module name at startup. For every
//! eligible task the executor asks the factory for a fresh [`TaskRunner`]
//! bound to one account, calls `run()` once and drops it, which releases
//! whatever the runner opened in `build`.
//!
//! Tests register fake factories here instead of spawning processes.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::debug;

use crate::dag::ModuleGraph;
use crate::errors::{EngineError, Result};
use crate::store::Account;
use crate::types::{ModuleName, TaskOutcome};

/// One module bound to one account.
pub trait TaskRunner: Send {
    /// Execute the task body once.
    ///
    /// `Err` is treated exactly like `Ok(TaskOutcome::Failed(..))` carrying
    /// the error text.
    fn run(&mut self) -> Pin<Box<dyn Future<Output = anyhow::Result<TaskOutcome>> + Send + '_>>;
}

/// Builds runners of one module.
pub trait TaskFactory: Send + Sync {
    fn build(&self, account: &Account) -> anyhow::Result<Box<dyn TaskRunner>>;
}

/// Module name to factory map, validated against the catalogue at startup.
#[derive(Clone, Default)]
pub struct TaskRegistry {
    factories: BTreeMap<ModuleName, Arc<dyn TaskFactory>>,
}

impl fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("modules", &self.modules().collect::<Vec<_>>())
            .finish()
    }
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `factory` for `module`, replacing any previous one.
    pub fn register(
        &mut self,
        module: impl Into<ModuleName>,
        factory: impl TaskFactory + 'static,
    ) -> &mut Self {
        self.register_arc(module, Arc::new(factory))
    }

    pub fn register_arc(
        &mut self,
        module: impl Into<ModuleName>,
        factory: Arc<dyn TaskFactory>,
    ) -> &mut Self {
        let module = module.into();
        debug!(module = %module, "task factory registered");
        self.factories.insert(module, factory);
        self
    }

    pub fn get(&self, module: &str) -> Option<Arc<dyn TaskFactory>> {
        self.factories.get(module).cloned()
    }

    pub fn contains(&self, module: &str) -> bool {
        self.factories.contains_key(module)
    }

    /// Registered module names, sorted.
    pub fn modules(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(|m| m.as_str())
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Catalogue modules without a factory.
    pub fn missing(&self, graph: &ModuleGraph) -> Vec<ModuleName> {
        graph
            .catalogue()
            .iter()
            .filter(|m| !self.contains(m))
            .cloned()
            .collect()
    }

    /// Every catalogue module must have a factory.
    pub fn validate(&self, graph: &ModuleGraph) -> Result<()> {
        let missing = self.missing(graph);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(EngineError::UnregisteredModule(missing.join(", ")))
        }
    }
}
