#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::Path;

use routeweave::config::{ConfigFile, ModuleConfig, RawConfigFile};
use routeweave::dag::{DependencyMap, ModuleGraph};
use routeweave::engine::SchedulerConfig;
use routeweave::errors::Result;

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile::default(),
        }
    }

    pub fn with_module(mut self, name: &str, module: ModuleConfig) -> Self {
        self.config.module.insert(name.to_string(), module);
        self
    }

    pub fn with_catalogue(mut self, order: &[&str]) -> Self {
        self.config.catalogue = Some(order.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn with_always_run(mut self, module: &str) -> Self {
        self.config.always_run.push(module.to_string());
        self
    }

    pub fn with_critical(mut self, modules: &[&str]) -> Self {
        self.config.critical = Some(modules.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.config.engine.threads = threads;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.config.engine.max_attempts = max_attempts;
        self
    }

    pub fn with_database(mut self, path: &Path) -> Self {
        self.config.engine.database = path.to_path_buf();
        self
    }

    pub fn with_accounts_file(mut self, path: &Path) -> Self {
        self.config.engine.accounts = path.to_path_buf();
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn try_build(self) -> Result<ConfigFile> {
        ConfigFile::try_from(self.config)
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `ModuleConfig`.
pub struct ModuleConfigBuilder {
    module: ModuleConfig,
}

impl ModuleConfigBuilder {
    pub fn new(cmd: &str) -> Self {
        Self {
            module: ModuleConfig {
                cmd: cmd.to_string(),
                after: vec![],
                timeout_secs: None,
            },
        }
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.module.after.push(dep.to_string());
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.module.timeout_secs = Some(secs);
        self
    }

    pub fn build(self) -> ModuleConfig {
        self.module
    }
}

/// Builder for a catalogue plus its dependency map.
#[derive(Default)]
pub struct CatalogueBuilder {
    modules: Vec<String>,
    dependencies: BTreeMap<String, Vec<String>>,
}

impl CatalogueBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn module(mut self, name: &str) -> Self {
        self.modules.push(name.to_string());
        self
    }

    /// Add `name`, which must run after every module in `deps`.
    pub fn module_after(mut self, name: &str, deps: &[&str]) -> Self {
        self.modules.push(name.to_string());
        self.dependencies
            .insert(name.to_string(), deps.iter().map(|d| d.to_string()).collect());
        self
    }

    pub fn catalogue(&self) -> Vec<String> {
        self.modules.clone()
    }

    pub fn dependencies(&self) -> DependencyMap {
        self.dependencies.clone().into_iter().collect()
    }

    pub fn build(self) -> ModuleGraph {
        let deps = self.dependencies();
        ModuleGraph::new(self.modules, deps)
    }
}

/// Scheduler defaults without sleeping, for executor tests.
pub fn quick_scheduler(threads: usize) -> SchedulerConfig {
    SchedulerConfig {
        threads,
        critical: Default::default(),
        ..SchedulerConfig::default()
    }
    .without_delays()
}
