// src/config/model.rs

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::dag::{DependencyMap, ModuleGraph};
use crate::engine::{DelayRange, SchedulerConfig};
use crate::exec::{CommandFactory, TaskRegistry};
use crate::store::StoreConfig;
use crate::types::ModuleName;

/// Configuration as read from the TOML file, before validation.
///
/// ```toml
/// always_run = ["onchain_gm"]
/// critical = ["faucet"]
///
/// [engine]
/// threads = 4
/// database = "data/routeweave.db"
///
/// [delay]
/// between_tasks = { min = 30, max = 120 }
///
/// [module.faucet]
/// cmd = "./bin/faucet"
/// after = ["profile"]
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    /// Explicit module order. Modules not listed here follow in
    /// alphabetical order.
    #[serde(default)]
    pub catalogue: Option<Vec<String>>,

    #[serde(default)]
    pub always_run: Vec<String>,

    /// Modules whose failure ends an account's pass. When omitted,
    /// `faucet` is critical if it is configured.
    #[serde(default)]
    pub critical: Option<Vec<String>>,

    #[serde(default)]
    pub engine: EngineSection,

    #[serde(default)]
    pub delay: DelaySection,

    #[serde(default)]
    pub cooldown: CooldownSection,

    /// All modules from `[module.<name>]`.
    #[serde(default)]
    pub module: BTreeMap<String, ModuleConfig>,
}

impl Default for RawConfigFile {
    fn default() -> Self {
        Self {
            catalogue: None,
            always_run: Vec::new(),
            critical: None,
            engine: EngineSection::default(),
            delay: DelaySection::default(),
            cooldown: CooldownSection::default(),
            module: BTreeMap::new(),
        }
    }
}

const DEFAULT_CRITICAL: &[&str] = &["faucet"];

/// `[engine]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineSection {
    /// Accounts processed concurrently; also the store pool size.
    #[serde(default = "default_threads")]
    pub threads: usize,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Randomise module order within a dependency level.
    #[serde(default = "default_true")]
    pub shuffle: bool,

    #[serde(default = "default_batch_pause_ms")]
    pub batch_pause_ms: u64,

    #[serde(default = "default_database")]
    pub database: PathBuf,

    /// One private key per line.
    #[serde(default = "default_accounts")]
    pub accounts: PathBuf,

    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_threads() -> usize {
    4
}

fn default_max_attempts() -> u32 {
    3
}

fn default_true() -> bool {
    true
}

fn default_batch_pause_ms() -> u64 {
    500
}

fn default_database() -> PathBuf {
    PathBuf::from("data/routeweave.db")
}

fn default_accounts() -> PathBuf {
    PathBuf::from("accounts.txt")
}

fn default_busy_timeout_ms() -> u64 {
    10_000
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            threads: default_threads(),
            max_attempts: default_max_attempts(),
            shuffle: default_true(),
            batch_pause_ms: default_batch_pause_ms(),
            database: default_database(),
            accounts: default_accounts(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

/// `{ min, max }` in seconds.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub struct DelayConfig {
    pub min: u64,
    pub max: u64,
}

impl DelayConfig {
    pub fn range(&self) -> DelayRange {
        DelayRange::from_secs(self.min, self.max)
    }
}

/// `[delay]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct DelaySection {
    /// Before every task body.
    #[serde(default = "default_before_start")]
    pub before_start: DelayConfig,

    /// Between two tasks of the same account.
    #[serde(default = "default_between_tasks")]
    pub between_tasks: DelayConfig,
}

fn default_before_start() -> DelayConfig {
    DelayConfig { min: 0, max: 0 }
}

fn default_between_tasks() -> DelayConfig {
    DelayConfig { min: 30, max: 120 }
}

impl Default for DelaySection {
    fn default() -> Self {
        Self {
            before_start: default_before_start(),
            between_tasks: default_between_tasks(),
        }
    }
}

/// `[cooldown]` section: re-arm windows of always-run modules.
#[derive(Debug, Clone, Deserialize)]
pub struct CooldownSection {
    /// Always-run modules that re-arm once a day.
    #[serde(default = "default_daily_modules")]
    pub daily_modules: Vec<String>,

    #[serde(default = "default_daily_hours")]
    pub daily_hours: u32,

    /// Window of every other always-run module.
    #[serde(default = "default_default_hours")]
    pub default_hours: u32,

    /// Failures older than this get a fresh retry budget.
    #[serde(default = "default_stale_after_hours")]
    pub stale_after_hours: u32,
}

fn default_daily_modules() -> Vec<String> {
    vec!["faucet".to_string(), "onchain_gm".to_string()]
}

fn default_daily_hours() -> u32 {
    24
}

fn default_default_hours() -> u32 {
    1
}

fn default_stale_after_hours() -> u32 {
    24
}

impl Default for CooldownSection {
    fn default() -> Self {
        Self {
            daily_modules: default_daily_modules(),
            daily_hours: default_daily_hours(),
            default_hours: default_default_hours(),
            stale_after_hours: default_stale_after_hours(),
        }
    }
}

/// `[module.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ModuleConfig {
    /// Shell command run for every account.
    pub cmd: String,

    /// Modules that must have succeeded first.
    #[serde(default)]
    pub after: Vec<String>,

    /// Kill the command after this many seconds.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// Validated configuration. Only built through `TryFrom<RawConfigFile>`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub engine: EngineSection,
    pub delay: DelaySection,
    pub cooldown: CooldownSection,
    pub always_run: Vec<String>,
    pub critical: Vec<String>,
    pub module: BTreeMap<String, ModuleConfig>,
    catalogue: Vec<ModuleName>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(raw: RawConfigFile, catalogue: Vec<ModuleName>) -> Self {
        let critical = raw.critical.unwrap_or_else(|| {
            DEFAULT_CRITICAL
                .iter()
                .filter(|m| raw.module.contains_key(**m))
                .map(|m| m.to_string())
                .collect()
        });
        Self {
            engine: raw.engine,
            delay: raw.delay,
            cooldown: raw.cooldown,
            always_run: raw.always_run,
            critical,
            module: raw.module,
            catalogue,
        }
    }

    /// Module names in catalogue order.
    pub fn catalogue(&self) -> &[ModuleName] {
        &self.catalogue
    }

    pub fn dependency_map(&self) -> DependencyMap {
        self.module
            .iter()
            .filter(|(_, m)| !m.after.is_empty())
            .map(|(name, m)| (name.clone(), m.after.clone()))
            .collect()
    }

    pub fn module_graph(&self) -> ModuleGraph {
        ModuleGraph::new(self.catalogue.iter().cloned(), self.dependency_map())
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            threads: self.engine.threads,
            max_attempts: self.engine.max_attempts,
            stale_after: chrono::Duration::hours(i64::from(self.cooldown.stale_after_hours)),
            daily_cooldown: chrono::Duration::hours(i64::from(self.cooldown.daily_hours)),
            default_cooldown: chrono::Duration::hours(i64::from(self.cooldown.default_hours)),
            daily_modules: to_set(&self.cooldown.daily_modules),
            always_run: to_set(&self.always_run),
            critical: to_set(&self.critical),
            delay_before_start: self.delay.before_start.range(),
            delay_between_tasks: self.delay.between_tasks.range(),
            batch_pause: Duration::from_millis(self.engine.batch_pause_ms),
            shuffle: self.engine.shuffle,
        }
    }

    /// Store settings; the pool is sized to the thread count.
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig::new(&self.engine.database)
            .with_pool_size(self.engine.threads as u32)
            .with_busy_timeout(Duration::from_millis(self.engine.busy_timeout_ms))
            .with_stale_failure_window(chrono::Duration::hours(i64::from(
                self.cooldown.stale_after_hours,
            )))
    }

    /// One [`CommandFactory`] per configured module.
    pub fn task_registry(&self) -> TaskRegistry {
        let mut registry = TaskRegistry::new();
        for (name, module) in &self.module {
            let factory = CommandFactory::new(name.clone(), module.cmd.clone())
                .with_timeout(module.timeout_secs.map(Duration::from_secs));
            registry.register(name.clone(), factory);
        }
        registry
    }
}

fn to_set(names: &[String]) -> BTreeSet<ModuleName> {
    names.iter().cloned().collect()
}
