// src/config/validate.rs

use std::collections::HashSet;

use tracing::warn;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::dag::{compile_levels, DependencyMap};
use crate::errors::{EngineError, Result};
use crate::types::ModuleName;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = EngineError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let catalogue = validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw, catalogue))
    }
}

/// Check every rule and return the resolved catalogue order.
fn validate_raw_config(cfg: &RawConfigFile) -> Result<Vec<ModuleName>> {
    ensure_has_modules(cfg)?;
    validate_engine(cfg)?;
    validate_delays(cfg)?;
    validate_module_commands(cfg)?;
    let catalogue = resolve_catalogue(cfg)?;
    validate_module_lists(cfg)?;
    validate_module_dependencies(cfg)?;
    validate_dag(cfg, &catalogue)?;
    Ok(catalogue)
}

fn config_error(msg: impl Into<String>) -> EngineError {
    EngineError::ConfigError(msg.into())
}

fn ensure_has_modules(cfg: &RawConfigFile) -> Result<()> {
    if cfg.module.is_empty() {
        return Err(config_error(
            "config must contain at least one [module.<name>] section",
        ));
    }
    Ok(())
}

fn validate_engine(cfg: &RawConfigFile) -> Result<()> {
    if cfg.engine.threads == 0 {
        return Err(config_error("[engine].threads must be >= 1 (got 0)"));
    }
    if cfg.engine.max_attempts == 0 {
        return Err(config_error("[engine].max_attempts must be >= 1 (got 0)"));
    }
    if cfg.cooldown.stale_after_hours == 0 {
        return Err(config_error(
            "[cooldown].stale_after_hours must be >= 1 (got 0)",
        ));
    }
    Ok(())
}

fn validate_delays(cfg: &RawConfigFile) -> Result<()> {
    for (name, delay) in [
        ("before_start", &cfg.delay.before_start),
        ("between_tasks", &cfg.delay.between_tasks),
    ] {
        if delay.min > delay.max {
            return Err(config_error(format!(
                "[delay].{name}: min ({}) must not exceed max ({})",
                delay.min, delay.max
            )));
        }
    }
    Ok(())
}

fn validate_module_commands(cfg: &RawConfigFile) -> Result<()> {
    for (name, module) in cfg.module.iter() {
        if module.cmd.trim().is_empty() {
            return Err(config_error(format!("module '{name}' has an empty `cmd`")));
        }
        if module.timeout_secs == Some(0) {
            return Err(config_error(format!(
                "module '{name}': timeout_secs must be >= 1"
            )));
        }
    }
    Ok(())
}

/// Explicit `catalogue` first, then the remaining modules alphabetically.
fn resolve_catalogue(cfg: &RawConfigFile) -> Result<Vec<ModuleName>> {
    let mut order: Vec<ModuleName> = Vec::with_capacity(cfg.module.len());
    let mut seen = HashSet::new();

    if let Some(listed) = &cfg.catalogue {
        for name in listed {
            if !cfg.module.contains_key(name) {
                return Err(config_error(format!(
                    "catalogue lists unknown module '{name}'"
                )));
            }
            if seen.insert(name.as_str()) {
                order.push(name.clone());
            }
        }
    }

    for name in cfg.module.keys() {
        if seen.insert(name.as_str()) {
            if cfg.catalogue.is_some() {
                warn!(module = %name, "module missing from catalogue; appended");
            }
            order.push(name.clone());
        }
    }

    Ok(order)
}

fn validate_module_lists(cfg: &RawConfigFile) -> Result<()> {
    let critical = cfg.critical.as_deref().unwrap_or(&[]);
    for (list, names) in [("always_run", cfg.always_run.as_slice()), ("critical", critical)] {
        for name in names {
            if !cfg.module.contains_key(name) {
                return Err(config_error(format!(
                    "`{list}` references unknown module '{name}'"
                )));
            }
        }
    }
    Ok(())
}

fn validate_module_dependencies(cfg: &RawConfigFile) -> Result<()> {
    for (name, module) in cfg.module.iter() {
        for dep in module.after.iter() {
            if dep == name {
                return Err(config_error(format!(
                    "module '{name}' cannot depend on itself in `after`"
                )));
            }
            if !cfg.module.contains_key(dep) {
                warn!(
                    module = %name,
                    dependency = %dep,
                    "dependency is not a configured module; ignored"
                );
            }
        }
    }
    Ok(())
}

fn validate_dag(cfg: &RawConfigFile, catalogue: &[ModuleName]) -> Result<()> {
    let dependencies: DependencyMap = cfg
        .module
        .iter()
        .map(|(name, module)| (name.clone(), module.after.clone()))
        .collect();
    compile_levels(catalogue, &dependencies)?;
    Ok(())
}
