// src/engine/eligibility.rs

//! Per-task eligibility rules.
//!
//! A task may run in the current pass when any of these hold:
//! - it was never executed,
//! - it has not succeeded and still has retry budget (a failure older than
//!   `stale_after` gets a fresh budget),
//! - it is an always-run module whose cooldown has elapsed.
//!
//! The dependency gate is applied afterwards by the store, which owns the
//! materialised dependency edges.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};

use crate::store::Task;
use crate::types::{ModuleName, TaskStatus};

/// Result of evaluating one task against the policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eligibility {
    NeverExecuted,
    /// Not succeeded yet; `attempt` is the 1-based attempt about to run.
    Retry { attempt: u32 },
    /// Always-run module whose cooldown has elapsed.
    CooldownElapsed,
    /// Retry budget used up until `retry_at`.
    Exhausted { retry_at: DateTime<Utc> },
    /// Always-run module still inside its cooldown window.
    CoolingDown { remaining: Duration },
    Succeeded,
}

impl Eligibility {
    pub fn is_eligible(&self) -> bool {
        matches!(
            self,
            Eligibility::NeverExecuted | Eligibility::Retry { .. } | Eligibility::CooldownElapsed
        )
    }
}

#[derive(Debug, Clone)]
pub struct EligibilityPolicy {
    pub max_attempts: u32,
    pub stale_after: Duration,
    pub daily_cooldown: Duration,
    pub default_cooldown: Duration,
    pub daily_modules: BTreeSet<ModuleName>,
    pub always_run: BTreeSet<ModuleName>,
}

impl Default for EligibilityPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            stale_after: Duration::hours(24),
            daily_cooldown: Duration::hours(24),
            default_cooldown: Duration::hours(1),
            daily_modules: ["faucet", "onchain_gm"].iter().map(|s| s.to_string()).collect(),
            always_run: BTreeSet::new(),
        }
    }
}

impl EligibilityPolicy {
    pub fn with_always_run<I, S>(mut self, modules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<ModuleName>,
    {
        self.always_run = modules.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_always_run(&self, module: &str) -> bool {
        self.always_run.contains(module)
    }

    /// Cooldown window of an always-run module.
    pub fn cooldown_for(&self, module: &str) -> Duration {
        if self.daily_modules.contains(module) {
            self.daily_cooldown
        } else {
            self.default_cooldown
        }
    }

    /// Error count after applying staleness: a failure older than
    /// `stale_after` counts as zero.
    pub fn effective_error_count(&self, task: &Task, now: DateTime<Utc>) -> u32 {
        match task.last_executed {
            Some(last) if now - last >= self.stale_after => 0,
            _ => task.error_count,
        }
    }

    pub fn evaluate(&self, task: &Task, now: DateTime<Utc>) -> Eligibility {
        let Some(last) = task.last_executed else {
            return Eligibility::NeverExecuted;
        };

        let mut exhausted = None;
        if task.status != TaskStatus::Success {
            let errors = self.effective_error_count(task, now);
            if errors < self.max_attempts {
                return Eligibility::Retry {
                    attempt: errors + 1,
                };
            }
            exhausted = Some(last + self.stale_after);
        }

        if self.is_always_run(&task.module_name) {
            let elapsed = now - last;
            let cooldown = self.cooldown_for(&task.module_name);
            if elapsed >= cooldown {
                return Eligibility::CooldownElapsed;
            }
            if exhausted.is_none() {
                return Eligibility::CoolingDown {
                    remaining: cooldown - elapsed,
                };
            }
        }

        match exhausted {
            Some(retry_at) => Eligibility::Exhausted { retry_at },
            None => Eligibility::Succeeded,
        }
    }
}
