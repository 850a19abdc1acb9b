// src/engine/config.rs

use std::collections::BTreeSet;
use std::time::Duration;

use rand::Rng;

use crate::engine::EligibilityPolicy;
use crate::types::ModuleName;

/// Inclusive range a random delay is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DelayRange {
    pub min: Duration,
    pub max: Duration,
}

impl DelayRange {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self { min, max }
    }

    pub fn from_secs(min: u64, max: u64) -> Self {
        Self::new(Duration::from_secs(min), Duration::from_secs(max))
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_zero(&self) -> bool {
        self.max.is_zero()
    }

    /// Draw a delay in `[min, max]` with millisecond resolution.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let min = self.min.as_millis() as u64;
        let max = self.max.as_millis() as u64;
        if max <= min {
            return self.min;
        }
        Duration::from_millis(rng.gen_range(min..=max))
    }
}

/// Everything the executor needs to know about scheduling policy.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Accounts per batch and the cap on accounts in flight.
    pub threads: usize,
    pub max_attempts: u32,
    pub stale_after: chrono::Duration,
    pub daily_cooldown: chrono::Duration,
    pub default_cooldown: chrono::Duration,
    pub daily_modules: BTreeSet<ModuleName>,
    pub always_run: BTreeSet<ModuleName>,
    /// A failure of one of these ends the account's pass.
    pub critical: BTreeSet<ModuleName>,
    pub delay_before_start: DelayRange,
    pub delay_between_tasks: DelayRange,
    pub batch_pause: Duration,
    pub shuffle: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        let policy = EligibilityPolicy::default();
        Self {
            threads: 4,
            max_attempts: policy.max_attempts,
            stale_after: policy.stale_after,
            daily_cooldown: policy.daily_cooldown,
            default_cooldown: policy.default_cooldown,
            daily_modules: policy.daily_modules,
            always_run: BTreeSet::new(),
            critical: ["faucet".to_string()].into_iter().collect(),
            delay_before_start: DelayRange::none(),
            delay_between_tasks: DelayRange::from_secs(30, 120),
            batch_pause: Duration::from_millis(500),
            shuffle: true,
        }
    }
}

impl SchedulerConfig {
    /// Same defaults without any sleeping; used by tests and dry runs.
    pub fn without_delays(mut self) -> Self {
        self.delay_before_start = DelayRange::none();
        self.delay_between_tasks = DelayRange::none();
        self.batch_pause = Duration::ZERO;
        self
    }

    pub fn eligibility_policy(&self) -> EligibilityPolicy {
        EligibilityPolicy {
            max_attempts: self.max_attempts,
            stale_after: self.stale_after,
            daily_cooldown: self.daily_cooldown,
            default_cooldown: self.default_cooldown,
            daily_modules: self.daily_modules.clone(),
            always_run: self.always_run.clone(),
        }
    }

    pub fn is_critical(&self, module: &str) -> bool {
        self.critical.contains(module)
    }
}
