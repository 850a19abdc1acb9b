// src/engine/mod.rs

//! Scheduling engine.
//!
//! - [`eligibility`] decides whether a single task may run now.
//! - [`pass`] is the pure per-account state machine of one pass.
//! - [`executor`] is the async shell: batching, concurrency bounds,
//!   cancellation, running task bodies and persisting outcomes.
//! - [`config`] holds the explicit [`SchedulerConfig`] value.
//! - [`progress`] counts accounts finished in a pass.

pub mod config;
pub mod eligibility;
pub mod executor;
pub mod pass;
pub mod progress;

pub use config::{DelayRange, SchedulerConfig};
pub use eligibility::{Eligibility, EligibilityPolicy};
pub use executor::{Executor, GenerateSummary, PassSummary};
pub use pass::{AccountPass, AccountReport, PassCommand, PassEvent, PassPhase};
pub use progress::Progress;
