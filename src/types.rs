// src/types.rs

//! Small shared enums persisted as lowercase strings.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Canonical module name type used throughout the engine.
pub type ModuleName = String;

/// Persisted execution status of one task row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Success,
    Failed,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Success => "success",
            TaskStatus::Failed => "failed",
        }
    }
}

impl Default for TaskStatus {
    fn default() -> Self {
        TaskStatus::Pending
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(TaskStatus::Pending),
            "success" => Ok(TaskStatus::Success),
            "failed" => Ok(TaskStatus::Failed),
            other => Err(format!(
                "invalid task status: {other} (expected \"pending\", \"success\" or \"failed\")"
            )),
        }
    }
}

/// Persisted status of a whole route.
///
/// A route is `Completed` once every one of its tasks is `success`; it drops
/// back to `Pending` when new modules are appended or a re-armed task fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteStatus {
    Pending,
    Completed,
}

impl RouteStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RouteStatus::Pending => "pending",
            RouteStatus::Completed => "completed",
        }
    }
}

impl Default for RouteStatus {
    fn default() -> Self {
        RouteStatus::Pending
    }
}

impl fmt::Display for RouteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RouteStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(RouteStatus::Pending),
            "completed" => Ok(RouteStatus::Completed),
            other => Err(format!(
                "invalid route status: {other} (expected \"pending\" or \"completed\")"
            )),
        }
    }
}

/// Outcome reported by a task body, persisted verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Success(String),
    Failed(String),
}

impl TaskOutcome {
    pub fn from_parts(success: bool, message: impl Into<String>) -> Self {
        if success {
            TaskOutcome::Success(message.into())
        } else {
            TaskOutcome::Failed(message.into())
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Success(_))
    }

    pub fn status(&self) -> TaskStatus {
        match self {
            TaskOutcome::Success(_) => TaskStatus::Success,
            TaskOutcome::Failed(_) => TaskStatus::Failed,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            TaskOutcome::Success(m) | TaskOutcome::Failed(m) => m,
        }
    }
}
