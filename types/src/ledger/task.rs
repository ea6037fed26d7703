//! Claimable one-time tasks.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A one-time task a user can complete for a reward.
///
/// The set is closed: unknown task names are rejected at the parsing boundary
/// so the rest of the system never sees a free-form task string.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Task {
    Instagram,
    YouTube,
    Telegram,
}

impl Task {
    /// All claimable tasks, in presentation order.
    pub const ALL: [Task; 3] = [Task::Instagram, Task::YouTube, Task::Telegram];

    /// Canonical task name as it appears in persisted state and user messages.
    pub fn name(&self) -> &'static str {
        match self {
            Task::Instagram => "Instagram",
            Task::YouTube => "YouTube",
            Task::Telegram => "Telegram",
        }
    }

    /// Comma-separated list of all task names, for error messages and help text.
    pub fn list() -> String {
        Task::ALL
            .iter()
            .map(|task| task.name())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when a task name does not match any claimable task.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("unknown task {0:?} (available: {available})", available = Task::list())]
pub struct UnknownTask(pub String);

impl FromStr for Task {
    type Err = UnknownTask;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "Instagram" => Ok(Task::Instagram),
            "YouTube" => Ok(Task::YouTube),
            "Telegram" => Ok(Task::Telegram),
            other => Err(UnknownTask(other.to_string())),
        }
    }
}
