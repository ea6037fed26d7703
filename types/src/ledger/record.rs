//! Per-user ledger records and the table that holds them.

use crate::ledger::{LevelUp, Task, LEVEL_UP_REFERRALS, MAX_LEVEL};
use serde::de::{MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;

/// All registered users, keyed by opaque user id.
///
/// Ordered so that serialized state and bulk listings are deterministic.
pub type UserTable = BTreeMap<String, UserRecord>;

/// Ledger state for a single registered user.
///
/// Field names on the wire match the persisted JSON layout, which predates
/// this implementation and must keep loading old files.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Current coin balance.
    #[serde(default)]
    pub coins: u64,

    /// Lifetime count of successful referrals made by this user.
    #[serde(rename = "referrals", default)]
    pub referral_count: u64,

    /// Current level, starting at 1.
    #[serde(default = "default_level")]
    pub level: u32,

    /// Badges earned through level-ups, in the order they were earned.
    #[serde(default)]
    pub badges: Vec<String>,

    /// Tasks this user has already claimed.
    ///
    /// Serialized as a sorted list of task names. Older files stored a map of
    /// task name to a completion flag, which is still accepted on read.
    #[serde(
        rename = "tasks",
        default,
        deserialize_with = "deserialize_task_set"
    )]
    pub completed_tasks: BTreeSet<Task>,
}

fn default_level() -> u32 {
    1
}

impl UserRecord {
    /// A freshly registered user: zero balance, level 1, no badges or tasks.
    pub fn new() -> Self {
        Self {
            coins: 0,
            referral_count: 0,
            level: 1,
            badges: Vec::new(),
            completed_tasks: BTreeSet::new(),
        }
    }

    /// Whether this user has already claimed the given task.
    pub fn has_completed(&self, task: Task) -> bool {
        self.completed_tasks.contains(&task)
    }

    /// Advance one level if a level-up is due.
    ///
    /// A level-up is due once the referral count has reached
    /// [`LEVEL_UP_REFERRALS`] and the level is still below [`MAX_LEVEL`]. At
    /// most one level is gained per call, and the matching badge is appended.
    pub fn try_level_up(&mut self) -> Option<LevelUp> {
        if self.referral_count < LEVEL_UP_REFERRALS || self.level >= MAX_LEVEL {
            return None;
        }
        self.level += 1;
        let badge = format!("Level {}", self.level);
        self.badges.push(badge.clone());
        Some(LevelUp {
            level: self.level,
            badge,
        })
    }

    /// Check the structural invariants every stored record must satisfy.
    pub fn validate(&self) -> Result<(), RecordError> {
        if self.level < 1 || self.level > MAX_LEVEL {
            return Err(RecordError::LevelOutOfRange {
                level: self.level,
                max: MAX_LEVEL,
            });
        }
        let expected_badges = (self.level - 1) as usize;
        if self.badges.len() != expected_badges {
            return Err(RecordError::BadgeMismatch {
                level: self.level,
                badges: self.badges.len(),
            });
        }
        Ok(())
    }
}

impl Default for UserRecord {
    fn default() -> Self {
        Self::new()
    }
}

/// Violation of a stored record's structural invariants.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("level {level} out of range 1..={max}")]
    LevelOutOfRange { level: u32, max: u32 },
    #[error("badge count {badges} does not match level {level}")]
    BadgeMismatch { level: u32, badges: usize },
}

/// Accept both the current list form and the legacy map form of `tasks`.
fn deserialize_task_set<'de, D>(deserializer: D) -> Result<BTreeSet<Task>, D::Error>
where
    D: Deserializer<'de>,
{
    struct TaskSetVisitor;

    impl<'de> Visitor<'de> for TaskSetVisitor {
        type Value = BTreeSet<Task>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a list of task names or a map of task name to completion flag")
        }

        fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
        where
            A: SeqAccess<'de>,
        {
            let mut tasks = BTreeSet::new();
            while let Some(task) = seq.next_element::<Task>()? {
                tasks.insert(task);
            }
            Ok(tasks)
        }

        fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut tasks = BTreeSet::new();
            while let Some((task, completed)) = map.next_entry::<Task, bool>()? {
                if completed {
                    tasks.insert(task);
                }
            }
            Ok(tasks)
        }
    }

    deserializer.deserialize_any(TaskSetVisitor)
}
