//! Core type definitions used throughout the codebase

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::core::error::GameError;

/// Learner identity as handed over by the transport (chat user id)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LearnerId(pub i64);

impl fmt::Display for LearnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable content-store identifier of a word
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WordId(pub i64);

/// Identifier of one audited day, generated when the day is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AuditSessionId(pub Uuid);

impl AuditSessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AuditSessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AuditSessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// CEFR level of the learner
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub enum Level {
    A1,
    #[default]
    A2,
    B1,
    B2,
}

impl Level {
    pub fn all() -> &'static [Level] {
        &[Level::A1, Level::A2, Level::B1, Level::B2]
    }

    /// Level of the words a learner at this level studies.
    ///
    /// Learners always work one level above their own; B2 is the ceiling.
    pub fn study_level(self) -> Level {
        match self {
            Level::A1 => Level::A2,
            Level::A2 => Level::B1,
            Level::B1 | Level::B2 => Level::B2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Level::A1 => "A1",
            Level::A2 => "A2",
            Level::B1 => "B1",
            Level::B2 => "B2",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = GameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A1" => Ok(Level::A1),
            "A2" => Ok(Level::A2),
            "B1" => Ok(Level::B1),
            "B2" => Ok(Level::B2),
            other => Err(GameError::UnknownCommand(format!("level '{}'", other))),
        }
    }
}

/// Stage of a learner's day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[default]
    Idle,
    Process,
    Morning,
    Evening,
    Done,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Idle => "idle",
            Stage::Process => "process",
            Stage::Morning => "morning",
            Stage::Evening => "evening",
            Stage::Done => "done",
        }
    }

    /// Stages from which a new day (or a level change) may begin
    pub fn is_between_days(self) -> bool {
        matches!(self, Stage::Idle | Stage::Process | Stage::Done)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
