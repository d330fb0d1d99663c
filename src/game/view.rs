//! What the engine hands back to a transport
//!
//! Content only: texts, positions, verdicts and amounts. Rendering is the
//! transport's job.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::content::{SentencePair, WordCard};
use crate::core::error::GameError;
use crate::ledger::Outcome;

/// A collaborator call that failed without stopping the game
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PersistenceWarning {
    pub operation: &'static str,
    pub message: String,
}

impl PersistenceWarning {
    pub fn from_error(fallback_operation: &'static str, err: &GameError) -> Self {
        match err {
            GameError::PersistenceUnavailable { operation, reason } => Self {
                operation,
                message: reason.clone(),
            },
            other => Self {
                operation: fallback_operation,
                message: other.to_string(),
            },
        }
    }
}

impl fmt::Display for PersistenceWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.operation, self.message)
    }
}

/// Operation result plus any degraded-mode warnings collected on the way
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reply<T> {
    pub body: T,
    pub warnings: Vec<PersistenceWarning>,
}

impl<T> Reply<T> {
    pub fn new(body: T) -> Self {
        Self {
            body,
            warnings: Vec::new(),
        }
    }

    pub fn with_warnings(body: T, warnings: Vec<PersistenceWarning>) -> Self {
        Self { body, warnings }
    }

    pub fn is_degraded(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Reply<U> {
        Reply {
            body: f(self.body),
            warnings: self.warnings,
        }
    }
}

/// One morning card (positions are 1-based)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MorningCard {
    pub position: usize,
    pub total: usize,
    pub card: WordCard,
    pub example: SentencePair,
    pub is_last: bool,
}

/// Sentence awaiting the learner's verdict (positions are 1-based)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EveningPrompt {
    pub position: usize,
    pub total: usize,
    pub text: String,
    pub translation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum MorningStep {
    Card(MorningCard),
    /// Morning is over; this is the first evening sentence
    Evening(EveningPrompt),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DaySummary {
    pub matched: usize,
    pub disputes: usize,
    pub balance: i64,
}

/// What follows a settled item
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum EveningNext {
    Item(EveningPrompt),
    Done(DaySummary),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerdictReply {
    pub counterpart_verdict: bool,
    pub label: &'static str,
    /// `Match` or `DisputeWait`
    pub outcome: Outcome,
    /// Counterpart's suggested sentence during a dispute
    pub proposal: Option<SentencePair>,
    /// Set only when the item settled on the spot
    pub next: Option<EveningNext>,
}

/// Revealed after a check
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolutionNote {
    pub truth: bool,
    pub explanation: String,
    /// Correct sentence for an incorrect item
    pub correct: Option<SentencePair>,
    pub highlights: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisputeReply {
    pub outcome: Outcome,
    pub delta: i64,
    pub balance: i64,
    pub note: Option<ResolutionNote>,
    pub next: EveningNext,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisputeAction {
    /// Accept the counterpart's view and pay the concession
    Concede,
    /// Look it up: the one who was wrong pays
    Check,
}

impl FromStr for DisputeAction {
    type Err = GameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "concede" | "agree" => Ok(DisputeAction::Concede),
            "check" | "dictionary" => Ok(DisputeAction::Check),
            other => Err(GameError::UnknownCommand(other.to_string())),
        }
    }
}
