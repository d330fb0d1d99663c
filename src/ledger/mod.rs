//! Ledger and audit trail
//!
//! Every judged evening item ends up as one append-only [`AttemptRecord`].
//! The session's balance is, at all times, the sum of the deltas of its
//! records. Sinks receive records fire-and-forget; the engine never waits
//! on them for longer than the configured timeout.

pub mod memory;
pub mod report;
pub mod rest;

pub use memory::MemoryAuditSink;
pub use report::{render_csv, LearnerStats};
pub use rest::RestAuditSink;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;

use crate::core::config::{AuditSource, GameConfig};
use crate::core::error::{GameError, Result};
use crate::core::types::{AuditSessionId, LearnerId, Level};
use crate::remote::PostgrestClient;

/// How a judged item was settled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Learner and counterpart agreed
    Match,
    /// Disagreement awaiting concede/check; never persisted
    DisputeWait,
    DisputeConcede,
    DisputeCheckWin,
    DisputeCheckLose,
}

impl Outcome {
    pub fn as_tag(self) -> &'static str {
        match self {
            Outcome::Match => "match",
            Outcome::DisputeWait => "dispute_wait",
            Outcome::DisputeConcede => "dispute_concede",
            Outcome::DisputeCheckWin => "dispute_check_win",
            Outcome::DisputeCheckLose => "dispute_check_lose",
        }
    }

    pub fn is_dispute(self) -> bool {
        !matches!(self, Outcome::Match)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_tag())
    }
}

/// One settled evening item. Never mutated once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub session_id: Option<AuditSessionId>,
    pub learner_id: LearnerId,
    pub level: Level,
    pub item_index: usize,
    /// Deck word the item was built for
    pub word: String,
    pub shown_text: String,
    pub shown_translation: String,
    pub truth: bool,
    pub learner_verdict: bool,
    pub counterpart_verdict: bool,
    pub outcome: Outcome,
    pub delta: i64,
    pub balance_after: i64,
    pub created_at: DateTime<Utc>,
}

/// Durable, append-only log of days and their attempts
pub trait AuditSink: Send + Sync {
    fn open_session(
        &self,
        learner: LearnerId,
        level: Level,
    ) -> impl Future<Output = Result<AuditSessionId>> + Send;

    fn append_attempt(&self, record: &AttemptRecord) -> impl Future<Output = Result<()>> + Send;

    fn close_session(
        &self,
        session: AuditSessionId,
        final_balance: i64,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Every record of a learner, oldest first
    fn export_attempts(
        &self,
        learner: LearnerId,
    ) -> impl Future<Output = Result<Vec<AttemptRecord>>> + Send;
}

/// Audit sink selected at startup
#[derive(Debug, Clone)]
pub enum AuditBackend {
    Memory(MemoryAuditSink),
    Rest(RestAuditSink),
}

impl AuditBackend {
    pub fn from_config(config: &GameConfig) -> Result<Self> {
        match config.audit.backend {
            AuditSource::Memory => Ok(AuditBackend::Memory(MemoryAuditSink::new())),
            AuditSource::Rest => {
                let rest = config.rest.as_ref().ok_or_else(|| {
                    GameError::Config("audit backend 'rest' needs [rest]".into())
                })?;
                Ok(AuditBackend::Rest(RestAuditSink::new(PostgrestClient::new(
                    &rest.url,
                    &rest.api_key,
                ))))
            }
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            AuditBackend::Memory(_) => "memory",
            AuditBackend::Rest(_) => "rest",
        }
    }
}

impl AuditSink for AuditBackend {
    async fn open_session(&self, learner: LearnerId, level: Level) -> Result<AuditSessionId> {
        match self {
            AuditBackend::Memory(sink) => sink.open_session(learner, level).await,
            AuditBackend::Rest(sink) => sink.open_session(learner, level).await,
        }
    }

    async fn append_attempt(&self, record: &AttemptRecord) -> Result<()> {
        match self {
            AuditBackend::Memory(sink) => sink.append_attempt(record).await,
            AuditBackend::Rest(sink) => sink.append_attempt(record).await,
        }
    }

    async fn close_session(&self, session: AuditSessionId, final_balance: i64) -> Result<()> {
        match self {
            AuditBackend::Memory(sink) => sink.close_session(session, final_balance).await,
            AuditBackend::Rest(sink) => sink.close_session(session, final_balance).await,
        }
    }

    async fn export_attempts(&self, learner: LearnerId) -> Result<Vec<AttemptRecord>> {
        match self {
            AuditBackend::Memory(sink) => sink.export_attempts(learner).await,
            AuditBackend::Rest(sink) => sink.export_attempts(learner).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_tags() {
        assert_eq!(Outcome::Match.as_tag(), "match");
        assert_eq!(Outcome::DisputeCheckWin.to_string(), "dispute_check_win");
        assert_eq!(
            serde_json::to_string(&Outcome::DisputeConcede).unwrap(),
            "\"dispute_concede\""
        );
    }

    #[test]
    fn test_only_match_is_not_a_dispute() {
        assert!(!Outcome::Match.is_dispute());
        assert!(Outcome::DisputeWait.is_dispute());
        assert!(Outcome::DisputeCheckLose.is_dispute());
    }

    #[test]
    fn test_memory_backend_by_default() {
        let backend = AuditBackend::from_config(&GameConfig::default()).unwrap();
        assert_eq!(backend.describe(), "memory");
    }
}
