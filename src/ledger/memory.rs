//! In-process audit sink
//!
//! Used when no database is configured. Clones share the same ledger, so a
//! registry and a test can both hold a handle.

use ahash::AHashMap;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::core::error::{GameError, Result};
use crate::core::types::{AuditSessionId, LearnerId, Level};
use crate::ledger::{AttemptRecord, AuditSink};

#[derive(Debug, Clone)]
pub struct SessionEntry {
    pub learner: LearnerId,
    pub level: Level,
    pub opened_at: DateTime<Utc>,
    /// Set once the day is closed
    pub final_balance: Option<i64>,
}

#[derive(Debug, Default)]
struct MemoryLedger {
    sessions: AHashMap<AuditSessionId, SessionEntry>,
    attempts: Vec<AttemptRecord>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryAuditSink {
    ledger: Arc<Mutex<MemoryLedger>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryLedger>> {
        self.ledger
            .lock()
            .map_err(|_| GameError::unavailable("memory ledger", "lock poisoned"))
    }

    pub fn session(&self, id: AuditSessionId) -> Option<SessionEntry> {
        self.lock().ok()?.sessions.get(&id).cloned()
    }

    /// Records appended for one day, in append order
    pub fn attempts_of(&self, id: AuditSessionId) -> Vec<AttemptRecord> {
        match self.lock() {
            Ok(ledger) => ledger
                .attempts
                .iter()
                .filter(|r| r.session_id == Some(id))
                .cloned()
                .collect(),
            Err(_) => Vec::new(),
        }
    }
}

impl AuditSink for MemoryAuditSink {
    async fn open_session(&self, learner: LearnerId, level: Level) -> Result<AuditSessionId> {
        let id = AuditSessionId::new();
        self.lock()?.sessions.insert(
            id,
            SessionEntry {
                learner,
                level,
                opened_at: Utc::now(),
                final_balance: None,
            },
        );
        Ok(id)
    }

    async fn append_attempt(&self, record: &AttemptRecord) -> Result<()> {
        let mut ledger = self.lock()?;
        let known = record
            .session_id
            .is_some_and(|id| ledger.sessions.contains_key(&id));
        if !known {
            return Err(GameError::InvalidState(format!(
                "attempt for unknown session {:?}",
                record.session_id
            )));
        }
        ledger.attempts.push(record.clone());
        Ok(())
    }

    async fn close_session(&self, session: AuditSessionId, final_balance: i64) -> Result<()> {
        let mut ledger = self.lock()?;
        let entry = ledger
            .sessions
            .get_mut(&session)
            .ok_or_else(|| GameError::InvalidState(format!("unknown session {}", session)))?;
        entry.final_balance = Some(final_balance);
        Ok(())
    }

    async fn export_attempts(&self, learner: LearnerId) -> Result<Vec<AttemptRecord>> {
        let ledger = self.lock()?;
        let mut records: Vec<AttemptRecord> = ledger
            .attempts
            .iter()
            .filter(|r| r.learner_id == learner)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }
}
