//! Live audit sink backed by the hosted `sessions` / `results` tables

use serde::Serialize;

use crate::core::error::Result;
use crate::core::types::{AuditSessionId, LearnerId, Level};
use crate::ledger::{AttemptRecord, AuditSink};
use crate::remote::{eq, PostgrestClient};

#[derive(Debug, Serialize)]
struct NewSession {
    id: AuditSessionId,
    learner_id: LearnerId,
    level: Level,
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct ClosedSession {
    status: &'static str,
    final_balance: i64,
}

#[derive(Debug, Clone)]
pub struct RestAuditSink {
    client: PostgrestClient,
}

impl RestAuditSink {
    pub fn new(client: PostgrestClient) -> Self {
        Self { client }
    }
}

impl AuditSink for RestAuditSink {
    async fn open_session(&self, learner: LearnerId, level: Level) -> Result<AuditSessionId> {
        // Ids are generated here so no round trip is needed to learn them
        let id = AuditSessionId::new();
        let row = NewSession {
            id,
            learner_id: learner,
            level,
            status: "morning",
        };
        self.client.insert("sessions", &row).await?;
        Ok(id)
    }

    async fn append_attempt(&self, record: &AttemptRecord) -> Result<()> {
        self.client.insert("results", record).await
    }

    async fn close_session(&self, session: AuditSessionId, final_balance: i64) -> Result<()> {
        self.client
            .update(
                "sessions",
                &[("id", eq(session))],
                &ClosedSession {
                    status: "done",
                    final_balance,
                },
            )
            .await
    }

    async fn export_attempts(&self, learner: LearnerId) -> Result<Vec<AttemptRecord>> {
        self.client
            .select(
                "results",
                &[
                    ("learner_id", eq(learner)),
                    ("order", "created_at.asc".to_string()),
                ],
            )
            .await
    }
}
