//! Session registry keyed by learner
//!
//! Each learner gets a slot holding its own async mutex, so calls for one
//! learner run one at a time while different learners proceed in parallel.
//! The map lock is only held long enough to find or create a slot.

use ahash::AHashMap;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::{Arc, Mutex};

use crate::content::ContentStore;
use crate::core::error::{GameError, Result};
use crate::core::guard::bounded;
use crate::core::types::{LearnerId, Level, Stage};
use crate::game::session::{GameContext, LearnerSession};
use crate::game::view::{
    DisputeAction, DisputeReply, MorningCard, MorningStep, PersistenceWarning, Reply,
    VerdictReply,
};
use crate::ledger::{render_csv, AttemptRecord, AuditSink, LearnerStats};

type Slot = Arc<tokio::sync::Mutex<LearnerSession>>;

struct Slots {
    sessions: AHashMap<LearnerId, Slot>,
    /// Every learner's generator is derived from this one
    master: ChaCha8Rng,
}

pub struct SessionRegistry<C, A> {
    ctx: GameContext<C, A>,
    slots: Mutex<Slots>,
}

impl<C: ContentStore, A: AuditSink> SessionRegistry<C, A> {
    pub fn new(ctx: GameContext<C, A>) -> Self {
        let master = match ctx.config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        Self {
            ctx,
            slots: Mutex::new(Slots {
                sessions: AHashMap::new(),
                master,
            }),
        }
    }

    pub fn context(&self) -> &GameContext<C, A> {
        &self.ctx
    }

    fn slot(&self, learner: LearnerId) -> Result<Slot> {
        let mut slots = self
            .slots
            .lock()
            .map_err(|_| GameError::InvalidState("session registry lock poisoned".into()))?;
        if let Some(slot) = slots.sessions.get(&learner) {
            return Ok(slot.clone());
        }

        let rng = ChaCha8Rng::seed_from_u64(slots.master.gen());
        let session = LearnerSession::new(learner, self.ctx.config.default_level, rng);
        let slot = Arc::new(tokio::sync::Mutex::new(session));
        slots.sessions.insert(learner, slot.clone());
        tracing::debug!("Created session slot for learner {}", learner);
        Ok(slot)
    }

    fn existing(&self, learner: LearnerId) -> Option<Slot> {
        self.slots.lock().ok()?.sessions.get(&learner).cloned()
    }

    /// Drop a learner's slot once it is between days with nothing left to
    /// flush. Slots still referenced by an in-flight call are kept. Returns
    /// whether the slot was removed.
    pub fn release(&self, learner: LearnerId) -> bool {
        let Ok(mut slots) = self.slots.lock() else {
            return false;
        };
        let releasable = match slots.sessions.get(&learner) {
            Some(slot) if Arc::strong_count(slot) == 1 => slot
                .try_lock()
                .map(|s| s.stage().is_between_days() && s.unsynced_count() == 0)
                .unwrap_or(false),
            _ => false,
        };

        if releasable {
            slots.sessions.remove(&learner);
            tracing::debug!("Released session slot for learner {}", learner);
        }
        releasable
    }

    pub fn learner_count(&self) -> usize {
        self.slots.lock().map(|s| s.sessions.len()).unwrap_or(0)
    }

    pub async fn stage(&self, learner: LearnerId) -> Stage {
        match self.existing(learner) {
            Some(slot) => slot.lock().await.stage(),
            None => Stage::Idle,
        }
    }

    pub async fn balance(&self, learner: LearnerId) -> i64 {
        match self.existing(learner) {
            Some(slot) => slot.lock().await.balance(),
            None => 0,
        }
    }

    /// Read the learner's session under its lock
    pub async fn inspect<T>(
        &self,
        learner: LearnerId,
        f: impl FnOnce(&LearnerSession) -> T,
    ) -> Result<T> {
        let slot = self.slot(learner)?;
        let session = slot.lock().await;
        Ok(f(&session))
    }

    pub async fn show_process(&self, learner: LearnerId) -> Result<Stage> {
        let slot = self.slot(learner)?;
        let mut session = slot.lock().await;
        session.show_process()
    }

    pub async fn set_level(&self, learner: LearnerId, level: Level) -> Result<Level> {
        let slot = self.slot(learner)?;
        let mut session = slot.lock().await;
        session.set_level(level)
    }

    pub async fn start_day(&self, learner: LearnerId) -> Result<Reply<MorningCard>> {
        let slot = self.slot(learner)?;
        let mut session = slot.lock().await;
        session.start_day(&self.ctx).await
    }

    pub async fn advance_morning(&self, learner: LearnerId) -> Result<Reply<MorningStep>> {
        let slot = self.slot(learner)?;
        let mut session = slot.lock().await;
        session.advance_morning(&self.ctx).await
    }

    pub async fn render_verdict(
        &self,
        learner: LearnerId,
        verdict: bool,
    ) -> Result<Reply<VerdictReply>> {
        let slot = self.slot(learner)?;
        let mut session = slot.lock().await;
        session.render_verdict(&self.ctx, verdict).await
    }

    pub async fn resolve_dispute(
        &self,
        learner: LearnerId,
        action: DisputeAction,
    ) -> Result<Reply<DisputeReply>> {
        let slot = self.slot(learner)?;
        let mut session = slot.lock().await;
        session.resolve_dispute(&self.ctx, action).await
    }

    pub async fn flush_audit(&self, learner: LearnerId) -> Result<Reply<usize>> {
        let slot = self.slot(learner)?;
        let mut session = slot.lock().await;
        Ok(session.flush_audit(&self.ctx).await)
    }

    pub async fn reset(&self, learner: LearnerId) -> Result<Reply<()>> {
        let slot = self.slot(learner)?;
        let mut session = slot.lock().await;
        Ok(session.reset(&self.ctx).await)
    }

    /// Every recorded attempt of a learner, oldest first. Falls back to the
    /// learner's in-memory ledger when the audit sink cannot be read.
    pub async fn export(&self, learner: LearnerId) -> Result<Reply<Vec<AttemptRecord>>> {
        let exported = bounded(
            self.ctx.config.io_timeout(),
            "export_attempts",
            self.ctx.audit.export_attempts(learner),
        )
        .await;

        match exported {
            Ok(records) => Ok(Reply::new(records)),
            Err(e) => {
                let warning = PersistenceWarning::from_error("export_attempts", &e);
                tracing::warn!("Export for learner {} from memory: {}", learner, warning);
                let records = match self.existing(learner) {
                    Some(slot) => slot.lock().await.ledger().to_vec(),
                    None => Vec::new(),
                };
                Ok(Reply::with_warnings(records, vec![warning]))
            }
        }
    }

    pub async fn stats(&self, learner: LearnerId) -> Result<Reply<LearnerStats>> {
        Ok(self
            .export(learner)
            .await?
            .map(|records| LearnerStats::from_records(&records)))
    }

    pub async fn csv(&self, learner: LearnerId) -> Result<Reply<String>> {
        Ok(self
            .export(learner)
            .await?
            .map(|records| render_csv(&records)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::BankContentStore;
    use crate::core::config::GameConfig;
    use crate::ledger::MemoryAuditSink;

    fn registry(seed: u64) -> SessionRegistry<BankContentStore, MemoryAuditSink> {
        let config = GameConfig {
            seed: Some(seed),
            ..GameConfig::default()
        };
        SessionRegistry::new(GameContext::new(
            BankContentStore::builtin(),
            MemoryAuditSink::new(),
            config,
        ))
    }

    #[tokio::test]
    async fn test_unknown_learner_is_idle() {
        let registry = registry(1);
        assert_eq!(registry.stage(LearnerId(5)).await, Stage::Idle);
        assert_eq!(registry.learner_count(), 0);
    }

    #[tokio::test]
    async fn test_sessions_are_independent() {
        let registry = registry(2);
        registry.start_day(LearnerId(1)).await.unwrap();

        assert_eq!(registry.stage(LearnerId(1)).await, Stage::Morning);
        assert_eq!(registry.stage(LearnerId(2)).await, Stage::Idle);
        assert!(registry.advance_morning(LearnerId(2)).await.is_err());
        assert_eq!(registry.learner_count(), 2);
    }

    #[tokio::test]
    async fn test_default_level_applied() {
        let registry = registry(3);
        let level = registry
            .inspect(LearnerId(1), |s| s.level())
            .await
            .unwrap();
        assert_eq!(level, Level::A2);
    }

    #[tokio::test]
    async fn test_same_seed_same_deck() {
        let first = registry(4);
        let second = registry(4);
        first.start_day(LearnerId(1)).await.unwrap();
        second.start_day(LearnerId(1)).await.unwrap();

        let a = first.inspect(LearnerId(1), |s| s.deck().to_vec()).await.unwrap();
        let b = second.inspect(LearnerId(1), |s| s.deck().to_vec()).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_release_only_between_days() {
        let registry = registry(6);
        let learner = LearnerId(1);
        assert!(!registry.release(learner));

        registry.start_day(learner).await.unwrap();
        assert!(!registry.release(learner));
        assert_eq!(registry.stage(learner).await, Stage::Morning);

        registry.reset(learner).await.unwrap();
        assert!(registry.release(learner));
        assert_eq!(registry.learner_count(), 0);
        assert_eq!(registry.stage(learner).await, Stage::Idle);
    }

    #[tokio::test]
    async fn test_empty_export_gives_header_only_csv() {
        let registry = registry(5);
        let csv = registry.csv(LearnerId(1)).await.unwrap();
        assert_eq!(csv.body.lines().count(), 1);
        assert!(!csv.is_degraded());
    }
}
