//! Per-learner session engine
//!
//! A learner's day runs `idle → process → morning → evening → done`.
//! Every operation checks the stage first and gathers whatever it needs from
//! the collaborators before touching any state, so a rejected or failed
//! request leaves the session exactly as it was.
//!
//! Collaborator calls are bounded by `io_timeout_ms`. A failed call degrades
//! the day (emergency content, missing audit rows) and is reported back as a
//! [`PersistenceWarning`]; it never stops the game.

use ahash::AHashMap;
use chrono::Utc;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use std::collections::{BTreeSet, VecDeque};

use crate::content::{
    BankContentStore, ContentStore, DeckDraw, Example, ExamplePools, SentencePair, WordCard,
};
use crate::core::config::GameConfig;
use crate::core::error::{GameError, Result};
use crate::core::guard::bounded;
use crate::core::types::{AuditSessionId, LearnerId, Level, Stage, WordId};
use crate::game::distractor::make_distractor;
use crate::game::judgment::Counterpart;
use crate::game::queue::{build_evening_queue, EveningItem, WordMaterial};
use crate::game::view::{
    DaySummary, DisputeAction, DisputeReply, EveningNext, EveningPrompt, MorningCard, MorningStep,
    PersistenceWarning, Reply, ResolutionNote, VerdictReply,
};
use crate::ledger::{AttemptRecord, AuditSink, Outcome};

/// Collaborators shared by every session
#[derive(Debug, Clone)]
pub struct GameContext<C, A> {
    pub content: C,
    pub audit: A,
    /// Static bank used when the configured store fails or comes back empty
    pub emergency: BankContentStore,
    pub config: GameConfig,
}

impl<C: ContentStore, A: AuditSink> GameContext<C, A> {
    pub fn new(content: C, audit: A, config: GameConfig) -> Self {
        Self {
            content,
            audit,
            emergency: BankContentStore::builtin(),
            config,
        }
    }

    pub fn counterpart(&self) -> Counterpart {
        Counterpart::new(self.config.counterpart_agree_probability)
    }
}

/// Where today's deck came from; word ids are only valid for that store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeckSource {
    #[default]
    Configured,
    Emergency,
}

/// Open disagreement between learner and counterpart
#[derive(Debug, Clone, PartialEq)]
pub struct DisputeContext {
    pub item_index: usize,
    pub shown_text: String,
    pub shown_translation: String,
    pub truth: bool,
    pub learner_verdict: bool,
    pub counterpart_verdict: bool,
    pub proposal: Option<SentencePair>,
}

fn warn_degraded(warnings: &mut Vec<PersistenceWarning>, operation: &'static str, err: &GameError) {
    let warning = PersistenceWarning::from_error(operation, err);
    tracing::warn!("Continuing without {}", warning);
    warnings.push(warning);
}

/// One correct example for a card: configured store, then the emergency
/// bank, then a placeholder
async fn correct_example<C: ContentStore, A: AuditSink>(
    ctx: &GameContext<C, A>,
    source: DeckSource,
    word_id: Option<WordId>,
    card: &WordCard,
    excluding: &BTreeSet<String>,
    seed: u64,
    warnings: &mut Vec<PersistenceWarning>,
) -> Example {
    let stored = match (source, word_id) {
        (_, None) => None,
        (DeckSource::Emergency, Some(id)) => ctx
            .emergency
            .pick_correct_example(id, excluding, seed)
            .await
            .ok()
            .flatten(),
        (DeckSource::Configured, Some(id)) => match bounded(
            ctx.config.io_timeout(),
            "pick_correct_example",
            ctx.content.pick_correct_example(id, excluding, seed),
        )
        .await
        {
            Ok(example) => example,
            Err(e) => {
                warn_degraded(warnings, "pick_correct_example", &e);
                None
            }
        },
    };

    stored
        .or_else(|| ctx.emergency.emergency_example(&card.word))
        .unwrap_or_else(|| Example::placeholder(card))
}

async fn example_pools<C: ContentStore, A: AuditSink>(
    ctx: &GameContext<C, A>,
    source: DeckSource,
    word_id: Option<WordId>,
    warnings: &mut Vec<PersistenceWarning>,
) -> ExamplePools {
    match (source, word_id) {
        (_, None) => ExamplePools::default(),
        (DeckSource::Emergency, Some(id)) => ctx
            .emergency
            .pick_example_pools(id)
            .await
            .unwrap_or_default(),
        (DeckSource::Configured, Some(id)) => match bounded(
            ctx.config.io_timeout(),
            "pick_example_pools",
            ctx.content.pick_example_pools(id),
        )
        .await
        {
            Ok(pools) => pools,
            Err(e) => {
                warn_degraded(warnings, "pick_example_pools", &e);
                ExamplePools::default()
            }
        },
    }
}

/// State of one learner's game
#[derive(Debug, Clone)]
pub struct LearnerSession {
    learner: LearnerId,
    stage: Stage,
    level: Level,

    deck: Vec<WordCard>,
    word_ids: AHashMap<String, WordId>,
    deck_source: DeckSource,

    morning_index: usize,
    morning_shown: BTreeSet<String>,

    evening_queue: Vec<EveningItem>,
    evening_index: usize,
    pending: Option<DisputeContext>,

    balance: i64,
    audit_id: Option<AuditSessionId>,
    /// Today's settled items, in settlement order
    ledger: Vec<AttemptRecord>,
    /// Settled items the audit sink has not accepted yet
    unsynced: VecDeque<AttemptRecord>,

    rng: ChaCha8Rng,
}

impl LearnerSession {
    pub fn new(learner: LearnerId, level: Level, rng: ChaCha8Rng) -> Self {
        Self {
            learner,
            stage: Stage::Idle,
            level,
            deck: Vec::new(),
            word_ids: AHashMap::new(),
            deck_source: DeckSource::default(),
            morning_index: 0,
            morning_shown: BTreeSet::new(),
            evening_queue: Vec::new(),
            evening_index: 0,
            pending: None,
            balance: 0,
            audit_id: None,
            ledger: Vec::new(),
            unsynced: VecDeque::new(),
            rng,
        }
    }

    // === ACCESSORS ===

    pub fn learner(&self) -> LearnerId {
        self.learner
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn balance(&self) -> i64 {
        self.balance
    }

    pub fn deck(&self) -> &[WordCard] {
        &self.deck
    }

    pub fn deck_source(&self) -> DeckSource {
        self.deck_source
    }

    pub fn morning_index(&self) -> usize {
        self.morning_index
    }

    pub fn evening_queue(&self) -> &[EveningItem] {
        &self.evening_queue
    }

    pub fn evening_index(&self) -> usize {
        self.evening_index
    }

    /// Item awaiting a verdict or a dispute resolution
    pub fn current_item(&self) -> Option<&EveningItem> {
        if self.stage == Stage::Evening {
            self.evening_queue.get(self.evening_index)
        } else {
            None
        }
    }

    pub fn pending_dispute(&self) -> Option<&DisputeContext> {
        self.pending.as_ref()
    }

    pub fn audit_id(&self) -> Option<AuditSessionId> {
        self.audit_id
    }

    pub fn ledger(&self) -> &[AttemptRecord] {
        &self.ledger
    }

    pub fn unsynced_count(&self) -> usize {
        self.unsynced.len()
    }

    pub fn summary(&self) -> DaySummary {
        let matched = self
            .ledger
            .iter()
            .filter(|r| r.outcome == Outcome::Match)
            .count();
        DaySummary {
            matched,
            disputes: self.ledger.len() - matched,
            balance: self.balance,
        }
    }

    fn require(&self, operation: &'static str, accepted: impl Fn(Stage) -> bool) -> Result<()> {
        if accepted(self.stage) {
            Ok(())
        } else {
            Err(GameError::WrongStage {
                operation,
                stage: self.stage,
            })
        }
    }

    fn enter(&mut self, stage: Stage) {
        tracing::debug!("Learner {}: {} -> {}", self.learner, self.stage, stage);
        self.stage = stage;
    }

    // === BETWEEN DAYS ===

    /// Show how the day works before a level is chosen
    pub fn show_process(&mut self) -> Result<Stage> {
        self.require("show_process", Stage::is_between_days)?;
        self.enter(Stage::Process);
        Ok(self.stage)
    }

    pub fn set_level(&mut self, level: Level) -> Result<Level> {
        self.require("set_level", Stage::is_between_days)?;
        self.level = level;
        Ok(level)
    }

    // === MORNING ===

    /// Draw a fresh deck and show its first card
    pub async fn start_day<C: ContentStore, A: AuditSink>(
        &mut self,
        ctx: &GameContext<C, A>,
    ) -> Result<Reply<MorningCard>> {
        self.require("start_day", Stage::is_between_days)?;
        let mut warnings = Vec::new();

        let study_level = self.level.study_level();
        let category = ctx.config.category.as_str();
        let count = ctx.config.deck_size;

        let seed = self.rng.gen();
        let configured = match bounded(
            ctx.config.io_timeout(),
            "pick_deck",
            ctx.content.pick_deck(study_level, category, count, seed),
        )
        .await
        {
            Ok(draw) => draw,
            Err(e) => {
                warn_degraded(&mut warnings, "pick_deck", &e);
                DeckDraw::default()
            }
        };

        let (draw, source) = if configured.is_empty() {
            tracing::info!(
                "No {} {} words from the configured store, using the emergency bank",
                study_level,
                category
            );
            let seed = self.rng.gen();
            let emergency = ctx
                .emergency
                .pick_deck(study_level, category, count, seed)
                .await?;
            (emergency, DeckSource::Emergency)
        } else {
            (configured, DeckSource::Configured)
        };

        let first = draw.cards.first().cloned().ok_or_else(|| {
            GameError::NoContentAvailable(format!("no {} {} words", study_level, category))
        })?;

        let seed = self.rng.gen();
        let example = correct_example(
            ctx,
            source,
            draw.id_of(&first.word),
            &first,
            &BTreeSet::new(),
            seed,
            &mut warnings,
        )
        .await;

        let audit_id = match bounded(
            ctx.config.io_timeout(),
            "open_session",
            ctx.audit.open_session(self.learner, self.level),
        )
        .await
        {
            Ok(id) => Some(id),
            Err(e) => {
                warn_degraded(&mut warnings, "open_session", &e);
                None
            }
        };

        self.deck = draw.cards;
        self.word_ids = draw.word_ids;
        self.deck_source = source;
        self.morning_index = 0;
        self.morning_shown = BTreeSet::from([example.text.clone()]);
        self.evening_queue.clear();
        self.evening_index = 0;
        self.pending = None;
        self.balance = 0;
        self.ledger.clear();
        self.audit_id = audit_id;
        self.enter(Stage::Morning);

        tracing::info!(
            "Learner {} started a {} day with {} words",
            self.learner,
            self.level,
            self.deck.len()
        );

        Ok(Reply::with_warnings(
            self.morning_card(0, first, example.pair()),
            warnings,
        ))
    }

    fn morning_card(&self, index: usize, card: WordCard, example: SentencePair) -> MorningCard {
        MorningCard {
            position: index + 1,
            total: self.deck.len(),
            card,
            example,
            is_last: index + 1 == self.deck.len(),
        }
    }

    /// Next card, or the first evening sentence once the deck is exhausted
    pub async fn advance_morning<C: ContentStore, A: AuditSink>(
        &mut self,
        ctx: &GameContext<C, A>,
    ) -> Result<Reply<MorningStep>> {
        self.require("advance_morning", |s| s == Stage::Morning)?;
        let mut warnings = Vec::new();
        let next = self.morning_index + 1;

        if let Some(card) = self.deck.get(next).cloned() {
            let seed = self.rng.gen();
            let example = correct_example(
                ctx,
                self.deck_source,
                self.word_ids.get(&card.word).copied(),
                &card,
                &self.morning_shown,
                seed,
                &mut warnings,
            )
            .await;

            self.morning_index = next;
            self.morning_shown.insert(example.text.clone());
            let body = MorningStep::Card(self.morning_card(next, card, example.pair()));
            return Ok(Reply::with_warnings(body, warnings));
        }

        let mut materials = Vec::with_capacity(self.deck.len());
        for card in &self.deck {
            let pools = example_pools(
                ctx,
                self.deck_source,
                self.word_ids.get(&card.word).copied(),
                &mut warnings,
            )
            .await;
            materials.push(WordMaterial {
                card: card.clone(),
                pools,
            });
        }

        let queue =
            build_evening_queue(&materials, &self.morning_shown, &ctx.emergency, &mut self.rng);
        if queue.is_empty() {
            return Err(GameError::InvalidState("evening queue is empty".into()));
        }

        self.morning_index = self.deck.len();
        self.evening_queue = queue;
        self.evening_index = 0;
        self.pending = None;
        self.enter(Stage::Evening);

        let prompt = self
            .prompt()
            .ok_or_else(|| GameError::InvalidState("evening queue is empty".into()))?;
        Ok(Reply::with_warnings(MorningStep::Evening(prompt), warnings))
    }

    // === EVENING ===

    fn prompt(&self) -> Option<EveningPrompt> {
        let item = self.evening_queue.get(self.evening_index)?;
        Some(EveningPrompt {
            position: self.evening_index + 1,
            total: self.evening_queue.len(),
            text: item.example.text.clone(),
            translation: item.example.translation.clone(),
        })
    }

    fn correct_sentence<C, A>(ctx: &GameContext<C, A>, item: &EveningItem) -> Option<SentencePair> {
        item.example
            .proposal
            .clone()
            .or_else(|| ctx.emergency.emergency_example(&item.word).map(|e| e.pair()))
    }

    /// The counterpart's suggested sentence when it disagrees with the learner
    fn counterpart_proposal<C, A>(
        &mut self,
        ctx: &GameContext<C, A>,
        item: &EveningItem,
        counterpart_verdict: bool,
    ) -> Option<SentencePair> {
        match (counterpart_verdict, item.truth()) {
            // Wrongly calls a correct sentence wrong: offers a bogus "fix"
            (false, true) => {
                let deck_words: Vec<String> = self.deck.iter().map(|c| c.word.clone()).collect();
                make_distractor(&item.example.pair(), &item.word, &deck_words, &mut self.rng)
                    .map(|e| e.pair())
            }
            (_, false) => Self::correct_sentence(ctx, item),
            (true, true) => None,
        }
    }

    /// Judge the current sentence
    pub async fn render_verdict<C: ContentStore, A: AuditSink>(
        &mut self,
        ctx: &GameContext<C, A>,
        learner_verdict: bool,
    ) -> Result<Reply<VerdictReply>> {
        self.require("render_verdict", |s| s == Stage::Evening)?;
        if self.pending.is_some() {
            return Err(GameError::InvalidState(
                "a dispute is waiting for concede or check".into(),
            ));
        }
        let item = self
            .evening_queue
            .get(self.evening_index)
            .cloned()
            .ok_or_else(|| GameError::InvalidState("no evening item left".into()))?;

        let truth = item.truth();
        let counterpart_verdict = ctx.counterpart().judge(truth, learner_verdict, &mut self.rng);
        let label = Counterpart::label(counterpart_verdict);

        if counterpart_verdict == learner_verdict {
            let mut warnings = Vec::new();
            let next = self
                .settle(
                    ctx,
                    &item,
                    learner_verdict,
                    counterpart_verdict,
                    Outcome::Match,
                    0,
                    &mut warnings,
                )
                .await;
            let body = VerdictReply {
                counterpart_verdict,
                label,
                outcome: Outcome::Match,
                proposal: None,
                next: Some(next),
            };
            return Ok(Reply::with_warnings(body, warnings));
        }

        let proposal = self.counterpart_proposal(ctx, &item, counterpart_verdict);
        self.pending = Some(DisputeContext {
            item_index: self.evening_index,
            shown_text: item.example.text.clone(),
            shown_translation: item.example.translation.clone(),
            truth,
            learner_verdict,
            counterpart_verdict,
            proposal: proposal.clone(),
        });
        tracing::debug!(
            "Learner {}: dispute on item {} (learner {}, counterpart {})",
            self.learner,
            self.evening_index + 1,
            learner_verdict,
            counterpart_verdict
        );

        Ok(Reply::new(VerdictReply {
            counterpart_verdict,
            label,
            outcome: Outcome::DisputeWait,
            proposal,
            next: None,
        }))
    }

    /// Settle the open dispute
    pub async fn resolve_dispute<C: ContentStore, A: AuditSink>(
        &mut self,
        ctx: &GameContext<C, A>,
        action: DisputeAction,
    ) -> Result<Reply<DisputeReply>> {
        self.require("resolve_dispute", |s| s == Stage::Evening)?;
        let dispute = self
            .pending
            .clone()
            .ok_or_else(|| GameError::InvalidState("no pending dispute".into()))?;
        let item = self
            .evening_queue
            .get(dispute.item_index)
            .cloned()
            .ok_or_else(|| GameError::InvalidState("dispute item is gone".into()))?;

        let stakes = ctx.config.stakes;
        let (outcome, delta, note) = match action {
            DisputeAction::Concede => (Outcome::DisputeConcede, -stakes.concede, None),
            DisputeAction::Check => {
                let (outcome, delta) = if dispute.learner_verdict == dispute.truth {
                    (Outcome::DisputeCheckWin, stakes.check_win)
                } else {
                    (Outcome::DisputeCheckLose, -stakes.check_lose)
                };
                (outcome, delta, Some(Self::resolution_note(ctx, &item)))
            }
        };

        self.pending = None;
        let mut warnings = Vec::new();
        let next = self
            .settle(
                ctx,
                &item,
                dispute.learner_verdict,
                dispute.counterpart_verdict,
                outcome,
                delta,
                &mut warnings,
            )
            .await;

        Ok(Reply::with_warnings(
            DisputeReply {
                outcome,
                delta,
                balance: self.balance,
                note,
                next,
            },
            warnings,
        ))
    }

    fn resolution_note<C, A>(ctx: &GameContext<C, A>, item: &EveningItem) -> ResolutionNote {
        let truth = item.truth();
        let explanation = item.example.explanation.clone().unwrap_or_else(|| {
            if truth {
                "The sentence is correct as written.".to_string()
            } else {
                "The sentence contains an error.".to_string()
            }
        });

        ResolutionNote {
            truth,
            explanation,
            correct: if truth {
                None
            } else {
                Self::correct_sentence(ctx, item)
            },
            highlights: if truth {
                Vec::new()
            } else {
                item.example.error_highlight.iter().cloned().collect()
            },
        }
    }

    /// Apply a settled item to the ledger, advance the queue, then persist.
    /// State is committed before the write so a failed write is never
    /// retried by replaying the item.
    #[allow(clippy::too_many_arguments)]
    async fn settle<C: ContentStore, A: AuditSink>(
        &mut self,
        ctx: &GameContext<C, A>,
        item: &EveningItem,
        learner_verdict: bool,
        counterpart_verdict: bool,
        outcome: Outcome,
        delta: i64,
        warnings: &mut Vec<PersistenceWarning>,
    ) -> EveningNext {
        self.balance += delta;
        let record = AttemptRecord {
            session_id: self.audit_id,
            learner_id: self.learner,
            level: self.level,
            item_index: self.evening_index,
            word: item.word.clone(),
            shown_text: item.example.text.clone(),
            shown_translation: item.example.translation.clone(),
            truth: item.truth(),
            learner_verdict,
            counterpart_verdict,
            outcome,
            delta,
            balance_after: self.balance,
            created_at: Utc::now(),
        };
        self.ledger.push(record.clone());
        self.evening_index += 1;

        let finished = self.evening_index >= self.evening_queue.len();
        if finished {
            self.enter(Stage::Done);
        }

        self.persist_attempt(ctx, record, warnings).await;

        if !finished {
            if let Some(prompt) = self.prompt() {
                return EveningNext::Item(prompt);
            }
        }

        if let Some(id) = self.audit_id {
            if let Err(e) = bounded(
                ctx.config.io_timeout(),
                "close_session",
                ctx.audit.close_session(id, self.balance),
            )
            .await
            {
                warn_degraded(warnings, "close_session", &e);
            }
        }

        let summary = self.summary();
        tracing::info!(
            "Learner {} finished the day: {} matched, {} disputes, balance {}",
            self.learner,
            summary.matched,
            summary.disputes,
            summary.balance
        );
        EveningNext::Done(summary)
    }

    async fn persist_attempt<C: ContentStore, A: AuditSink>(
        &mut self,
        ctx: &GameContext<C, A>,
        record: AttemptRecord,
        warnings: &mut Vec<PersistenceWarning>,
    ) {
        if self.audit_id.is_none() {
            tracing::debug!("Learner {}: no audit session, attempt kept in memory", self.learner);
            return;
        }

        // Buffered first so an abandoned write is still retried by flush_audit
        self.unsynced.push_back(record.clone());
        if self.unsynced.len() > ctx.config.max_unsynced_attempts {
            if let Some(dropped) = self.unsynced.pop_front() {
                tracing::warn!(
                    "Learner {}: unsynced buffer full, dropping pending write of item {}",
                    self.learner,
                    dropped.item_index
                );
            }
        }
        let written = bounded(
            ctx.config.io_timeout(),
            "append_attempt",
            ctx.audit.append_attempt(&record),
        )
        .await;

        match written {
            Ok(()) => {
                self.unsynced.pop_back();
            }
            Err(e) => warn_degraded(warnings, "append_attempt", &e),
        }
    }

    // === ANY STAGE ===

    /// Retry attempt writes the audit sink has not accepted; returns how many
    /// went through. Stops at the first failure to keep the write order.
    pub async fn flush_audit<C: ContentStore, A: AuditSink>(
        &mut self,
        ctx: &GameContext<C, A>,
    ) -> Reply<usize> {
        let mut warnings = Vec::new();
        let mut flushed = 0;

        while let Some(record) = self.unsynced.front().cloned() {
            let written = bounded(
                ctx.config.io_timeout(),
                "append_attempt",
                ctx.audit.append_attempt(&record),
            )
            .await;

            match written {
                Ok(()) => {
                    self.unsynced.pop_front();
                    flushed += 1;
                }
                Err(e) => {
                    warn_degraded(&mut warnings, "append_attempt", &e);
                    break;
                }
            }
        }

        if flushed > 0 {
            tracing::info!(
                "Learner {}: flushed {} attempts, {} still pending",
                self.learner,
                flushed,
                self.unsynced.len()
            );
        }
        Reply::with_warnings(flushed, warnings)
    }

    /// Abandon the current day and go back to idle
    pub async fn reset<C: ContentStore, A: AuditSink>(
        &mut self,
        ctx: &GameContext<C, A>,
    ) -> Reply<()> {
        let mut warnings = Vec::new();
        let day_open = matches!(self.stage, Stage::Morning | Stage::Evening);

        if let (true, Some(id)) = (day_open, self.audit_id) {
            if let Err(e) = bounded(
                ctx.config.io_timeout(),
                "close_session",
                ctx.audit.close_session(id, self.balance),
            )
            .await
            {
                warn_degraded(&mut warnings, "close_session", &e);
            }
        }

        self.deck.clear();
        self.word_ids.clear();
        self.deck_source = DeckSource::default();
        self.morning_index = 0;
        self.morning_shown.clear();
        self.evening_queue.clear();
        self.evening_index = 0;
        self.pending = None;
        self.balance = 0;
        self.ledger.clear();
        self.audit_id = None;
        self.enter(Stage::Idle);

        Reply::with_warnings((), warnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::ExampleKind;
    use crate::game::distractor::SWAP_EXPLANATION;
    use crate::ledger::MemoryAuditSink;
    use rand::SeedableRng;

    const DECK: [(&str, &str); 5] = [
        ("reliable", "надёжный"),
        ("efficient", "эффективный"),
        ("flexible", "гибкий"),
        ("confident", "уверенный"),
        ("accurate", "точный"),
    ];

    fn store() -> BankContentStore {
        let mut store = BankContentStore::new();
        for (word, translation) in DECK {
            store.add_word(Level::B1, "adjectives", WordCard::new(word, translation));
            let text = format!("The {} answer wins.", word);
            store
                .add_example(word, ExampleKind::Ok, Example::new(text, "перевод", word, true))
                .unwrap();
        }
        store
    }

    fn context() -> GameContext<BankContentStore, MemoryAuditSink> {
        GameContext::new(store(), MemoryAuditSink::new(), GameConfig::default())
    }

    fn session(seed: u64) -> LearnerSession {
        LearnerSession::new(LearnerId(1), Level::A2, ChaCha8Rng::seed_from_u64(seed))
    }

    async fn to_evening(
        session: &mut LearnerSession,
        ctx: &GameContext<BankContentStore, MemoryAuditSink>,
    ) {
        session.start_day(ctx).await.unwrap();
        for _ in 0..5 {
            session.advance_morning(ctx).await.unwrap();
        }
        assert_eq!(session.stage(), Stage::Evening);
    }

    #[tokio::test]
    async fn test_start_day_shows_first_card() {
        let ctx = context();
        let mut s = session(1);
        let reply = s.start_day(&ctx).await.unwrap();

        assert_eq!(s.stage(), Stage::Morning);
        assert_eq!(s.deck().len(), 5);
        assert_eq!(reply.body.position, 1);
        assert_eq!(reply.body.total, 5);
        assert!(!reply.body.is_last);
        assert!(reply.warnings.is_empty());
        assert!(s.audit_id().is_some());
    }

    #[tokio::test]
    async fn test_morning_walks_the_deck_then_evening() {
        let ctx = context();
        let mut s = session(2);
        s.start_day(&ctx).await.unwrap();

        for position in 2..=5 {
            match s.advance_morning(&ctx).await.unwrap().body {
                MorningStep::Card(card) => {
                    assert_eq!(card.position, position);
                    assert_eq!(card.is_last, position == 5);
                    assert!(card.example.text.contains(&card.card.word));
                }
                other => panic!("expected a card, got {:?}", other),
            }
        }

        match s.advance_morning(&ctx).await.unwrap().body {
            MorningStep::Evening(prompt) => {
                assert_eq!(prompt.position, 1);
                assert_eq!(prompt.total, 5);
            }
            other => panic!("expected the evening, got {:?}", other),
        }
        assert_eq!(s.evening_queue().len(), 5);
    }

    #[tokio::test]
    async fn test_out_of_stage_calls_rejected() {
        let ctx = context();
        let mut s = session(3);

        assert!(matches!(
            s.advance_morning(&ctx).await,
            Err(GameError::WrongStage { .. })
        ));
        assert!(matches!(
            s.render_verdict(&ctx, true).await,
            Err(GameError::WrongStage { .. })
        ));

        s.start_day(&ctx).await.unwrap();
        assert!(matches!(
            s.resolve_dispute(&ctx, DisputeAction::Check).await,
            Err(GameError::WrongStage { .. })
        ));
        assert!(matches!(s.set_level(Level::B2), Err(GameError::WrongStage { .. })));
        assert!(matches!(s.start_day(&ctx).await, Err(GameError::WrongStage { .. })));
        assert_eq!(s.stage(), Stage::Morning);
        assert_eq!(s.morning_index(), 0);
    }

    #[tokio::test]
    async fn test_resolve_without_dispute_is_invalid_state() {
        let ctx = context();
        let mut s = session(4);
        to_evening(&mut s, &ctx).await;

        assert!(matches!(
            s.resolve_dispute(&ctx, DisputeAction::Concede).await,
            Err(GameError::InvalidState(_))
        ));
        assert_eq!(s.evening_index(), 0);
    }

    #[tokio::test]
    async fn test_verdict_blocked_while_dispute_pending() {
        let mut ctx = context();
        ctx.config.counterpart_agree_probability = 0.0;
        let mut s = session(5);
        to_evening(&mut s, &ctx).await;

        let truth = s.current_item().unwrap().truth();
        let reply = s.render_verdict(&ctx, truth).await.unwrap();
        assert_eq!(reply.body.outcome, Outcome::DisputeWait);
        assert!(s.pending_dispute().is_some());

        assert!(matches!(
            s.render_verdict(&ctx, truth).await,
            Err(GameError::InvalidState(_))
        ));
        assert_eq!(s.evening_index(), 0);
        assert!(s.ledger().is_empty());
    }

    #[tokio::test]
    async fn test_full_day_balances_ledger() {
        let ctx = context();
        let mut s = session(6);
        to_evening(&mut s, &ctx).await;

        let mut summary = None;
        while s.stage() == Stage::Evening {
            let truth = s.current_item().unwrap().truth();
            let reply = s.render_verdict(&ctx, truth).await.unwrap();
            let next = match reply.body.next {
                Some(next) => next,
                None => s
                    .resolve_dispute(&ctx, DisputeAction::Check)
                    .await
                    .unwrap()
                    .body
                    .next,
            };
            if let EveningNext::Done(day) = next {
                summary = Some(day);
            }
        }

        let summary = summary.unwrap();
        assert_eq!(s.stage(), Stage::Done);
        assert_eq!(summary.matched + summary.disputes, 5);
        assert_eq!(summary.balance, s.balance());
        assert_eq!(s.balance(), s.ledger().iter().map(|r| r.delta).sum::<i64>());
        assert_eq!(s.balance(), 50 * summary.disputes as i64);

        let id = s.audit_id().unwrap();
        assert_eq!(ctx.audit.attempts_of(id).len(), 5);
        assert_eq!(ctx.audit.session(id).unwrap().final_balance, Some(s.balance()));
    }

    #[tokio::test]
    async fn test_concede_costs_stake() {
        let mut ctx = context();
        ctx.config.counterpart_agree_probability = 0.0;
        let mut s = session(7);
        to_evening(&mut s, &ctx).await;

        let truth = s.current_item().unwrap().truth();
        s.render_verdict(&ctx, truth).await.unwrap();
        let reply = s.resolve_dispute(&ctx, DisputeAction::Concede).await.unwrap();

        assert_eq!(reply.body.outcome, Outcome::DisputeConcede);
        assert_eq!(reply.body.delta, -50);
        assert_eq!(reply.body.balance, -50);
        assert!(reply.body.note.is_none());
        assert_eq!(s.evening_index(), 1);
        assert!(s.pending_dispute().is_none());
    }

    #[tokio::test]
    async fn test_check_lost_when_learner_wrong() {
        let ctx = context();
        let mut s = session(8);
        to_evening(&mut s, &ctx).await;

        // A wrong learner is always contradicted
        let truth = s.current_item().unwrap().truth();
        let reply = s.render_verdict(&ctx, !truth).await.unwrap();
        assert_eq!(reply.body.counterpart_verdict, truth);

        let resolved = s.resolve_dispute(&ctx, DisputeAction::Check).await.unwrap();
        assert_eq!(resolved.body.outcome, Outcome::DisputeCheckLose);
        assert_eq!(resolved.body.delta, -100);
        assert_eq!(resolved.body.note.unwrap().truth, truth);
    }

    #[tokio::test]
    async fn test_proposals_follow_counterpart_claim() {
        let mut ctx = context();
        ctx.config.counterpart_agree_probability = 0.0;

        for seed in 0..20 {
            let mut s = session(100 + seed);
            to_evening(&mut s, &ctx).await;
            let item = s.current_item().unwrap().clone();
            let reply = s.render_verdict(&ctx, item.truth()).await.unwrap();
            let proposal = reply.body.proposal.unwrap();

            if item.truth() {
                // Bogus fix: the item's word swapped out
                assert_ne!(proposal.text, item.example.text);
                assert_eq!(proposal.translation, item.example.translation);
            } else {
                assert_eq!(proposal.text, format!("The {} answer wins.", item.word));
            }
        }
    }

    fn capitalize(word: &str) -> String {
        let mut chars = word.chars();
        chars
            .next()
            .map(|c| c.to_uppercase().chain(chars).collect())
            .unwrap_or_default()
    }

    /// Play the evening with a counterpart that always disagrees with a
    /// right learner, checking every incorrect item and conceding the rest.
    /// Returns the shown incorrect items with their resolution notes.
    async fn notes_for_incorrect_items(
        ctx: &GameContext<BankContentStore, MemoryAuditSink>,
        seed: u64,
    ) -> Vec<(EveningItem, ResolutionNote)> {
        let mut s = session(seed);
        to_evening(&mut s, ctx).await;

        let mut notes = Vec::new();
        while s.stage() == Stage::Evening {
            let item = s.current_item().unwrap().clone();
            let reply = s.render_verdict(ctx, item.truth()).await.unwrap();
            assert!(reply.body.next.is_none());

            if item.truth() {
                s.resolve_dispute(ctx, DisputeAction::Concede).await.unwrap();
            } else {
                let resolved = s.resolve_dispute(ctx, DisputeAction::Check).await.unwrap();
                assert_eq!(resolved.body.outcome, Outcome::DisputeCheckWin);
                notes.push((item, resolved.body.note.unwrap()));
            }
        }
        notes
    }

    #[tokio::test]
    async fn test_distractor_note_highlights_shown_fragment() {
        // Capitalized sentences, so the swapped word is re-cased
        let mut store = BankContentStore::new();
        for (word, translation) in DECK {
            store.add_word(Level::B1, "adjectives", WordCard::new(word, translation));
            let text = format!("{} numbers are important for decisions.", capitalize(word));
            store
                .add_example(word, ExampleKind::Ok, Example::new(text, "перевод", word, true))
                .unwrap();
        }
        let mut ctx = GameContext::new(store, MemoryAuditSink::new(), GameConfig::default());
        ctx.config.counterpart_agree_probability = 0.0;

        let mut checked = 0;
        for seed in 0..20 {
            for (item, note) in notes_for_incorrect_items(&ctx, 200 + seed).await {
                assert!(!note.truth);
                assert_eq!(note.explanation, SWAP_EXPLANATION);
                assert_eq!(note.highlights.len(), 1);
                assert!(
                    item.example.text.contains(&note.highlights[0]),
                    "{:?} not in {:?}",
                    note.highlights[0],
                    item.example.text
                );
                let correct = note.correct.unwrap();
                assert!(correct.text.starts_with(&capitalize(&item.word)));
                assert_ne!(correct.text, item.example.text);
                checked += 1;
            }
        }
        assert!(checked > 0);
    }

    #[tokio::test]
    async fn test_stored_bad_note_carries_its_explanation() {
        let mut store = store();
        for (word, _) in DECK {
            let mut bad = Example::new(
                format!("The {} answer win.", word),
                "перевод",
                word,
                false,
            );
            bad.explanation = Some("Third person singular needs 'wins'.".into());
            bad.error_highlight = BTreeSet::from(["win".to_string()]);
            store.add_example(word, ExampleKind::Bad, bad).unwrap();
        }
        let mut ctx = GameContext::new(store, MemoryAuditSink::new(), GameConfig::default());
        ctx.config.counterpart_agree_probability = 0.0;

        let mut checked = 0;
        for seed in 0..10 {
            for (item, note) in notes_for_incorrect_items(&ctx, 300 + seed).await {
                assert_eq!(note.explanation, "Third person singular needs 'wins'.");
                assert_eq!(note.highlights, vec!["win".to_string()]);
                assert!(item.example.text.contains(&note.highlights[0]));
                assert_eq!(
                    note.correct.unwrap().text,
                    format!("The {} answer wins.", item.word)
                );
                checked += 1;
            }
        }
        assert!(checked > 0);
    }

    #[tokio::test]
    async fn test_nan_probability_does_not_panic() {
        let mut ctx = context();
        ctx.config.counterpart_agree_probability = f64::NAN;
        let mut s = session(12);
        to_evening(&mut s, &ctx).await;

        let truth = s.current_item().unwrap().truth();
        assert!(s.render_verdict(&ctx, truth).await.is_ok());
    }

    #[tokio::test]
    async fn test_reset_closes_open_day() {
        let ctx = context();
        let mut s = session(9);
        s.start_day(&ctx).await.unwrap();
        let id = s.audit_id().unwrap();

        let reply = s.reset(&ctx).await;
        assert!(reply.warnings.is_empty());
        assert_eq!(s.stage(), Stage::Idle);
        assert!(s.deck().is_empty());
        assert_eq!(ctx.audit.session(id).unwrap().final_balance, Some(0));

        assert_eq!(s.show_process().unwrap(), Stage::Process);
        assert_eq!(s.set_level(Level::B2).unwrap(), Level::B2);
    }

    #[tokio::test]
    async fn test_empty_store_falls_back_to_emergency_bank() {
        let ctx = GameContext::new(
            BankContentStore::new(),
            MemoryAuditSink::new(),
            GameConfig::default(),
        );
        let mut s = session(10);
        s.start_day(&ctx).await.unwrap();

        assert_eq!(s.deck_source(), DeckSource::Emergency);
        assert_eq!(s.deck().len(), 5);
    }

    #[tokio::test]
    async fn test_no_words_anywhere_is_no_content() {
        let mut ctx = GameContext::new(
            BankContentStore::new(),
            MemoryAuditSink::new(),
            GameConfig::default(),
        );
        ctx.config.category = "verbs".into();
        let mut s = session(11);

        assert!(matches!(
            s.start_day(&ctx).await,
            Err(GameError::NoContentAvailable(_))
        ));
        assert_eq!(s.stage(), Stage::Idle);
    }
}
