//! Full-day integration tests
//!
//! A learner walks through a whole day against the in-memory backends:
//! morning deck, evening judgments, disputes and the resulting ledger.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeSet;

use trust_or_bust::content::{BankContentStore, Example, ExampleKind, WordCard};
use trust_or_bust::core::{GameConfig, GameError, LearnerId, Level, Stage};
use trust_or_bust::game::{
    DisputeAction, EveningNext, GameContext, LearnerSession, MorningStep, SessionRegistry,
};
use trust_or_bust::ledger::{AuditSink, MemoryAuditSink, Outcome};

const DECK: [(&str, &str, &str, &str); 5] = [
    (
        "reliable",
        "надёжный",
        "Our team is reliable and finishes tasks on time.",
        "Наша команда надёжная и завершает задачи вовремя.",
    ),
    (
        "efficient",
        "эффективный",
        "This tool is efficient for our project.",
        "Этот инструмент эффективен для нашего проекта.",
    ),
    (
        "flexible",
        "гибкий",
        "We need a flexible plan for the week.",
        "Нам нужен гибкий план на неделю.",
    ),
    (
        "confident",
        "уверенный",
        "She is confident about the interview.",
        "Она уверена насчёт собеседования.",
    ),
    (
        "accurate",
        "точный",
        "We need accurate data for the report.",
        "Нам нужны точные данные для отчёта.",
    ),
];

fn deck_store() -> BankContentStore {
    let mut store = BankContentStore::new();
    for (word, translation, text, text_ru) in DECK {
        store.add_word(Level::B1, "adjectives", WordCard::new(word, translation));
        store
            .add_example(word, ExampleKind::Ok, Example::new(text, text_ru, word, true))
            .unwrap();
    }
    store
}

fn context(config: GameConfig) -> GameContext<BankContentStore, MemoryAuditSink> {
    GameContext::new(deck_store(), MemoryAuditSink::new(), config)
}

fn config_with_agreement(agree: f64) -> GameConfig {
    GameConfig {
        counterpart_agree_probability: agree,
        ..GameConfig::default()
    }
}

async fn play_morning(
    session: &mut LearnerSession,
    ctx: &GameContext<BankContentStore, MemoryAuditSink>,
) {
    session.start_day(ctx).await.unwrap();
    for _ in 0..5 {
        session.advance_morning(ctx).await.unwrap();
    }
}

/// Answer every item truthfully, checking every dispute
async fn play_evening_truthfully(
    session: &mut LearnerSession,
    ctx: &GameContext<BankContentStore, MemoryAuditSink>,
) {
    while session.stage() == Stage::Evening {
        let truth = session.current_item().unwrap().truth();
        let reply = session.render_verdict(ctx, truth).await.unwrap();
        if reply.body.next.is_none() {
            session
                .resolve_dispute(ctx, DisputeAction::Check)
                .await
                .unwrap();
        }
    }
}

#[tokio::test]
async fn test_end_to_end_day() {
    let ctx = context(GameConfig::default());
    let mut session = LearnerSession::new(LearnerId(7), Level::A2, ChaCha8Rng::seed_from_u64(7));

    let first = session.start_day(&ctx).await.unwrap().body;
    assert_eq!(first.total, 5);

    let expected: BTreeSet<&str> = DECK.iter().map(|d| d.0).collect();
    let drawn: BTreeSet<&str> = session.deck().iter().map(|c| c.word.as_str()).collect();
    assert_eq!(drawn, expected);

    let mut shown = vec![first.card.word.clone()];
    let mut evening = None;
    for _ in 0..5 {
        match session.advance_morning(&ctx).await.unwrap().body {
            MorningStep::Card(card) => shown.push(card.card.word),
            MorningStep::Evening(prompt) => evening = Some(prompt),
        }
    }
    assert_eq!(shown.len(), 5);
    assert_eq!(session.stage(), Stage::Evening);

    let prompt = evening.unwrap();
    assert_eq!(prompt.position, 1);
    assert_eq!(prompt.total, 5);

    let queue_words: BTreeSet<&str> = session
        .evening_queue()
        .iter()
        .map(|i| i.word.as_str())
        .collect();
    assert_eq!(queue_words, expected);

    play_evening_truthfully(&mut session, &ctx).await;
    assert_eq!(session.stage(), Stage::Done);
    assert_eq!(session.ledger().len(), 5);
}

#[tokio::test]
async fn test_ledger_matches_audit_trail() {
    let ctx = context(GameConfig::default());

    for seed in 0..10 {
        let mut session =
            LearnerSession::new(LearnerId(seed as i64), Level::A2, ChaCha8Rng::seed_from_u64(seed));
        play_morning(&mut session, &ctx).await;

        // Alternate strategies so every outcome shows up
        let mut turn = 0;
        while session.stage() == Stage::Evening {
            let truth = session.current_item().unwrap().truth();
            let verdict = if turn % 3 == 0 { !truth } else { truth };
            let reply = session.render_verdict(&ctx, verdict).await.unwrap();
            if reply.body.next.is_none() {
                let action = if turn % 2 == 0 {
                    DisputeAction::Check
                } else {
                    DisputeAction::Concede
                };
                session.resolve_dispute(&ctx, action).await.unwrap();
            }
            turn += 1;
        }

        let id = session.audit_id().unwrap();
        let stored = ctx.audit.attempts_of(id);
        let sum: i64 = stored.iter().map(|r| r.delta).sum();

        assert_eq!(stored.len(), 5);
        assert_eq!(session.balance(), sum);
        assert_eq!(stored.last().unwrap().balance_after, session.balance());
        assert_eq!(ctx.audit.session(id).unwrap().final_balance, Some(sum));
        assert!(stored.iter().all(|r| r.outcome != Outcome::DisputeWait));

        let indices: Vec<usize> = stored.iter().map(|r| r.item_index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
    }
}

#[tokio::test]
async fn test_stage_rejections_leave_state_unchanged() {
    let ctx = context(GameConfig::default());
    let mut session = LearnerSession::new(LearnerId(1), Level::A2, ChaCha8Rng::seed_from_u64(1));
    session.start_day(&ctx).await.unwrap();

    let err = session
        .resolve_dispute(&ctx, DisputeAction::Check)
        .await
        .unwrap_err();
    assert!(matches!(err, GameError::WrongStage { stage: Stage::Morning, .. }));

    for _ in 0..5 {
        session.advance_morning(&ctx).await.unwrap();
    }
    let err = session
        .resolve_dispute(&ctx, DisputeAction::Check)
        .await
        .unwrap_err();
    assert!(matches!(err, GameError::InvalidState(_)));
    assert!(matches!(
        session.advance_morning(&ctx).await,
        Err(GameError::WrongStage { .. })
    ));
    assert_eq!(session.evening_index(), 0);
    assert_eq!(session.balance(), 0);

    play_evening_truthfully(&mut session, &ctx).await;
    assert!(matches!(
        session.render_verdict(&ctx, true).await,
        Err(GameError::WrongStage { stage: Stage::Done, .. })
    ));

    // Only a new day is accepted after done
    session.start_day(&ctx).await.unwrap();
    assert_eq!(session.stage(), Stage::Morning);
    assert!(session.ledger().is_empty());
    assert_eq!(session.balance(), 0);
}

#[tokio::test]
async fn test_check_win_when_learner_right_on_incorrect_sentence() {
    // The counterpart never agrees with a right learner
    let ctx = context(config_with_agreement(0.0));

    let mut found = false;
    for seed in 0..50 {
        let mut session =
            LearnerSession::new(LearnerId(1), Level::A2, ChaCha8Rng::seed_from_u64(seed));
        play_morning(&mut session, &ctx).await;

        if session.current_item().unwrap().truth() {
            continue;
        }
        found = true;

        let verdict = session.render_verdict(&ctx, false).await.unwrap().body;
        assert_eq!(verdict.outcome, Outcome::DisputeWait);
        assert!(verdict.counterpart_verdict);

        let resolved = session
            .resolve_dispute(&ctx, DisputeAction::Check)
            .await
            .unwrap()
            .body;
        assert_eq!(resolved.outcome, Outcome::DisputeCheckWin);
        assert_eq!(resolved.delta, 50);
        assert_eq!(resolved.balance, 50);

        let note = resolved.note.unwrap();
        assert!(!note.truth);
        assert!(note.correct.is_some());
        assert!(matches!(resolved.next, EveningNext::Item(_)));
        break;
    }
    assert!(found, "no incorrect first item in 50 days");
}

#[tokio::test]
async fn test_concede_costs_regardless_of_who_was_right() {
    let ctx = context(config_with_agreement(0.0));

    for seed in 0..10 {
        let mut session =
            LearnerSession::new(LearnerId(1), Level::A2, ChaCha8Rng::seed_from_u64(seed));
        play_morning(&mut session, &ctx).await;

        // Right learner, disputed by the counterpart
        let truth = session.current_item().unwrap().truth();
        session.render_verdict(&ctx, truth).await.unwrap();
        let right = session
            .resolve_dispute(&ctx, DisputeAction::Concede)
            .await
            .unwrap()
            .body;
        assert_eq!(right.outcome, Outcome::DisputeConcede);
        assert_eq!(right.delta, -50);

        // Wrong learner, corrected by the counterpart
        let truth = session.current_item().unwrap().truth();
        session.render_verdict(&ctx, !truth).await.unwrap();
        let wrong = session
            .resolve_dispute(&ctx, DisputeAction::Concede)
            .await
            .unwrap()
            .body;
        assert_eq!(wrong.outcome, Outcome::DisputeConcede);
        assert_eq!(wrong.delta, -50);
        assert_eq!(session.balance(), -100);
    }
}

#[tokio::test]
async fn test_dispute_rate_on_easy_items() {
    let ctx = context(GameConfig::default());
    let mut easy = 0usize;
    let mut disputed = 0usize;

    for seed in 0..600 {
        let mut session =
            LearnerSession::new(LearnerId(1), Level::A2, ChaCha8Rng::seed_from_u64(seed));
        play_morning(&mut session, &ctx).await;

        while session.stage() == Stage::Evening {
            let truth = session.current_item().unwrap().truth();
            let reply = session.render_verdict(&ctx, truth).await.unwrap();
            let dispute = reply.body.next.is_none();
            if truth {
                easy += 1;
                disputed += dispute as usize;
            }
            if dispute {
                session
                    .resolve_dispute(&ctx, DisputeAction::Check)
                    .await
                    .unwrap();
            }
        }
    }

    assert!(easy >= 1000, "only {} true/true items", easy);
    let rate = disputed as f64 / easy as f64;
    assert!((rate - 0.3).abs() < 0.05, "dispute rate {}", rate);
}

#[tokio::test]
async fn test_incorrect_items_carry_their_truth() {
    let ctx = context(GameConfig::default());
    let originals: BTreeSet<&str> = DECK.iter().map(|d| d.2).collect();

    for seed in 0..30 {
        let mut session =
            LearnerSession::new(LearnerId(1), Level::A2, ChaCha8Rng::seed_from_u64(seed));
        play_morning(&mut session, &ctx).await;

        for item in session.evening_queue() {
            assert_eq!(item.truth(), originals.contains(item.example.text.as_str()));
            if !item.truth() {
                let source = item.example.proposal.as_ref().unwrap();
                assert!(originals.contains(source.text.as_str()));
                assert_eq!(item.example.translation, source.translation);
            }
        }
    }
}

#[tokio::test]
async fn test_registry_stats_and_csv_after_a_day() {
    let config = GameConfig {
        seed: Some(21),
        ..GameConfig::default()
    };
    let registry = SessionRegistry::new(context(config));
    let learner = LearnerId(3);

    registry.start_day(learner).await.unwrap();
    for _ in 0..5 {
        registry.advance_morning(learner).await.unwrap();
    }
    while registry.stage(learner).await == Stage::Evening {
        let truth = registry
            .inspect(learner, |s| s.current_item().map(|i| i.truth()))
            .await
            .unwrap()
            .unwrap();
        let reply = registry.render_verdict(learner, truth).await.unwrap();
        if reply.body.next.is_none() {
            registry
                .resolve_dispute(learner, DisputeAction::Check)
                .await
                .unwrap();
        }
    }

    let stats = registry.stats(learner).await.unwrap().body;
    assert_eq!(stats.total, 5);
    assert_eq!(stats.correct, 5);
    assert_eq!(stats.accuracy_percent, 100.0);
    assert_eq!(stats.sum_delta, registry.balance(learner).await);

    let csv = registry.csv(learner).await.unwrap().body;
    assert_eq!(csv.lines().count(), 6);

    let exported = registry
        .context()
        .audit
        .export_attempts(learner)
        .await
        .unwrap();
    assert_eq!(exported.len(), 5);
}
