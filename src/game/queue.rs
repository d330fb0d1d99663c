//! Evening queue construction
//!
//! One judged item per deck word. Each item is either a correct sentence or
//! an incorrect one (stored `bad` example, else a generated distractor),
//! picked with equal odds among what is available. The queue is shuffled
//! before the evening starts.

use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::BTreeSet;

use crate::content::{BankContentStore, Example, ExamplePools, WordCard};
use crate::game::distractor::make_distractor;

/// One judged unit of the evening
#[derive(Debug, Clone, PartialEq)]
pub struct EveningItem {
    /// Deck word the item was built for
    pub word: String,
    /// What is actually shown; `example.is_correct` is the truth of that text
    pub example: Example,
}

impl EveningItem {
    pub fn truth(&self) -> bool {
        self.example.is_correct
    }
}

/// Stored examples gathered for one deck word
#[derive(Debug, Clone)]
pub struct WordMaterial {
    pub card: WordCard,
    pub pools: ExamplePools,
}

/// Correct sentence to build the item around. Texts already shown in the
/// morning are avoided while something else is left.
fn base_example<R: Rng + ?Sized>(
    material: &WordMaterial,
    morning_shown: &BTreeSet<String>,
    emergency: &BankContentStore,
    rng: &mut R,
) -> Example {
    let fresh: Vec<&Example> = material
        .pools
        .ok
        .iter()
        .filter(|e| !morning_shown.contains(&e.text))
        .collect();
    let chosen = if fresh.is_empty() {
        material.pools.ok.choose(rng)
    } else {
        fresh.choose(rng).copied()
    };

    chosen
        .cloned()
        .or_else(|| emergency.emergency_example(&material.card.word))
        .unwrap_or_else(|| Example::placeholder(&material.card))
}

fn incorrect_example<R: Rng + ?Sized>(
    material: &WordMaterial,
    base: &Example,
    deck_words: &[String],
    rng: &mut R,
) -> Option<Example> {
    if let Some(stored) = material.pools.bad.choose(rng) {
        let mut bad = stored.clone();
        if bad.proposal.is_none() {
            bad.proposal = Some(base.pair());
        }
        return Some(bad);
    }

    let seed = material.pools.ok.choose(rng).unwrap_or(base);
    make_distractor(&seed.pair(), &material.card.word, deck_words, rng)
}

/// Build one item for a deck word
pub fn build_item<R: Rng + ?Sized>(
    material: &WordMaterial,
    morning_shown: &BTreeSet<String>,
    deck_words: &[String],
    emergency: &BankContentStore,
    rng: &mut R,
) -> EveningItem {
    let base = base_example(material, morning_shown, emergency, rng);
    let bad = incorrect_example(material, &base, deck_words, rng);

    let example = match bad {
        Some(bad) if rng.gen_bool(0.5) => bad,
        _ => base,
    };

    EveningItem {
        word: material.card.word.clone(),
        example,
    }
}

/// Build and shuffle the whole evening queue
pub fn build_evening_queue<R: Rng + ?Sized>(
    materials: &[WordMaterial],
    morning_shown: &BTreeSet<String>,
    emergency: &BankContentStore,
    rng: &mut R,
) -> Vec<EveningItem> {
    let deck_words: Vec<String> = materials.iter().map(|m| m.card.word.clone()).collect();

    let mut queue: Vec<EveningItem> = materials
        .iter()
        .map(|m| build_item(m, morning_shown, &deck_words, emergency, rng))
        .collect();
    queue.shuffle(rng);

    tracing::debug!(
        "Evening queue built: {} items, {} incorrect",
        queue.len(),
        queue.iter().filter(|i| !i.truth()).count()
    );
    queue
}
