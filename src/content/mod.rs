//! Content store - leveled vocabulary and labelled example sentences
//!
//! The engine only ever reads content. Correctness of a sentence is a label
//! carried by the content (`ok`, `alt_ok`, `bad`), never computed.
//!
//! Two capabilities implement [`ContentStore`]:
//! - [`BankContentStore`]: offline, from the built-in bank or a TOML pack
//! - [`RestContentStore`]: live, from the hosted database over PostgREST
//!
//! [`ContentBackend`] picks one at startup from configuration.

pub mod bank;
pub mod rest;

pub use bank::BankContentStore;
pub use rest::RestContentStore;

use ahash::AHashMap;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::future::Future;

use crate::core::config::{ContentSource, GameConfig};
use crate::core::error::{GameError, Result};
use crate::core::types::{Level, WordId};
use crate::remote::PostgrestClient;

/// A word to study with its translation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordCard {
    pub word: String,
    pub translation: String,
}

impl WordCard {
    pub fn new(word: impl Into<String>, translation: impl Into<String>) -> Self {
        Self {
            word: word.into(),
            translation: translation.into(),
        }
    }
}

/// Sentence with its translation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentencePair {
    pub text: String,
    pub translation: String,
}

impl SentencePair {
    pub fn new(text: impl Into<String>, translation: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            translation: translation.into(),
        }
    }
}

/// Label attached to a stored example
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExampleKind {
    /// Primary correct example
    Ok,
    /// Alternative correct example
    AltOk,
    /// Incorrect example
    Bad,
}

impl ExampleKind {
    pub fn is_correct(self) -> bool {
        !matches!(self, ExampleKind::Bad)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExampleKind::Ok => "ok",
            ExampleKind::AltOk => "alt_ok",
            ExampleKind::Bad => "bad",
        }
    }
}

/// One example sentence as shown to the learner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Example {
    pub text: String,
    pub translation: String,
    pub used_words: BTreeSet<String>,
    /// Ground truth, taken from the content label
    pub is_correct: bool,
    /// Correct variant the counterpart can offer for an incorrect sentence
    pub proposal: Option<SentencePair>,
    /// Fragments to highlight when the error is revealed
    pub error_highlight: BTreeSet<String>,
    pub explanation: Option<String>,
}

impl Example {
    pub fn new(
        text: impl Into<String>,
        translation: impl Into<String>,
        word: &str,
        is_correct: bool,
    ) -> Self {
        Self {
            text: text.into(),
            translation: translation.into(),
            used_words: BTreeSet::from([word.to_string()]),
            is_correct,
            proposal: None,
            error_highlight: BTreeSet::new(),
            explanation: None,
        }
    }

    /// Trivial correct sentence used when the store has nothing for a word
    pub fn placeholder(card: &WordCard) -> Self {
        Self::new(
            format!("This is {}.", card.word),
            format!("Это {}.", card.translation),
            &card.word,
            true,
        )
    }

    pub fn pair(&self) -> SentencePair {
        SentencePair::new(self.text.clone(), self.translation.clone())
    }
}

/// A freshly drawn deck plus the ids needed for follow-up lookups
#[derive(Debug, Clone, Default)]
pub struct DeckDraw {
    pub cards: Vec<WordCard>,
    pub word_ids: AHashMap<String, WordId>,
}

impl DeckDraw {
    pub fn id_of(&self, word: &str) -> Option<WordId> {
        self.word_ids.get(word).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }
}

/// Correct and incorrect examples stored for one word
#[derive(Debug, Clone, Default)]
pub struct ExamplePools {
    pub ok: Vec<Example>,
    pub bad: Vec<Example>,
}

/// Drop repeated spellings (case-insensitive, first one wins), then draw up
/// to `count` entries in random order
pub(crate) fn sample_distinct<T>(
    items: Vec<T>,
    word: impl Fn(&T) -> &str,
    count: usize,
    seed: u64,
) -> Vec<T> {
    let mut seen = HashSet::new();
    let mut distinct: Vec<T> = items
        .into_iter()
        .filter(|item| seen.insert(word(item).to_lowercase()))
        .collect();

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    distinct.shuffle(&mut rng);
    distinct.truncate(count);
    distinct
}

/// Read-only access to vocabulary and examples
///
/// Draws that involve chance take a `seed` so the caller's generator stays
/// the single source of randomness.
pub trait ContentStore: Send + Sync {
    /// Draw up to `count` distinct words of `level` in `category`
    fn pick_deck(
        &self,
        level: Level,
        category: &str,
        count: usize,
        seed: u64,
    ) -> impl Future<Output = Result<DeckDraw>> + Send;

    /// One correct example for a word, `ok` preferred over `alt_ok`,
    /// skipping texts in `excluding`
    fn pick_correct_example(
        &self,
        word_id: WordId,
        excluding: &BTreeSet<String>,
        seed: u64,
    ) -> impl Future<Output = Result<Option<Example>>> + Send;

    /// All stored examples of a word split by correctness
    fn pick_example_pools(
        &self,
        word_id: WordId,
    ) -> impl Future<Output = Result<ExamplePools>> + Send;
}

/// Content store selected at startup
#[derive(Debug, Clone)]
pub enum ContentBackend {
    Bank(BankContentStore),
    Rest(RestContentStore),
}

impl ContentBackend {
    pub fn from_config(config: &GameConfig) -> Result<Self> {
        match config.content.backend {
            ContentSource::Builtin => Ok(ContentBackend::Bank(BankContentStore::builtin())),
            ContentSource::Pack => {
                let path = config.content.path.as_deref().ok_or_else(|| {
                    GameError::Config("content backend 'pack' needs content.path".into())
                })?;
                Ok(ContentBackend::Bank(BankContentStore::load(path)?))
            }
            ContentSource::Rest => {
                let rest = config.rest.as_ref().ok_or_else(|| {
                    GameError::Config("content backend 'rest' needs [rest]".into())
                })?;
                Ok(ContentBackend::Rest(RestContentStore::new(
                    PostgrestClient::new(&rest.url, &rest.api_key),
                )))
            }
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            ContentBackend::Bank(_) => "bank",
            ContentBackend::Rest(_) => "rest",
        }
    }
}

impl ContentStore for ContentBackend {
    async fn pick_deck(
        &self,
        level: Level,
        category: &str,
        count: usize,
        seed: u64,
    ) -> Result<DeckDraw> {
        match self {
            ContentBackend::Bank(store) => store.pick_deck(level, category, count, seed).await,
            ContentBackend::Rest(store) => store.pick_deck(level, category, count, seed).await,
        }
    }

    async fn pick_correct_example(
        &self,
        word_id: WordId,
        excluding: &BTreeSet<String>,
        seed: u64,
    ) -> Result<Option<Example>> {
        match self {
            ContentBackend::Bank(store) => {
                store.pick_correct_example(word_id, excluding, seed).await
            }
            ContentBackend::Rest(store) => {
                store.pick_correct_example(word_id, excluding, seed).await
            }
        }
    }

    async fn pick_example_pools(&self, word_id: WordId) -> Result<ExamplePools> {
        match self {
            ContentBackend::Bank(store) => store.pick_example_pools(word_id).await,
            ContentBackend::Rest(store) => store.pick_example_pools(word_id).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_is_correct_and_names_word() {
        let card = WordCard::new("reliable", "надёжный");
        let example = Example::placeholder(&card);

        assert_eq!(example.text, "This is reliable.");
        assert!(example.is_correct);
        assert!(example.used_words.contains("reliable"));
    }

    #[test]
    fn test_kind_correctness() {
        assert!(ExampleKind::Ok.is_correct());
        assert!(ExampleKind::AltOk.is_correct());
        assert!(!ExampleKind::Bad.is_correct());
    }

    #[test]
    fn test_sample_distinct_drops_case_duplicates() {
        let words = vec!["Busy", "busy", "big", "BIG", "hard"];
        for seed in 0..20 {
            let picked = sample_distinct(words.clone(), |w| *w, 5, seed);
            assert_eq!(picked.len(), 3);
            let folded: HashSet<String> = picked.iter().map(|w| w.to_lowercase()).collect();
            assert_eq!(folded.len(), 3);
        }
    }

    #[test]
    fn test_sample_distinct_respects_count() {
        let words = vec!["a", "b", "c", "d", "e", "f", "g"];
        assert_eq!(sample_distinct(words, |w| *w, 5, 11).len(), 5);
    }

    #[test]
    fn test_builtin_backend_from_default_config() {
        let backend = ContentBackend::from_config(&GameConfig::default()).unwrap();
        assert_eq!(backend.describe(), "bank");
    }
}
