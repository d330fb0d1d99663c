//! Offline content store
//!
//! Holds words and examples in memory. Built either from the static bank
//! compiled into the crate or from a TOML content pack. The static bank also
//! serves as the engine's emergency fallback when the configured store fails.

use ahash::AHashMap;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::Path;

use crate::content::{
    sample_distinct, ContentStore, DeckDraw, Example, ExampleKind, ExamplePools, WordCard,
};
use crate::core::error::{GameError, Result};
use crate::core::types::{Level, WordId};

const DEFAULT_CATEGORY: &str = "adjectives";

/// (level, word, translation)
const BUILTIN_WORDS: &[(Level, &str, &str)] = &[
    (Level::A2, "big", "большой"),
    (Level::A2, "small", "маленький"),
    (Level::A2, "easy", "лёгкий"),
    (Level::A2, "hard", "трудный"),
    (Level::A2, "busy", "занятой"),
    (Level::B1, "reliable", "надёжный"),
    (Level::B1, "efficient", "эффективный"),
    (Level::B1, "flexible", "гибкий"),
    (Level::B1, "confident", "уверенный"),
    (Level::B1, "accurate", "точный"),
    (Level::B1, "productive", "продуктивный"),
    (Level::B1, "creative", "креативный"),
    (Level::B2, "meticulous", "дотошный"),
    (Level::B2, "versatile", "разносторонний"),
    (Level::B2, "robust", "надёжный/устойчивый"),
    (Level::B2, "scalable", "масштабируемый"),
    (Level::B2, "redundant", "избыточный"),
];

/// (word, kind, text, translation)
const BUILTIN_EXAMPLES: &[(&str, ExampleKind, &str, &str)] = &[
    ("reliable", ExampleKind::Ok, "Our team is reliable and finishes tasks on time.", "Наша команда надёжная и завершает задачи вовремя."),
    ("efficient", ExampleKind::Ok, "This tool is efficient for our project.", "Этот инструмент эффективен для нашего проекта."),
    ("flexible", ExampleKind::Ok, "We need a flexible plan for the week.", "Нам нужен гибкий план на неделю."),
    ("confident", ExampleKind::Ok, "She is confident about the interview.", "Она уверена насчёт собеседования."),
    ("accurate", ExampleKind::Ok, "We need accurate data for the report.", "Нам нужны точные данные для отчёта."),
    ("productive", ExampleKind::Ok, "A short break can make you more productive.", "Короткий перерыв может сделать вас более продуктивным."),
    ("creative", ExampleKind::Ok, "We need a creative idea for this ad.", "Нам нужна креативная идея для этой рекламы."),
    ("meticulous", ExampleKind::Ok, "She is meticulous and checks every detail.", "Она дотошная и проверяет каждую деталь."),
    ("versatile", ExampleKind::Ok, "A versatile employee can do many different tasks.", "Разносторонний сотрудник может выполнять много разных задач."),
    ("robust", ExampleKind::Ok, "The system is robust and works under heavy load.", "Система надёжная и работает под высокой нагрузкой."),
    ("scalable", ExampleKind::Ok, "Our product is scalable and can handle more users.", "Наш продукт масштабируемый и может выдерживать больше пользователей."),
    ("redundant", ExampleKind::Ok, "This step is redundant in our process.", "Этот шаг избыточен в нашем процессе."),
    ("reliable", ExampleKind::AltOk, "A reliable colleague keeps promises.", "Надёжный коллега держит обещания."),
    ("efficient", ExampleKind::AltOk, "An efficient team saves time and budget.", "Эффективная команда экономит время и бюджет."),
    ("flexible", ExampleKind::AltOk, "Flexible policies help employees.", "Гибкие правила помогают сотрудникам."),
    ("confident", ExampleKind::AltOk, "I feel confident after preparation.", "Я чувствую уверенность после подготовки."),
    ("accurate", ExampleKind::AltOk, "Accurate numbers are important for decisions.", "Точные цифры важны для принятия решений."),
    ("productive", ExampleKind::AltOk, "I had a productive day at work.", "У меня был продуктивный день на работе."),
    ("creative", ExampleKind::AltOk, "She came up with a creative solution.", "Она придумала креативное решение."),
    ("meticulous", ExampleKind::AltOk, "He is meticulous and checks every line.", "Он дотошный и проверяет каждую строчку."),
    ("versatile", ExampleKind::AltOk, "A versatile tool is useful in many situations.", "Разносторонний инструмент полезен во многих ситуациях."),
    ("robust", ExampleKind::AltOk, "This app is robust and rarely crashes.", "Это приложение надёжно и редко падает."),
    ("scalable", ExampleKind::AltOk, "The platform is scalable for future growth.", "Платформа масштабируема для будущего роста."),
    ("redundant", ExampleKind::AltOk, "We removed redundant details from the report.", "Мы убрали избыточные детали из отчёта."),
];

#[derive(Debug, Clone)]
struct BankWord {
    id: WordId,
    level: Level,
    category: String,
    card: WordCard,
}

#[derive(Debug, Clone)]
struct BankExample {
    word_id: WordId,
    kind: ExampleKind,
    example: Example,
}

/// In-memory content store
#[derive(Debug, Clone, Default)]
pub struct BankContentStore {
    words: Vec<BankWord>,
    examples: Vec<BankExample>,
}

#[derive(Debug, Deserialize)]
struct ContentPack {
    #[serde(default)]
    words: Vec<PackWord>,
    #[serde(default)]
    examples: Vec<PackExample>,
}

#[derive(Debug, Deserialize)]
struct PackWord {
    level: Level,
    #[serde(default = "default_category")]
    category: String,
    word: String,
    translation: String,
}

#[derive(Debug, Deserialize)]
struct PackExample {
    word: String,
    kind: ExampleKind,
    text: String,
    translation: String,
    #[serde(default)]
    explanation: Option<String>,
    #[serde(default)]
    highlight: Vec<String>,
}

fn default_category() -> String {
    DEFAULT_CATEGORY.to_string()
}

impl BankContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The static bank shipped with the crate
    pub fn builtin() -> Self {
        let mut store = Self::new();
        for (level, word, translation) in BUILTIN_WORDS {
            store.add_word(*level, DEFAULT_CATEGORY, WordCard::new(*word, *translation));
        }
        for (word, kind, text, translation) in BUILTIN_EXAMPLES {
            let example = Example::new(*text, *translation, word, kind.is_correct());
            if let Err(e) = store.add_example(word, *kind, example) {
                tracing::warn!("Skipping builtin example for '{}': {}", word, e);
            }
        }
        store
    }

    /// Load a TOML content pack from disk
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let pack: ContentPack = toml::from_str(content)?;
        let mut store = Self::new();

        for word in pack.words {
            store.add_word(
                word.level,
                &word.category,
                WordCard::new(word.word, word.translation),
            );
        }

        for entry in pack.examples {
            let mut example =
                Example::new(entry.text, entry.translation, &entry.word, entry.kind.is_correct());
            example.explanation = entry.explanation;
            example.error_highlight = entry.highlight.into_iter().collect();
            store.add_example(&entry.word, entry.kind, example)?;
        }

        tracing::debug!(
            "Loaded content pack: {} words, {} examples",
            store.words.len(),
            store.examples.len()
        );
        Ok(store)
    }

    pub fn add_word(&mut self, level: Level, category: &str, card: WordCard) -> WordId {
        let id = WordId(self.words.len() as i64 + 1);
        self.words.push(BankWord {
            id,
            level,
            category: category.to_string(),
            card,
        });
        id
    }

    /// Attach an example to the first word spelled `word`
    pub fn add_example(&mut self, word: &str, kind: ExampleKind, example: Example) -> Result<()> {
        let word_id = self
            .find_word(word)
            .map(|w| w.id)
            .ok_or_else(|| GameError::Config(format!("example for unknown word '{}'", word)))?;
        self.examples.push(BankExample {
            word_id,
            kind,
            example,
        });
        Ok(())
    }

    pub fn word_count(&self) -> usize {
        self.words.len()
    }

    fn find_word(&self, word: &str) -> Option<&BankWord> {
        self.words
            .iter()
            .find(|w| w.card.word.eq_ignore_ascii_case(word))
    }

    fn examples_of(&self, word_id: WordId) -> impl Iterator<Item = &BankExample> {
        self.examples.iter().filter(move |e| e.word_id == word_id)
    }

    /// Correct example for a word looked up by spelling, `ok` before `alt_ok`
    pub fn emergency_example(&self, word: &str) -> Option<Example> {
        let id = self.find_word(word)?.id;
        [ExampleKind::Ok, ExampleKind::AltOk].iter().find_map(|kind| {
            self.examples_of(id)
                .find(|e| e.kind == *kind)
                .map(|e| e.example.clone())
        })
    }

    fn draw(&self, level: Level, category: &str, count: usize, seed: u64) -> DeckDraw {
        let candidates: Vec<&BankWord> = self
            .words
            .iter()
            .filter(|w| w.level == level && w.category == category)
            .collect();
        let picked = sample_distinct(candidates, |w| w.card.word.as_str(), count, seed);

        let mut word_ids = AHashMap::new();
        let cards = picked
            .into_iter()
            .map(|w| {
                word_ids.insert(w.card.word.clone(), w.id);
                w.card.clone()
            })
            .collect();

        DeckDraw { cards, word_ids }
    }

    fn correct_example(
        &self,
        word_id: WordId,
        excluding: &BTreeSet<String>,
        seed: u64,
    ) -> Option<Example> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        [ExampleKind::Ok, ExampleKind::AltOk].iter().find_map(|kind| {
            let pool: Vec<&BankExample> = self
                .examples_of(word_id)
                .filter(|e| e.kind == *kind && !excluding.contains(&e.example.text))
                .collect();
            pool.choose(&mut rng).map(|e| e.example.clone())
        })
    }

    fn pools(&self, word_id: WordId) -> ExamplePools {
        let (ok, bad): (Vec<&BankExample>, Vec<&BankExample>) = self
            .examples_of(word_id)
            .partition(|e| e.kind.is_correct());
        ExamplePools {
            ok: ok.into_iter().map(|e| e.example.clone()).collect(),
            bad: bad.into_iter().map(|e| e.example.clone()).collect(),
        }
    }
}

impl ContentStore for BankContentStore {
    async fn pick_deck(
        &self,
        level: Level,
        category: &str,
        count: usize,
        seed: u64,
    ) -> Result<DeckDraw> {
        Ok(self.draw(level, category, count, seed))
    }

    async fn pick_correct_example(
        &self,
        word_id: WordId,
        excluding: &BTreeSet<String>,
        seed: u64,
    ) -> Result<Option<Example>> {
        Ok(self.correct_example(word_id, excluding, seed))
    }

    async fn pick_example_pools(&self, word_id: WordId) -> Result<ExamplePools> {
        Ok(self.pools(word_id))
    }
}
