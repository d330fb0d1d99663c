//! Live content store backed by the hosted `words` / `examples` tables

use ahash::AHashMap;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Deserialize;
use std::collections::BTreeSet;

use crate::content::{
    sample_distinct, ContentStore, DeckDraw, Example, ExampleKind, ExamplePools, WordCard,
};
use crate::core::error::Result;
use crate::core::types::{Level, WordId};
use crate::remote::{eq, in_list, PostgrestClient};

#[derive(Debug, Deserialize)]
struct WordRow {
    id: i64,
    word: String,
    translation: String,
}

#[derive(Debug, Deserialize)]
struct ExampleRow {
    kind: ExampleKind,
    en: String,
    ru: String,
}

impl ExampleRow {
    fn to_example(&self) -> Example {
        Example {
            text: self.en.clone(),
            translation: self.ru.clone(),
            used_words: BTreeSet::new(),
            is_correct: self.kind.is_correct(),
            proposal: None,
            error_highlight: BTreeSet::new(),
            explanation: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RestContentStore {
    client: PostgrestClient,
}

impl RestContentStore {
    pub fn new(client: PostgrestClient) -> Self {
        Self { client }
    }

    async fn examples(&self, word_id: WordId, kinds: &[&str]) -> Result<Vec<ExampleRow>> {
        self.client
            .select(
                "examples",
                &[
                    ("select", "kind,en,ru".to_string()),
                    ("word_id", eq(word_id.0)),
                    ("kind", in_list(kinds)),
                ],
            )
            .await
    }
}

impl ContentStore for RestContentStore {
    async fn pick_deck(
        &self,
        level: Level,
        category: &str,
        count: usize,
        seed: u64,
    ) -> Result<DeckDraw> {
        let rows: Vec<WordRow> = self
            .client
            .select(
                "words",
                &[
                    ("select", "id,word,translation".to_string()),
                    ("level", eq(level)),
                    ("pos", eq(category)),
                ],
            )
            .await?;

        let picked = sample_distinct(rows, |r| r.word.as_str(), count, seed);
        let mut word_ids = AHashMap::new();
        let cards = picked
            .into_iter()
            .map(|row| {
                word_ids.insert(row.word.clone(), WordId(row.id));
                WordCard::new(row.word, row.translation)
            })
            .collect();

        Ok(DeckDraw { cards, word_ids })
    }

    async fn pick_correct_example(
        &self,
        word_id: WordId,
        excluding: &BTreeSet<String>,
        seed: u64,
    ) -> Result<Option<Example>> {
        let rows = self
            .examples(word_id, &[ExampleKind::Ok.as_str(), ExampleKind::AltOk.as_str()])
            .await?;
        let mut rng = ChaCha8Rng::seed_from_u64(seed);

        for kind in [ExampleKind::Ok, ExampleKind::AltOk] {
            let pool: Vec<&ExampleRow> = rows
                .iter()
                .filter(|r| r.kind == kind && !excluding.contains(&r.en))
                .collect();
            if let Some(row) = pool.choose(&mut rng) {
                return Ok(Some(row.to_example()));
            }
        }
        Ok(None)
    }

    async fn pick_example_pools(&self, word_id: WordId) -> Result<ExamplePools> {
        let rows = self
            .examples(
                word_id,
                &[
                    ExampleKind::Ok.as_str(),
                    ExampleKind::AltOk.as_str(),
                    ExampleKind::Bad.as_str(),
                ],
            )
            .await?;

        let (ok, bad): (Vec<Example>, Vec<Example>) = rows
            .iter()
            .map(ExampleRow::to_example)
            .partition(|e| e.is_correct);
        Ok(ExamplePools { ok, bad })
    }
}
