//! Distractor generation
//!
//! A distractor is a correct sentence with its target word swapped for
//! another word from the same deck. The translation is left untouched on
//! purpose: the mismatch between the sentence and its translation is the
//! tell the learner has to catch.

use rand::seq::SliceRandom;
use rand::Rng;
use regex::Regex;
use std::collections::BTreeSet;

use crate::content::{Example, SentencePair};

/// Explanation attached to every generated distractor
pub const SWAP_EXPLANATION: &str = "The key word was swapped for another word from today's deck.";

/// Re-case `replacement` after the matched occurrence: all caps stays all
/// caps, a leading capital stays a leading capital.
pub fn preserve_case(matched: &str, replacement: &str) -> String {
    let has_cased = matched.chars().any(char::is_alphabetic);
    if has_cased && !matched.chars().any(char::is_lowercase) {
        return replacement.to_uppercase();
    }

    if matched.chars().next().is_some_and(char::is_uppercase) {
        let mut chars = replacement.chars();
        return match chars.next() {
            Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
            None => String::new(),
        };
    }

    replacement.to_string()
}

/// Result of a successful swap
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Swapped {
    pub text: String,
    /// The replacement as it appears in `text`, after re-casing
    pub inserted: String,
}

/// Replace the first whole-word, case-insensitive occurrence of `target`.
///
/// Returns `None` when the word does not occur as a whole word or the
/// replacement leaves the text unchanged.
pub fn swap_word(text: &str, target: &str, replacement: &str) -> Option<Swapped> {
    if target.trim().is_empty() {
        return None;
    }

    let pattern = format!(r"(?i)\b{}\b", regex::escape(target));
    let re = Regex::new(&pattern).ok()?;
    let found = re.find(text)?;
    let inserted = preserve_case(found.as_str(), replacement);

    let swapped = format!("{}{}{}", &text[..found.start()], inserted, &text[found.end()..]);
    if swapped == text {
        None
    } else {
        Some(Swapped {
            text: swapped,
            inserted,
        })
    }
}

/// Build an incorrect example from a correct `base` sentence for `word`,
/// drawing the replacement uniformly from the other `deck_words`.
pub fn make_distractor<R: Rng + ?Sized>(
    base: &SentencePair,
    word: &str,
    deck_words: &[String],
    rng: &mut R,
) -> Option<Example> {
    let target = word.to_lowercase();
    let candidates: Vec<&String> = deck_words
        .iter()
        .filter(|w| w.to_lowercase() != target)
        .collect();
    let replacement = candidates.choose(rng)?;
    let swapped = swap_word(&base.text, word, replacement)?;

    Some(Example {
        text: swapped.text,
        translation: base.translation.clone(),
        used_words: BTreeSet::from([word.to_string()]),
        is_correct: false,
        proposal: Some(base.clone()),
        error_highlight: BTreeSet::from([swapped.inserted]),
        explanation: Some(SWAP_EXPLANATION.to_string()),
    })
}
