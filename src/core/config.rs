//! Game configuration with documented constants
//!
//! All tunable numbers are collected here with an explanation of what
//! they change in a learner's day. Values load from TOML; anything left
//! out falls back to the defaults below.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::error::{GameError, Result};
use crate::core::types::Level;

/// Configuration for the game engine and its collaborators
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    // === DECK ===
    /// Number of words drawn for one day
    ///
    /// Also the length of the evening queue: every deck word yields exactly
    /// one judged sentence.
    pub deck_size: usize,

    /// Word category the deck is drawn from (part of speech in the store)
    pub category: String,

    /// Level assigned to a learner who never picked one
    pub default_level: Level,

    // === COUNTERPART ===
    /// Probability that the counterpart agrees with a learner who is right
    ///
    /// At 0.7, roughly three in ten correct answers get challenged. The
    /// counterpart always agrees with the truth when the learner is wrong,
    /// so this is the only knob on dispute frequency.
    pub counterpart_agree_probability: f64,

    /// Money moved by dispute resolutions
    pub stakes: Stakes,

    // === COLLABORATORS ===
    /// Upper bound for every content-store and audit-sink call (milliseconds)
    ///
    /// A call that exceeds it is treated as failed and the day continues
    /// without it.
    pub io_timeout_ms: u64,

    /// Seed for all random draws; `None` seeds from entropy
    pub seed: Option<u64>,

    /// Most settled attempts kept for a later flush while the audit sink is
    /// down. Past this the oldest pending write is dropped; the in-memory
    /// ledger still has it.
    pub max_unsynced_attempts: usize,

    pub content: ContentSettings,
    pub audit: AuditSettings,

    /// Connection to the hosted database, needed by the `rest` backends
    pub rest: Option<RestSettings>,
}

/// Ledger amounts for dispute outcomes (all non-negative; signs are applied
/// by the engine)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Stakes {
    /// Paid to the counterpart when the learner concedes
    pub concede: i64,
    /// Won when a dictionary check proves the learner right
    pub check_win: i64,
    /// Lost when a dictionary check proves the learner wrong
    pub check_lose: i64,
}

impl Default for Stakes {
    fn default() -> Self {
        Self {
            concede: 50,
            check_win: 50,
            check_lose: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentSource {
    /// Static bank compiled into the binary
    #[default]
    Builtin,
    /// TOML content pack on disk
    Pack,
    /// Hosted database over PostgREST
    Rest,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ContentSettings {
    pub backend: ContentSource,
    /// Content pack location for the `pack` backend
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditSource {
    /// Keep the ledger in process memory
    #[default]
    Memory,
    /// Hosted database over PostgREST
    Rest,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuditSettings {
    pub backend: AuditSource,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RestSettings {
    /// Base URL of the project, e.g. `https://xyz.supabase.co`
    pub url: String,
    /// Service key sent as `apikey` and bearer token
    pub api_key: String,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            deck_size: 5,
            category: "adjectives".into(),
            default_level: Level::A2,
            counterpart_agree_probability: 0.7,
            stakes: Stakes::default(),
            io_timeout_ms: 3000,
            seed: None,
            max_unsynced_attempts: 256,
            content: ContentSettings::default(),
            audit: AuditSettings::default(),
            rest: None,
        }
    }
}

impl GameConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: GameConfig = toml::from_str(content)?;
        config.validate().map_err(GameError::Config)?;
        Ok(config)
    }

    /// Load a TOML file, then apply environment overrides
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: GameConfig = toml::from_str(&content)?;
        config.apply_env();
        config.validate().map_err(GameError::Config)?;
        Ok(config)
    }

    /// Apply `TOB_REST_URL`, `TOB_REST_KEY` and `TOB_SEED` when set
    pub fn apply_env(&mut self) {
        let url = std::env::var("TOB_REST_URL").ok();
        let key = std::env::var("TOB_REST_KEY").ok();
        if let (Some(url), Some(api_key)) = (&url, &key) {
            self.rest = Some(RestSettings {
                url: url.clone(),
                api_key: api_key.clone(),
            });
        } else if let Some(rest) = self.rest.as_mut() {
            if let Some(url) = url {
                rest.url = url;
            }
            if let Some(api_key) = key {
                rest.api_key = api_key;
            }
        }

        if let Some(seed) = std::env::var("TOB_SEED").ok().and_then(|s| parse_seed(&s)) {
            self.seed = Some(seed);
        }
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }

    /// Validate configuration for internal consistency
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.deck_size == 0 {
            return Err("deck_size must be at least 1".into());
        }

        if !(0.0..=1.0).contains(&self.counterpart_agree_probability) {
            return Err(format!(
                "counterpart_agree_probability ({}) must be within [0, 1]",
                self.counterpart_agree_probability
            ));
        }

        if self.max_unsynced_attempts == 0 {
            return Err("max_unsynced_attempts must be at least 1".into());
        }

        if self.io_timeout_ms == 0 {
            return Err("io_timeout_ms must be positive".into());
        }

        let stakes = self.stakes;
        if stakes.concede < 0 || stakes.check_win < 0 || stakes.check_lose < 0 {
            return Err("stakes are magnitudes and must not be negative".into());
        }

        if self.content.backend == ContentSource::Pack && self.content.path.is_none() {
            return Err("content backend 'pack' needs content.path".into());
        }

        let wants_rest =
            self.content.backend == ContentSource::Rest || self.audit.backend == AuditSource::Rest;
        if wants_rest && self.rest.is_none() {
            return Err("rest backends need a [rest] section (or TOB_REST_URL/TOB_REST_KEY)".into());
        }

        Ok(())
    }
}

fn parse_seed(raw: &str) -> Option<u64> {
    match raw.trim().parse() {
        Ok(seed) => Some(seed),
        Err(_) => {
            tracing::warn!("TOB_SEED '{}' is not a u64 - ignoring it", raw);
            None
        }
    }
}
