//! Trust or Bust - vocabulary trust game engine
//!
//! A learner studies a small deck of words in the morning, then judges
//! sentences in the evening against a counterpart who can be disputed.

pub mod content;
pub mod core;
pub mod game;
pub mod ledger;
pub mod remote;
