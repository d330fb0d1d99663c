//! Session engine
//!
//! - [`distractor`]: incorrect sentences built by swapping a deck word
//! - [`judgment`]: the counterpart's biased verdict
//! - [`queue`]: evening queue construction
//! - [`session`]: the per-learner state machine
//! - [`registry`]: sessions keyed by learner, one lock each
//! - [`view`]: replies handed to the transport

pub mod distractor;
pub mod judgment;
pub mod queue;
pub mod registry;
pub mod session;
pub mod view;

pub use distractor::{make_distractor, swap_word, Swapped};
pub use judgment::Counterpart;
pub use queue::{build_evening_queue, EveningItem, WordMaterial};
pub use registry::SessionRegistry;
pub use session::{DeckSource, DisputeContext, GameContext, LearnerSession};
pub use view::{
    DaySummary, DisputeAction, DisputeReply, EveningNext, EveningPrompt, MorningCard, MorningStep,
    PersistenceWarning, Reply, ResolutionNote, VerdictReply,
};
