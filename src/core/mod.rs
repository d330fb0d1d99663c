pub mod config;
pub mod error;
pub mod guard;
pub mod types;

pub use config::{GameConfig, Stakes};
pub use error::{GameError, Result};
pub use types::{AuditSessionId, LearnerId, Level, Stage, WordId};
