//! Counterpart verdicts
//!
//! The counterpart never backs a wrong learner, but second-guesses a right
//! one often enough to make disputes worth having. No state is carried
//! between items: every verdict is a fresh draw.

use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Counterpart {
    /// Chance of agreeing with a learner whose verdict matches the truth
    pub agree_probability: f64,
}

impl Default for Counterpart {
    fn default() -> Self {
        Self {
            agree_probability: 0.7,
        }
    }
}

impl Counterpart {
    /// Out-of-range values are clamped; NaN and infinities fall back to
    /// the default.
    pub fn new(agree_probability: f64) -> Self {
        if !agree_probability.is_finite() {
            tracing::warn!(
                "Counterpart agree probability {} is not finite, using default",
                agree_probability
            );
            return Self::default();
        }
        Self {
            agree_probability: agree_probability.clamp(0.0, 1.0),
        }
    }

    /// Counterpart's claim about whether the shown sentence is correct
    pub fn judge<R: Rng + ?Sized>(&self, truth: bool, learner_verdict: bool, rng: &mut R) -> bool {
        if learner_verdict != truth {
            return truth;
        }

        if rng.gen_bool(self.agree_probability) {
            truth
        } else {
            !truth
        }
    }

    /// Label shown next to the counterpart's verdict
    pub fn label(verdict: bool) -> &'static str {
        if verdict {
            "correct"
        } else {
            "incorrect"
        }
    }
}
