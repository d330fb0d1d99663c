//! Statistics and CSV rendering over exported attempts

use serde::Serialize;

use crate::ledger::AttemptRecord;

const CSV_HEADER: &[&str] = &[
    "created_at",
    "session_id",
    "level",
    "item_index",
    "word",
    "sentence",
    "translation",
    "truth",
    "learner_verdict",
    "counterpart_verdict",
    "outcome",
    "delta",
    "balance_after",
];

/// Aggregate over a learner's settled items
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct LearnerStats {
    pub total: usize,
    /// Items where the learner's verdict matched the truth
    pub correct: usize,
    pub accuracy_percent: f64,
    pub sum_delta: i64,
}

impl LearnerStats {
    pub fn from_records(records: &[AttemptRecord]) -> Self {
        let total = records.len();
        let correct = records
            .iter()
            .filter(|r| r.truth == r.learner_verdict)
            .count();
        let sum_delta = records.iter().map(|r| r.delta).sum();
        let accuracy_percent = if total == 0 {
            0.0
        } else {
            // one decimal place
            ((correct as f64 / total as f64) * 1000.0).round() / 10.0
        };

        Self {
            total,
            correct,
            accuracy_percent,
            sum_delta,
        }
    }
}

fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Render records as CSV, header first, one row per record
pub fn render_csv(records: &[AttemptRecord]) -> String {
    let mut out = CSV_HEADER.join(",");
    out.push('\n');

    for r in records {
        let fields = [
            r.created_at.to_rfc3339(),
            r.session_id.map(|id| id.to_string()).unwrap_or_default(),
            r.level.to_string(),
            r.item_index.to_string(),
            r.word.clone(),
            r.shown_text.clone(),
            r.shown_translation.clone(),
            r.truth.to_string(),
            r.learner_verdict.to_string(),
            r.counterpart_verdict.to_string(),
            r.outcome.to_string(),
            r.delta.to_string(),
            r.balance_after.to_string(),
        ];
        let row: Vec<String> = fields.iter().map(|f| escape(f)).collect();
        out.push_str(&row.join(","));
        out.push('\n');
    }

    out
}
