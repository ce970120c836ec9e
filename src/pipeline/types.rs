//! Shared types for the translation pipeline.

use serde::Serialize;

/// Parameters fixed for the lifetime of a pipeline.
#[derive(Debug, Clone)]
pub struct RunParams {
    /// Search expression passed verbatim to the inbox.
    pub criteria: String,
    /// Messages older than this many whole days are skipped.
    pub max_age_days: i64,
    pub sender_address: String,
    pub recipient_address: String,
}

/// Terminal state of one candidate message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Id already in the ledger; not fetched.
    AlreadyProcessed,
    /// Older than the age threshold.
    TooOld { age_days: i64 },
    /// No translatable text (e.g. image-only).
    NoContent,
    /// Translated and handed to the outbox.
    Delivered {
        segments: usize,
        chunks: usize,
        degraded: bool,
    },
}

impl Outcome {
    /// Whether this outcome is recorded in the ledger.
    pub fn marks_seen(&self) -> bool {
        matches!(self, Outcome::Delivered { .. } | Outcome::NoContent)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Outcome::AlreadyProcessed => "already_processed",
            Outcome::TooOld { .. } => "too_old",
            Outcome::NoContent => "no_content",
            Outcome::Delivered { .. } => "delivered",
        }
    }
}

/// Counters for one pass over the inbox.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Candidates examined (excludes any left after a stop).
    pub seen: usize,
    pub delivered: usize,
    pub already_processed: usize,
    pub too_old: usize,
    pub no_content: usize,
    /// Per-message errors; these ids stay out of the ledger.
    pub failed: usize,
    /// A shutdown request ended the pass early.
    pub stopped: bool,
}

impl RunSummary {
    pub fn record(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::AlreadyProcessed => self.already_processed += 1,
            Outcome::TooOld { .. } => self.too_old += 1,
            Outcome::NoContent => self.no_content += 1,
            Outcome::Delivered { .. } => self.delivered += 1,
        }
    }
}
