use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Scheduling state for one card, per user and deck. Created on the
/// card's first review and mutated on every review after that.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardProgress {
    pub card_id: Uuid,
    pub deck_id: Uuid,
    pub user_id: Uuid,
    pub ease_factor: f64,
    pub interval_days: i64,
    /// Successful reviews only (quality >= 3). Never decremented.
    pub review_count: i64,
    /// Driven by the outcome's `correct` flag, not by quality.
    pub correct_count: i64,
    /// 0 = new/failed .. 5 = mastered.
    pub mastery_level: i64,
    pub last_reviewed_at: DateTime<Utc>,
    pub next_review_at: DateTime<Utc>,
}

/// One graded answer from a finished session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewOutcome {
    pub card_id: Uuid,
    /// 0 (blackout) .. 5 (perfect recall).
    pub quality: u8,
    /// Independent correctness signal; falls back to quality >= 3.
    pub correct: Option<bool>,
}

impl ReviewOutcome {
    pub fn was_correct(&self) -> bool {
        self.correct.unwrap_or(self.quality >= crate::srs::PASS_THRESHOLD)
    }
}

/// Card text as supplied by deck management. The engine never fetches
/// or generates content itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardContent {
    pub card_id: Uuid,
    pub front: String,
    pub back: String,
}

/// Display hint for the client. Does not affect scheduling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StudyMode {
    Flashcards,
    Quiz,
    Match,
}

impl StudyMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StudyMode::Flashcards => "flashcards",
            StudyMode::Quiz => "quiz",
            StudyMode::Match => "match",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "flashcards" => Some(StudyMode::Flashcards),
            "quiz" => Some(StudyMode::Quiz),
            "match" => Some(StudyMode::Match),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionCard {
    pub card: CardContent,
    /// True when no progress row existed at session build time.
    pub is_new: bool,
    pub progress: Option<CardProgress>,
}

/// A study session handed back to the caller. Presentation order is
/// shuffled; the due/new counts reflect what was selected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudySession {
    pub deck_id: Uuid,
    pub mode: StudyMode,
    pub cards: Vec<SessionCard>,
    pub due_cards: usize,
    pub new_cards: usize,
    pub recommendation: String,
}

/// Per-bucket mastery counts for one deck and user. Always recomputed
/// from the progress rows, never stored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MasteryStats {
    pub new: i64,
    pub learning: i64,
    pub familiar: i64,
    pub well_known: i64,
    pub mastered: i64,
    pub average_mastery: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub cards_studied: i64,
    pub cards_correct: i64,
    /// round(100 * cards_correct / cards_studied), 0 when nothing studied.
    pub accuracy: i64,
    /// Outcomes referencing cards outside the deck, skipped not applied.
    pub skipped_cards: Vec<Uuid>,
}

/// Immutable audit entry for a submitted session. Reporting only; the
/// scheduler never reads these back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: Uuid,
    pub deck_id: Uuid,
    pub user_id: Uuid,
    pub mode: StudyMode,
    pub duration_seconds: i64,
    pub cards_studied: i64,
    pub cards_correct: i64,
    pub accuracy: i64,
    pub outcomes: Vec<ReviewOutcome>,
    pub finished_at: DateTime<Utc>,
}
