use std::collections::{HashMap, HashSet};

use chrono::Utc;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::Db;
use crate::error::EngineError;
use crate::models::{
    CardContent, CardProgress, MasteryStats, ReviewOutcome, SessionCard, SessionRecord,
    SessionSummary, StudyMode, StudySession,
};
use crate::{scheduler, srs};

/// Everything the caller must supply to build a session. Card content
/// is owned by deck management; the engine only joins against it.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionRequest {
    pub deck_id: Uuid,
    pub user_id: Uuid,
    pub mode: StudyMode,
    pub max_cards: usize,
    pub cards: Vec<CardContent>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitRequest {
    pub deck_id: Uuid,
    pub user_id: Uuid,
    pub mode: StudyMode,
    pub duration_seconds: i64,
    /// The deck's current card-id set, supplied by deck management.
    pub card_ids: Vec<Uuid>,
    pub outcomes: Vec<ReviewOutcome>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionResult {
    pub per_card_updates: Vec<CardProgress>,
    pub stats: MasteryStats,
    pub summary: SessionSummary,
}

/// Builds a study session: due cards first (stalest leading), then new
/// cards up to max_cards, then a uniform shuffle of the combined list.
/// Selection order decides *which* cards get in; the shuffle decides
/// the order the client shows them in.
pub async fn build_session(
    db: &Db,
    req: &SessionRequest,
    rng: &mut (impl Rng + ?Sized),
) -> Result<StudySession, EngineError> {
    let deck_ids: Vec<Uuid> = req.cards.iter().map(|c| c.card_id).collect();
    let in_deck: HashSet<Uuid> = deck_ids.iter().copied().collect();

    // Progress rows for cards since removed from the deck are ignored.
    let progress: Vec<CardProgress> = db
        .progress_for_deck(req.user_id, req.deck_id)
        .await?
        .into_iter()
        .filter(|p| in_deck.contains(&p.card_id))
        .collect();

    let now = Utc::now();
    let due = scheduler::select_due(&progress, now, req.max_cards);
    let new = scheduler::select_new(&deck_ids, &progress, req.max_cards.saturating_sub(due.len()));

    // The recommendation speaks about the whole backlog, not just what
    // fit into this session.
    let total_due = progress.iter().filter(|p| p.next_review_at <= now).count();
    let total_new = deck_ids.len() - progress.len();
    let plan = scheduler::recommend(req.cards.len(), total_new, total_due);
    log::debug!(
        "recommended composition for deck {}: {} due + {} new ({} total)",
        req.deck_id,
        plan.due_cards,
        plan.new_cards,
        plan.total_session
    );

    let content_by_id: HashMap<Uuid, &CardContent> =
        req.cards.iter().map(|c| (c.card_id, c)).collect();
    let progress_by_id: HashMap<Uuid, &CardProgress> =
        progress.iter().map(|p| (p.card_id, p)).collect();
    let new_ids: HashSet<Uuid> = new.iter().copied().collect();

    let mut picked: Vec<Uuid> = due.iter().chain(new.iter()).copied().collect();
    picked.shuffle(rng);

    let cards = picked
        .iter()
        .filter_map(|id| content_by_id.get(id))
        .map(|content| SessionCard {
            card: (*content).clone(),
            is_new: new_ids.contains(&content.card_id),
            progress: progress_by_id.get(&content.card_id).map(|p| (*p).clone()),
        })
        .collect();

    log::debug!(
        "built session for deck {}: {} due, {} new of {} cards",
        req.deck_id,
        due.len(),
        new.len(),
        deck_ids.len()
    );

    Ok(StudySession {
        deck_id: req.deck_id,
        mode: req.mode,
        cards,
        due_cards: due.len(),
        new_cards: new.len(),
        recommendation: plan.recommendation,
    })
}

/// Applies a batch of review outcomes. Per-card writes are atomic
/// (compare-and-swap with one internal retry); the batch as a whole is
/// not, so outcomes already applied stay applied if a later one fails.
/// Unknown cards are skipped and reported, never fatal.
pub async fn submit_session(db: &Db, req: &SubmitRequest) -> Result<SessionResult, EngineError> {
    // Reject bad quality values before touching storage at all.
    for outcome in &req.outcomes {
        if outcome.quality > srs::MAX_QUALITY {
            return Err(EngineError::InvalidQuality(outcome.quality));
        }
    }

    let deck_cards: HashSet<Uuid> = req.card_ids.iter().copied().collect();
    let mut updates = Vec::new();
    let mut skipped = Vec::new();
    let mut cards_correct = 0i64;

    for outcome in &req.outcomes {
        if !deck_cards.contains(&outcome.card_id) {
            let err = EngineError::UnknownCard {
                card_id: outcome.card_id,
                deck_id: req.deck_id,
            };
            log::warn!("skipping outcome: {err}");
            skipped.push(outcome.card_id);
            continue;
        }

        let updated = apply_outcome(db, req, outcome).await?;
        if outcome.was_correct() {
            cards_correct += 1;
        }
        updates.push(updated);
    }

    let cards_studied = updates.len() as i64;
    let accuracy = if cards_studied > 0 {
        (100.0 * cards_correct as f64 / cards_studied as f64).round() as i64
    } else {
        0
    };

    let stats = srs::aggregate_stats(&db.progress_for_deck(req.user_id, req.deck_id).await?);

    let record = SessionRecord {
        session_id: Uuid::new_v4(),
        deck_id: req.deck_id,
        user_id: req.user_id,
        mode: req.mode,
        duration_seconds: req.duration_seconds,
        cards_studied,
        cards_correct,
        accuracy,
        outcomes: req.outcomes.clone(),
        finished_at: Utc::now(),
    };
    db.record_session(&record).await?;

    log::info!(
        "session submitted for deck {}: {} studied, {} correct, {} skipped",
        req.deck_id,
        cards_studied,
        cards_correct,
        skipped.len()
    );

    Ok(SessionResult {
        per_card_updates: updates,
        stats,
        summary: SessionSummary {
            cards_studied,
            cards_correct,
            accuracy,
            skipped_cards: skipped,
        },
    })
}

/// Read-modify-write for one card. The write is conditional on the
/// state we read; losing the race once triggers a fresh read and a
/// second attempt, after which the conflict is surfaced.
async fn apply_outcome(
    db: &Db,
    req: &SubmitRequest,
    outcome: &ReviewOutcome,
) -> Result<CardProgress, EngineError> {
    for attempt in 0..2 {
        let prior = db
            .progress_for_card(req.user_id, req.deck_id, outcome.card_id)
            .await?;
        let state = srs::CardState::from_progress(prior.as_ref());
        let update = srs::apply_review(outcome.quality, &state, outcome.was_correct(), Utc::now())?;

        let row = CardProgress {
            card_id: outcome.card_id,
            deck_id: req.deck_id,
            user_id: req.user_id,
            ease_factor: update.scheduling.ease_factor,
            interval_days: update.scheduling.interval_days,
            review_count: update.scheduling.review_count,
            correct_count: update.scheduling.correct_count,
            mastery_level: update.scheduling.mastery_level,
            last_reviewed_at: update.last_reviewed_at,
            next_review_at: update.next_review_at,
        };

        let stored = match &prior {
            None => db.insert_progress(&row).await?,
            Some(existing) => db.update_progress(&row, existing.last_reviewed_at).await?,
        };
        if stored {
            return Ok(row);
        }
        log::debug!(
            "write conflict on card {} (attempt {}), re-reading",
            outcome.card_id,
            attempt + 1
        );
    }
    Err(EngineError::Conflict(outcome.card_id))
}
