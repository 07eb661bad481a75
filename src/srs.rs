use chrono::{DateTime, Duration, Utc};

use crate::error::EngineError;
use crate::models::{CardProgress, MasteryStats};

/// Ease factor assigned to a card with no history.
pub const INITIAL_EASE_FACTOR: f64 = 2.5;
/// EF never drops below this, preventing runaway short intervals.
pub const MIN_EASE_FACTOR: f64 = 1.3;
/// Quality at or above this counts as a successful review.
pub const PASS_THRESHOLD: u8 = 3;
pub const MAX_QUALITY: u8 = 5;
pub const MAX_MASTERY: i64 = 5;

/// Scheduling numbers for one card, stripped of identity. This is what
/// the update function reads and writes; the orchestrator joins it back
/// to a (user, deck, card) triple before persisting.
#[derive(Debug, Clone, PartialEq)]
pub struct Scheduling {
    pub ease_factor: f64,
    pub interval_days: i64,
    pub review_count: i64,
    pub correct_count: i64,
    pub mastery_level: i64,
}

impl Scheduling {
    /// The zero-state every card implicitly starts from.
    pub fn fresh() -> Self {
        Self {
            ease_factor: INITIAL_EASE_FACTOR,
            interval_days: 0,
            review_count: 0,
            correct_count: 0,
            mastery_level: 0,
        }
    }
}

/// A card either has no history at all or carries a scheduling record.
/// Keeping the distinction explicit avoids default-field guessing at
/// call sites.
#[derive(Debug, Clone)]
pub enum CardState {
    Unreviewed,
    Reviewed(Scheduling),
}

impl CardState {
    pub fn from_progress(progress: Option<&CardProgress>) -> Self {
        match progress {
            None => CardState::Unreviewed,
            Some(p) => CardState::Reviewed(Scheduling {
                ease_factor: p.ease_factor,
                interval_days: p.interval_days,
                review_count: p.review_count,
                correct_count: p.correct_count,
                mastery_level: p.mastery_level,
            }),
        }
    }

    fn scheduling(&self) -> Scheduling {
        match self {
            CardState::Unreviewed => Scheduling::fresh(),
            CardState::Reviewed(s) => s.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReviewUpdate {
    pub scheduling: Scheduling,
    pub last_reviewed_at: DateTime<Utc>,
    pub next_review_at: DateTime<Utc>,
}

/// Applies one graded review to a card's scheduling state (SM-2).
///
/// Quality:
/// 5 - Perfect response
/// 4 - Correct response after a hesitation
/// 3 - Correct response recalled with serious difficulty
/// 2 - Incorrect response; where the correct one seemed easy to recall
/// 1 - Incorrect response; the correct one remembered
/// 0 - Complete blackout.
///
/// The ease factor recurrence runs on both branches; the interval and
/// mastery logic then split on pass/fail. `correct` feeds the separate
/// correct_count tally and may disagree with the quality branch.
///
/// Pure: no I/O, and `now` is injected so identical inputs give
/// identical outputs.
pub fn apply_review(
    quality: u8,
    prior: &CardState,
    correct: bool,
    now: DateTime<Utc>,
) -> Result<ReviewUpdate, EngineError> {
    if quality > MAX_QUALITY {
        return Err(EngineError::InvalidQuality(quality));
    }

    let mut s = prior.scheduling();

    // EF' = EF + (0.1 - (5 - q) * (0.08 + (5 - q) * 0.02))
    let q = quality as f64;
    let new_ef = s.ease_factor + (0.1 - (5.0 - q) * (0.08 + (5.0 - q) * 0.02));
    s.ease_factor = new_ef.max(MIN_EASE_FACTOR);

    if quality >= PASS_THRESHOLD {
        if s.review_count == 0 {
            s.interval_days = 1;
            s.mastery_level = 1;
        } else if s.review_count == 1 {
            s.interval_days = 6;
            s.mastery_level = 2;
        } else {
            s.interval_days = (s.interval_days as f64 * s.ease_factor).round() as i64;
            // This branch only ever moves mastery up; short intervals
            // leave the level where it was.
            s.mastery_level = s
                .mastery_level
                .max(mastery_from_interval(s.interval_days, s.mastery_level));
        }
        s.review_count += 1;
    } else {
        // Failed: the card comes straight back, one mastery step down.
        s.interval_days = 0;
        s.mastery_level = (s.mastery_level - 1).max(0);
    }

    if correct {
        s.correct_count += 1;
    }

    Ok(ReviewUpdate {
        next_review_at: now + Duration::days(s.interval_days),
        last_reviewed_at: now,
        scheduling: s,
    })
}

/// Mastery from interval length. Partial on purpose: below a week the
/// caller's current level stands.
pub fn mastery_from_interval(interval_days: i64, current: i64) -> i64 {
    if interval_days >= 30 {
        MAX_MASTERY
    } else if interval_days >= 14 {
        4
    } else if interval_days >= 7 {
        3
    } else {
        current
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MasteryBucket {
    New,
    Learning,
    Familiar,
    WellKnown,
    Mastered,
}

pub fn mastery_bucket(level: i64) -> MasteryBucket {
    match level {
        l if l <= 0 => MasteryBucket::New,
        1 | 2 => MasteryBucket::Learning,
        3 => MasteryBucket::Familiar,
        4 => MasteryBucket::WellKnown,
        _ => MasteryBucket::Mastered,
    }
}

/// Rebuilds deck-level stats from the full set of progress rows.
pub fn aggregate_stats(rows: &[CardProgress]) -> MasteryStats {
    let mut stats = MasteryStats::default();
    for row in rows {
        match mastery_bucket(row.mastery_level) {
            MasteryBucket::New => stats.new += 1,
            MasteryBucket::Learning => stats.learning += 1,
            MasteryBucket::Familiar => stats.familiar += 1,
            MasteryBucket::WellKnown => stats.well_known += 1,
            MasteryBucket::Mastered => stats.mastered += 1,
        }
    }
    if !rows.is_empty() {
        let total: i64 = rows.iter().map(|r| r.mastery_level).sum();
        stats.average_mastery = total as f64 / rows.len() as f64;
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn reviewed(ease: f64, interval: i64, reviews: i64, mastery: i64) -> CardState {
        CardState::Reviewed(Scheduling {
            ease_factor: ease,
            interval_days: interval,
            review_count: reviews,
            correct_count: reviews,
            mastery_level: mastery,
        })
    }

    fn progress_with_mastery(level: i64) -> CardProgress {
        CardProgress {
            card_id: Uuid::new_v4(),
            deck_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            ease_factor: INITIAL_EASE_FACTOR,
            interval_days: 0,
            review_count: 0,
            correct_count: 0,
            mastery_level: level,
            last_reviewed_at: Utc::now(),
            next_review_at: Utc::now(),
        }
    }

    #[test]
    fn rejects_out_of_range_quality() {
        let err = apply_review(6, &CardState::Unreviewed, true, Utc::now());
        assert!(matches!(err, Err(EngineError::InvalidQuality(6))));
    }

    #[test]
    fn ease_factor_never_drops_below_floor() {
        for q in 0..=MAX_QUALITY {
            let prior = reviewed(MIN_EASE_FACTOR, 10, 5, 3);
            let update = apply_review(q, &prior, false, Utc::now()).unwrap();
            assert!(update.scheduling.ease_factor >= MIN_EASE_FACTOR);
        }
    }

    #[test]
    fn failure_resets_interval_and_keeps_review_count() {
        for q in 0..PASS_THRESHOLD {
            let prior = reviewed(2.2, 12, 4, 4);
            let update = apply_review(q, &prior, false, Utc::now()).unwrap();
            assert_eq!(update.scheduling.interval_days, 0);
            assert_eq!(update.scheduling.review_count, 4);
            assert_eq!(update.scheduling.mastery_level, 3);
        }
    }

    #[test]
    fn failed_mastery_floors_at_zero() {
        let update = apply_review(0, &CardState::Unreviewed, false, Utc::now()).unwrap();
        assert_eq!(update.scheduling.mastery_level, 0);
    }

    #[test]
    fn first_success_schedules_one_day() {
        let update = apply_review(4, &CardState::Unreviewed, true, Utc::now()).unwrap();
        assert_eq!(update.scheduling.interval_days, 1);
        assert_eq!(update.scheduling.mastery_level, 1);
        assert_eq!(update.scheduling.review_count, 1);
    }

    #[test]
    fn second_success_schedules_six_days() {
        let prior = reviewed(2.5, 1, 1, 1);
        let update = apply_review(4, &prior, true, Utc::now()).unwrap();
        assert_eq!(update.scheduling.interval_days, 6);
        assert_eq!(update.scheduling.mastery_level, 2);
        assert_eq!(update.scheduling.review_count, 2);
    }

    #[test]
    fn third_success_multiplies_by_new_ease() {
        // q=5 bumps ease 2.7 -> 2.8, then round(6 * 2.8) = 17.
        let prior = reviewed(2.7, 6, 2, 2);
        let update = apply_review(5, &prior, true, Utc::now()).unwrap();
        assert_eq!(update.scheduling.interval_days, 17);
        assert_eq!(update.scheduling.mastery_level, 4);
        assert_eq!(update.scheduling.review_count, 3);
    }

    #[test]
    fn mastery_is_never_lowered_on_success() {
        // A success landing on a short interval keeps the old level.
        let prior = reviewed(1.3, 2, 3, 4);
        let update = apply_review(3, &prior, true, Utc::now()).unwrap();
        assert!(update.scheduling.interval_days < 7);
        assert_eq!(update.scheduling.mastery_level, 4);
    }

    #[test]
    fn correct_flag_drives_correct_count_independently() {
        // Failed on quality but flagged correct: count still moves.
        let prior = reviewed(2.5, 6, 2, 2);
        let update = apply_review(2, &prior, true, Utc::now()).unwrap();
        assert_eq!(update.scheduling.correct_count, 3);
        assert_eq!(update.scheduling.review_count, 2);
    }

    #[test]
    fn next_review_is_last_review_plus_interval() {
        let now = Utc::now();
        let prior = reviewed(2.5, 1, 1, 1);
        let update = apply_review(4, &prior, true, now).unwrap();
        assert_eq!(update.last_reviewed_at, now);
        assert_eq!(update.next_review_at, now + Duration::days(6));
    }

    #[test]
    fn three_perfect_reviews_from_scratch() {
        // Day-by-day: intervals 1, 6, round(6 * ef) with mastery 1 -> 2 -> 4.
        let mut state = CardState::Unreviewed;
        let mut intervals = Vec::new();
        let mut masteries = Vec::new();
        for day in 0..3 {
            let now = Utc::now() + Duration::days(day * 7);
            let update = apply_review(5, &state, true, now).unwrap();
            intervals.push(update.scheduling.interval_days);
            masteries.push(update.scheduling.mastery_level);
            state = CardState::Reviewed(update.scheduling);
        }
        assert_eq!(intervals, vec![1, 6, 17]);
        assert_eq!(masteries[0], 1);
        assert_eq!(masteries[1], 2);
        assert!(masteries[2] >= 3);
    }

    #[test]
    fn lapse_on_mature_card() {
        let prior = reviewed(2.0, 20, 5, 4);
        let update = apply_review(1, &prior, false, Utc::now()).unwrap();
        assert_eq!(update.scheduling.interval_days, 0);
        assert_eq!(update.scheduling.review_count, 5);
        assert_eq!(update.scheduling.mastery_level, 3);
        // q=1 delta is -0.54: 2.0 -> 1.46.
        assert!((update.scheduling.ease_factor - 1.46).abs() < 1e-9);
    }

    #[test]
    fn interval_thresholds_map_to_levels() {
        assert_eq!(mastery_from_interval(30, 0), 5);
        assert_eq!(mastery_from_interval(14, 0), 4);
        assert_eq!(mastery_from_interval(7, 0), 3);
        assert_eq!(mastery_from_interval(6, 2), 2);
        assert_eq!(mastery_from_interval(0, 1), 1);
    }

    #[test]
    fn buckets_cover_all_levels() {
        assert_eq!(mastery_bucket(0), MasteryBucket::New);
        assert_eq!(mastery_bucket(1), MasteryBucket::Learning);
        assert_eq!(mastery_bucket(2), MasteryBucket::Learning);
        assert_eq!(mastery_bucket(3), MasteryBucket::Familiar);
        assert_eq!(mastery_bucket(4), MasteryBucket::WellKnown);
        assert_eq!(mastery_bucket(MAX_MASTERY), MasteryBucket::Mastered);
    }

    #[test]
    fn stats_aggregate_buckets_and_average() {
        let rows: Vec<CardProgress> = [0, 2, 3, 4, 5, 5]
            .into_iter()
            .map(progress_with_mastery)
            .collect();
        let stats = aggregate_stats(&rows);
        assert_eq!(stats.new, 1);
        assert_eq!(stats.learning, 1);
        assert_eq!(stats.familiar, 1);
        assert_eq!(stats.well_known, 1);
        assert_eq!(stats.mastered, 2);
        assert!((stats.average_mastery - 19.0 / 6.0).abs() < 1e-9);
    }

    #[test]
    fn stats_on_empty_deck_are_zero() {
        assert_eq!(aggregate_stats(&[]), MasteryStats::default());
    }
}
