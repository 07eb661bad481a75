use std::collections::HashSet;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::CardProgress;

pub const MAX_DUE_PER_SESSION: usize = 20;
pub const MAX_NEW_PER_SESSION: usize = 10;
pub const MAX_SESSION_SIZE: usize = 25;
/// Above this many due cards the recommendation switches to review-only.
const DUE_OVERLOAD: usize = 15;

/// Cards whose next review has passed, oldest overdue first. Pure over
/// the snapshot it is handed; it never re-reads storage.
pub fn select_due(progress: &[CardProgress], now: DateTime<Utc>, limit: usize) -> Vec<Uuid> {
    let mut due: Vec<&CardProgress> = progress
        .iter()
        .filter(|p| p.next_review_at <= now)
        .collect();
    // Staleness order, not score order: the longest-waiting card wins.
    due.sort_by_key(|p| p.next_review_at);
    due.into_iter().take(limit).map(|p| p.card_id).collect()
}

/// Cards with no progress row at all, kept in the caller-supplied
/// order. Presentation shuffling happens later, in session assembly.
pub fn select_new(all_cards: &[Uuid], progress: &[CardProgress], limit: usize) -> Vec<Uuid> {
    let seen: HashSet<Uuid> = progress.iter().map(|p| p.card_id).collect();
    all_cards
        .iter()
        .filter(|id| !seen.contains(id))
        .take(limit)
        .copied()
        .collect()
}

/// Advisory session composition. The caps here bound what we suggest,
/// not what a caller may explicitly request via max_cards.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionPlan {
    pub due_cards: usize,
    pub new_cards: usize,
    pub total_session: usize,
    pub recommendation: String,
}

pub fn recommend(total_cards: usize, new_count: usize, due_count: usize) -> SessionPlan {
    let due = due_count.min(MAX_DUE_PER_SESSION);
    // Due cards take priority within the combined session cap.
    let new = new_count
        .min(MAX_NEW_PER_SESSION)
        .min(MAX_SESSION_SIZE.saturating_sub(due));

    // Precedence matters: overload beats balance beats empty.
    let recommendation = if due_count > DUE_OVERLOAD {
        format!(
            "You have {} cards waiting. Focus on reviewing before picking up new material.",
            due_count
        )
    } else if new_count > 0 {
        format!(
            "Review {} due cards and learn {} new ones from the {} in this deck.",
            due, new, total_cards
        )
    } else if due_count == 0 {
        "All caught up. Nothing is due right now.".to_string()
    } else {
        format!("A light review session: {} cards are due.", due)
    };

    SessionPlan {
        due_cards: due,
        new_cards: new,
        total_session: due + new,
        recommendation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn progress_due_at(card_id: Uuid, next_review_at: DateTime<Utc>) -> CardProgress {
        CardProgress {
            card_id,
            deck_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            ease_factor: 2.5,
            interval_days: 1,
            review_count: 1,
            correct_count: 1,
            mastery_level: 1,
            last_reviewed_at: next_review_at - Duration::days(1),
            next_review_at,
        }
    }

    #[test]
    fn due_selection_filters_sorts_and_truncates() {
        let now = Utc::now();
        let oldest = Uuid::new_v4();
        let older = Uuid::new_v4();
        let recent = Uuid::new_v4();
        let future = Uuid::new_v4();
        let progress = vec![
            progress_due_at(recent, now - Duration::hours(1)),
            progress_due_at(oldest, now - Duration::days(5)),
            progress_due_at(future, now + Duration::days(3)),
            progress_due_at(older, now - Duration::days(2)),
        ];

        let picked = select_due(&progress, now, 10);
        assert_eq!(picked, vec![oldest, older, recent]);

        let capped = select_due(&progress, now, 2);
        assert_eq!(capped, vec![oldest, older]);
    }

    #[test]
    fn due_selection_is_idempotent_over_a_snapshot() {
        let now = Utc::now();
        let progress: Vec<CardProgress> = (0..5)
            .map(|i| progress_due_at(Uuid::new_v4(), now - Duration::days(i)))
            .collect();
        assert_eq!(select_due(&progress, now, 3), select_due(&progress, now, 3));
    }

    #[test]
    fn new_selection_keeps_caller_order() {
        let now = Utc::now();
        let ids: Vec<Uuid> = (0..6).map(|_| Uuid::new_v4()).collect();
        let progress = vec![
            progress_due_at(ids[1], now),
            progress_due_at(ids[4], now),
        ];

        let picked = select_new(&ids, &progress, 10);
        assert_eq!(picked, vec![ids[0], ids[2], ids[3], ids[5]]);

        let capped = select_new(&ids, &progress, 2);
        assert_eq!(capped, vec![ids[0], ids[2]]);
    }

    #[test]
    fn recommendation_respects_caps() {
        let plan = recommend(100, 50, 50);
        assert_eq!(plan.due_cards, 20);
        assert_eq!(plan.new_cards, 5);
        assert_eq!(plan.total_session, 25);
        assert!(plan.due_cards <= MAX_DUE_PER_SESSION);
        assert!(plan.new_cards <= MAX_NEW_PER_SESSION);
        assert!(plan.total_session <= MAX_SESSION_SIZE);
    }

    #[test]
    fn overload_message_wins_over_balance() {
        let plan = recommend(40, 5, 16);
        assert!(plan.recommendation.contains("Focus on reviewing"));
    }

    #[test]
    fn balanced_message_when_new_cards_exist() {
        let plan = recommend(40, 5, 10);
        assert!(plan.recommendation.contains("new"));
    }

    #[test]
    fn new_card_framing_on_a_fresh_deck() {
        let plan = recommend(30, 30, 0);
        assert_eq!(plan.due_cards, 0);
        assert_eq!(plan.new_cards, 10);
        assert!(plan.recommendation.contains("new"));
    }

    #[test]
    fn caught_up_when_nothing_to_do() {
        let plan = recommend(12, 0, 0);
        assert_eq!(plan.total_session, 0);
        assert!(plan.recommendation.contains("caught up"));
    }

    #[test]
    fn review_only_when_due_but_nothing_new() {
        let plan = recommend(12, 0, 4);
        assert_eq!(plan.due_cards, 4);
        assert_eq!(plan.new_cards, 0);
        assert!(plan.recommendation.contains("review session"));
    }
}
