use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::models::Flashcard;

pub const MIN_EASE_FACTOR: f64 = 1.3;
pub const DEFAULT_EASE_FACTOR: f64 = 2.5;

const FIRST_INTERVAL_DAYS: f64 = 1.0;
const SECOND_INTERVAL_DAYS: f64 = 6.0;
const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Recall quality reported by the user after seeing the answer.
/// Grades below `Good` count as a lapse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewGrade {
    Again = 0,
    Hard = 1,
    Good = 2,
    Easy = 3,
}

impl ReviewGrade {
    pub fn from_int(grade: i32) -> Option<ReviewGrade> {
        match grade {
            0 => Some(ReviewGrade::Again),
            1 => Some(ReviewGrade::Hard),
            2 => Some(ReviewGrade::Good),
            3 => Some(ReviewGrade::Easy),
            _ => None,
        }
    }

    pub fn is_lapse(self) -> bool {
        matches!(self, ReviewGrade::Again | ReviewGrade::Hard)
    }
}

/// Simplified SM-2 scheduler. Both `initialize` and `review` are pure over
/// their inputs; the caller supplies the clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SrsScheduler;

impl SrsScheduler {
    pub fn new() -> Self {
        SrsScheduler
    }

    /// Fresh scheduling state for a newly generated card: due immediately,
    /// interval set on first review.
    pub fn initialize(
        &self,
        question: String,
        answer: String,
        summary_hash: Option<String>,
        now: DateTime<Utc>,
    ) -> Flashcard {
        Flashcard {
            id: Uuid::new_v4(),
            question,
            answer,
            interval_days: 0.0,
            repetition: 0,
            ease_factor: DEFAULT_EASE_FACTOR,
            due: now,
            last_reviewed: None,
            summary_hash,
        }
    }

    pub fn review(&self, card: &Flashcard, grade: ReviewGrade, now: DateTime<Utc>) -> Flashcard {
        let mut interval = card.interval_days;
        let mut repetition = card.repetition;
        let mut ease_factor = card.ease_factor;

        if grade.is_lapse() {
            // A lapse resets the card regardless of prior streak length.
            repetition = 0;
            interval = FIRST_INTERVAL_DAYS;
            ease_factor = (ease_factor - 0.2).max(MIN_EASE_FACTOR);
        } else {
            repetition += 1;
            interval = match repetition {
                1 => FIRST_INTERVAL_DAYS,
                2 => SECOND_INTERVAL_DAYS,
                // The growth step uses the ease factor as it stood before
                // any bonus from this review.
                _ => (card.interval_days * ease_factor).round(),
            };
            if grade == ReviewGrade::Easy {
                ease_factor += 0.1;
            }
            ease_factor = ease_factor.max(MIN_EASE_FACTOR);
        }

        Flashcard {
            id: card.id,
            question: card.question.clone(),
            answer: card.answer.clone(),
            interval_days: interval,
            repetition,
            ease_factor,
            due: now + Duration::milliseconds((interval * MILLIS_PER_DAY) as i64),
            last_reviewed: Some(now),
            summary_hash: card.summary_hash.clone(),
        }
    }
}
