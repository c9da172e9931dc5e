use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use crate::ai_flows::FlashcardContent;
use crate::models::Flashcard;
use crate::srs_scheduler::{ReviewGrade, SrsScheduler};
use crate::storage::{KvStore, flashcards_key};

/// Flashcard decks and their review scheduling, keyed per user and summary.
#[derive(Clone)]
pub struct CardService {
    store: KvStore,
    scheduler: SrsScheduler,
}

impl CardService {
    pub fn new(store: KvStore) -> Self {
        Self {
            store,
            scheduler: SrsScheduler::new(),
        }
    }

    /// Replaces the deck for this summary wholesale. Cards are never deleted
    /// individually; regenerating for a summary clears the previous set.
    pub async fn replace_deck(
        &self,
        username: &str,
        summary_hash: &str,
        contents: &[FlashcardContent],
        now: DateTime<Utc>,
    ) -> Result<Vec<Flashcard>> {
        let deck: Vec<Flashcard> = contents
            .iter()
            .map(|content| {
                self.scheduler.initialize(
                    content.question.clone(),
                    content.answer.clone(),
                    Some(summary_hash.to_string()),
                    now,
                )
            })
            .collect();

        self.store
            .set(&flashcards_key(username, summary_hash), &deck)
            .await?;

        info!(
            username = %username,
            summary_hash = %summary_hash,
            card_count = deck.len(),
            "Replaced flashcard deck"
        );
        Ok(deck)
    }

    pub async fn deck(&self, username: &str, summary_hash: &str) -> Result<Vec<Flashcard>> {
        self.store
            .get_or_default(&flashcards_key(username, summary_hash))
            .await
    }

    /// Cards whose review is due at or before `now`, soonest first.
    pub async fn due_cards(
        &self,
        username: &str,
        summary_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Flashcard>> {
        let mut due: Vec<Flashcard> = self
            .deck(username, summary_hash)
            .await?
            .into_iter()
            .filter(|card| card.due <= now)
            .collect();
        due.sort_by_key(|card| card.due);
        Ok(due)
    }

    /// Applies a review grade to one card and persists the updated deck.
    /// Returns `None` when the card is not in the deck.
    pub async fn review(
        &self,
        username: &str,
        summary_hash: &str,
        card_id: Uuid,
        grade: ReviewGrade,
        now: DateTime<Utc>,
    ) -> Result<Option<Flashcard>> {
        let mut deck = self.deck(username, summary_hash).await?;
        let Some(slot) = deck.iter_mut().find(|card| card.id == card_id) else {
            return Ok(None);
        };

        let updated = self.scheduler.review(slot, grade, now);
        *slot = updated.clone();
        self.store
            .set(&flashcards_key(username, summary_hash), &deck)
            .await?;

        info!(
            username = %username,
            card_id = %card_id,
            repetition = updated.repetition,
            interval_days = updated.interval_days,
            "Reviewed flashcard"
        );
        Ok(Some(updated))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn service() -> CardService {
        CardService::new(KvStore::new("sqlite::memory:").await.unwrap())
    }

    fn contents() -> Vec<FlashcardContent> {
        vec![
            FlashcardContent {
                question: "Who founded the Mauryan empire?".to_string(),
                answer: "Chandragupta Maurya".to_string(),
            },
            FlashcardContent {
                question: "Which edicts describe Ashoka's dhamma?".to_string(),
                answer: "The rock and pillar edicts".to_string(),
            },
        ]
    }

    #[tokio::test]
    async fn new_deck_is_due_immediately() {
        let service = service().await;
        let now = Utc::now();

        let deck = service
            .replace_deck("asha", "ab12", &contents(), now)
            .await
            .unwrap();
        assert_eq!(deck.len(), 2);
        assert!(deck.iter().all(|c| c.repetition == 0 && c.due == now));
        assert!(deck.iter().all(|c| c.summary_hash.as_deref() == Some("ab12")));

        let due = service.due_cards("asha", "ab12", now).await.unwrap();
        assert_eq!(due.len(), 2);
    }

    #[tokio::test]
    async fn regenerating_replaces_previous_deck() {
        let service = service().await;
        let now = Utc::now();

        service
            .replace_deck("asha", "ab12", &contents(), now)
            .await
            .unwrap();
        let replacement = vec![FlashcardContent {
            question: "New question".to_string(),
            answer: "New answer".to_string(),
        }];
        service
            .replace_deck("asha", "ab12", &replacement, now)
            .await
            .unwrap();

        let deck = service.deck("asha", "ab12").await.unwrap();
        assert_eq!(deck.len(), 1);
        assert_eq!(deck[0].question, "New question");
    }

    #[tokio::test]
    async fn decks_are_isolated_per_summary() {
        let service = service().await;
        let now = Utc::now();

        service
            .replace_deck("asha", "ab12", &contents(), now)
            .await
            .unwrap();
        let other = service.deck("asha", "cd34").await.unwrap();
        assert!(other.is_empty());
    }

    #[tokio::test]
    async fn reviewing_reschedules_and_persists() {
        let service = service().await;
        let now = Utc::now();

        let deck = service
            .replace_deck("asha", "ab12", &contents(), now)
            .await
            .unwrap();
        let card_id = deck[0].id;

        let updated = service
            .review("asha", "ab12", card_id, ReviewGrade::Good, now)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.repetition, 1);
        assert_eq!(updated.interval_days, 1.0);

        // The scheduled card is no longer due.
        let due = service.due_cards("asha", "ab12", now).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_ne!(due[0].id, card_id);

        // And the persisted deck reflects the review.
        let reloaded = service.deck("asha", "ab12").await.unwrap();
        let stored = reloaded.iter().find(|c| c.id == card_id).unwrap();
        assert_eq!(stored.repetition, 1);
        assert!(stored.last_reviewed.is_some());
    }

    #[tokio::test]
    async fn reviewing_unknown_card_is_none() {
        let service = service().await;
        let now = Utc::now();

        service
            .replace_deck("asha", "ab12", &contents(), now)
            .await
            .unwrap();
        let missing = service
            .review("asha", "ab12", Uuid::new_v4(), ReviewGrade::Good, now)
            .await
            .unwrap();
        assert!(missing.is_none());
    }
}
