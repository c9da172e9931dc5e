use anyhow::Result;
use tracing::info;

use crate::models::QuizResult;
use crate::storage::{KvStore, quiz_results_key};

/// Maximum results kept per user; the oldest entry is evicted past this.
pub const MAX_QUIZ_HISTORY: usize = 20;

/// Append-only quiz history, newest first.
#[derive(Clone)]
pub struct QuizService {
    store: KvStore,
}

impl QuizService {
    pub fn new(store: KvStore) -> Self {
        Self { store }
    }

    pub async fn history(&self, username: &str) -> Result<Vec<QuizResult>> {
        self.store.get_or_default(&quiz_results_key(username)).await
    }

    pub async fn record_result(&self, username: &str, result: QuizResult) -> Result<Vec<QuizResult>> {
        let mut history = self.history(username).await?;
        history.insert(0, result);
        history.truncate(MAX_QUIZ_HISTORY);
        self.store.set(&quiz_results_key(username), &history).await?;

        info!(
            username = %username,
            history_len = history.len(),
            "Recorded quiz result"
        );
        Ok(history)
    }
}
