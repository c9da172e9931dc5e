use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::{Row, SqlitePool};
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Storage key for a user's profile record.
pub fn profile_key(username: &str) -> String {
    format!("profile:{username}")
}

pub fn tasks_key(username: &str) -> String {
    format!("tasks:{username}")
}

pub fn sessions_key(username: &str) -> String {
    format!("sessions:{username}")
}

pub fn quiz_results_key(username: &str) -> String {
    format!("quiz-results:{username}")
}

/// Flashcard decks are grouped per summary under the user.
pub fn flashcards_key(username: &str, summary_hash: &str) -> String {
    format!("flashcards:{username}:{summary_hash}")
}

/// Last logged-in username, kept as a session convenience.
pub const CURRENT_USER_KEY: &str = "current-user";

/// Notification that a key changed. Subscribers reload the whole value for
/// the key; the last writer wins, there is no merge.
#[derive(Debug, Clone)]
pub struct StoreEvent {
    pub key: String,
}

/// Per-user keyed JSON storage over a single SQLite table, with change
/// notifications for other holders of the same store.
#[derive(Clone)]
pub struct KvStore {
    pool: SqlitePool,
    events: broadcast::Sender<StoreEvent>,
}

impl KvStore {
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(database_url).await?;
        let (events, _) = broadcast::channel(64);
        let store = KvStore { pool, events };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv_entries (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Reads and deserializes the value under `key`. A malformed stored value
    /// is logged and reported as absent so callers fall back to their
    /// declared default instead of surfacing corruption to the user.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let row = sqlx::query("SELECT value FROM kv_entries WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let raw: String = row.get("value");
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(err) => {
                warn!(key = %key, error = %err, "Discarding malformed stored value");
                Ok(None)
            }
        }
    }

    pub async fn get_or_default<T: DeserializeOwned + Default>(&self, key: &str) -> Result<T> {
        Ok(self.get(key).await?.unwrap_or_default())
    }

    pub async fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        sqlx::query(
            r#"
            INSERT INTO kv_entries (key, value, updated_at) VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(&raw)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        debug!(key = %key, bytes = raw.len(), "Stored value");
        let _ = self.events.send(StoreEvent {
            key: key.to_string(),
        });
        Ok(())
    }

    pub async fn remove(&self, key: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM kv_entries WHERE key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await?;

        let removed = result.rows_affected() > 0;
        if removed {
            let _ = self.events.send(StoreEvent {
                key: key.to_string(),
            });
        }
        Ok(removed)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Task;
    use uuid::Uuid;

    async fn memory_store() -> KvStore {
        KvStore::new("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn round_trips_json_values() {
        let store = memory_store().await;
        let task = Task {
            id: Uuid::new_v4(),
            name: "Read Chapter 5".to_string(),
            description: Some("Modern history".to_string()),
            required_hours: Some(2.5),
            deadline: None,
            priority: None,
            completed: false,
            completed_at: None,
        };

        store.set(&tasks_key("asha"), &vec![task.clone()]).await.unwrap();
        let loaded: Vec<Task> = store.get_or_default(&tasks_key("asha")).await.unwrap();

        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, task.id);
        assert_eq!(loaded[0].name, "Read Chapter 5");
    }

    #[tokio::test]
    async fn missing_key_yields_default() {
        let store = memory_store().await;
        let loaded: Vec<Task> = store.get_or_default(&tasks_key("nobody")).await.unwrap();
        assert!(loaded.is_empty());
    }

    #[tokio::test]
    async fn malformed_value_falls_back_to_default() {
        let store = memory_store().await;
        sqlx::query("INSERT INTO kv_entries (key, value, updated_at) VALUES (?1, ?2, ?3)")
            .bind(tasks_key("asha"))
            .bind("{not json")
            .bind(Utc::now().to_rfc3339())
            .execute(&store.pool)
            .await
            .unwrap();

        let loaded: Vec<Task> = store.get_or_default(&tasks_key("asha")).await.unwrap();
        assert!(loaded.is_empty());
    }

    #[tokio::test]
    async fn overwrite_replaces_value_wholesale() {
        let store = memory_store().await;
        store.set(CURRENT_USER_KEY, &"asha").await.unwrap();
        store.set(CURRENT_USER_KEY, &"ravi").await.unwrap();

        let user: Option<String> = store.get(CURRENT_USER_KEY).await.unwrap();
        assert_eq!(user.as_deref(), Some("ravi"));
    }

    #[tokio::test]
    async fn remove_reports_whether_key_existed() {
        let store = memory_store().await;
        store.set(CURRENT_USER_KEY, &"asha").await.unwrap();

        assert!(store.remove(CURRENT_USER_KEY).await.unwrap());
        assert!(!store.remove(CURRENT_USER_KEY).await.unwrap());
        let user: Option<String> = store.get(CURRENT_USER_KEY).await.unwrap();
        assert!(user.is_none());
    }

    #[tokio::test]
    async fn writes_notify_subscribers() {
        let store = memory_store().await;
        let mut events = store.subscribe();

        store.set(&profile_key("asha"), &42u32).await.unwrap();

        let event = events.recv().await.unwrap();
        assert_eq!(event.key, profile_key("asha"));
    }

    #[test]
    fn keys_are_namespaced_per_user() {
        assert_eq!(profile_key("asha"), "profile:asha");
        assert_eq!(tasks_key("asha"), "tasks:asha");
        assert_eq!(sessions_key("asha"), "sessions:asha");
        assert_eq!(quiz_results_key("asha"), "quiz-results:asha");
        assert_eq!(flashcards_key("asha", "ab12"), "flashcards:asha:ab12");
    }
}
