use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use crate::models::{NewTask, StudySession, Task, TaskUpdate};
use crate::storage::{KvStore, sessions_key, tasks_key};

/// Tasks and logged study sessions, stored as ordered per-user sequences.
#[derive(Clone)]
pub struct TaskService {
    store: KvStore,
}

impl TaskService {
    pub fn new(store: KvStore) -> Self {
        Self { store }
    }

    pub async fn tasks(&self, username: &str) -> Result<Vec<Task>> {
        self.store.get_or_default(&tasks_key(username)).await
    }

    pub async fn add_task(&self, username: &str, new_task: NewTask) -> Result<Task> {
        let task = Task {
            id: Uuid::new_v4(),
            name: new_task.name,
            description: new_task.description,
            required_hours: new_task.required_hours,
            deadline: new_task.deadline,
            priority: new_task.priority,
            completed: false,
            completed_at: None,
        };

        let mut tasks = self.tasks(username).await?;
        tasks.push(task.clone());
        self.store.set(&tasks_key(username), &tasks).await?;

        info!(username = %username, task_id = %task.id, "Added task");
        Ok(task)
    }

    pub async fn update_task(
        &self,
        username: &str,
        task_id: Uuid,
        update: TaskUpdate,
    ) -> Result<Option<Task>> {
        let mut tasks = self.tasks(username).await?;
        let Some(task) = tasks.iter_mut().find(|t| t.id == task_id) else {
            return Ok(None);
        };

        if let Some(name) = update.name {
            task.name = name;
        }
        if let Some(description) = update.description {
            task.description = Some(description);
        }
        if let Some(required_hours) = update.required_hours {
            task.required_hours = Some(required_hours);
        }
        if let Some(deadline) = update.deadline {
            task.deadline = Some(deadline);
        }
        if let Some(priority) = update.priority {
            task.priority = Some(priority);
        }

        let updated = task.clone();
        self.store.set(&tasks_key(username), &tasks).await?;
        Ok(Some(updated))
    }

    /// Flips a task's completion state. The completion timestamp is set on
    /// the incomplete-to-complete transition and cleared when reverted.
    /// Returns the toggled task along with the full updated list, which
    /// callers feed to badge evaluation.
    pub async fn toggle_task(
        &self,
        username: &str,
        task_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<(Task, Vec<Task>)>> {
        let mut tasks = self.tasks(username).await?;
        let Some(task) = tasks.iter_mut().find(|t| t.id == task_id) else {
            return Ok(None);
        };

        task.completed = !task.completed;
        task.completed_at = task.completed.then_some(now);
        let toggled = task.clone();

        self.store.set(&tasks_key(username), &tasks).await?;
        info!(
            username = %username,
            task_id = %task_id,
            completed = toggled.completed,
            "Toggled task completion"
        );
        Ok(Some((toggled, tasks)))
    }

    pub async fn delete_task(&self, username: &str, task_id: Uuid) -> Result<bool> {
        let mut tasks = self.tasks(username).await?;
        let before = tasks.len();
        tasks.retain(|t| t.id != task_id);
        if tasks.len() == before {
            return Ok(false);
        }
        self.store.set(&tasks_key(username), &tasks).await?;
        Ok(true)
    }

    pub async fn sessions(&self, username: &str) -> Result<Vec<StudySession>> {
        self.store.get_or_default(&sessions_key(username)).await
    }

    /// Records a finished study session against a task, denormalizing the
    /// task name for display. Returns `None` when the task does not exist.
    pub async fn log_session(
        &self,
        username: &str,
        task_id: Uuid,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
        notes: Option<String>,
    ) -> Result<Option<StudySession>> {
        let tasks = self.tasks(username).await?;
        let Some(task) = tasks.iter().find(|t| t.id == task_id) else {
            return Ok(None);
        };

        let session = StudySession {
            id: Uuid::new_v4(),
            task_id,
            task_name: task.name.clone(),
            started_at,
            ended_at,
            notes,
        };

        let mut sessions = self.sessions(username).await?;
        sessions.push(session.clone());
        self.store.set(&sessions_key(username), &sessions).await?;

        info!(
            username = %username,
            task_id = %task_id,
            session_id = %session.id,
            "Logged study session"
        );
        Ok(Some(session))
    }

    pub async fn delete_session(&self, username: &str, session_id: Uuid) -> Result<bool> {
        let mut sessions = self.sessions(username).await?;
        let before = sessions.len();
        sessions.retain(|s| s.id != session_id);
        if sessions.len() == before {
            return Ok(false);
        }
        self.store.set(&sessions_key(username), &sessions).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Priority;
    use chrono::Duration;

    async fn service() -> TaskService {
        TaskService::new(KvStore::new("sqlite::memory:").await.unwrap())
    }

    fn read_chapter() -> NewTask {
        NewTask {
            name: "Read Chapter 5".to_string(),
            description: Some("Modern history".to_string()),
            required_hours: Some(2.5),
            deadline: None,
            priority: Some(Priority::Medium),
        }
    }

    #[tokio::test]
    async fn added_tasks_start_incomplete() {
        let service = service().await;
        let task = service.add_task("asha", read_chapter()).await.unwrap();

        assert!(!task.completed);
        assert!(task.completed_at.is_none());

        let tasks = service.tasks("asha").await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].name, "Read Chapter 5");
    }

    #[tokio::test]
    async fn toggle_sets_and_clears_completion_timestamp() {
        let service = service().await;
        let task = service.add_task("asha", read_chapter()).await.unwrap();
        let now = Utc::now();

        let (completed, _) = service
            .toggle_task("asha", task.id, now)
            .await
            .unwrap()
            .unwrap();
        assert!(completed.completed);
        assert_eq!(completed.completed_at, Some(now));

        let later = now + Duration::minutes(5);
        let (reverted, _) = service
            .toggle_task("asha", task.id, later)
            .await
            .unwrap()
            .unwrap();
        assert!(!reverted.completed);
        assert!(reverted.completed_at.is_none());
    }

    #[tokio::test]
    async fn toggle_returns_full_list_for_badge_checks() {
        let service = service().await;
        let first = service.add_task("asha", read_chapter()).await.unwrap();
        let _second = service
            .add_task(
                "asha",
                NewTask {
                    name: "Solve practice set".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let (_, tasks) = service
            .toggle_task("asha", first.id, Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks.iter().filter(|t| t.completed).count(), 1);
    }

    #[tokio::test]
    async fn partial_update_preserves_other_fields() {
        let service = service().await;
        let task = service.add_task("asha", read_chapter()).await.unwrap();

        let updated = service
            .update_task(
                "asha",
                task.id,
                TaskUpdate {
                    name: Some("Read Chapters 5-6".to_string()),
                    priority: Some(Priority::High),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.name, "Read Chapters 5-6");
        assert_eq!(updated.priority, Some(Priority::High));
        assert_eq!(updated.description.as_deref(), Some("Modern history"));
        assert_eq!(updated.required_hours, Some(2.5));
    }

    #[tokio::test]
    async fn delete_reports_missing_tasks() {
        let service = service().await;
        let task = service.add_task("asha", read_chapter()).await.unwrap();

        assert!(service.delete_task("asha", task.id).await.unwrap());
        assert!(!service.delete_task("asha", task.id).await.unwrap());
        assert!(service.tasks("asha").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn sessions_denormalize_the_task_name() {
        let service = service().await;
        let task = service.add_task("asha", read_chapter()).await.unwrap();
        let start = Utc::now();
        let end = start + Duration::minutes(25);

        let session = service
            .log_session("asha", task.id, start, end, Some("good focus".to_string()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.task_name, "Read Chapter 5");

        let sessions = service.sessions("asha").await.unwrap();
        assert_eq!(sessions.len(), 1);

        assert!(service.delete_session("asha", session.id).await.unwrap());
        assert!(service.sessions("asha").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn session_for_unknown_task_is_none() {
        let service = service().await;
        let now = Utc::now();
        let logged = service
            .log_session("asha", Uuid::new_v4(), now, now, None)
            .await
            .unwrap();
        assert!(logged.is_none());
    }

    #[tokio::test]
    async fn users_do_not_share_task_lists() {
        let service = service().await;
        service.add_task("asha", read_chapter()).await.unwrap();

        assert!(service.tasks("ravi").await.unwrap().is_empty());
    }
}
