use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use tracing::info;

use crate::badges::{BadgeContext, BadgeTrigger, definitions_for, evaluate};
use crate::models::{Badge, QuizResult, StudySession, Task, UserProfile};
use crate::storage::{KvStore, profile_key};

/// Owns the single active profile record. One writer per user key: all
/// mutations go through this service and are persisted immediately.
#[derive(Clone)]
pub struct ProfileService {
    store: KvStore,
    active: Option<UserProfile>,
}

impl ProfileService {
    pub fn new(store: KvStore) -> Self {
        Self {
            store,
            active: None,
        }
    }

    /// Loads the stored profile for `username`, creating and persisting the
    /// zero-state record on first login.
    pub async fn login(&mut self, username: &str) -> Result<UserProfile> {
        let stored: Option<UserProfile> = self.store.get(&profile_key(username)).await?;
        let profile = match stored {
            // A corrupt or never-written record both land here.
            None => {
                let fresh = UserProfile::new(username);
                self.store.set(&profile_key(username), &fresh).await?;
                info!(username = %username, "Created zero-state profile");
                fresh
            }
            Some(mut profile) => {
                if profile.username != username {
                    // Stored under the right key but from an older record
                    // shape; adopt the key's username.
                    profile.username = username.to_string();
                }
                profile
            }
        };

        info!(
            username = %username,
            points = profile.points,
            badge_count = profile.badges.len(),
            "Loaded profile"
        );
        self.active = Some(profile.clone());
        Ok(profile)
    }

    /// Drops the in-memory record. The stored profile is kept for the next
    /// login.
    pub fn logout(&mut self) {
        if let Some(profile) = self.active.take() {
            info!(username = %profile.username, "Cleared active profile");
        }
    }

    pub fn profile(&self) -> Option<&UserProfile> {
        self.active.as_ref()
    }

    pub async fn add_points(&mut self, amount: u64) -> Result<u64> {
        let Some(profile) = self.active.as_mut() else {
            bail!("no active profile");
        };
        profile.points += amount;
        let total = profile.points;
        let snapshot = profile.clone();
        self.persist(&snapshot).await?;
        info!(username = %snapshot.username, amount, total, "Added points");
        Ok(total)
    }

    /// Replaces the active profile wholesale and persists it.
    pub async fn update_profile(&mut self, profile: UserProfile) -> Result<()> {
        self.persist(&profile).await?;
        self.active = Some(profile);
        Ok(())
    }

    pub async fn award_for_tasks(
        &mut self,
        tasks: &[Task],
        now: DateTime<Utc>,
    ) -> Result<Vec<Badge>> {
        self.award(BadgeTrigger::Task, BadgeContext::Tasks(tasks), now)
            .await
    }

    pub async fn award_for_quiz(
        &mut self,
        result: &QuizResult,
        now: DateTime<Utc>,
    ) -> Result<Vec<Badge>> {
        self.award(BadgeTrigger::Quiz, BadgeContext::Quiz(result), now)
            .await
    }

    pub async fn award_for_sessions(
        &mut self,
        sessions: &[StudySession],
        now: DateTime<Utc>,
    ) -> Result<Vec<Badge>> {
        self.award(BadgeTrigger::Session, BadgeContext::Sessions(sessions), now)
            .await
    }

    async fn award(
        &mut self,
        trigger: BadgeTrigger,
        context: BadgeContext<'_>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Badge>> {
        let Some(profile) = self.active.as_ref() else {
            bail!("no active profile");
        };

        let outcome = evaluate(profile, definitions_for(trigger), context, now);
        if outcome.awarded.is_empty() {
            return Ok(Vec::new());
        }

        for badge in &outcome.awarded {
            info!(
                username = %outcome.profile.username,
                badge_id = %badge.id,
                badge_name = %badge.name,
                "Badge unlocked"
            );
        }
        self.persist(&outcome.profile).await?;
        self.active = Some(outcome.profile);
        Ok(outcome.awarded)
    }

    async fn persist(&self, profile: &UserProfile) -> Result<()> {
        self.store
            .set(&profile_key(&profile.username), profile)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    async fn service() -> ProfileService {
        ProfileService::new(KvStore::new("sqlite::memory:").await.unwrap())
    }

    fn completed_task() -> Task {
        Task {
            id: Uuid::new_v4(),
            name: "Revise polity notes".to_string(),
            description: None,
            required_hours: None,
            deadline: None,
            priority: None,
            completed: true,
            completed_at: Some(Utc::now()),
        }
    }

    #[tokio::test]
    async fn first_login_creates_zero_state() {
        let mut service = service().await;
        let profile = service.login("asha").await.unwrap();

        assert_eq!(profile.username, "asha");
        assert_eq!(profile.points, 0);
        assert!(profile.badges.is_empty());
    }

    #[tokio::test]
    async fn points_accumulate_additively() {
        let mut service = service().await;
        service.login("asha").await.unwrap();

        assert_eq!(service.add_points(5).await.unwrap(), 5);
        assert_eq!(service.add_points(3).await.unwrap(), 8);
        assert_eq!(service.profile().unwrap().points, 8);
    }

    #[tokio::test]
    async fn profile_survives_logout_and_relogin() {
        let mut service = service().await;
        service.login("asha").await.unwrap();
        service.add_points(7).await.unwrap();
        service.logout();
        assert!(service.profile().is_none());

        let reloaded = service.login("asha").await.unwrap();
        assert_eq!(reloaded.points, 7);
    }

    #[tokio::test]
    async fn task_award_persists_across_reload() {
        let mut service = service().await;
        service.login("asha").await.unwrap();
        let tasks = vec![completed_task()];

        let awarded = service.award_for_tasks(&tasks, Utc::now()).await.unwrap();
        assert_eq!(awarded.len(), 1);
        assert_eq!(awarded[0].id, "first-task-completed");

        service.logout();
        let reloaded = service.login("asha").await.unwrap();
        assert!(reloaded.has_badge("first-task-completed"));
        assert_eq!(reloaded.points, 5);
    }

    #[tokio::test]
    async fn repeated_award_calls_do_not_duplicate() {
        let mut service = service().await;
        service.login("asha").await.unwrap();
        let tasks = vec![completed_task()];

        let first = service.award_for_tasks(&tasks, Utc::now()).await.unwrap();
        assert_eq!(first.len(), 1);
        let second = service.award_for_tasks(&tasks, Utc::now()).await.unwrap();
        assert!(second.is_empty());

        let profile = service.profile().unwrap();
        assert_eq!(profile.badges.len(), 1);
        assert_eq!(profile.points, 5);
    }

    #[tokio::test]
    async fn mutations_require_an_active_profile() {
        let mut service = service().await;
        assert!(service.add_points(1).await.is_err());
        assert!(
            service
                .award_for_tasks(&[completed_task()], Utc::now())
                .await
                .is_err()
        );
    }
}
