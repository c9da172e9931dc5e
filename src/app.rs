use chrono::Utc;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::ai_client::{AiClient, GenerativeBackend};
use crate::ai_flows::{
    AiFlows, AptitudeHelp, IasBriefing, summary_fingerprint,
};
use crate::card_service::CardService;
use crate::config::Config;
use crate::errors::StudyError;
use crate::models::{
    Badge, Flashcard, NewTask, QuizQuestion, QuizResult, StudySession, Task, TaskUpdate,
    UserProfile,
};
use crate::profile_service::ProfileService;
use crate::quiz_service::QuizService;
use crate::srs_scheduler::ReviewGrade;
use crate::storage::{CURRENT_USER_KEY, KvStore, StoreEvent};
use crate::task_service::TaskService;

/// The summary the session is currently working from, with its grouping hash.
#[derive(Debug, Clone)]
pub struct ActiveSummary {
    pub text: String,
    pub hash: String,
}

/// A generated quiz awaiting submission.
#[derive(Debug, Clone)]
pub struct ActiveQuiz {
    pub title: String,
    pub questions: Vec<QuizQuestion>,
    pub summary_hash: String,
}

#[derive(Debug, Clone)]
pub struct QuizSubmission {
    pub result: QuizResult,
    pub awarded: Vec<Badge>,
}

#[derive(Debug, Clone)]
pub struct TaskToggle {
    pub task: Task,
    pub awarded: Vec<Badge>,
}

#[derive(Debug, Clone)]
pub struct SessionLogged {
    pub session: StudySession,
    pub awarded: Vec<Badge>,
}

/// Session facade over the services: one logged-in user, one working summary,
/// one pending quiz. Generation calls run one at a time from the caller's
/// point of view, but nothing guards against overlapping requests; a later
/// response overwrites the working state (last writer wins).
pub struct StudyApp {
    store: KvStore,
    flows: AiFlows,
    profiles: ProfileService,
    tasks: TaskService,
    cards: CardService,
    quizzes: QuizService,
    summary: Option<ActiveSummary>,
    quiz: Option<ActiveQuiz>,
}

impl StudyApp {
    pub async fn new(config: &Config) -> Result<Self, StudyError> {
        let store = KvStore::new(&config.database.url).await?;
        let client = AiClient::from_config(&config.ai);
        Ok(Self::assemble(store, client))
    }

    /// Wires the app over an existing store and generative backend; used by
    /// tests to avoid the network.
    pub fn with_backend(store: KvStore, backend: Arc<dyn GenerativeBackend>) -> Self {
        Self::assemble(store, AiClient::with_backend(backend))
    }

    fn assemble(store: KvStore, client: AiClient) -> Self {
        StudyApp {
            flows: AiFlows::new(client),
            profiles: ProfileService::new(store.clone()),
            tasks: TaskService::new(store.clone()),
            cards: CardService::new(store.clone()),
            quizzes: QuizService::new(store.clone()),
            store,
            summary: None,
            quiz: None,
        }
    }

    // --- session -----------------------------------------------------------

    pub async fn login(&mut self, username: &str) -> Result<UserProfile, StudyError> {
        let profile = self.profiles.login(username).await?;
        self.store.set(CURRENT_USER_KEY, &username).await?;
        info!(username = %username, "User logged in");
        Ok(profile)
    }

    /// Re-login as the last user recorded in the store, if any.
    pub async fn resume(&mut self) -> Result<Option<UserProfile>, StudyError> {
        let Some(username) = self.store.get::<String>(CURRENT_USER_KEY).await? else {
            return Ok(None);
        };
        Ok(Some(self.login(&username).await?))
    }

    pub async fn logout(&mut self) -> Result<(), StudyError> {
        self.profiles.logout();
        self.summary = None;
        self.quiz = None;
        self.store.remove(CURRENT_USER_KEY).await?;
        Ok(())
    }

    pub fn profile(&self) -> Option<&UserProfile> {
        self.profiles.profile()
    }

    pub fn current_summary(&self) -> Option<&ActiveSummary> {
        self.summary.as_ref()
    }

    pub fn current_quiz(&self) -> Option<&ActiveQuiz> {
        self.quiz.as_ref()
    }

    /// Change notifications from the underlying store; another holder of the
    /// same store reloads affected state wholesale on receipt.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<StoreEvent> {
        self.store.subscribe()
    }

    fn username(&self) -> Result<String, StudyError> {
        self.profiles
            .profile()
            .map(|p| p.username.clone())
            .ok_or(StudyError::NotLoggedIn)
    }

    fn require_summary(&self) -> Result<ActiveSummary, StudyError> {
        self.summary.clone().ok_or_else(StudyError::missing_summary)
    }

    // --- content generation ------------------------------------------------

    /// Summarizes pasted text or a URL and makes the result the session's
    /// working summary.
    pub async fn summarize(&mut self, material: &str) -> Result<String, StudyError> {
        self.username()?;
        if material.trim().is_empty() {
            return Err(StudyError::MissingPrecondition(
                "enter text or a URL to summarize".to_string(),
            ));
        }

        let output = self
            .flows
            .summarize(material)
            .await
            .map_err(StudyError::generation)?;
        let summary = ActiveSummary {
            hash: summary_fingerprint(&output.summary),
            text: output.summary.clone(),
        };
        self.summary = Some(summary);
        // A new summary invalidates any quiz built from the previous one.
        self.quiz = None;
        Ok(output.summary)
    }

    pub async fn explain(&self) -> Result<Vec<String>, StudyError> {
        self.username()?;
        let summary = self.require_summary()?;
        let output = self
            .flows
            .generate_explanation(&summary.text)
            .await
            .map_err(StudyError::generation)?;
        Ok(output.explanation_points)
    }

    pub async fn prep_ias_material(&self, material: &str) -> Result<IasBriefing, StudyError> {
        self.username()?;
        if material.trim().is_empty() {
            return Err(StudyError::MissingPrecondition(
                "provide study material to process".to_string(),
            ));
        }
        self.flows
            .process_ias_material(material)
            .await
            .map_err(StudyError::generation)
    }

    pub async fn aptitude_help(&self, question_or_topic: &str) -> Result<AptitudeHelp, StudyError> {
        self.username()?;
        if question_or_topic.trim().is_empty() {
            return Err(StudyError::MissingPrecondition(
                "enter an aptitude question or topic".to_string(),
            ));
        }
        self.flows
            .generate_aptitude_help(question_or_topic)
            .await
            .map_err(StudyError::generation)
    }

    // --- flashcards --------------------------------------------------------

    /// Generates a fresh deck from the working summary, replacing any deck
    /// previously generated for it.
    pub async fn create_flashcards(&mut self) -> Result<Vec<Flashcard>, StudyError> {
        let username = self.username()?;
        let summary = self.require_summary()?;

        let generated = self
            .flows
            .generate_flashcards(&summary.text)
            .await
            .map_err(StudyError::generation)?;
        let deck = self
            .cards
            .replace_deck(&username, &summary.hash, &generated.flashcards, Utc::now())
            .await?;
        Ok(deck)
    }

    pub async fn flashcards(&self) -> Result<Vec<Flashcard>, StudyError> {
        let username = self.username()?;
        let summary = self.require_summary()?;
        Ok(self.cards.deck(&username, &summary.hash).await?)
    }

    pub async fn due_flashcards(&self) -> Result<Vec<Flashcard>, StudyError> {
        let username = self.username()?;
        let summary = self.require_summary()?;
        Ok(self
            .cards
            .due_cards(&username, &summary.hash, Utc::now())
            .await?)
    }

    pub async fn review_flashcard(
        &mut self,
        card_id: Uuid,
        grade: ReviewGrade,
    ) -> Result<Flashcard, StudyError> {
        let username = self.username()?;
        let summary = self.require_summary()?;
        self.cards
            .review(&username, &summary.hash, card_id, grade, Utc::now())
            .await?
            .ok_or_else(|| StudyError::NotFound(format!("flashcard {card_id}")))
    }

    // --- quizzes -----------------------------------------------------------

    pub async fn start_quiz(&mut self, num_questions: Option<u32>) -> Result<ActiveQuiz, StudyError> {
        self.username()?;
        let summary = self.require_summary()?;

        let generated = self
            .flows
            .generate_quiz(&summary.text, num_questions)
            .await
            .map_err(StudyError::generation)?;
        let quiz = ActiveQuiz {
            title: generated.quiz_title,
            questions: generated.questions,
            summary_hash: summary.hash,
        };
        self.quiz = Some(quiz.clone());
        Ok(quiz)
    }

    /// Scores the pending quiz, records the result (newest first, capped
    /// history), awards one point per correct answer, and runs quiz badges.
    /// The quiz stays pending so it can be retaken.
    pub async fn submit_quiz(
        &mut self,
        answers: Vec<Option<String>>,
    ) -> Result<QuizSubmission, StudyError> {
        let username = self.username()?;
        let Some(quiz) = self.quiz.clone() else {
            return Err(StudyError::MissingPrecondition(
                "generate a quiz before submitting answers".to_string(),
            ));
        };

        let score = quiz
            .questions
            .iter()
            .zip(answers.iter())
            .filter(|(question, answer)| answer.as_deref() == Some(question.correct_answer.as_str()))
            .count() as u32;
        let total = quiz.questions.len() as u32;
        let percentage = if total > 0 {
            ((score as f64 / total as f64) * 100.0).round() as u32
        } else {
            0
        };

        let now = Utc::now();
        let result = QuizResult {
            id: Uuid::new_v4(),
            quiz_title: quiz.title.clone(),
            summary_hash: Some(quiz.summary_hash.clone()),
            score,
            total_questions: total,
            percentage,
            answers,
            taken_at: now,
        };

        self.quizzes.record_result(&username, result.clone()).await?;
        if score > 0 {
            self.profiles.add_points(score as u64).await?;
        }
        let awarded = self.profiles.award_for_quiz(&result, now).await?;

        info!(
            username = %username,
            score,
            total,
            percentage,
            "Quiz submitted"
        );
        Ok(QuizSubmission { result, awarded })
    }

    pub async fn quiz_history(&self) -> Result<Vec<QuizResult>, StudyError> {
        let username = self.username()?;
        Ok(self.quizzes.history(&username).await?)
    }

    // --- tasks & sessions --------------------------------------------------

    pub async fn tasks(&self) -> Result<Vec<Task>, StudyError> {
        let username = self.username()?;
        Ok(self.tasks.tasks(&username).await?)
    }

    pub async fn add_task(&mut self, new_task: NewTask) -> Result<Task, StudyError> {
        let username = self.username()?;
        if new_task.name.trim().is_empty() {
            return Err(StudyError::MissingPrecondition(
                "task name must not be empty".to_string(),
            ));
        }
        Ok(self.tasks.add_task(&username, new_task).await?)
    }

    pub async fn update_task(
        &mut self,
        task_id: Uuid,
        update: TaskUpdate,
    ) -> Result<Task, StudyError> {
        let username = self.username()?;
        self.tasks
            .update_task(&username, task_id, update)
            .await?
            .ok_or_else(|| StudyError::NotFound(format!("task {task_id}")))
    }

    /// Toggles completion; completing a task runs the task-triggered badge
    /// definitions against the updated list.
    pub async fn toggle_task(&mut self, task_id: Uuid) -> Result<TaskToggle, StudyError> {
        let username = self.username()?;
        let now = Utc::now();
        let Some((task, all_tasks)) = self.tasks.toggle_task(&username, task_id, now).await? else {
            return Err(StudyError::NotFound(format!("task {task_id}")));
        };

        let awarded = if task.completed {
            self.profiles.award_for_tasks(&all_tasks, now).await?
        } else {
            Vec::new()
        };
        Ok(TaskToggle { task, awarded })
    }

    pub async fn delete_task(&mut self, task_id: Uuid) -> Result<(), StudyError> {
        let username = self.username()?;
        if !self.tasks.delete_task(&username, task_id).await? {
            return Err(StudyError::NotFound(format!("task {task_id}")));
        }
        Ok(())
    }

    pub async fn sessions(&self) -> Result<Vec<StudySession>, StudyError> {
        let username = self.username()?;
        Ok(self.tasks.sessions(&username).await?)
    }

    /// Logs a finished study session and runs the session-triggered badge
    /// definitions.
    pub async fn log_session(
        &mut self,
        task_id: Uuid,
        started_at: chrono::DateTime<Utc>,
        ended_at: chrono::DateTime<Utc>,
        notes: Option<String>,
    ) -> Result<SessionLogged, StudyError> {
        let username = self.username()?;
        let Some(session) = self
            .tasks
            .log_session(&username, task_id, started_at, ended_at, notes)
            .await?
        else {
            return Err(StudyError::NotFound(format!("task {task_id}")));
        };

        let sessions = self.tasks.sessions(&username).await?;
        let awarded = self.profiles.award_for_sessions(&sessions, Utc::now()).await?;
        Ok(SessionLogged { session, awarded })
    }

    pub async fn delete_session(&mut self, session_id: Uuid) -> Result<(), StudyError> {
        let username = self.username()?;
        if !self.tasks.delete_session(&username, session_id).await? {
            return Err(StudyError::NotFound(format!("session {session_id}")));
        }
        Ok(())
    }
}
