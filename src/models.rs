use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flashcard {
    pub id: Uuid,
    pub question: String,
    pub answer: String,
    pub interval_days: f64, // next review interval in days
    pub repetition: u32,    // successful recalls in a row
    pub ease_factor: f64,   // interval multiplier, never below 1.3
    pub due: DateTime<Utc>,
    pub last_reviewed: Option<DateTime<Utc>>,
    pub summary_hash: Option<String>, // groups a deck under the summary it came from
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Priority {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub required_hours: Option<f64>,
    pub deadline: Option<NaiveDate>,
    pub priority: Option<Priority>,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>, // set on completion, cleared if reverted
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewTask {
    pub name: String,
    pub description: Option<String>,
    pub required_hours: Option<f64>,
    pub deadline: Option<NaiveDate>,
    pub priority: Option<Priority>,
}

/// Partial task edit; `None` fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub required_hours: Option<f64>,
    pub deadline: Option<NaiveDate>,
    pub priority: Option<Priority>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizQuestion {
    pub question: String,
    pub options: Vec<String>,
    pub correct_answer: String, // the correct answer text, not an option index
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizResult {
    pub id: Uuid,
    pub quiz_title: String,
    pub summary_hash: Option<String>,
    pub score: u32,
    pub total_questions: u32,
    pub percentage: u32,
    pub answers: Vec<Option<String>>, // one entry per question, None if skipped
    pub taken_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Badge {
    pub id: String,
    pub name: String,
    pub description: String,
    pub icon: String, // Lucide icon name carried for the presentation layer
    pub achieved: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub username: String,
    pub points: u64,
    pub badges: Vec<Badge>,
}

impl UserProfile {
    pub fn new(username: impl Into<String>) -> Self {
        UserProfile {
            username: username.into(),
            points: 0,
            badges: Vec::new(),
        }
    }

    pub fn has_badge(&self, badge_id: &str) -> bool {
        self.badges.iter().any(|b| b.id == badge_id)
    }
}

impl Default for UserProfile {
    fn default() -> Self {
        UserProfile::new("")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudySession {
    pub id: Uuid,
    pub task_id: Uuid,
    pub task_name: String, // denormalized for display
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub notes: Option<String>,
}
