use chrono::{DateTime, Utc};
use std::collections::HashSet;

use crate::models::{Badge, QuizResult, StudySession, Task, UserProfile};

/// Which kind of activity mutation a definition listens to. Callers pass the
/// matching subset of the table per trigger so unrelated criteria are never
/// evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BadgeTrigger {
    Task,
    Quiz,
    Session,
}

/// Award criteria as a closed rule table rather than opaque predicates.
#[derive(Debug, Clone, Copy)]
pub enum BadgeCriteria {
    /// At least this many tasks are completed.
    CompletedTasks(usize),
    /// Tasks were completed on at least this many distinct calendar days.
    TaskDayStreak(usize),
    /// The submitted quiz scored 100%.
    PerfectQuizScore,
    /// At least this many study sessions have been logged.
    LoggedSessions(usize),
}

#[derive(Debug)]
pub struct BadgeDefinition {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub icon: &'static str,
    pub trigger: BadgeTrigger,
    pub criteria: BadgeCriteria,
    pub points_awarded: u64,
}

/// Declaration order is notification order when several badges land in the
/// same evaluation pass.
pub const BADGE_DEFINITIONS: &[BadgeDefinition] = &[
    BadgeDefinition {
        id: "first-task-completed",
        name: "Task Initiator",
        description: "Completed your very first task!",
        icon: "CheckSquare",
        trigger: BadgeTrigger::Task,
        criteria: BadgeCriteria::CompletedTasks(1),
        points_awarded: 5,
    },
    BadgeDefinition {
        id: "five-tasks-completed",
        name: "Task Doer",
        description: "Completed 5 tasks!",
        icon: "ListChecks",
        trigger: BadgeTrigger::Task,
        criteria: BadgeCriteria::CompletedTasks(5),
        points_awarded: 20,
    },
    BadgeDefinition {
        id: "streak-starter",
        name: "Streak Starter",
        description: "Completed tasks on 3 different days!",
        icon: "Flame",
        trigger: BadgeTrigger::Task,
        criteria: BadgeCriteria::TaskDayStreak(3),
        points_awarded: 30,
    },
    BadgeDefinition {
        id: "perfect-quiz-score",
        name: "Quiz Whiz",
        description: "Achieved a perfect score on a quiz!",
        icon: "Award",
        trigger: BadgeTrigger::Quiz,
        criteria: BadgeCriteria::PerfectQuizScore,
        points_awarded: 25,
    },
    BadgeDefinition {
        id: "focus-finder",
        name: "Focus Finder",
        description: "Logged your first study session!",
        icon: "Timer",
        trigger: BadgeTrigger::Session,
        criteria: BadgeCriteria::LoggedSessions(1),
        points_awarded: 10,
    },
];

pub fn definitions_for(trigger: BadgeTrigger) -> impl Iterator<Item = &'static BadgeDefinition> {
    BADGE_DEFINITIONS.iter().filter(move |d| d.trigger == trigger)
}

/// Activity snapshot a criteria check runs against.
#[derive(Debug, Clone, Copy)]
pub enum BadgeContext<'a> {
    Tasks(&'a [Task]),
    Quiz(&'a QuizResult),
    Sessions(&'a [StudySession]),
}

fn criteria_met(criteria: BadgeCriteria, context: BadgeContext<'_>) -> bool {
    match (criteria, context) {
        (BadgeCriteria::CompletedTasks(wanted), BadgeContext::Tasks(tasks)) => {
            tasks.iter().filter(|t| t.completed).count() >= wanted
        }
        (BadgeCriteria::TaskDayStreak(wanted), BadgeContext::Tasks(tasks)) => {
            let days: HashSet<_> = tasks
                .iter()
                .filter(|t| t.completed)
                .filter_map(|t| t.completed_at)
                .map(|at| at.date_naive())
                .collect();
            days.len() >= wanted
        }
        (BadgeCriteria::PerfectQuizScore, BadgeContext::Quiz(result)) => result.percentage == 100,
        (BadgeCriteria::LoggedSessions(wanted), BadgeContext::Sessions(sessions)) => {
            sessions.len() >= wanted
        }
        // A criteria paired with a context it does not inspect is a no-op.
        _ => false,
    }
}

#[derive(Debug, Clone)]
pub struct EvaluationOutcome {
    pub profile: UserProfile,
    pub awarded: Vec<Badge>,
}

/// Checks every not-yet-owned definition against the context and awards all
/// that qualify in this pass. A badge id already on the profile is never
/// re-evaluated, so re-submitting the same context is idempotent. Criteria
/// see the pre-award profile throughout the pass.
pub fn evaluate<'a>(
    profile: &UserProfile,
    definitions: impl IntoIterator<Item = &'a BadgeDefinition>,
    context: BadgeContext<'_>,
    now: DateTime<Utc>,
) -> EvaluationOutcome {
    let mut updated = profile.clone();
    let mut awarded = Vec::new();

    for definition in definitions {
        if updated.has_badge(definition.id) {
            continue;
        }
        if !criteria_met(definition.criteria, context) {
            continue;
        }
        let badge = Badge {
            id: definition.id.to_string(),
            name: definition.name.to_string(),
            description: definition.description.to_string(),
            icon: definition.icon.to_string(),
            achieved: now,
        };
        updated.points += definition.points_awarded;
        updated.badges.push(badge.clone());
        awarded.push(badge);
    }

    EvaluationOutcome {
        profile: updated,
        awarded,
    }
}
