//! Awards from completed activity, and progression reads.
//!
//! An award runs ledger -> points -> quests in one store transaction, then a
//! badge pass. The ledger write decides whether anything happens at all: a
//! duplicate event returns the current snapshot and touches nothing else.
//! Badge grants are idempotent and re-checked on every award, so a failed
//! badge pass is logged and left for the next award instead of failing one
//! that has already committed.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use labquest_domain::{
    task_completion_points, work_session_points, AwardSourceType, Badge,
    GamificationEvent, NewAward, ProgressionSnapshot, ProjectId, QuestEvent, QuestMetric, TaskId,
    UserId, UserProfile, WorkSessionId,
};
use serde::{Deserialize, Serialize};

use super::badges::BadgeEvaluator;
use super::error::EngineError;
use super::quests::QuestTracker;
use crate::infrastructure::ports::{AwardOutcome, AwardRepo, ClockPort, UserRepo};

/// A task the collaborator has already marked complete.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskCompletion {
    pub user_id: UserId,
    pub task_id: TaskId,
    /// Configured task value; the default applies when absent.
    #[serde(default)]
    pub task_points: Option<i64>,
    #[serde(default)]
    pub due_at: Option<DateTime<Utc>>,
    pub completed_at: DateTime<Utc>,
    #[serde(default)]
    pub project_id: Option<ProjectId>,
}

/// A finished work session.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkSessionCompletion {
    pub user_id: UserId,
    pub work_session_id: WorkSessionId,
    pub duration_seconds: i64,
    #[serde(default)]
    pub completed_task_ids: Vec<TaskId>,
    #[serde(default)]
    pub project_id: Option<ProjectId>,
    /// When the session ended. Defaults to now.
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AwardResult {
    pub already_awarded: bool,
    pub points_awarded: i64,
    pub progression: ProgressionSnapshot,
    pub new_badges: Vec<Badge>,
    pub events: Vec<GamificationEvent>,
}

pub struct AwardActivity {
    users: Arc<dyn UserRepo>,
    awards: Arc<dyn AwardRepo>,
    quests: Arc<QuestTracker>,
    badges: Arc<BadgeEvaluator>,
    clock: Arc<dyn ClockPort>,
}

impl AwardActivity {
    pub fn new(
        users: Arc<dyn UserRepo>,
        awards: Arc<dyn AwardRepo>,
        quests: Arc<QuestTracker>,
        badges: Arc<BadgeEvaluator>,
        clock: Arc<dyn ClockPort>,
    ) -> Self {
        Self {
            users,
            awards,
            quests,
            badges,
            clock,
        }
    }

    pub async fn from_task_completion(
        &self,
        input: &TaskCompletion,
    ) -> Result<AwardResult, EngineError> {
        let points = task_completion_points(input.task_points, input.due_at, input.completed_at);
        if points.days_late > 0 {
            tracing::debug!(
                user_id = %input.user_id,
                task_id = %input.task_id,
                days_late = points.days_late,
                penalty = points.penalty,
                "Late task completion"
            );
        }

        let award = NewAward::new(
            input.user_id,
            AwardSourceType::TaskCompleted,
            input.task_id.get(),
            points.net,
            input.completed_at,
        )
        .with_project(input.project_id);

        let metrics = [(QuestMetric::TasksCompleted, 1.0)];
        self.record(award, &metrics).await
    }

    pub async fn from_work_session(
        &self,
        input: &WorkSessionCompletion,
    ) -> Result<AwardResult, EngineError> {
        if input.duration_seconds < 0 {
            return Err(EngineError::validation("durationSeconds cannot be negative"));
        }
        let points = work_session_points(input.duration_seconds, input.completed_task_ids.len());
        let ended_at = input.ended_at.unwrap_or_else(|| self.clock.now());

        let award = NewAward::new(
            input.user_id,
            AwardSourceType::WorkSessionCompleted,
            input.work_session_id.get(),
            points.total,
            ended_at,
        )
        .with_project(input.project_id)
        .with_duration(input.duration_seconds);

        let hours = input.duration_seconds as f64 / 3600.0;
        let metrics = [
            (QuestMetric::SessionsCompleted, 1.0),
            (QuestMetric::HoursWorked, hours),
        ];
        self.record(award, &metrics).await
    }

    async fn record(
        &self,
        award: NewAward,
        metrics: &[(QuestMetric, f64)],
    ) -> Result<AwardResult, EngineError> {
        let user_id = award.user_id;
        let user = self
            .users
            .get(user_id)
            .await?
            .ok_or_else(|| EngineError::not_found("User", user_id))?;

        let metric_events: Vec<QuestEvent> = metrics
            .iter()
            .copied()
            .chain(std::iter::once((QuestMetric::PointsEarned, award.points as f64)))
            .map(|(metric, amount)| QuestEvent {
                user_id,
                metric,
                amount,
                project_id: award.project_id,
            })
            .collect();
        let (quests, quest_events) = self.quests.feed_for(user_id, metric_events).await?;

        let outcome = self
            .awards
            .award_once(&award, &quests, &quest_events)
            .await?;
        let (record, points_before, points_after, completed_quests) = match outcome {
            AwardOutcome::Recorded {
                record,
                points_before,
                points_after,
                completed_quests,
            } => (record, points_before, points_after, completed_quests),
            AwardOutcome::AlreadyAwarded => {
                tracing::debug!(
                    user_id = %user_id,
                    source_type = %award.source_type,
                    source_id = award.source_id,
                    "Award already recorded"
                );
                return Ok(AwardResult {
                    already_awarded: true,
                    points_awarded: 0,
                    progression: user.progression(),
                    new_badges: Vec::new(),
                    events: Vec::new(),
                });
            }
        };

        tracing::info!(
            user_id = %user_id,
            source_type = %record.source_type,
            source_id = record.source_id,
            points = record.points_awarded,
            "Award recorded"
        );

        let mut events = vec![GamificationEvent::PointsAwarded {
            user_id,
            source_type: record.source_type,
            source_id: record.source_id,
            points: record.points_awarded,
        }];
        events.extend(GamificationEvent::progression_changes(
            user_id,
            points_before,
            points_after,
        ));
        for quest_id in completed_quests {
            tracing::info!(user_id = %user_id, quest_id = %quest_id, "Quest completed");
            events.push(GamificationEvent::QuestCompleted { user_id, quest_id });
        }

        let new_badges = match self.badges.evaluate_user(user_id).await {
            Ok(granted) => {
                events.extend(granted.events());
                granted.badges
            }
            Err(e) => {
                tracing::warn!(
                    user_id = %user_id,
                    source_id = record.source_id,
                    error = %e,
                    "Badge pass failed after award; the next award re-checks"
                );
                Vec::new()
            }
        };

        Ok(AwardResult {
            already_awarded: false,
            points_awarded: record.points_awarded,
            progression: ProgressionSnapshot::from_points(user_id, points_after),
            new_badges,
            events,
        })
    }
}

/// Collaborator sync and progression reads.
pub struct UserProgression {
    users: Arc<dyn UserRepo>,
}

impl UserProgression {
    pub fn new(users: Arc<dyn UserRepo>) -> Self {
        Self { users }
    }

    pub async fn get(&self, user_id: UserId) -> Result<ProgressionSnapshot, EngineError> {
        let user = self
            .users
            .get(user_id)
            .await?
            .ok_or_else(|| EngineError::not_found("User", user_id))?;
        Ok(user.progression())
    }

    /// Mirror a collaborator-owned user. Balances in `profile` only seed a
    /// new row; existing balances are never overwritten.
    pub async fn upsert(&self, profile: &UserProfile) -> Result<UserProfile, EngineError> {
        if profile.display_name.trim().is_empty() {
            return Err(EngineError::validation("displayName cannot be empty"));
        }
        let stored = self.users.upsert(profile).await?;
        tracing::debug!(user_id = %stored.id, role = %stored.role, "User synced");
        Ok(stored)
    }
}
