//! Quests and per-user quest progress.
//!
//! # Status lifecycle
//!
//! ```text
//! IN_PROGRESS --(progress >= target)--> COMPLETED --(claim)--> CLAIMED
//! ```
//!
//! Progress never decreases and `CLAIMED` is terminal. Rewards are paid only
//! on the `COMPLETED -> CLAIMED` transition.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::{ProjectId, QuestId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuestType {
    Daily,
    Weekly,
    Event,
    Story,
}

impl QuestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "DAILY",
            Self::Weekly => "WEEKLY",
            Self::Event => "EVENT",
            Self::Story => "STORY",
        }
    }
}

impl fmt::Display for QuestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuestType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DAILY" => Ok(Self::Daily),
            "WEEKLY" => Ok(Self::Weekly),
            "EVENT" => Ok(Self::Event),
            "STORY" => Ok(Self::Story),
            other => Err(DomainError::validation(format!(
                "Unknown quest type: {other}"
            ))),
        }
    }
}

/// Which events count toward a quest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuestScope {
    /// Only events on one project.
    #[serde(rename_all = "camelCase")]
    Project { project_id: ProjectId },
    /// Any event attached to some project.
    CrossProject,
    /// Every event.
    Global,
}

impl QuestScope {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Project { .. } => "PROJECT",
            Self::CrossProject => "CROSS_PROJECT",
            Self::Global => "GLOBAL",
        }
    }

    pub fn project_id(&self) -> Option<ProjectId> {
        match self {
            Self::Project { project_id } => Some(*project_id),
            _ => None,
        }
    }

    /// Rebuild from the stored `(kind, project_id)` pair.
    pub fn from_parts(kind: &str, project_id: Option<ProjectId>) -> Result<Self, DomainError> {
        match (kind, project_id) {
            ("PROJECT", Some(project_id)) => Ok(Self::Project { project_id }),
            ("PROJECT", None) => Err(DomainError::validation(
                "PROJECT scope requires a project id",
            )),
            ("CROSS_PROJECT", _) => Ok(Self::CrossProject),
            ("GLOBAL", _) => Ok(Self::Global),
            (other, _) => Err(DomainError::validation(format!(
                "Unknown quest scope: {other}"
            ))),
        }
    }

    pub fn matches(&self, event_project: Option<ProjectId>) -> bool {
        match self {
            Self::Project { project_id } => event_project == Some(*project_id),
            Self::CrossProject => event_project.is_some(),
            Self::Global => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuestMetric {
    TasksCompleted,
    SessionsCompleted,
    HoursWorked,
    PointsEarned,
}

impl QuestMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TasksCompleted => "TASKS_COMPLETED",
            Self::SessionsCompleted => "SESSIONS_COMPLETED",
            Self::HoursWorked => "HOURS_WORKED",
            Self::PointsEarned => "POINTS_EARNED",
        }
    }
}

impl fmt::Display for QuestMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuestMetric {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TASKS_COMPLETED" => Ok(Self::TasksCompleted),
            "SESSIONS_COMPLETED" => Ok(Self::SessionsCompleted),
            "HOURS_WORKED" => Ok(Self::HoursWorked),
            "POINTS_EARNED" => Ok(Self::PointsEarned),
            other => Err(DomainError::validation(format!(
                "Unknown quest metric: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestRequirement {
    pub metric: QuestMetric,
    pub target: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QuestReward {
    pub xp: i64,
    pub coins: i64,
    pub trophies: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quest {
    pub id: QuestId,
    pub code: String,
    pub title: String,
    #[serde(rename = "type")]
    pub quest_type: QuestType,
    pub scope: QuestScope,
    #[serde(default)]
    pub min_level: u32,
    pub requirement: QuestRequirement,
    #[serde(default)]
    pub reward: QuestReward,
    pub active: bool,
}

impl Quest {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.code.trim().is_empty() {
            return Err(DomainError::validation("quest code cannot be empty"));
        }
        if !self.requirement.target.is_finite() || self.requirement.target <= 0.0 {
            return Err(DomainError::validation("quest target must be positive"));
        }
        let QuestReward { xp, coins, trophies } = self.reward;
        if xp < 0 || coins < 0 || trophies < 0 {
            return Err(DomainError::validation("quest rewards cannot be negative"));
        }
        Ok(())
    }

    /// Whether `event` counts toward this quest for a user at `user_level`.
    pub fn accepts(&self, event: &QuestEvent, user_level: u32) -> bool {
        self.active
            && self.requirement.metric == event.metric
            && user_level >= self.min_level
            && self.scope.matches(event.project_id)
    }
}

/// A metric increment produced by a fresh award.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestEvent {
    pub user_id: UserId,
    pub metric: QuestMetric,
    pub amount: f64,
    pub project_id: Option<ProjectId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuestStatus {
    InProgress,
    Completed,
    Claimed,
}

impl QuestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
            Self::Claimed => "CLAIMED",
        }
    }
}

impl fmt::Display for QuestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuestStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IN_PROGRESS" => Ok(Self::InProgress),
            "COMPLETED" => Ok(Self::Completed),
            "CLAIMED" => Ok(Self::Claimed),
            other => Err(DomainError::validation(format!(
                "Unknown quest status: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestProgress {
    pub user_id: UserId,
    pub quest_id: QuestId,
    pub progress_value: f64,
    pub target_value: f64,
    pub status: QuestStatus,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub claimed_at: Option<DateTime<Utc>>,
}

impl QuestProgress {
    pub fn start(user_id: UserId, quest_id: QuestId, target_value: f64, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            quest_id,
            progress_value: 0.0,
            target_value,
            status: QuestStatus::InProgress,
            updated_at: now,
            completed_at: None,
            claimed_at: None,
        }
    }

    /// Add `amount` to progress. Returns `true` when this call completed the quest.
    ///
    /// Negative or non-finite amounts are ignored. Claimed progress is frozen.
    pub fn apply_increment(&mut self, amount: f64, now: DateTime<Utc>) -> bool {
        if !amount.is_finite() || amount <= 0.0 {
            return false;
        }
        self.raise_to(self.progress_value + amount, now)
    }

    /// Raise progress to an externally measured absolute value. Lower
    /// observations leave progress untouched.
    pub fn observe(&mut self, observed: f64, now: DateTime<Utc>) -> bool {
        if !observed.is_finite() {
            return false;
        }
        self.raise_to(observed.max(self.progress_value), now)
    }

    fn raise_to(&mut self, value: f64, now: DateTime<Utc>) -> bool {
        if self.status == QuestStatus::Claimed || value <= self.progress_value {
            return false;
        }
        self.progress_value = value;
        self.updated_at = now;
        if self.status == QuestStatus::InProgress && self.progress_value >= self.target_value {
            self.status = QuestStatus::Completed;
            self.completed_at = Some(now);
            return true;
        }
        false
    }

    pub fn claim(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        match self.status {
            QuestStatus::Completed => {
                self.status = QuestStatus::Claimed;
                self.claimed_at = Some(now);
                self.updated_at = now;
                Ok(())
            }
            other => Err(DomainError::invalid_state_transition(format!(
                "quest {} is {other}, only COMPLETED quests can be claimed",
                self.quest_id
            ))),
        }
    }
}

/// A quest together with the user's progress on it, if any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestView {
    pub quest: Quest,
    pub progress: Option<QuestProgress>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn quest(scope: QuestScope, min_level: u32) -> Quest {
        Quest {
            id: QuestId::new(1),
            code: "TEN_TASKS".into(),
            title: "Ten tasks".into(),
            quest_type: QuestType::Weekly,
            scope,
            min_level,
            requirement: QuestRequirement {
                metric: QuestMetric::TasksCompleted,
                target: 10.0,
            },
            reward: QuestReward {
                xp: 50,
                coins: 20,
                trophies: 1,
            },
            active: true,
        }
    }

    fn event(project: Option<i64>) -> QuestEvent {
        QuestEvent {
            user_id: UserId::new(1),
            metric: QuestMetric::TasksCompleted,
            amount: 1.0,
            project_id: project.map(ProjectId::new),
        }
    }

    #[test]
    fn scope_filters_events() {
        let project = quest(
            QuestScope::Project {
                project_id: ProjectId::new(3),
            },
            0,
        );
        assert!(project.accepts(&event(Some(3)), 0));
        assert!(!project.accepts(&event(Some(4)), 0));
        assert!(!project.accepts(&event(None), 0));

        let cross = quest(QuestScope::CrossProject, 0);
        assert!(cross.accepts(&event(Some(4)), 0));
        assert!(!cross.accepts(&event(None), 0));

        assert!(quest(QuestScope::Global, 0).accepts(&event(None), 0));
    }

    #[test]
    fn level_gate_and_metric_filter() {
        let q = quest(QuestScope::Global, 5);
        assert!(!q.accepts(&event(None), 4));
        assert!(q.accepts(&event(None), 5));

        let mut hours = event(None);
        hours.metric = QuestMetric::HoursWorked;
        assert!(!q.accepts(&hours, 5));
    }

    #[test]
    fn increments_complete_once() {
        let mut progress = QuestProgress::start(UserId::new(1), QuestId::new(1), 2.0, now());
        assert!(!progress.apply_increment(1.0, now()));
        assert!(progress.apply_increment(1.0, now()));
        assert_eq!(progress.status, QuestStatus::Completed);
        assert!(!progress.apply_increment(1.0, now()));
        assert_eq!(progress.progress_value, 3.0);
    }

    #[test]
    fn negative_increment_and_lower_observation_are_ignored() {
        let mut progress = QuestProgress::start(UserId::new(1), QuestId::new(1), 10.0, now());
        progress.apply_increment(4.0, now());
        progress.apply_increment(-3.0, now());
        progress.observe(2.0, now());
        assert_eq!(progress.progress_value, 4.0);
        progress.observe(7.5, now());
        assert_eq!(progress.progress_value, 7.5);
    }

    #[test]
    fn claim_requires_completed_and_is_terminal() {
        let mut progress = QuestProgress::start(UserId::new(1), QuestId::new(1), 1.0, now());
        assert!(matches!(
            progress.claim(now()),
            Err(DomainError::InvalidStateTransition(_))
        ));

        progress.apply_increment(1.0, now());
        assert!(progress.claim(now()).is_ok());
        assert_eq!(progress.status, QuestStatus::Claimed);
        assert!(progress.claim(now()).is_err());

        // frozen after claim
        assert!(!progress.apply_increment(5.0, now()));
        assert_eq!(progress.progress_value, 1.0);
    }

    #[test]
    fn validate_rejects_non_positive_target() {
        let mut q = quest(QuestScope::Global, 0);
        q.requirement.target = 0.0;
        assert!(q.validate().is_err());
        q.requirement.target = 3.0;
        q.reward.coins = -1;
        assert!(q.validate().is_err());
    }

    #[test]
    fn scope_parts_round_trip() {
        let scope = QuestScope::Project {
            project_id: ProjectId::new(8),
        };
        let rebuilt = QuestScope::from_parts(scope.kind(), scope.project_id()).unwrap();
        assert_eq!(rebuilt, scope);
        assert!(QuestScope::from_parts("PROJECT", None).is_err());
        let json = serde_json::to_string(&scope).unwrap();
        assert_eq!(json, r#"{"type":"PROJECT","projectId":8}"#);
    }
}
