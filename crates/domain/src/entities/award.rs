//! Award ledger entries.
//!
//! One row per real-world event that produced points. The triple
//! (user, source type, source id) is the idempotency key: a second award
//! for the same event is a no-op.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::value_objects::ActivityFact;
use crate::{ProjectId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AwardSourceType {
    TaskCompleted,
    WorkSessionCompleted,
    QuestClaimed,
    ManualGrant,
}

impl AwardSourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TaskCompleted => "TASK_COMPLETED",
            Self::WorkSessionCompleted => "WORK_SESSION_COMPLETED",
            Self::QuestClaimed => "QUEST_CLAIMED",
            Self::ManualGrant => "MANUAL_GRANT",
        }
    }
}

impl fmt::Display for AwardSourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AwardSourceType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TASK_COMPLETED" => Ok(Self::TaskCompleted),
            "WORK_SESSION_COMPLETED" => Ok(Self::WorkSessionCompleted),
            "QUEST_CLAIMED" => Ok(Self::QuestClaimed),
            "MANUAL_GRANT" => Ok(Self::ManualGrant),
            other => Err(DomainError::validation(format!(
                "Unknown award source type: {other}"
            ))),
        }
    }
}

/// An award to be written. `points` credits the user's balance; `xp` is
/// recorded alongside and equals points for every current source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAward {
    pub user_id: UserId,
    pub source_type: AwardSourceType,
    pub source_id: i64,
    pub points: i64,
    pub xp: i64,
    pub project_id: Option<ProjectId>,
    pub duration_seconds: i64,
    pub occurred_at: DateTime<Utc>,
}

impl NewAward {
    pub fn new(
        user_id: UserId,
        source_type: AwardSourceType,
        source_id: i64,
        points: i64,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        let points = points.max(0);
        Self {
            user_id,
            source_type,
            source_id,
            points,
            xp: points,
            project_id: None,
            duration_seconds: 0,
            occurred_at,
        }
    }

    pub fn with_project(mut self, project_id: Option<ProjectId>) -> Self {
        self.project_id = project_id;
        self
    }

    pub fn with_duration(mut self, duration_seconds: i64) -> Self {
        self.duration_seconds = duration_seconds.max(0);
        self
    }
}

/// Stored, immutable ledger row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwardRecord {
    pub id: i64,
    pub user_id: UserId,
    pub source_type: AwardSourceType,
    pub source_id: i64,
    pub points_awarded: i64,
    pub xp_awarded: i64,
    pub project_id: Option<ProjectId>,
    pub duration_seconds: i64,
    pub occurred_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl AwardRecord {
    pub fn activity(&self) -> ActivityFact {
        ActivityFact {
            source_type: self.source_type,
            project_id: self.project_id,
            duration_seconds: self.duration_seconds,
            occurred_at: self.occurred_at,
        }
    }
}
