//! Story arcs - narrative chapters gated by level, elo and other arcs.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::value_objects::EloTier;
use crate::{StoryArcId, UserId};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoryArcMetadata {
    pub total_steps: u32,
    pub min_level: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_elo: Option<EloTier>,
    #[serde(rename = "dependsOnArcCodes")]
    pub depends_on: BTreeSet<String>,
    /// Optional text per step, shown as the next objective.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub objectives: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryArc {
    pub id: StoryArcId,
    pub code: String,
    pub title: String,
    #[serde(default)]
    pub chapter: u32,
    pub active: bool,
    #[serde(default)]
    pub starts_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ends_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: StoryArcMetadata,
}

impl StoryArc {
    /// Active and inside its availability window.
    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        self.active
            && self.starts_at.map_or(true, |start| start <= now)
            && self.ends_at.map_or(true, |end| now <= end)
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.code.trim().is_empty() {
            return Err(DomainError::validation("story arc code cannot be empty"));
        }
        if self.metadata.total_steps == 0 {
            return Err(DomainError::validation(format!(
                "story arc {} needs at least one step",
                self.code
            )));
        }
        if let (Some(start), Some(end)) = (self.starts_at, self.ends_at) {
            if end < start {
                return Err(DomainError::validation(format!(
                    "story arc {} ends before it starts",
                    self.code
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ArcStatus {
    Locked,
    InProgress,
    Completed,
}

impl ArcStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Locked => "LOCKED",
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
        }
    }
}

impl fmt::Display for ArcStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArcStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LOCKED" => Ok(Self::Locked),
            "IN_PROGRESS" => Ok(Self::InProgress),
            "COMPLETED" => Ok(Self::Completed),
            other => Err(DomainError::validation(format!(
                "Unknown arc status: {other}"
            ))),
        }
    }
}

/// Stored per-user step counters for one arc.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryArcProgress {
    pub user_id: UserId,
    pub arc_id: StoryArcId,
    /// 1-based step the user is working on.
    pub current_step: u32,
    pub completed_steps: u32,
    pub status: ArcStatus,
    pub updated_at: DateTime<Utc>,
}

impl StoryArcProgress {
    pub fn start(user_id: UserId, arc_id: StoryArcId, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            arc_id,
            current_step: 1,
            completed_steps: 0,
            status: ArcStatus::InProgress,
            updated_at: now,
        }
    }

    /// Complete one step. Caller has already checked the arc is unlocked.
    pub fn advance(
        &mut self,
        total_steps: u32,
        now: DateTime<Utc>,
    ) -> Result<ArcStatus, DomainError> {
        if self.completed_steps >= total_steps || self.status == ArcStatus::Completed {
            return Err(DomainError::invalid_state_transition(format!(
                "story arc {} is already completed",
                self.arc_id
            )));
        }
        self.completed_steps += 1;
        self.updated_at = now;
        if self.completed_steps >= total_steps {
            self.status = ArcStatus::Completed;
            self.current_step = total_steps;
        } else {
            self.status = ArcStatus::InProgress;
            self.current_step = self.completed_steps + 1;
        }
        Ok(self.status)
    }
}

/// Resolved per-user view of an arc.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryArcView {
    pub arc_id: StoryArcId,
    pub code: String,
    pub title: String,
    pub chapter: u32,
    pub status: ArcStatus,
    pub current_step: u32,
    pub completed_steps: u32,
    pub total_steps: u32,
    pub next_objective: Option<String>,
    pub unlock_requirement: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn arc() -> StoryArc {
        StoryArc {
            id: StoryArcId::new(1),
            code: "A1".into(),
            title: "First light".into(),
            chapter: 1,
            active: true,
            starts_at: None,
            ends_at: None,
            metadata: StoryArcMetadata {
                total_steps: 2,
                ..StoryArcMetadata::default()
            },
        }
    }

    #[test]
    fn window_is_inclusive() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let mut a = arc();
        a.starts_at = Some(now);
        a.ends_at = Some(now + Duration::days(7));
        assert!(a.is_open_at(now));
        assert!(a.is_open_at(now + Duration::days(7)));
        assert!(!a.is_open_at(now - Duration::seconds(1)));

        a.active = false;
        assert!(!a.is_open_at(now));
    }

    #[test]
    fn advance_reaches_completion_then_rejects() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let mut progress = StoryArcProgress::start(UserId::new(1), StoryArcId::new(1), now);
        assert_eq!(progress.advance(2, now).unwrap(), ArcStatus::InProgress);
        assert_eq!(progress.current_step, 2);
        assert_eq!(progress.advance(2, now).unwrap(), ArcStatus::Completed);
        assert!(progress.advance(2, now).is_err());
    }

    #[test]
    fn metadata_reads_dependency_codes() {
        let meta: StoryArcMetadata =
            serde_json::from_str(r#"{"totalSteps":3,"minLevel":5,"dependsOnArcCodes":["A1"]}"#)
                .unwrap();
        assert_eq!(meta.min_level, 5);
        assert!(meta.depends_on.contains("A1"));
        assert!(arc().validate().is_ok());
    }
}
