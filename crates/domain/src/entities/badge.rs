//! Badge definitions and grants

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::value_objects::SpecialCondition;
use crate::{BadgeId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BadgeCategory {
    Achievement,
    Milestone,
    Special,
    Social,
}

impl BadgeCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Achievement => "achievement",
            Self::Milestone => "milestone",
            Self::Special => "special",
            Self::Social => "social",
        }
    }
}

impl fmt::Display for BadgeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BadgeCategory {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "achievement" => Ok(Self::Achievement),
            "milestone" => Ok(Self::Milestone),
            "special" => Ok(Self::Special),
            "social" => Ok(Self::Social),
            other => Err(DomainError::validation(format!(
                "Unknown badge category: {other}"
            ))),
        }
    }
}

/// Thresholds a user must meet. Absent fields are not checked; all present
/// fields must hold.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BadgeCriteria {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_points: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_tasks: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_projects: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_work_sessions: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_weekly_hours: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_consecutive_days: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub special: Option<SpecialCondition>,
}

impl BadgeCriteria {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Badge {
    pub id: BadgeId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub category: BadgeCategory,
    #[serde(default)]
    pub criteria: BadgeCriteria,
    pub active: bool,
}

impl Badge {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("badge name cannot be empty"));
        }
        if self.criteria.min_points.is_some_and(|p| p < 0) {
            return Err(DomainError::validation("minPoints cannot be negative"));
        }
        if self
            .criteria
            .min_weekly_hours
            .is_some_and(|h| !h.is_finite() || h < 0.0)
        {
            return Err(DomainError::validation(
                "minWeeklyHours must be a non-negative number",
            ));
        }
        if let Some(special) = &self.criteria.special {
            special.validate()?;
        }
        Ok(())
    }
}

/// A badge held by a user. `earned_by` is `None` for automatic grants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserBadge {
    pub user_id: UserId,
    pub badge_id: BadgeId,
    pub earned_at: DateTime<Utc>,
    pub earned_by: Option<UserId>,
}
