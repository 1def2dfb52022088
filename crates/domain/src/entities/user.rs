//! User profile - the engine's mirror of a collaborator-owned user.
//!
//! Identity, role and class come from the user module. The engine owns the
//! reward balances (points, coins, trophies) and mutates them only through
//! ledger-gated awards, quest payouts and chest debits.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::value_objects::ProgressionSnapshot;
use crate::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    Admin,
    Coordinator,
    Researcher,
    Student,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "ADMIN",
            Self::Coordinator => "COORDINATOR",
            Self::Researcher => "RESEARCHER",
            Self::Student => "STUDENT",
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserRole {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ADMIN" => Ok(Self::Admin),
            "COORDINATOR" => Ok(Self::Coordinator),
            "RESEARCHER" => Ok(Self::Researcher),
            "STUDENT" => Ok(Self::Student),
            other => Err(DomainError::validation(format!("Unknown role: {other}"))),
        }
    }
}

/// Character class chosen by the user. Some classes carry shop perks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Archetype {
    Alchemist,
    Scholar,
    Engineer,
    Explorer,
}

impl Archetype {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Alchemist => "ALCHEMIST",
            Self::Scholar => "SCHOLAR",
            Self::Engineer => "ENGINEER",
            Self::Explorer => "EXPLORER",
        }
    }

    /// Percentage taken off chest prices.
    pub fn chest_discount_pct(&self) -> u8 {
        match self {
            Self::Alchemist => 10,
            Self::Scholar | Self::Engineer | Self::Explorer => 0,
        }
    }
}

impl fmt::Display for Archetype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Archetype {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ALCHEMIST" => Ok(Self::Alchemist),
            "SCHOLAR" => Ok(Self::Scholar),
            "ENGINEER" => Ok(Self::Engineer),
            "EXPLORER" => Ok(Self::Explorer),
            other => Err(DomainError::validation(format!(
                "Unknown archetype: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: UserId,
    pub display_name: String,
    pub role: UserRole,
    pub archetype: Option<Archetype>,
    pub points: i64,
    pub coins: i64,
    pub trophies: i64,
}

impl UserProfile {
    pub fn new(id: UserId, display_name: impl Into<String>, role: UserRole) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            role,
            archetype: None,
            points: 0,
            coins: 0,
            trophies: 0,
        }
    }

    pub fn with_archetype(mut self, archetype: Archetype) -> Self {
        self.archetype = Some(archetype);
        self
    }

    pub fn with_coins(mut self, coins: i64) -> Self {
        self.coins = coins;
        self
    }

    pub fn with_points(mut self, points: i64) -> Self {
        self.points = points;
        self
    }

    pub fn chest_discount_pct(&self) -> u8 {
        self.archetype.map_or(0, |a| a.chest_discount_pct())
    }

    pub fn progression(&self) -> ProgressionSnapshot {
        ProgressionSnapshot::from_points(self.id, self.points)
    }
}
