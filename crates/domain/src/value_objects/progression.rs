//! Progression calculator - level, elo tier and level progress from experience.
//!
//! Everything here is a pure function of accumulated experience. Level and elo
//! are never stored; they are derived on read so they cannot drift from xp.
//!
//! Malformed inputs (negative or non-finite xp) are normalized to zero rather
//! than rejected.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::UserId;

/// Experience required per level.
pub const LEVEL_XP_STEP: i64 = 100;

/// Named rank bucket derived from accumulated experience.
///
/// Variants are declared lowest first, so the derived `Ord` follows rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EloTier {
    Bronze,
    Silver,
    Gold,
    Platinum,
    Diamond,
}

impl EloTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bronze => "BRONZE",
            Self::Silver => "SILVER",
            Self::Gold => "GOLD",
            Self::Platinum => "PLATINUM",
            Self::Diamond => "DIAMOND",
        }
    }
}

impl fmt::Display for EloTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EloTier {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BRONZE" => Ok(Self::Bronze),
            "SILVER" => Ok(Self::Silver),
            "GOLD" => Ok(Self::Gold),
            "PLATINUM" => Ok(Self::Platinum),
            "DIAMOND" => Ok(Self::Diamond),
            other => Err(DomainError::validation(format!("Unknown elo tier: {other}"))),
        }
    }
}

/// Elo thresholds, sorted by `min_xp` descending. The last entry is the
/// catch-all floor and must stay at zero.
pub const ELO_TABLE: &[(i64, EloTier)] = &[
    (6000, EloTier::Diamond),
    (3000, EloTier::Platinum),
    (1500, EloTier::Gold),
    (500, EloTier::Silver),
    (0, EloTier::Bronze),
];

/// Clamp stored experience to the valid domain.
pub fn normalize_xp(xp: i64) -> i64 {
    xp.max(0)
}

/// Normalize a floating experience value (e.g. from an aggregate or a client).
///
/// NaN and infinities become zero, fractions are truncated.
pub fn normalize_xp_f64(xp: f64) -> i64 {
    if !xp.is_finite() || xp <= 0.0 {
        return 0;
    }
    if xp >= i64::MAX as f64 {
        return i64::MAX;
    }
    xp.trunc() as i64
}

/// `floor(xp / LEVEL_XP_STEP)`
pub fn level_of(xp: i64) -> u32 {
    let level = normalize_xp(xp) / LEVEL_XP_STEP;
    u32::try_from(level).unwrap_or(u32::MAX)
}

/// Highest elo tier whose threshold is reached.
pub fn elo_of(xp: i64) -> EloTier {
    let xp = normalize_xp(xp);
    ELO_TABLE
        .iter()
        .find(|(min_xp, _)| *min_xp <= xp)
        .map(|(_, tier)| *tier)
        .unwrap_or(EloTier::Bronze)
}

/// Percentage of the way from the current level floor to the next, in [0, 100].
pub fn progress_to_next_level(xp: i64) -> u8 {
    let xp = normalize_xp(xp);
    let into_level = xp % LEVEL_XP_STEP;
    let pct = into_level * 100 / LEVEL_XP_STEP;
    pct.clamp(0, 100) as u8
}

/// Derived view of a user's progression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressionSnapshot {
    pub user_id: UserId,
    pub points: i64,
    pub xp: i64,
    pub level: u32,
    pub elo: EloTier,
    pub progress_to_next_level: u8,
    /// Experience still needed to reach the next level.
    pub xp_to_next_level: i64,
}

impl ProgressionSnapshot {
    /// Build the snapshot from stored points. Experience equals points.
    pub fn from_points(user_id: UserId, points: i64) -> Self {
        let xp = normalize_xp(points);
        let level = level_of(xp);
        Self {
            user_id,
            points: xp,
            xp,
            level,
            elo: elo_of(xp),
            progress_to_next_level: progress_to_next_level(xp),
            xp_to_next_level: (i64::from(level) + 1) * LEVEL_XP_STEP - xp,
        }
    }
}
