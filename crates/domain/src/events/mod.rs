//! Domain Events
//!
//! Notification-worthy state changes produced by the engine. Delivery is a
//! collaborator concern; the engine only returns these alongside results.

use serde::{Deserialize, Serialize};

use crate::entities::AwardSourceType;
use crate::value_objects::EloTier;
use crate::{BadgeId, ChestId, QuestId, StoryArcId, UserId};

/// Domain event for significant progression or reward changes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GamificationEvent {
    #[serde(rename_all = "camelCase")]
    PointsAwarded {
        user_id: UserId,
        source_type: AwardSourceType,
        source_id: i64,
        points: i64,
    },
    #[serde(rename_all = "camelCase")]
    LevelUp {
        user_id: UserId,
        from_level: u32,
        to_level: u32,
    },
    #[serde(rename_all = "camelCase")]
    EloPromoted {
        user_id: UserId,
        from: EloTier,
        to: EloTier,
    },
    #[serde(rename_all = "camelCase")]
    BadgeEarned {
        user_id: UserId,
        badge_id: BadgeId,
        badge_name: String,
    },
    #[serde(rename_all = "camelCase")]
    QuestCompleted { user_id: UserId, quest_id: QuestId },
    #[serde(rename_all = "camelCase")]
    QuestClaimed {
        user_id: UserId,
        quest_id: QuestId,
        xp: i64,
        coins: i64,
        trophies: i64,
    },
    #[serde(rename_all = "camelCase")]
    ChestOpened {
        user_id: UserId,
        chest_id: ChestId,
        quantity: u32,
        spent_coins: i64,
    },
    #[serde(rename_all = "camelCase")]
    ArcCompleted {
        user_id: UserId,
        arc_id: StoryArcId,
        code: String,
    },
}

impl GamificationEvent {
    pub fn user_id(&self) -> UserId {
        match self {
            Self::PointsAwarded { user_id, .. }
            | Self::LevelUp { user_id, .. }
            | Self::EloPromoted { user_id, .. }
            | Self::BadgeEarned { user_id, .. }
            | Self::QuestCompleted { user_id, .. }
            | Self::QuestClaimed { user_id, .. }
            | Self::ChestOpened { user_id, .. }
            | Self::ArcCompleted { user_id, .. } => *user_id,
        }
    }

    /// Events describing the move from `before` to `after` points.
    pub fn progression_changes(user_id: UserId, before: i64, after: i64) -> Vec<Self> {
        let mut events = Vec::new();
        let (from_level, to_level) = (
            crate::value_objects::level_of(before),
            crate::value_objects::level_of(after),
        );
        if to_level > from_level {
            events.push(Self::LevelUp {
                user_id,
                from_level,
                to_level,
            });
        }
        let (from, to) = (
            crate::value_objects::elo_of(before),
            crate::value_objects::elo_of(after),
        );
        if to > from {
            events.push(Self::EloPromoted { user_id, from, to });
        }
        events
    }
}
