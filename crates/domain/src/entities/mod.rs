//! Domain entities - Core business objects with identity

mod award;
mod badge;
mod chest;
mod quest;
mod story_arc;
mod user;

pub use award::{AwardRecord, AwardSourceType, NewAward};
pub use badge::{Badge, BadgeCategory, BadgeCriteria, UserBadge};
pub use chest::{
    discounted_unit_price, Chest, ChestDrop, ChestOpening, InventoryItem, LootDrop,
    OpenChestResult, Rarity,
};
pub use quest::{
    Quest, QuestEvent, QuestMetric, QuestProgress, QuestRequirement, QuestReward, QuestScope,
    QuestStatus, QuestType, QuestView,
};
pub use story_arc::{ArcStatus, StoryArc, StoryArcMetadata, StoryArcProgress, StoryArcView};
pub use user::{Archetype, UserProfile, UserRole};
