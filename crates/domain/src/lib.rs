//! LabQuest domain - progression, badges, quests, loot and story arcs.
//!
//! Pure rules and entities with no I/O. Storage, HTTP and time/randomness
//! sources live in `labquest-engine`.

pub mod common;
pub mod entities;
pub mod error;
pub mod events;
pub mod ids;
pub mod rules;
pub mod value_objects;

// Re-export all entities (explicit list in entities/mod.rs)
pub use entities::{
    discounted_unit_price, Archetype, ArcStatus, AwardRecord, AwardSourceType, Badge,
    BadgeCategory, BadgeCriteria, Chest, ChestDrop, ChestOpening, InventoryItem, LootDrop,
    NewAward, OpenChestResult, Quest, QuestEvent, QuestMetric, QuestProgress, QuestRequirement,
    QuestReward, QuestScope, QuestStatus, QuestType, QuestView, Rarity, StoryArc,
    StoryArcMetadata, StoryArcProgress, StoryArcView, UserBadge, UserProfile, UserRole,
};

pub use error::DomainError;
pub use events::GamificationEvent;

// Re-export ID types
pub use ids::{BadgeId, ChestId, ProjectId, QuestId, StoryArcId, TaskId, UserId, WorkSessionId};

pub use rules::{
    meets_thresholds, merge_drops, roll_openings, validate_arc_graph, ArcGate, ArcResolver,
    BadgeRulesEngine, LootTable,
};

pub use value_objects::{
    elo_of, level_of, normalize_xp, normalize_xp_f64, progress_to_next_level,
    task_completion_points, work_session_points, ActivityFact, EloTier, ProgressionSnapshot,
    SpecialCondition, SpecialConditionContext, SpecialRule, SpecialRuleRegistry, StatMetric,
    TaskPoints, UserStats, WorkSessionPoints, DEFAULT_TASK_POINTS, ELO_TABLE, LEVEL_XP_STEP,
    POLYMATH,
};
