//! Use cases - User story orchestration.
//!
//! Each module owns one rewards concern and talks to storage only through the
//! port traits in `infrastructure::ports`.

pub mod badges;
pub mod chests;
pub mod error;
pub mod progression;
pub mod quests;
pub mod story_arcs;

pub use badges::{BadgeEvaluator, BadgeSweep, UserBadgeGrants};
pub use chests::{ChestLoot, OpenedChest};
pub use error::EngineError;
pub use progression::{
    AwardActivity, AwardResult, TaskCompletion, UserProgression, WorkSessionCompletion,
};
pub use quests::{ObservedProgress, QuestClaim, QuestTracker};
pub use story_arcs::{AdvancedArc, StoryArcs};
