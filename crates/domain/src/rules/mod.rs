//! Reward rules - badge criteria, loot tables and story arc resolution

mod badges;
mod loot;
mod story_arcs;

pub use badges::{meets_thresholds, BadgeRulesEngine};
pub use loot::{merge_drops, roll_openings, LootTable};
pub use story_arcs::{validate_arc_graph, ArcGate, ArcResolver};
