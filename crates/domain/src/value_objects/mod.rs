//! Value objects - Immutable objects defined by their attributes

mod points;
mod progression;
mod special_condition;
mod user_stats;

pub use points::{
    task_completion_points, work_session_points, TaskPoints, WorkSessionPoints,
    DEFAULT_TASK_POINTS,
};
pub use progression::{
    elo_of, level_of, normalize_xp, normalize_xp_f64, progress_to_next_level, EloTier,
    ProgressionSnapshot, ELO_TABLE, LEVEL_XP_STEP,
};
pub use special_condition::{
    SpecialCondition, SpecialConditionContext, SpecialRule, SpecialRuleRegistry, POLYMATH,
};
pub use user_stats::{ActivityFact, StatMetric, UserStats};
