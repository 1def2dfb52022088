//! Badge rules engine.
//!
//! A badge is earned when every present threshold in its criteria holds and
//! its special condition (if any) resolves to `true`.

use crate::entities::{Badge, BadgeCriteria};
use crate::error::DomainError;
use crate::value_objects::{SpecialConditionContext, SpecialRuleRegistry, UserStats};

#[derive(Debug, Default)]
pub struct BadgeRulesEngine {
    registry: SpecialRuleRegistry,
}

impl BadgeRulesEngine {
    pub fn new(registry: SpecialRuleRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &SpecialRuleRegistry {
        &self.registry
    }

    /// Whether the user described by `ctx` qualifies for `badge`.
    ///
    /// Inactive badges never qualify. A special condition with no registered
    /// rule is a configuration error.
    pub fn qualifies(
        &self,
        badge: &Badge,
        ctx: &SpecialConditionContext<'_>,
    ) -> Result<bool, DomainError> {
        if !badge.active || !meets_thresholds(&badge.criteria, ctx.stats) {
            return Ok(false);
        }
        match &badge.criteria.special {
            None => Ok(true),
            Some(condition) => self.registry.evaluate(condition, ctx).ok_or_else(|| {
                DomainError::configuration(format!(
                    "badge {} uses unregistered rule {}",
                    badge.id,
                    condition.key()
                ))
            }),
        }
    }
}

/// AND over every threshold present in `criteria`.
pub fn meets_thresholds(criteria: &BadgeCriteria, stats: &UserStats) -> bool {
    criteria.min_points.map_or(true, |min| stats.points >= min)
        && criteria.min_tasks.map_or(true, |min| stats.completed_tasks >= min)
        && criteria.min_projects.map_or(true, |min| stats.projects >= min)
        && criteria
            .min_work_sessions
            .map_or(true, |min| stats.work_sessions >= min)
        && criteria
            .min_weekly_hours
            .map_or(true, |min| stats.avg_weekly_hours >= min)
        && criteria
            .min_consecutive_days
            .map_or(true, |min| stats.max_consecutive_days >= min)
}
