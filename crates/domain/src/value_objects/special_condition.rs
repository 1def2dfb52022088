//! Special badge conditions.
//!
//! A badge may carry one extra predicate on top of its numeric thresholds.
//! Conditions are stored as tagged JSON and dispatched through a
//! [`SpecialRuleRegistry`] keyed by the condition tag, so `CUSTOM` rules can
//! be registered at startup without touching the enum.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::user_stats::{StatMetric, UserStats};
use crate::entities::UserRole;
use crate::error::DomainError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SpecialCondition {
    /// Metric reached while nobody else holds the badge yet.
    FirstToReach { metric: StatMetric, threshold: f64 },
    /// Consecutive active days.
    #[serde(rename_all = "camelCase")]
    Streak { min_days: u32 },
    HasRole { role: UserRole },
    /// At least one ISO week with activity on every weekday.
    PerfectWeek,
    Custom {
        key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        threshold: Option<f64>,
    },
}

impl SpecialCondition {
    /// Registry key for this condition.
    pub fn key(&self) -> &str {
        match self {
            Self::FirstToReach { .. } => FIRST_TO_REACH,
            Self::Streak { .. } => STREAK,
            Self::HasRole { .. } => HAS_ROLE,
            Self::PerfectWeek => PERFECT_WEEK,
            Self::Custom { key, .. } => key.as_str(),
        }
    }

    /// A custom key may not reuse the tag of a typed variant, or the custom
    /// rule would be dispatched to that variant's predicate.
    pub fn validate(&self) -> Result<(), DomainError> {
        match self {
            Self::Custom { key, .. } if key.trim().is_empty() => {
                Err(DomainError::validation("custom rule key cannot be empty"))
            }
            Self::Custom { key, .. } if is_tagged_key(key) => Err(DomainError::validation(
                format!("custom rule key {key} is reserved"),
            )),
            Self::Custom {
                threshold: Some(t), ..
            } if !t.is_finite() => Err(DomainError::validation(
                "custom rule threshold must be a number",
            )),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for SpecialCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FirstToReach { metric, threshold } => {
                write!(f, "first to reach {threshold} {metric}")
            }
            Self::Streak { min_days } => write!(f, "{min_days}-day streak"),
            Self::HasRole { role } => write!(f, "role {role}"),
            Self::PerfectWeek => f.write_str("perfect week"),
            Self::Custom { key, .. } => write!(f, "custom rule {key}"),
        }
    }
}

pub const FIRST_TO_REACH: &str = "FIRST_TO_REACH";
pub const STREAK: &str = "STREAK";
pub const HAS_ROLE: &str = "HAS_ROLE";
pub const PERFECT_WEEK: &str = "PERFECT_WEEK";
/// Built-in custom rule: contributed to at least `threshold` projects (default 3).
pub const POLYMATH: &str = "POLYMATH";

/// Keys owned by the typed variants.
const TAGGED_KEYS: [&str; 4] = [FIRST_TO_REACH, STREAK, HAS_ROLE, PERFECT_WEEK];

fn is_tagged_key(key: &str) -> bool {
    TAGGED_KEYS.contains(&key)
}

/// Everything a special rule may look at.
#[derive(Debug, Clone)]
pub struct SpecialConditionContext<'a> {
    pub stats: &'a UserStats,
    pub role: UserRole,
    /// Users already holding the badge under evaluation.
    pub badge_holders: u64,
}

/// A single predicate in the registry.
pub trait SpecialRule: Send + Sync {
    fn evaluate(&self, condition: &SpecialCondition, ctx: &SpecialConditionContext<'_>) -> bool;
}

struct FirstToReachRule;

impl SpecialRule for FirstToReachRule {
    fn evaluate(&self, condition: &SpecialCondition, ctx: &SpecialConditionContext<'_>) -> bool {
        match condition {
            SpecialCondition::FirstToReach { metric, threshold } => {
                ctx.badge_holders == 0 && ctx.stats.metric(*metric) >= *threshold
            }
            _ => false,
        }
    }
}

struct StreakRule;

impl SpecialRule for StreakRule {
    fn evaluate(&self, condition: &SpecialCondition, ctx: &SpecialConditionContext<'_>) -> bool {
        match condition {
            SpecialCondition::Streak { min_days } => ctx.stats.max_consecutive_days >= *min_days,
            _ => false,
        }
    }
}

struct HasRoleRule;

impl SpecialRule for HasRoleRule {
    fn evaluate(&self, condition: &SpecialCondition, ctx: &SpecialConditionContext<'_>) -> bool {
        match condition {
            SpecialCondition::HasRole { role } => ctx.role == *role,
            _ => false,
        }
    }
}

struct PerfectWeekRule;

impl SpecialRule for PerfectWeekRule {
    fn evaluate(&self, _condition: &SpecialCondition, ctx: &SpecialConditionContext<'_>) -> bool {
        ctx.stats.perfect_weeks > 0
    }
}

struct PolymathRule;

impl SpecialRule for PolymathRule {
    fn evaluate(&self, condition: &SpecialCondition, ctx: &SpecialConditionContext<'_>) -> bool {
        let threshold = match condition {
            SpecialCondition::Custom { threshold, .. } => threshold.unwrap_or(3.0),
            _ => 3.0,
        };
        f64::from(ctx.stats.projects) >= threshold
    }
}

/// Dispatch table from condition key to predicate.
pub struct SpecialRuleRegistry {
    rules: HashMap<String, Box<dyn SpecialRule>>,
}

impl SpecialRuleRegistry {
    pub fn empty() -> Self {
        Self {
            rules: HashMap::new(),
        }
    }

    /// Registry with every tagged variant plus the built-in custom rules.
    pub fn with_builtin() -> Self {
        let mut registry = Self::empty();
        registry.insert(FIRST_TO_REACH, FirstToReachRule);
        registry.insert(STREAK, StreakRule);
        registry.insert(HAS_ROLE, HasRoleRule);
        registry.insert(PERFECT_WEEK, PerfectWeekRule);
        registry.insert(POLYMATH, PolymathRule);
        registry
    }

    fn insert(&mut self, key: impl Into<String>, rule: impl SpecialRule + 'static) {
        self.rules.insert(key.into(), Box::new(rule));
    }

    /// Register (or replace) the custom rule for `key`. Typed-variant tags
    /// are reserved.
    pub fn register(
        &mut self,
        key: impl Into<String>,
        rule: impl SpecialRule + 'static,
    ) -> Result<(), DomainError> {
        let key = key.into();
        if is_tagged_key(&key) {
            return Err(DomainError::validation(format!(
                "custom rule key {key} is reserved"
            )));
        }
        self.insert(key, rule);
        Ok(())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.rules.contains_key(key)
    }

    /// `None` when no rule is registered for the condition's key, or when a
    /// stored custom condition carries a reserved key.
    pub fn evaluate(
        &self,
        condition: &SpecialCondition,
        ctx: &SpecialConditionContext<'_>,
    ) -> Option<bool> {
        if let SpecialCondition::Custom { key, .. } = condition {
            if is_tagged_key(key) {
                return None;
            }
        }
        self.rules
            .get(condition.key())
            .map(|rule| rule.evaluate(condition, ctx))
    }
}

impl Default for SpecialRuleRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

impl fmt::Debug for SpecialRuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&String> = self.rules.keys().collect();
        keys.sort();
        f.debug_struct("SpecialRuleRegistry")
            .field("rules", &keys)
            .finish()
    }
}
