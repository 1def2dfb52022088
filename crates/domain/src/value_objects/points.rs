//! Source-specific point rules.
//!
//! Each real-world event type converts to points with its own formula. The
//! result is what gets written to the award ledger; experience mirrors points.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::common::ceil_days_late;

/// Points for a task that has no configured value.
pub const DEFAULT_TASK_POINTS: i64 = 10;

pub const SESSION_BASE_POINTS: i64 = 10;
pub const SESSION_DURATION_BONUS_CAP: i64 = 40;
pub const SESSION_POINTS_PER_HOUR: f64 = 10.0;
pub const SESSION_POINTS_PER_TASK: i64 = 5;
pub const SESSION_TASK_BONUS_CAP: i64 = 30;
pub const SESSION_MIN_POINTS: i64 = 1;

/// Breakdown of the work-session formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkSessionPoints {
    pub base: i64,
    pub duration_bonus: i64,
    pub task_bonus: i64,
    pub total: i64,
}

/// `10 + min(40, floor(hours * 10)) + min(30, tasks * 5)`, at least 1.
pub fn work_session_points(duration_seconds: i64, completed_task_count: usize) -> WorkSessionPoints {
    let hours = duration_seconds.max(0) as f64 / 3600.0;
    let duration_bonus = ((hours * SESSION_POINTS_PER_HOUR).floor() as i64)
        .clamp(0, SESSION_DURATION_BONUS_CAP);
    let task_count = i64::try_from(completed_task_count).unwrap_or(i64::MAX);
    let task_bonus = task_count
        .saturating_mul(SESSION_POINTS_PER_TASK)
        .min(SESSION_TASK_BONUS_CAP);
    let total = (SESSION_BASE_POINTS + duration_bonus + task_bonus).max(SESSION_MIN_POINTS);

    WorkSessionPoints {
        base: SESSION_BASE_POINTS,
        duration_bonus,
        task_bonus,
        total,
    }
}

/// Breakdown of the task-completion formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPoints {
    pub base: i64,
    pub days_late: i64,
    pub penalty: i64,
    /// `base - penalty`, floored at zero. Late completions never deduct points.
    pub net: i64,
}

/// Task value minus `days_late * value` when completed after the due date.
pub fn task_completion_points(
    task_points: Option<i64>,
    due_at: Option<DateTime<Utc>>,
    completed_at: DateTime<Utc>,
) -> TaskPoints {
    let base = task_points.unwrap_or(DEFAULT_TASK_POINTS).max(0);
    let days_late = due_at.map_or(0, |due| ceil_days_late(due, completed_at));
    let penalty = days_late.saturating_mul(base);
    let net = base.saturating_sub(penalty).max(0);

    TaskPoints {
        base,
        days_late,
        penalty,
        net,
    }
}
