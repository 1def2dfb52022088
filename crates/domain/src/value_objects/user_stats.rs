//! Aggregate user statistics derived from ledger activity.
//!
//! Badge criteria are evaluated against these numbers. They are recomputed
//! from the award ledger on every evaluation, never cached.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::common::iso_week_key;
use crate::entities::AwardSourceType;
use crate::error::DomainError;
use crate::ProjectId;

/// One ledger row reduced to the facts statistics care about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityFact {
    pub source_type: AwardSourceType,
    pub project_id: Option<ProjectId>,
    pub duration_seconds: i64,
    pub occurred_at: DateTime<Utc>,
}

impl ActivityFact {
    /// Task completions and work sessions are real activity. Quest payouts and
    /// manual grants are not.
    pub fn is_activity(&self) -> bool {
        matches!(
            self.source_type,
            AwardSourceType::TaskCompleted | AwardSourceType::WorkSessionCompleted
        )
    }
}

/// Numbers badge criteria compare against.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub points: i64,
    pub completed_tasks: u32,
    pub projects: u32,
    pub work_sessions: u32,
    pub avg_weekly_hours: f64,
    pub max_consecutive_days: u32,
    /// ISO weeks in which every weekday (Mon-Fri) had activity.
    pub perfect_weeks: u32,
}

impl UserStats {
    pub fn from_activity(points: i64, facts: &[ActivityFact]) -> Self {
        let mut completed_tasks = 0u32;
        let mut work_sessions = 0u32;
        let mut projects: HashSet<ProjectId> = HashSet::new();
        let mut hours_by_week: BTreeMap<(i32, u32), f64> = BTreeMap::new();
        let mut active_dates: BTreeSet<NaiveDate> = BTreeSet::new();

        for fact in facts.iter().filter(|f| f.is_activity()) {
            match fact.source_type {
                AwardSourceType::TaskCompleted => completed_tasks += 1,
                AwardSourceType::WorkSessionCompleted => {
                    work_sessions += 1;
                    let week = iso_week_key(fact.occurred_at.date_naive());
                    *hours_by_week.entry(week).or_default() +=
                        fact.duration_seconds.max(0) as f64 / 3600.0;
                }
                _ => {}
            }
            if let Some(project_id) = fact.project_id {
                projects.insert(project_id);
            }
            active_dates.insert(fact.occurred_at.date_naive());
        }

        let avg_weekly_hours = if hours_by_week.is_empty() {
            0.0
        } else {
            hours_by_week.values().sum::<f64>() / hours_by_week.len() as f64
        };

        Self {
            points: points.max(0),
            completed_tasks,
            projects: u32::try_from(projects.len()).unwrap_or(u32::MAX),
            work_sessions,
            avg_weekly_hours,
            max_consecutive_days: longest_run(&active_dates),
            perfect_weeks: count_perfect_weeks(&active_dates),
        }
    }

    pub fn metric(&self, metric: StatMetric) -> f64 {
        match metric {
            StatMetric::Points => self.points as f64,
            StatMetric::CompletedTasks => f64::from(self.completed_tasks),
            StatMetric::Projects => f64::from(self.projects),
            StatMetric::WorkSessions => f64::from(self.work_sessions),
            StatMetric::AvgWeeklyHours => self.avg_weekly_hours,
            StatMetric::ConsecutiveDays => f64::from(self.max_consecutive_days),
        }
    }
}

/// Longest run of consecutive calendar dates.
fn longest_run(dates: &BTreeSet<NaiveDate>) -> u32 {
    let mut best = 0u32;
    let mut current = 0u32;
    let mut previous: Option<NaiveDate> = None;

    for date in dates {
        current = match previous {
            Some(prev) if prev.succ_opt() == Some(*date) => current + 1,
            _ => 1,
        };
        best = best.max(current);
        previous = Some(*date);
    }
    best
}

fn count_perfect_weeks(dates: &BTreeSet<NaiveDate>) -> u32 {
    let mut weekdays_by_week: BTreeMap<(i32, u32), HashSet<Weekday>> = BTreeMap::new();
    for date in dates {
        let weekday = date.weekday();
        if matches!(weekday, Weekday::Sat | Weekday::Sun) {
            continue;
        }
        weekdays_by_week
            .entry(iso_week_key(*date))
            .or_default()
            .insert(weekday);
    }
    let perfect = weekdays_by_week.values().filter(|days| days.len() == 5).count();
    u32::try_from(perfect).unwrap_or(u32::MAX)
}

/// Statistic a rule can compare against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatMetric {
    Points,
    CompletedTasks,
    Projects,
    WorkSessions,
    AvgWeeklyHours,
    ConsecutiveDays,
}

impl StatMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Points => "POINTS",
            Self::CompletedTasks => "COMPLETED_TASKS",
            Self::Projects => "PROJECTS",
            Self::WorkSessions => "WORK_SESSIONS",
            Self::AvgWeeklyHours => "AVG_WEEKLY_HOURS",
            Self::ConsecutiveDays => "CONSECUTIVE_DAYS",
        }
    }
}

impl fmt::Display for StatMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatMetric {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "POINTS" => Ok(Self::Points),
            "COMPLETED_TASKS" => Ok(Self::CompletedTasks),
            "PROJECTS" => Ok(Self::Projects),
            "WORK_SESSIONS" => Ok(Self::WorkSessions),
            "AVG_WEEKLY_HOURS" => Ok(Self::AvgWeeklyHours),
            "CONSECUTIVE_DAYS" => Ok(Self::ConsecutiveDays),
            other => Err(DomainError::validation(format!("Unknown metric: {other}"))),
        }
    }
}
