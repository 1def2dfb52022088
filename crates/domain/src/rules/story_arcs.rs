//! Story arc dependency graph and per-user unlock resolution.
//!
//! Arcs form a DAG through `dependsOnArcCodes`. The graph is validated with a
//! Kahn topological sort whenever an arc is written, so resolution can assume
//! it is acyclic. Resolution still carries a visiting guard and reports a
//! cycle as locked rather than recursing forever.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use chrono::{DateTime, Utc};

use crate::entities::{ArcStatus, StoryArc, StoryArcProgress, StoryArcView};
use crate::error::DomainError;
use crate::value_objects::EloTier;

/// Reject duplicate codes, self-dependencies, unknown dependencies and cycles.
///
/// Returns the arc codes in a dependency-respecting order.
pub fn validate_arc_graph(arcs: &[StoryArc]) -> Result<Vec<String>, DomainError> {
    let mut codes: HashSet<&str> = HashSet::new();
    for arc in arcs {
        if !codes.insert(arc.code.as_str()) {
            return Err(DomainError::configuration(format!(
                "duplicate story arc code {}",
                arc.code
            )));
        }
    }

    // BTreeMap keeps the resulting order deterministic.
    let mut in_degree: BTreeMap<&str, usize> = BTreeMap::new();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    for arc in arcs {
        in_degree.entry(arc.code.as_str()).or_insert(0);
        for dep in &arc.metadata.depends_on {
            if dep == &arc.code {
                return Err(DomainError::configuration(format!(
                    "story arc {} depends on itself",
                    arc.code
                )));
            }
            if !codes.contains(dep.as_str()) {
                return Err(DomainError::configuration(format!(
                    "story arc {} depends on unknown arc {dep}",
                    arc.code
                )));
            }
            *in_degree.entry(arc.code.as_str()).or_insert(0) += 1;
            dependents
                .entry(dep.as_str())
                .or_default()
                .push(arc.code.as_str());
        }
    }

    let mut queue: VecDeque<&str> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(code, _)| *code)
        .collect();
    let mut order = Vec::with_capacity(arcs.len());

    while let Some(code) = queue.pop_front() {
        order.push(code.to_string());
        if let Some(children) = dependents.get(code) {
            for child in children {
                if let Some(degree) = in_degree.get_mut(child) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(child);
                    }
                }
            }
        }
    }

    if order.len() != arcs.len() {
        let mut stuck: Vec<&str> = in_degree
            .iter()
            .filter(|(_, degree)| **degree > 0)
            .map(|(code, _)| *code)
            .collect();
        stuck.sort_unstable();
        return Err(DomainError::configuration(format!(
            "story arc dependency cycle among {}",
            stuck.join(", ")
        )));
    }
    Ok(order)
}

/// What the resolver knows about the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArcGate {
    pub level: u32,
    pub elo: EloTier,
}

/// Resolves arc statuses for one user. Statuses are memoized for the
/// lifetime of the resolver, which is one request.
pub struct ArcResolver<'a> {
    arcs: HashMap<&'a str, &'a StoryArc>,
    progress: HashMap<i64, &'a StoryArcProgress>,
    gate: ArcGate,
    memo: HashMap<&'a str, ArcStatus>,
    visiting: HashSet<&'a str>,
}

impl<'a> ArcResolver<'a> {
    pub fn new(arcs: &'a [StoryArc], progress: &'a [StoryArcProgress], gate: ArcGate) -> Self {
        Self {
            arcs: arcs.iter().map(|a| (a.code.as_str(), a)).collect(),
            progress: progress.iter().map(|p| (p.arc_id.get(), p)).collect(),
            gate,
            memo: HashMap::new(),
            visiting: HashSet::new(),
        }
    }

    fn progress_of(&self, arc: &StoryArc) -> Option<&'a StoryArcProgress> {
        self.progress.get(&arc.id.get()).copied()
    }

    fn passes_gate(&self, arc: &StoryArc) -> bool {
        self.gate.level >= arc.metadata.min_level
            && arc.metadata.min_elo.map_or(true, |min| self.gate.elo >= min)
    }

    /// Status of the arc with `code`. Unknown codes resolve as locked.
    pub fn status_of(&mut self, code: &str) -> ArcStatus {
        let Some(arc) = self.arcs.get(code).copied() else {
            return ArcStatus::Locked;
        };
        let key = arc.code.as_str();
        if let Some(status) = self.memo.get(key) {
            return *status;
        }
        if !self.visiting.insert(key) {
            return ArcStatus::Locked;
        }

        let deps_done = arc
            .metadata
            .depends_on
            .iter()
            .all(|dep| self.status_of(dep) == ArcStatus::Completed);

        let status = if !deps_done || !self.passes_gate(arc) {
            ArcStatus::Locked
        } else {
            let completed = self.progress_of(arc).map_or(0, |p| p.completed_steps);
            if completed >= arc.metadata.total_steps {
                ArcStatus::Completed
            } else {
                ArcStatus::InProgress
            }
        };

        self.visiting.remove(key);
        self.memo.insert(key, status);
        status
    }

    /// Views of every arc open at `now`, ordered by chapter then code.
    pub fn resolve_open(&mut self, now: DateTime<Utc>) -> Vec<StoryArcView> {
        let mut open: Vec<&'a StoryArc> = self
            .arcs
            .values()
            .copied()
            .filter(|a| a.is_open_at(now))
            .collect();
        open.sort_by(|a, b| a.chapter.cmp(&b.chapter).then_with(|| a.code.cmp(&b.code)));
        open.into_iter().map(|arc| self.view(arc)).collect()
    }

    pub fn view(&mut self, arc: &'a StoryArc) -> StoryArcView {
        let status = self.status_of(&arc.code);
        let total = arc.metadata.total_steps;
        let completed = self
            .progress_of(arc)
            .map_or(0, |p| p.completed_steps.min(total));
        let current_step = match status {
            ArcStatus::Completed => total,
            _ => (completed + 1).min(total.max(1)),
        };

        let next_objective = match status {
            ArcStatus::InProgress => Some(
                arc.metadata
                    .objectives
                    .get(current_step.saturating_sub(1) as usize)
                    .cloned()
                    .unwrap_or_else(|| format!("Complete step {current_step} of {total}")),
            ),
            _ => None,
        };
        let unlock_requirement = match status {
            ArcStatus::Locked => Some(self.unlock_requirement(arc)),
            _ => None,
        };

        StoryArcView {
            arc_id: arc.id,
            code: arc.code.clone(),
            title: arc.title.clone(),
            chapter: arc.chapter,
            status,
            current_step,
            completed_steps: completed,
            total_steps: total,
            next_objective,
            unlock_requirement,
        }
    }

    /// Human-readable list of what is still missing.
    fn unlock_requirement(&mut self, arc: &'a StoryArc) -> String {
        let mut missing = Vec::new();
        if self.gate.level < arc.metadata.min_level {
            missing.push(format!("Reach level {}", arc.metadata.min_level));
        }
        if let Some(min_elo) = arc.metadata.min_elo {
            if self.gate.elo < min_elo {
                missing.push(format!("Reach {min_elo} elo"));
            }
        }
        let pending: Vec<&str> = arc
            .metadata
            .depends_on
            .iter()
            .filter(|dep| self.status_of(dep) != ArcStatus::Completed)
            .map(String::as_str)
            .collect();
        if !pending.is_empty() {
            missing.push(format!("Complete {}", pending.join(", ")));
        }
        if missing.is_empty() {
            "Dependency cycle".to_string()
        } else {
            missing.join("; ")
        }
    }
}
