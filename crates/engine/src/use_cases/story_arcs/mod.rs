//! Story arc administration, resolution and step advancement.

use std::sync::Arc;

use labquest_domain::{
    ArcGate, ArcResolver, ArcStatus, GamificationEvent, StoryArc,
    StoryArcProgress, StoryArcView, UserId, UserProfile,
};
use serde::Serialize;

use super::error::EngineError;
use crate::infrastructure::ports::{ArcSaveOutcome, ClockPort, StoryArcRepo, UserRepo};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvancedArc {
    pub arc: StoryArcView,
    pub events: Vec<GamificationEvent>,
}

pub struct StoryArcs {
    users: Arc<dyn UserRepo>,
    arcs: Arc<dyn StoryArcRepo>,
    clock: Arc<dyn ClockPort>,
}

fn gate_for(user: &UserProfile) -> ArcGate {
    let progression = user.progression();
    ArcGate {
        level: progression.level,
        elo: progression.elo,
    }
}

impl StoryArcs {
    pub fn new(
        users: Arc<dyn UserRepo>,
        arcs: Arc<dyn StoryArcRepo>,
        clock: Arc<dyn ClockPort>,
    ) -> Self {
        Self { users, arcs, clock }
    }

    /// Create or replace an arc. The whole arc set, including this write, must
    /// stay acyclic and reference only known codes. The store checks this in
    /// the same transaction as the write.
    pub async fn save(&self, arc: &StoryArc) -> Result<(), EngineError> {
        arc.validate()?;

        match self.arcs.save(arc).await? {
            ArcSaveOutcome::Saved => {
                tracing::info!(arc_id = %arc.id, code = %arc.code, "Story arc saved");
                Ok(())
            }
            ArcSaveOutcome::DuplicateCode { existing } => Err(EngineError::validation(format!(
                "story arc code {} is already used by arc {existing}",
                arc.code
            ))),
            ArcSaveOutcome::InvalidGraph(reason) => {
                tracing::warn!(arc_id = %arc.id, code = %arc.code, %reason, "Story arc rejected");
                Err(EngineError::Configuration(reason))
            }
        }
    }

    /// Views of every open arc for the user, ordered by chapter.
    pub async fn resolve_for_user(&self, user_id: UserId) -> Result<Vec<StoryArcView>, EngineError> {
        let user = self
            .users
            .get(user_id)
            .await?
            .ok_or_else(|| EngineError::not_found("User", user_id))?;
        let arcs = self.arcs.list().await?;
        let progress = self.arcs.list_progress(user_id).await?;

        let mut resolver = ArcResolver::new(&arcs, &progress, gate_for(&user));
        Ok(resolver.resolve_open(self.clock.now()))
    }

    /// Complete the next step of an unlocked arc.
    pub async fn advance(&self, user_id: UserId, code: &str) -> Result<AdvancedArc, EngineError> {
        let user = self
            .users
            .get(user_id)
            .await?
            .ok_or_else(|| EngineError::not_found("User", user_id))?;
        let arcs = self.arcs.list().await?;
        let mut progress = self.arcs.list_progress(user_id).await?;
        let now = self.clock.now();

        let arc = arcs
            .iter()
            .find(|a| a.code == code)
            .ok_or_else(|| EngineError::not_found("StoryArc", code))?;
        if !arc.is_open_at(now) {
            return Err(EngineError::invalid_state(format!(
                "story arc {code} is not open"
            )));
        }

        let gate = gate_for(&user);
        let view = ArcResolver::new(&arcs, &progress, gate).view(arc);
        match view.status {
            ArcStatus::Locked => {
                return Err(EngineError::invalid_state(format!(
                    "story arc {code} is locked: {}",
                    view.unlock_requirement.unwrap_or_default()
                )));
            }
            ArcStatus::Completed => {
                return Err(EngineError::invalid_state(format!(
                    "story arc {code} is already completed"
                )));
            }
            ArcStatus::InProgress => {}
        }

        let mut current = progress
            .iter()
            .find(|p| p.arc_id == arc.id)
            .cloned()
            .unwrap_or_else(|| StoryArcProgress::start(user_id, arc.id, now));
        let expected = current.completed_steps;
        let status = current.advance(arc.metadata.total_steps, now)?;

        if !self.arcs.save_progress(&current, expected).await? {
            return Err(EngineError::invalid_state(format!(
                "story arc {code} was advanced concurrently"
            )));
        }

        let mut events = Vec::new();
        if status == ArcStatus::Completed {
            tracing::info!(user_id = %user_id, code = %code, "Story arc completed");
            events.push(GamificationEvent::ArcCompleted {
                user_id,
                arc_id: arc.id,
                code: arc.code.clone(),
            });
        } else {
            tracing::info!(
                user_id = %user_id,
                code = %code,
                completed_steps = current.completed_steps,
                "Story arc advanced"
            );
        }

        match progress.iter_mut().find(|p| p.arc_id == arc.id) {
            Some(existing) => *existing = current,
            None => progress.push(current),
        }
        let view = ArcResolver::new(&arcs, &progress, gate).view(arc);
        Ok(AdvancedArc { arc: view, events })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::clock::FixedClock;
    use crate::infrastructure::ports::{MockStoryArcRepo, MockUserRepo};
    use chrono::{DateTime, TimeZone, Utc};
    use labquest_domain::{StoryArcId, StoryArcMetadata, UserRole};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 6, 10, 0, 0).unwrap()
    }

    fn arc(id: i64, code: &str, deps: &[&str], min_level: u32, steps: u32) -> StoryArc {
        StoryArc {
            id: StoryArcId::new(id),
            code: code.into(),
            title: code.into(),
            chapter: id as u32,
            active: true,
            starts_at: None,
            ends_at: None,
            metadata: StoryArcMetadata {
                total_steps: steps,
                min_level,
                min_elo: None,
                depends_on: deps.iter().map(|d| d.to_string()).collect(),
                objectives: Vec::new(),
            },
        }
    }

    fn done(arc_id: i64, steps: u32) -> StoryArcProgress {
        StoryArcProgress {
            user_id: UserId::new(1),
            arc_id: StoryArcId::new(arc_id),
            current_step: steps,
            completed_steps: steps,
            status: ArcStatus::Completed,
            updated_at: now(),
        }
    }

    fn user_with_points(points: i64) -> MockUserRepo {
        let mut users = MockUserRepo::new();
        users.expect_get().returning(move |id| {
            Ok(Some(UserProfile::new(id, "Ada", UserRole::Student).with_points(points)))
        });
        users
    }

    fn arcs_use_case(users: MockUserRepo, arcs: MockStoryArcRepo) -> StoryArcs {
        StoryArcs::new(Arc::new(users), Arc::new(arcs), Arc::new(FixedClock(now())))
    }

    async fn status_of_a2(points: i64, a1_done: bool) -> ArcStatus {
        let mut repo = MockStoryArcRepo::new();
        repo.expect_list()
            .returning(|| Ok(vec![arc(1, "A1", &[], 0, 1), arc(2, "A2", &["A1"], 5, 2)]));
        repo.expect_list_progress().returning(move |_| {
            Ok(if a1_done { vec![done(1, 1)] } else { vec![] })
        });

        let views = arcs_use_case(user_with_points(points), repo)
            .resolve_for_user(UserId::new(1))
            .await
            .expect("resolve");
        views
            .into_iter()
            .find(|v| v.code == "A2")
            .map(|v| v.status)
            .expect("A2 view")
    }

    #[tokio::test]
    async fn dependent_arc_needs_both_level_and_prerequisite() {
        assert_eq!(status_of_a2(300, true).await, ArcStatus::Locked);
        assert_eq!(status_of_a2(1000, false).await, ArcStatus::Locked);
        assert_eq!(status_of_a2(1000, true).await, ArcStatus::InProgress);
    }

    #[tokio::test]
    async fn graph_rejected_by_the_store_is_a_configuration_error() {
        let mut repo = MockStoryArcRepo::new();
        repo.expect_list().times(0);
        repo.expect_save()
            .withf(|a| a.code == "A2")
            .times(1)
            .returning(|_| Ok(ArcSaveOutcome::InvalidGraph("story arc dependency cycle among A1, A2".into())));

        let err = arcs_use_case(MockUserRepo::new(), repo)
            .save(&arc(2, "A2", &["A1"], 0, 1))
            .await
            .unwrap_err();
        assert!(
            matches!(&err, EngineError::Configuration(msg) if msg.contains("cycle")),
            "got {err:?}"
        );
    }

    #[tokio::test]
    async fn duplicate_code_is_a_validation_error() {
        let mut repo = MockStoryArcRepo::new();
        repo.expect_save().returning(|_| {
            Ok(ArcSaveOutcome::DuplicateCode {
                existing: StoryArcId::new(1),
            })
        });

        let err = arcs_use_case(MockUserRepo::new(), repo)
            .save(&arc(2, "A1", &[], 0, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn malformed_arc_never_reaches_the_store() {
        let mut repo = MockStoryArcRepo::new();
        repo.expect_save().times(0);

        let err = arcs_use_case(MockUserRepo::new(), repo)
            .save(&arc(1, "A1", &[], 0, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[tokio::test]
    async fn advancing_last_step_completes_the_arc() {
        let mut repo = MockStoryArcRepo::new();
        repo.expect_list().returning(|| Ok(vec![arc(1, "A1", &[], 0, 2)]));
        repo.expect_list_progress().returning(|_| {
            let mut p = StoryArcProgress::start(UserId::new(1), StoryArcId::new(1), now());
            p.completed_steps = 1;
            p.current_step = 2;
            Ok(vec![p])
        });
        repo.expect_save_progress()
            .withf(|p, expected| *expected == 1 && p.completed_steps == 2)
            .times(1)
            .returning(|_, _| Ok(true));

        let advanced = arcs_use_case(user_with_points(0), repo)
            .advance(UserId::new(1), "A1")
            .await
            .expect("advance");

        assert_eq!(advanced.arc.status, ArcStatus::Completed);
        assert_eq!(advanced.events.len(), 1);
    }

    #[tokio::test]
    async fn advancing_locked_arc_is_invalid_state() {
        let mut repo = MockStoryArcRepo::new();
        repo.expect_list().returning(|| Ok(vec![arc(1, "A1", &[], 5, 2)]));
        repo.expect_list_progress().returning(|_| Ok(vec![]));
        repo.expect_save_progress().times(0);

        let err = arcs_use_case(user_with_points(0), repo)
            .advance(UserId::new(1), "A1")
            .await
            .unwrap_err();
        let EngineError::InvalidState(msg) = &err else {
            panic!("expected InvalidState, got {err:?}");
        };
        assert!(msg.contains("Reach level 5"), "{msg}");
    }
}
