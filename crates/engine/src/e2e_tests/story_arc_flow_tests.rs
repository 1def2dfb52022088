//! Story arc gating as a user progresses.

use labquest_domain::{ArcStatus, GamificationEvent};

use super::{arc, task_done, E2ETestContext};
use crate::use_cases::EngineError;

#[tokio::test]
async fn dependent_arc_opens_after_prerequisite_and_level() {
    let ctx = E2ETestContext::setup().await;
    let ada = ctx.student(1, 0).await;
    let arcs = &ctx.app.use_cases.story_arcs;
    arcs.save(&arc(1, "ORIENTATION", &[], 0, 1))
        .await
        .expect("save arc");
    arcs.save(&arc(2, "FIELD-WORK", &["ORIENTATION"], 1, 2))
        .await
        .expect("save arc");

    let err = arcs.advance(ada, "FIELD-WORK").await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidState(_)), "got {err:?}");

    let done = arcs.advance(ada, "ORIENTATION").await.expect("advance");
    assert_eq!(done.arc.status, ArcStatus::Completed);
    assert!(matches!(
        done.events.as_slice(),
        [GamificationEvent::ArcCompleted { .. }]
    ));

    let status = |views: Vec<labquest_domain::StoryArcView>| {
        views
            .into_iter()
            .find(|v| v.code == "FIELD-WORK")
            .map(|v| v.status)
    };
    let views = arcs.resolve_for_user(ada).await.expect("resolve");
    assert_eq!(status(views), Some(ArcStatus::Locked));

    ctx.app
        .use_cases
        .awards
        .from_task_completion(&task_done(ada, 1, 100))
        .await
        .expect("award");

    let views = arcs.resolve_for_user(ada).await.expect("resolve");
    assert_eq!(status(views), Some(ArcStatus::InProgress));

    let step = arcs.advance(ada, "FIELD-WORK").await.expect("advance");
    assert_eq!(step.arc.completed_steps, 1);
    assert!(step.events.is_empty());
}

#[tokio::test]
async fn completed_arc_cannot_advance_again() {
    let ctx = E2ETestContext::setup().await;
    let ada = ctx.student(1, 0).await;
    let arcs = &ctx.app.use_cases.story_arcs;
    arcs.save(&arc(1, "ORIENTATION", &[], 0, 1))
        .await
        .expect("save arc");

    arcs.advance(ada, "ORIENTATION").await.expect("advance");
    let err = arcs.advance(ada, "ORIENTATION").await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidState(_)), "got {err:?}");
}

#[tokio::test]
async fn cyclic_arc_graph_is_rejected() {
    let ctx = E2ETestContext::setup().await;
    let arcs = &ctx.app.use_cases.story_arcs;
    arcs.save(&arc(1, "A", &[], 0, 1)).await.expect("save arc");
    arcs.save(&arc(2, "B", &["A"], 0, 1)).await.expect("save arc");

    let err = arcs.save(&arc(1, "A", &["B"], 0, 1)).await.unwrap_err();
    assert!(matches!(err, EngineError::Configuration(_)), "got {err:?}");
}
