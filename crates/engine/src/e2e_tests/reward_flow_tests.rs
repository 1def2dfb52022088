//! Quest claims and chest purchases against live balances.

use labquest_domain::{ChestId, GamificationEvent, QuestMetric, QuestReward, QuestStatus};

use super::{chest, quest, session_done, E2ETestContext};
use crate::use_cases::EngineError;

fn reward() -> QuestReward {
    QuestReward {
        xp: 50,
        coins: 120,
        trophies: 1,
    }
}

#[tokio::test]
async fn completed_quest_pays_out_exactly_once() {
    let ctx = E2ETestContext::setup().await;
    let ada = ctx.student(1, 0).await;
    let first_session = quest(1, QuestMetric::SessionsCompleted, 1.0, reward());
    let marathon = quest(2, QuestMetric::SessionsCompleted, 5.0, reward());
    for q in [&first_session, &marathon] {
        ctx.app.use_cases.quests.save(q).await.expect("save quest");
    }

    let award = ctx
        .app
        .use_cases
        .awards
        .from_work_session(&session_done(ada, 1, 3_600))
        .await
        .expect("award");
    assert_eq!(award.points_awarded, 20);
    assert!(award.events.contains(&GamificationEvent::QuestCompleted {
        user_id: ada,
        quest_id: first_session.id,
    }));

    let quests = &ctx.app.use_cases.quests;
    let err = quests.claim(ada, marathon.id).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidState(_)), "got {err:?}");

    let claim = quests.claim(ada, first_session.id).await.expect("claim");
    assert_eq!(claim.progress.status, QuestStatus::Claimed);
    assert_eq!(claim.progression.points, 70);
    assert_eq!(claim.coins, 120);
    assert_eq!(claim.trophies, 1);

    let err = quests.claim(ada, first_session.id).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidState(_)), "got {err:?}");

    let snapshot = ctx.app.use_cases.users.get(ada).await.expect("progression");
    assert_eq!(snapshot.points, 70);
}

#[tokio::test]
async fn observed_progress_only_moves_forward() {
    let ctx = E2ETestContext::setup().await;
    let ada = ctx.student(1, 0).await;
    let q = quest(3, QuestMetric::HoursWorked, 10.0, reward());
    ctx.app.use_cases.quests.save(&q).await.expect("save quest");

    let quests = &ctx.app.use_cases.quests;
    let raised = quests.observe(ada, q.id, 6.0).await.expect("observe");
    assert!((raised.progress.progress_value - 6.0).abs() < 1e-9);

    let ignored = quests.observe(ada, q.id, 2.0).await.expect("observe");
    assert!((ignored.progress.progress_value - 6.0).abs() < 1e-9);
    assert!(ignored.events.is_empty());

    let done = quests.observe(ada, q.id, 10.0).await.expect("observe");
    assert_eq!(done.progress.status, QuestStatus::Completed);
    assert_eq!(done.events.len(), 1);
}

#[tokio::test]
async fn chest_purchase_debits_and_fills_inventory() {
    let ctx = E2ETestContext::setup().await;
    let ada = ctx.student(1, 250).await;
    let (crate_chest, drops) = chest(1, 100);
    ctx.app
        .use_cases
        .chests
        .save(&crate_chest, &drops)
        .await
        .expect("save chest");

    let opened = ctx
        .app
        .use_cases
        .chests
        .open(ada, crate_chest.id, 2)
        .await
        .expect("open");
    assert_eq!(opened.result.spent_coins, 200);
    assert_eq!(opened.result.remaining_coins, 50);
    assert!(!opened.result.drops.is_empty());

    let inventory = ctx
        .app
        .use_cases
        .chests
        .inventory(ada)
        .await
        .expect("inventory");
    let held: i64 = inventory.iter().map(|i| i.quantity).sum();
    let dropped: i64 = opened.result.drops.iter().map(|d| d.quantity).sum();
    assert_eq!(held, dropped);
}

#[tokio::test]
async fn unaffordable_purchase_leaves_state_unchanged() {
    let ctx = E2ETestContext::setup().await;
    let ada = ctx.student(1, 120).await;
    let (crate_chest, drops) = chest(1, 100);
    ctx.app
        .use_cases
        .chests
        .save(&crate_chest, &drops)
        .await
        .expect("save chest");

    let chests = &ctx.app.use_cases.chests;
    chests.open(ada, crate_chest.id, 1).await.expect("open");
    let before = chests.inventory(ada).await.expect("inventory");

    let err = chests.open(ada, crate_chest.id, 1).await.unwrap_err();
    assert!(
        matches!(
            err,
            EngineError::InsufficientFunds {
                required: 100,
                available: 20
            }
        ),
        "got {err:?}"
    );
    assert_eq!(chests.inventory(ada).await.expect("inventory"), before);

    let err = chests.open(ada, ChestId::new(99), 1).await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound { .. }));
}
