use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use labquest_domain::*;

use super::{connect, connect_in_memory, SqliteRepositories};
use crate::infrastructure::clock::FixedClock;
use crate::infrastructure::ports::{
    ArcSaveOutcome, AwardOutcome, AwardRepo, BadgeRepo, ChestRepo, ClaimOutcome, ClockPort,
    QuestRepo, RepoError, SettleOutcome, StoryArcRepo, UserRepo,
};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 3, 9, 0, 0).unwrap()
}

async fn store() -> SqliteRepositories {
    let pool = connect_in_memory().await.expect("in-memory pool");
    let clock: Arc<dyn ClockPort> = Arc::new(FixedClock(now()));
    SqliteRepositories::new(pool, clock)
}

/// File-backed store with several connections, for tests that race writers.
async fn file_store(dir: &tempfile::TempDir, connections: u32) -> SqliteRepositories {
    let db_path = dir.path().join("labquest.db");
    let pool = connect(&db_path.to_string_lossy(), connections).await.expect("pool");
    let clock: Arc<dyn ClockPort> = Arc::new(FixedClock(now()));
    SqliteRepositories::new(pool, clock)
}

fn tasks_done(user: i64, amount: f64) -> QuestEvent {
    QuestEvent {
        user_id: UserId::new(user),
        metric: QuestMetric::TasksCompleted,
        amount,
        project_id: None,
    }
}

/// Award a task worth `points` that feeds one task into `quests`.
async fn award_task(
    repos: &SqliteRepositories,
    task_id: i64,
    points: i64,
    quests: &[Quest],
) -> AwardOutcome {
    let award = NewAward::new(UserId::new(1), AwardSourceType::TaskCompleted, task_id, points, now());
    repos
        .awards
        .award_once(&award, quests, &[tasks_done(1, 1.0)])
        .await
        .expect("award")
}

async fn seed_user(repos: &SqliteRepositories, id: i64, coins: i64) -> UserProfile {
    repos
        .users
        .upsert(&UserProfile::new(UserId::new(id), format!("user-{id}"), UserRole::Student).with_coins(coins))
        .await
        .expect("seed user")
}

fn quest(id: i64, target: f64) -> Quest {
    Quest {
        id: QuestId::new(id),
        code: format!("Q{id}"),
        title: "Three tasks".into(),
        quest_type: QuestType::Daily,
        scope: QuestScope::Global,
        min_level: 0,
        requirement: QuestRequirement {
            metric: QuestMetric::TasksCompleted,
            target,
        },
        reward: QuestReward {
            xp: 40,
            coins: 15,
            trophies: 1,
        },
        active: true,
    }
}

#[tokio::test]
async fn user_upsert_keeps_balances_after_first_insert() {
    let repos = store().await;
    seed_user(&repos, 1, 100).await;

    let renamed = UserProfile::new(UserId::new(1), "Ada L.", UserRole::Researcher)
        .with_archetype(Archetype::Alchemist)
        .with_coins(0);
    let stored = repos.users.upsert(&renamed).await.expect("upsert");

    assert_eq!(stored.display_name, "Ada L.");
    assert_eq!(stored.role, UserRole::Researcher);
    assert_eq!(stored.archetype, Some(Archetype::Alchemist));
    assert_eq!(stored.coins, 100);
    assert_eq!(repos.users.list_ids().await.expect("ids"), vec![UserId::new(1)]);
}

#[tokio::test]
async fn award_once_is_idempotent_and_credits_points() {
    let repos = store().await;
    seed_user(&repos, 1, 0).await;

    let award = NewAward::new(UserId::new(1), AwardSourceType::TaskCompleted, 77, 10, now())
        .with_project(Some(ProjectId::new(3)));

    match repos.awards.award_once(&award, &[], &[]).await.expect("first") {
        AwardOutcome::Recorded {
            record,
            points_before,
            points_after,
            completed_quests,
        } => {
            assert!(completed_quests.is_empty());
            assert_eq!(points_before, 0);
            assert_eq!(points_after, 10);
            assert_eq!(record.source_id, 77);
            assert_eq!(record.project_id, Some(ProjectId::new(3)));
            assert_eq!(record.occurred_at, now());
        }
        other => panic!("unexpected outcome: {other:?}"),
    }

    assert_eq!(
        repos.awards.award_once(&award, &[], &[]).await.expect("second"),
        AwardOutcome::AlreadyAwarded
    );

    let user = repos.users.get(UserId::new(1)).await.expect("get").expect("user");
    assert_eq!(user.points, 10);
    assert!(repos
        .awards
        .has_award(UserId::new(1), AwardSourceType::TaskCompleted, 77)
        .await
        .expect("lookup"));
    assert_eq!(repos.awards.list_for_user(UserId::new(1)).await.expect("list").len(), 1);
}

#[tokio::test]
async fn same_source_id_under_another_type_is_a_separate_award() {
    let repos = store().await;
    seed_user(&repos, 1, 0).await;

    let task = NewAward::new(UserId::new(1), AwardSourceType::TaskCompleted, 5, 10, now());
    let session = NewAward::new(UserId::new(1), AwardSourceType::WorkSessionCompleted, 5, 25, now());
    repos.awards.award_once(&task, &[], &[]).await.expect("task");
    let outcome = repos.awards.award_once(&session, &[], &[]).await.expect("session");

    assert!(matches!(outcome, AwardOutcome::Recorded { points_after: 35, .. }));
}

#[tokio::test]
async fn award_for_unknown_user_is_not_found() {
    let repos = store().await;
    let award = NewAward::new(UserId::new(404), AwardSourceType::TaskCompleted, 1, 10, now());

    let err = repos.awards.award_once(&award, &[], &[]).await.unwrap_err();
    assert!(matches!(err, RepoError::NotFound { entity_type: "User", .. }), "got {err:?}");
}

#[tokio::test]
async fn concurrent_duplicate_awards_credit_once() {
    let temp_dir = tempfile::tempdir().expect("tempdir");
    let repos = file_store(&temp_dir, 4).await;
    seed_user(&repos, 1, 0).await;

    let award = NewAward::new(UserId::new(1), AwardSourceType::WorkSessionCompleted, 9, 30, now());
    let mut handles = Vec::new();
    for _ in 0..8 {
        let awards = repos.awards.clone();
        let award = award.clone();
        handles.push(tokio::spawn(async move { awards.award_once(&award, &[], &[]).await }));
    }

    let mut recorded = 0;
    for handle in handles {
        if let AwardOutcome::Recorded { .. } = handle.await.expect("join").expect("award") {
            recorded += 1;
        }
    }

    assert_eq!(recorded, 1);
    let user = repos.users.get(UserId::new(1)).await.expect("get").expect("user");
    assert_eq!(user.points, 30);
}

#[tokio::test]
async fn badge_grant_is_unique_per_user() {
    let repos = store().await;
    seed_user(&repos, 1, 0).await;

    let badge = Badge {
        id: BadgeId::new(1),
        name: "Marathon".into(),
        description: "Ten sessions".into(),
        category: BadgeCategory::Milestone,
        criteria: BadgeCriteria {
            min_work_sessions: Some(10),
            special: Some(SpecialCondition::Streak { min_days: 3 }),
            ..BadgeCriteria::default()
        },
        active: true,
    };
    repos.badges.save(&badge).await.expect("save");
    assert_eq!(repos.badges.get(BadgeId::new(1)).await.expect("get"), Some(badge));

    let grant = UserBadge {
        user_id: UserId::new(1),
        badge_id: BadgeId::new(1),
        earned_at: now(),
        earned_by: None,
    };
    assert!(repos.badges.grant(&grant).await.expect("grant"));
    assert!(!repos.badges.grant(&grant).await.expect("regrant"));
    assert_eq!(repos.badges.holder_count(BadgeId::new(1)).await.expect("count"), 1);
    assert_eq!(repos.badges.list_for_user(UserId::new(1)).await.expect("list"), vec![grant]);
}

fn completed(outcome: &AwardOutcome) -> Vec<QuestId> {
    match outcome {
        AwardOutcome::Recorded {
            completed_quests, ..
        } => completed_quests.clone(),
        AwardOutcome::AlreadyAwarded => panic!("award was a duplicate"),
    }
}

#[tokio::test]
async fn award_reports_quest_completion_edge_once() {
    let repos = store().await;
    seed_user(&repos, 1, 0).await;
    let q = quest(1, 2.0);
    repos.quests.save(&q).await.expect("save");
    let catalog = [q.clone()];

    assert!(completed(&award_task(&repos, 1, 10, &catalog).await).is_empty());
    let progress = repos.quests.list_progress(UserId::new(1)).await.expect("progress");
    assert_eq!(progress[0].status, QuestStatus::InProgress);

    assert_eq!(completed(&award_task(&repos, 2, 10, &catalog).await), vec![q.id]);
    assert!(completed(&award_task(&repos, 3, 10, &catalog).await).is_empty());

    let progress = repos.quests.list_progress(UserId::new(1)).await.expect("progress");
    assert_eq!(progress[0].status, QuestStatus::Completed);
    assert_eq!(progress[0].progress_value, 3.0);
    assert_eq!(progress[0].completed_at, Some(now()));
}

#[tokio::test]
async fn duplicate_award_does_not_feed_quests_again() {
    let repos = store().await;
    seed_user(&repos, 1, 0).await;
    let q = quest(1, 5.0);
    repos.quests.save(&q).await.expect("save");
    let catalog = [q];

    award_task(&repos, 1, 10, &catalog).await;
    assert_eq!(award_task(&repos, 1, 10, &catalog).await, AwardOutcome::AlreadyAwarded);

    let progress = repos.quests.list_progress(UserId::new(1)).await.expect("progress");
    assert_eq!(progress[0].progress_value, 1.0);
}

#[tokio::test]
async fn award_applies_level_gate_with_the_new_balance() {
    let repos = store().await;
    seed_user(&repos, 1, 0).await;
    let mut gated = quest(1, 1.0);
    gated.min_level = 1;
    let mut scoped = quest(2, 1.0);
    scoped.scope = QuestScope::Project {
        project_id: ProjectId::new(9),
    };
    repos.quests.save(&gated).await.expect("save");
    repos.quests.save(&scoped).await.expect("save");
    let catalog = [gated.clone(), scoped];

    // 95 points keeps the user at level 0.
    assert!(completed(&award_task(&repos, 1, 95, &catalog).await).is_empty());
    // 105 points reaches level 1 within the same award.
    assert_eq!(completed(&award_task(&repos, 2, 10, &catalog).await), vec![gated.id]);
    assert_eq!(repos.quests.list_progress(UserId::new(1)).await.expect("progress").len(), 1);
}

#[tokio::test]
async fn failed_quest_write_rolls_back_the_whole_award() {
    let repos = store().await;
    seed_user(&repos, 1, 0).await;
    // Never saved: the counter insert hits the foreign key inside the award.
    let missing = quest(1, 3.0);

    let award = NewAward::new(UserId::new(1), AwardSourceType::TaskCompleted, 7, 10, now());
    let err = repos
        .awards
        .award_once(&award, &[missing.clone()], &[tasks_done(1, 1.0)])
        .await
        .unwrap_err();
    assert!(matches!(err, RepoError::ConstraintViolation(_)), "got {err:?}");

    let user = repos.users.get(UserId::new(1)).await.expect("get").expect("user");
    assert_eq!(user.points, 0);
    assert!(!repos
        .awards
        .has_award(UserId::new(1), AwardSourceType::TaskCompleted, 7)
        .await
        .expect("lookup"));

    // The retry is a fresh award, not a duplicate.
    repos.quests.save(&missing).await.expect("save");
    let retry = repos
        .awards
        .award_once(&award, &[missing], &[tasks_done(1, 1.0)])
        .await
        .expect("retry");
    assert!(matches!(retry, AwardOutcome::Recorded { points_after: 10, .. }));
}

#[tokio::test]
async fn quest_observe_only_raises_the_counter() {
    let repos = store().await;
    seed_user(&repos, 1, 0).await;
    let q = quest(1, 10.0);
    repos.quests.save(&q).await.expect("save");

    repos.quests.observe(UserId::new(1), &q, 6.0, now()).await.expect("observe");
    let lower = repos.quests.observe(UserId::new(1), &q, 2.0, now()).await.expect("observe");
    assert_eq!(lower.progress.progress_value, 6.0);

    let done = repos.quests.observe(UserId::new(1), &q, 12.0, now()).await.expect("observe");
    assert!(done.newly_completed);
    assert_eq!(done.progress.progress_value, 12.0);
}

#[tokio::test]
async fn quest_claim_pays_once_and_freezes_progress() {
    let repos = store().await;
    seed_user(&repos, 1, 5).await;
    let q = quest(1, 1.0);
    repos.quests.save(&q).await.expect("save");

    let early = repos.quests.claim(UserId::new(1), &q, now()).await.expect("claim");
    assert_eq!(early, ClaimOutcome::NotClaimable { status: None });

    award_task(&repos, 1, 0, &[q.clone()]).await;
    let later = now() + Duration::minutes(5);
    match repos.quests.claim(UserId::new(1), &q, later).await.expect("claim") {
        ClaimOutcome::Claimed { progress, user } => {
            assert_eq!(progress.status, QuestStatus::Claimed);
            assert_eq!(progress.claimed_at, Some(later));
            assert_eq!(user.points, 40);
            assert_eq!(user.coins, 20);
            assert_eq!(user.trophies, 1);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }

    let again = repos.quests.claim(UserId::new(1), &q, later).await.expect("claim");
    assert_eq!(
        again,
        ClaimOutcome::NotClaimable {
            status: Some(QuestStatus::Claimed)
        }
    );

    award_task(&repos, 2, 0, &[q.clone()]).await;
    let frozen = repos.quests.observe(UserId::new(1), &q, 9.0, later).await.expect("observe");
    assert!(!frozen.newly_completed);
    assert_eq!(frozen.progress.progress_value, 1.0);
    assert_eq!(frozen.progress.status, QuestStatus::Claimed);

    assert!(repos
        .awards
        .has_award(UserId::new(1), AwardSourceType::QuestClaimed, 1)
        .await
        .expect("ledger"));
}

#[tokio::test]
async fn list_active_skips_inactive_quests() {
    let repos = store().await;
    let mut inactive = quest(2, 1.0);
    inactive.active = false;
    inactive.scope = QuestScope::Project {
        project_id: ProjectId::new(8),
    };
    repos.quests.save(&quest(1, 1.0)).await.expect("save");
    repos.quests.save(&inactive).await.expect("save");

    let active = repos.quests.list_active().await.expect("list");
    assert_eq!(active.len(), 1);
    assert_eq!(
        repos.quests.get(QuestId::new(2)).await.expect("get").map(|q| q.scope),
        Some(QuestScope::Project {
            project_id: ProjectId::new(8)
        })
    );
}

fn chest() -> (Chest, Vec<ChestDrop>) {
    let chest = Chest {
        id: ChestId::new(1),
        name: "Wooden chest".into(),
        rarity: Rarity::Common,
        price_coins: 50,
        min_drops: 1,
        max_drops: 2,
        active: true,
    };
    let drops = vec![ChestDrop {
        item_key: "reagent".into(),
        item_name: "Reagent".into(),
        rarity: Rarity::Common,
        weight: 10,
        qty_min: 1,
        qty_max: 3,
        active: true,
    }];
    (chest, drops)
}

#[tokio::test]
async fn settle_open_debits_and_accumulates_inventory() {
    let repos = store().await;
    seed_user(&repos, 1, 120).await;
    let (chest, drops) = chest();
    repos.chests.save(&chest, &drops).await.expect("save");
    assert_eq!(repos.chests.list_drops(chest.id).await.expect("drops"), drops);

    let opening = ChestOpening {
        user_id: UserId::new(1),
        chest_id: chest.id,
        quantity: 1,
        unit_price: 50,
        spent_coins: 50,
        opened_at: now(),
    };
    let loot = vec![LootDrop {
        item_key: "reagent".into(),
        item_name: "Reagent".into(),
        rarity: Rarity::Common,
        quantity: 2,
    }];

    assert_eq!(
        repos.chests.settle_open(&opening, &loot).await.expect("open"),
        SettleOutcome::Settled { remaining_coins: 70 }
    );
    assert_eq!(
        repos.chests.settle_open(&opening, &loot).await.expect("open"),
        SettleOutcome::Settled { remaining_coins: 20 }
    );
    assert_eq!(
        repos.chests.settle_open(&opening, &loot).await.expect("open"),
        SettleOutcome::InsufficientFunds { available: 20 }
    );

    let inventory = repos.chests.inventory(UserId::new(1)).await.expect("inventory");
    assert_eq!(inventory.len(), 1);
    assert_eq!(inventory[0].quantity, 4);
}

#[tokio::test]
async fn saving_a_chest_replaces_its_drop_table() {
    let repos = store().await;
    let (chest, drops) = chest();
    repos.chests.save(&chest, &drops).await.expect("save");

    let replacement = vec![ChestDrop {
        item_key: "crystal".into(),
        item_name: "Crystal".into(),
        rarity: Rarity::Rare,
        weight: 1,
        qty_min: 1,
        qty_max: 1,
        active: true,
    }];
    repos.chests.save(&chest, &replacement).await.expect("save");

    assert_eq!(repos.chests.list_drops(chest.id).await.expect("drops"), replacement);
}

#[tokio::test]
async fn arc_progress_write_is_conditional_on_step_count() {
    let repos = store().await;
    seed_user(&repos, 1, 0).await;
    let arc = StoryArc {
        id: StoryArcId::new(1),
        code: "A1".into(),
        title: "Arrival".into(),
        chapter: 1,
        active: true,
        starts_at: None,
        ends_at: Some(now() + Duration::days(30)),
        metadata: StoryArcMetadata {
            total_steps: 3,
            depends_on: BTreeSet::new(),
            ..StoryArcMetadata::default()
        },
    };
    assert_eq!(repos.story_arcs.save(&arc).await.expect("save"), ArcSaveOutcome::Saved);
    assert_eq!(repos.story_arcs.list().await.expect("list"), vec![arc.clone()]);

    let mut progress = StoryArcProgress::start(UserId::new(1), arc.id, now());
    progress.advance(3, now()).expect("advance");
    assert!(repos.story_arcs.save_progress(&progress, 0).await.expect("first"));

    let mut stale = progress.clone();
    stale.advance(3, now()).expect("advance");
    assert!(!repos.story_arcs.save_progress(&stale, 0).await.expect("stale"));
    assert!(repos.story_arcs.save_progress(&stale, 1).await.expect("fresh"));

    let stored = repos.story_arcs.list_progress(UserId::new(1)).await.expect("progress");
    assert_eq!(stored, vec![stale]);
}

#[tokio::test]
async fn racing_chest_opens_never_overdraw() {
    let temp_dir = tempfile::tempdir().expect("tempdir");
    let repos = file_store(&temp_dir, 4).await;
    seed_user(&repos, 1, 250).await;
    let (chest, drops) = chest();
    repos.chests.save(&chest, &drops).await.expect("save");

    let opening = ChestOpening {
        user_id: UserId::new(1),
        chest_id: chest.id,
        quantity: 2,
        unit_price: 50,
        spent_coins: 100,
        opened_at: now(),
    };
    let loot = vec![LootDrop {
        item_key: "reagent".into(),
        item_name: "Reagent".into(),
        rarity: Rarity::Common,
        quantity: 1,
    }];

    let mut handles = Vec::new();
    for _ in 0..5 {
        let chests = repos.chests.clone();
        let (opening, loot) = (opening.clone(), loot.clone());
        handles.push(tokio::spawn(async move { chests.settle_open(&opening, &loot).await }));
    }

    let mut settled = 0;
    for handle in handles {
        match handle.await.expect("join").expect("open") {
            SettleOutcome::Settled { remaining_coins } => {
                assert!(remaining_coins >= 0);
                settled += 1;
            }
            SettleOutcome::InsufficientFunds { available } => assert!(available < 100),
        }
    }

    assert_eq!(settled, 2);
    let user = repos.users.get(UserId::new(1)).await.expect("get").expect("user");
    assert_eq!(user.coins, 50);
    let inventory = repos.chests.inventory(UserId::new(1)).await.expect("inventory");
    assert_eq!(inventory[0].quantity, 2);
}

#[tokio::test]
async fn racing_quest_claims_pay_once() {
    let temp_dir = tempfile::tempdir().expect("tempdir");
    let repos = file_store(&temp_dir, 4).await;
    seed_user(&repos, 1, 0).await;
    let q = quest(1, 1.0);
    repos.quests.save(&q).await.expect("save");
    award_task(&repos, 1, 0, &[q.clone()]).await;

    let (first, second) = tokio::join!(
        repos.quests.claim(UserId::new(1), &q, now()),
        repos.quests.claim(UserId::new(1), &q, now()),
    );
    let outcomes = [first.expect("claim"), second.expect("claim")];

    let claimed = outcomes
        .iter()
        .filter(|o| matches!(o, ClaimOutcome::Claimed { .. }))
        .count();
    assert_eq!(claimed, 1, "outcomes: {outcomes:?}");
    assert!(outcomes.contains(&ClaimOutcome::NotClaimable {
        status: Some(QuestStatus::Claimed)
    }));

    let user = repos.users.get(UserId::new(1)).await.expect("get").expect("user");
    assert_eq!(user.points, 40);
    assert_eq!(user.coins, 15);
    assert_eq!(user.trophies, 1);
}

fn arc(id: i64, code: &str, deps: &[&str]) -> StoryArc {
    StoryArc {
        id: StoryArcId::new(id),
        code: code.into(),
        title: code.into(),
        chapter: 1,
        active: true,
        starts_at: None,
        ends_at: None,
        metadata: StoryArcMetadata {
            total_steps: 1,
            depends_on: deps.iter().map(|d| d.to_string()).collect(),
            ..StoryArcMetadata::default()
        },
    }
}

#[tokio::test]
async fn arc_save_rejects_cycles_and_duplicate_codes_without_writing() {
    let repos = store().await;
    assert_eq!(repos.story_arcs.save(&arc(1, "A", &[])).await.expect("save"), ArcSaveOutcome::Saved);
    assert_eq!(repos.story_arcs.save(&arc(2, "B", &["A"])).await.expect("save"), ArcSaveOutcome::Saved);

    let cycle = repos.story_arcs.save(&arc(1, "A", &["B"])).await.expect("save");
    assert!(matches!(cycle, ArcSaveOutcome::InvalidGraph(_)), "got {cycle:?}");

    let clash = repos.story_arcs.save(&arc(3, "B", &[])).await.expect("save");
    assert_eq!(clash, ArcSaveOutcome::DuplicateCode { existing: StoryArcId::new(2) });

    let stored = repos.story_arcs.list().await.expect("list");
    assert_eq!(stored, vec![arc(1, "A", &[]), arc(2, "B", &["A"])]);
}

#[tokio::test]
async fn racing_arc_saves_cannot_build_a_cycle() {
    let temp_dir = tempfile::tempdir().expect("tempdir");
    let repos = file_store(&temp_dir, 4).await;
    repos.story_arcs.save(&arc(1, "A", &[])).await.expect("save");
    repos.story_arcs.save(&arc(2, "B", &[])).await.expect("save");

    let a_needs_b = arc(1, "A", &["B"]);
    let b_needs_a = arc(2, "B", &["A"]);
    let (first, second) = tokio::join!(
        repos.story_arcs.save(&a_needs_b),
        repos.story_arcs.save(&b_needs_a),
    );
    let outcomes = [first.expect("save"), second.expect("save")];

    let saved = outcomes.iter().filter(|o| **o == ArcSaveOutcome::Saved).count();
    assert_eq!(saved, 1, "outcomes: {outcomes:?}");
    let stored = repos.story_arcs.list().await.expect("list");
    assert!(validate_arc_graph(&stored).is_ok());
}

#[tokio::test]
async fn data_survives_reopening_the_file() {
    let temp_dir = tempfile::tempdir().expect("tempdir");
    let db_path = temp_dir.path().join("nested").join("labquest.db");
    let db_path = db_path.to_string_lossy().to_string();
    let clock: Arc<dyn ClockPort> = Arc::new(FixedClock(now()));

    {
        let pool = connect(&db_path, 2).await.expect("pool");
        let repos = SqliteRepositories::new(pool.clone(), clock.clone());
        seed_user(&repos, 7, 33).await;
        pool.close().await;
    }

    let pool = connect(&db_path, 2).await.expect("reopen");
    let repos = SqliteRepositories::new(pool, clock);
    let user = repos.users.get(UserId::new(7)).await.expect("get").expect("user");
    assert_eq!(user.coins, 33);
}
