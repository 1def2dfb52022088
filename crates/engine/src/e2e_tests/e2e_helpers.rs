//! E2E test helpers for constructing the full application stack.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use labquest_domain::{
    Badge, BadgeCategory, BadgeCriteria, BadgeId, Chest, ChestDrop, ChestId, ProjectId, Quest,
    QuestId, QuestMetric, QuestRequirement, QuestReward, QuestScope, QuestType, Rarity, StoryArc,
    StoryArcId, StoryArcMetadata, TaskId, UserId, UserProfile, UserRole, WorkSessionId,
};

use crate::app::App;
use crate::infrastructure::clock::{FixedClock, SeededRandom};
use crate::infrastructure::ports::ClockPort;
use crate::infrastructure::sqlite::{connect_in_memory, SqliteRepositories};
use crate::use_cases::{TaskCompletion, WorkSessionCompletion};

pub fn test_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 9, 2, 14, 0, 0).unwrap()
}

/// Full E2E test context: wired App plus direct store access for assertions.
pub struct E2ETestContext {
    pub app: App,
    pub repos: SqliteRepositories,
}

impl E2ETestContext {
    pub async fn setup() -> Self {
        let pool = connect_in_memory().await.expect("in-memory store");
        let clock: Arc<dyn ClockPort> = Arc::new(FixedClock(test_now()));
        let repos = SqliteRepositories::new(pool, clock.clone());
        let app = App::new(repos.clone(), clock, Arc::new(SeededRandom::new(7)));
        Self { app, repos }
    }

    /// Create a student with the given coin balance.
    pub async fn student(&self, id: i64, coins: i64) -> UserId {
        let profile =
            UserProfile::new(UserId::new(id), format!("Student {id}"), UserRole::Student)
                .with_coins(coins);
        self.app
            .use_cases
            .users
            .upsert(&profile)
            .await
            .expect("seed student")
            .id
    }
}

pub fn task_done(user_id: UserId, task_id: i64, points: i64) -> TaskCompletion {
    TaskCompletion {
        user_id,
        task_id: TaskId::new(task_id),
        task_points: Some(points),
        due_at: Some(test_now() + Duration::days(1)),
        completed_at: test_now(),
        project_id: Some(ProjectId::new(1)),
    }
}

pub fn session_done(user_id: UserId, session_id: i64, seconds: i64) -> WorkSessionCompletion {
    WorkSessionCompletion {
        user_id,
        work_session_id: WorkSessionId::new(session_id),
        duration_seconds: seconds,
        completed_task_ids: Vec::new(),
        project_id: Some(ProjectId::new(1)),
        ended_at: Some(test_now()),
    }
}

pub fn quest(id: i64, metric: QuestMetric, target: f64, reward: QuestReward) -> Quest {
    Quest {
        id: QuestId::new(id),
        code: format!("QUEST-{id}"),
        title: format!("Quest {id}"),
        quest_type: QuestType::Daily,
        scope: QuestScope::Global,
        min_level: 0,
        requirement: QuestRequirement { metric, target },
        reward,
        active: true,
    }
}

pub fn badge(id: i64, name: &str, criteria: BadgeCriteria) -> Badge {
    Badge {
        id: BadgeId::new(id),
        name: name.into(),
        description: String::new(),
        category: BadgeCategory::Achievement,
        criteria,
        active: true,
    }
}

pub fn chest(id: i64, price_coins: i64) -> (Chest, Vec<ChestDrop>) {
    let chest = Chest {
        id: ChestId::new(id),
        name: "Supply crate".into(),
        rarity: Rarity::Common,
        price_coins,
        min_drops: 1,
        max_drops: 2,
        active: true,
    };
    let drops = vec![
        ChestDrop {
            item_key: "pipette".into(),
            item_name: "Pipette".into(),
            rarity: Rarity::Common,
            weight: 70,
            qty_min: 1,
            qty_max: 3,
            active: true,
        },
        ChestDrop {
            item_key: "centrifuge".into(),
            item_name: "Centrifuge".into(),
            rarity: Rarity::Rare,
            weight: 30,
            qty_min: 1,
            qty_max: 1,
            active: true,
        },
    ];
    (chest, drops)
}

pub fn arc(id: i64, code: &str, depends_on: &[&str], min_level: u32, steps: u32) -> StoryArc {
    StoryArc {
        id: StoryArcId::new(id),
        code: code.into(),
        title: format!("Arc {code}"),
        chapter: id as u32,
        active: true,
        starts_at: None,
        ends_at: None,
        metadata: StoryArcMetadata {
            total_steps: steps,
            min_level,
            min_elo: None,
            depends_on: depends_on.iter().map(|d| d.to_string()).collect(),
            objectives: Vec::new(),
        },
    }
}
