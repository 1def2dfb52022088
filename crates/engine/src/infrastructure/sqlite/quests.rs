//! SQLite-backed quest catalog and per-user counters.
//!
//! Every counter change goes through the domain transitions on
//! [`QuestProgress`]: the row is read, the transition runs in memory and the
//! result is written back only if the stored row is still the one that was
//! read. CLAIMED rows never change because the domain freezes them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use labquest_domain::{
    AwardSourceType, NewAward, ProjectId, Quest, QuestId, QuestMetric, QuestProgress,
    QuestRequirement, QuestReward, QuestScope, QuestStatus, QuestType, UserId,
};
use sqlx::sqlite::SqliteRow;
use sqlx::{Connection, Row, SqliteConnection, SqlitePool};

use super::awards::insert_ledger;
use super::users::{row_to_user, USER_COLUMNS};
use super::{is_fk_violation, parse_opt_ts, parse_ts, to_u32, ts};
use crate::infrastructure::ports::{ClaimOutcome, ProgressUpdate, QuestRepo, RepoError};

pub struct SqliteQuestRepo {
    pool: SqlitePool,
}

impl SqliteQuestRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

const QUEST_COLUMNS: &str = "id, code, title, quest_type, scope, project_id, min_level, metric, \
     target, reward_xp, reward_coins, reward_trophies, active";

const PROGRESS_COLUMNS: &str = "user_id, quest_id, progress_value, target_value, status, \
     updated_at, completed_at, claimed_at";

/// Compare-and-set attempts for a standalone observation before giving up.
const MAX_COUNTER_ATTEMPTS: usize = 5;

fn row_to_quest(row: &SqliteRow) -> Result<Quest, RepoError> {
    let db = |e: sqlx::Error| RepoError::database("quest", e);
    let quest_type: String = row.try_get("quest_type").map_err(db)?;
    let scope: String = row.try_get("scope").map_err(db)?;
    let project_id: Option<i64> = row.try_get("project_id").map_err(db)?;
    let metric: String = row.try_get("metric").map_err(db)?;
    let min_level: i64 = row.try_get("min_level").map_err(db)?;

    Ok(Quest {
        id: QuestId::new(row.try_get("id").map_err(db)?),
        code: row.try_get("code").map_err(db)?,
        title: row.try_get("title").map_err(db)?,
        quest_type: quest_type.parse::<QuestType>()?,
        scope: QuestScope::from_parts(&scope, project_id.map(ProjectId::new))?,
        min_level: to_u32(min_level, "min_level")?,
        requirement: QuestRequirement {
            metric: metric.parse::<QuestMetric>()?,
            target: row.try_get("target").map_err(db)?,
        },
        reward: QuestReward {
            xp: row.try_get("reward_xp").map_err(db)?,
            coins: row.try_get("reward_coins").map_err(db)?,
            trophies: row.try_get("reward_trophies").map_err(db)?,
        },
        active: row.try_get("active").map_err(db)?,
    })
}

fn row_to_progress(row: &SqliteRow) -> Result<QuestProgress, RepoError> {
    let db = |e: sqlx::Error| RepoError::database("quest_progress", e);
    let status: String = row.try_get("status").map_err(db)?;
    let updated_at: String = row.try_get("updated_at").map_err(db)?;

    Ok(QuestProgress {
        user_id: UserId::new(row.try_get("user_id").map_err(db)?),
        quest_id: QuestId::new(row.try_get("quest_id").map_err(db)?),
        progress_value: row.try_get("progress_value").map_err(db)?,
        target_value: row.try_get("target_value").map_err(db)?,
        status: status.parse::<QuestStatus>()?,
        updated_at: parse_ts(&updated_at)?,
        completed_at: parse_opt_ts(row.try_get("completed_at").map_err(db)?)?,
        claimed_at: parse_opt_ts(row.try_get("claimed_at").map_err(db)?)?,
    })
}

async fn load_progress(
    conn: &mut SqliteConnection,
    user_id: UserId,
    quest_id: QuestId,
) -> Result<Option<QuestProgress>, RepoError> {
    let row = sqlx::query(&format!(
        "SELECT {PROGRESS_COLUMNS} FROM quest_progress WHERE user_id = ? AND quest_id = ?"
    ))
    .bind(user_id.get())
    .bind(quest_id.get())
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| RepoError::database("quest_progress_get", e))?;

    row.as_ref().map(row_to_progress).transpose()
}

/// Read the counter (or start a fresh one), run `step` on it and write the
/// result back if the stored row has not moved in between.
///
/// Returns `None` when another writer got there first; nothing was written.
pub(super) async fn advance_counter<F>(
    conn: &mut SqliteConnection,
    user_id: UserId,
    quest: &Quest,
    now: DateTime<Utc>,
    step: F,
) -> Result<Option<ProgressUpdate>, RepoError>
where
    F: FnOnce(&mut QuestProgress, DateTime<Utc>) -> bool,
{
    let stored = load_progress(conn, user_id, quest.id).await?;
    let mut progress = stored
        .clone()
        .unwrap_or_else(|| QuestProgress::start(user_id, quest.id, quest.requirement.target, now));
    let newly_completed = step(&mut progress, now);

    let written = match &stored {
        Some(before) if *before == progress => true,
        Some(before) => update_progress(conn, before, &progress).await?,
        None => insert_progress(conn, &progress).await?,
    };

    Ok(written.then_some(ProgressUpdate {
        progress,
        newly_completed,
    }))
}

async fn insert_progress(
    conn: &mut SqliteConnection,
    progress: &QuestProgress,
) -> Result<bool, RepoError> {
    let result = sqlx::query(
        r#"
        INSERT INTO quest_progress (user_id, quest_id, progress_value, target_value, status,
                                    updated_at, completed_at, claimed_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(user_id, quest_id) DO NOTHING
        "#,
    )
    .bind(progress.user_id.get())
    .bind(progress.quest_id.get())
    .bind(progress.progress_value)
    .bind(progress.target_value)
    .bind(progress.status.as_str())
    .bind(ts(progress.updated_at))
    .bind(progress.completed_at.map(ts))
    .bind(progress.claimed_at.map(ts))
    .execute(&mut *conn)
    .await
    .map_err(|e| {
        if is_fk_violation(&e) {
            RepoError::constraint(format!(
                "quest progress for user {} references a missing user or quest {}",
                progress.user_id, progress.quest_id
            ))
        } else {
            RepoError::database("quest_progress_insert", e)
        }
    })?;

    Ok(result.rows_affected() > 0)
}

/// Conditional on the value and status that were read.
async fn update_progress(
    conn: &mut SqliteConnection,
    before: &QuestProgress,
    after: &QuestProgress,
) -> Result<bool, RepoError> {
    let result = sqlx::query(
        r#"
        UPDATE quest_progress
        SET progress_value = ?, status = ?, updated_at = ?, completed_at = ?, claimed_at = ?
        WHERE user_id = ? AND quest_id = ? AND progress_value = ? AND status = ?
        "#,
    )
    .bind(after.progress_value)
    .bind(after.status.as_str())
    .bind(ts(after.updated_at))
    .bind(after.completed_at.map(ts))
    .bind(after.claimed_at.map(ts))
    .bind(before.user_id.get())
    .bind(before.quest_id.get())
    .bind(before.progress_value)
    .bind(before.status.as_str())
    .execute(&mut *conn)
    .await
    .map_err(|e| RepoError::database("quest_progress_update", e))?;

    Ok(result.rows_affected() > 0)
}

#[async_trait]
impl QuestRepo for SqliteQuestRepo {
    async fn save(&self, quest: &Quest) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            INSERT INTO quests (id, code, title, quest_type, scope, project_id, min_level, metric,
                                target, reward_xp, reward_coins, reward_trophies, active)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                code = excluded.code,
                title = excluded.title,
                quest_type = excluded.quest_type,
                scope = excluded.scope,
                project_id = excluded.project_id,
                min_level = excluded.min_level,
                metric = excluded.metric,
                target = excluded.target,
                reward_xp = excluded.reward_xp,
                reward_coins = excluded.reward_coins,
                reward_trophies = excluded.reward_trophies,
                active = excluded.active
            "#,
        )
        .bind(quest.id.get())
        .bind(&quest.code)
        .bind(&quest.title)
        .bind(quest.quest_type.as_str())
        .bind(quest.scope.kind())
        .bind(quest.scope.project_id().map(|p| p.get()))
        .bind(i64::from(quest.min_level))
        .bind(quest.requirement.metric.as_str())
        .bind(quest.requirement.target)
        .bind(quest.reward.xp)
        .bind(quest.reward.coins)
        .bind(quest.reward.trophies)
        .bind(quest.active)
        .execute(&self.pool)
        .await
        .map_err(|e| RepoError::database("quest_save", e))?;

        Ok(())
    }

    async fn get(&self, id: QuestId) -> Result<Option<Quest>, RepoError> {
        let row = sqlx::query(&format!("SELECT {QUEST_COLUMNS} FROM quests WHERE id = ?"))
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepoError::database("quest_get", e))?;

        row.as_ref().map(row_to_quest).transpose()
    }

    async fn list_active(&self) -> Result<Vec<Quest>, RepoError> {
        let rows = sqlx::query(&format!(
            "SELECT {QUEST_COLUMNS} FROM quests WHERE active = 1 ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepoError::database("quest_list", e))?;

        rows.iter().map(row_to_quest).collect()
    }

    async fn list_progress(&self, user_id: UserId) -> Result<Vec<QuestProgress>, RepoError> {
        let rows = sqlx::query(&format!(
            "SELECT {PROGRESS_COLUMNS} FROM quest_progress WHERE user_id = ? ORDER BY quest_id"
        ))
        .bind(user_id.get())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepoError::database("quest_progress_list", e))?;

        rows.iter().map(row_to_progress).collect()
    }

    async fn observe(
        &self,
        user_id: UserId,
        quest: &Quest,
        observed: f64,
        now: DateTime<Utc>,
    ) -> Result<ProgressUpdate, RepoError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| RepoError::database("quest_observe_acquire", e))?;

        for _ in 0..MAX_COUNTER_ATTEMPTS {
            let update = advance_counter(&mut conn, user_id, quest, now, |p, at| {
                p.observe(observed, at)
            })
            .await?;
            if let Some(update) = update {
                return Ok(update);
            }
        }
        Err(RepoError::constraint(format!(
            "quest {} counter for user {user_id} kept changing",
            quest.id
        )))
    }

    async fn claim(
        &self,
        user_id: UserId,
        quest: &Quest,
        now: DateTime<Utc>,
    ) -> Result<ClaimOutcome, RepoError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| RepoError::database("quest_claim_acquire", e))?;

        let Some(mut progress) = load_progress(&mut conn, user_id, quest.id).await? else {
            return Ok(ClaimOutcome::NotClaimable { status: None });
        };
        let status = progress.status;
        if progress.claim(now).is_err() {
            return Ok(ClaimOutcome::NotClaimable {
                status: Some(status),
            });
        }

        let mut tx = conn
            .begin()
            .await
            .map_err(|e| RepoError::database("quest_claim_begin", e))?;

        // Guard on COMPLETED so only one of two racing claims gets the row.
        let claimed = sqlx::query(
            r#"
            UPDATE quest_progress
            SET status = ?, claimed_at = ?, updated_at = ?
            WHERE user_id = ? AND quest_id = ? AND status = 'COMPLETED'
            "#,
        )
        .bind(progress.status.as_str())
        .bind(progress.claimed_at.map(ts))
        .bind(ts(progress.updated_at))
        .bind(user_id.get())
        .bind(quest.id.get())
        .execute(&mut *tx)
        .await
        .map_err(|e| RepoError::database("quest_claim", e))?;

        if claimed.rows_affected() == 0 {
            tx.rollback()
                .await
                .map_err(|e| RepoError::database("quest_claim_rollback", e))?;
            let status = load_progress(&mut conn, user_id, quest.id)
                .await?
                .map(|p| p.status);
            return Ok(ClaimOutcome::NotClaimable { status });
        }

        let QuestReward { xp, coins, trophies } = quest.reward;
        let payout = NewAward::new(user_id, AwardSourceType::QuestClaimed, quest.id.get(), xp, now)
            .with_project(quest.scope.project_id());
        if insert_ledger(&mut tx, &payout, now).await?.is_none() {
            tx.rollback()
                .await
                .map_err(|e| RepoError::database("quest_claim_rollback", e))?;
            return Err(RepoError::constraint(format!(
                "quest {} already paid out to user {user_id}",
                quest.id
            )));
        }

        let user_row = sqlx::query(&format!(
            r#"
            UPDATE users
            SET points = points + ?, coins = coins + ?, trophies = trophies + ?
            WHERE id = ?
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(payout.points)
        .bind(coins)
        .bind(trophies)
        .bind(user_id.get())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| RepoError::database("quest_claim_payout", e))?
        .ok_or_else(|| RepoError::not_found("User", user_id))?;
        let user = row_to_user(&user_row)?;

        tx.commit()
            .await
            .map_err(|e| RepoError::database("quest_claim_commit", e))?;

        Ok(ClaimOutcome::Claimed { progress, user })
    }
}
