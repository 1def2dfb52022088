//! SQLite-backed award ledger.
//!
//! The unique index on (user_id, source_type, source_id) is the idempotency
//! guard. The ledger insert is the first statement of the transaction, so a
//! duplicate is detected before any balance is touched and the write lock is
//! held for everything that follows: the points credit and the quest counters
//! the award feeds either all commit or none do.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use labquest_domain::{
    level_of, AwardRecord, AwardSourceType, NewAward, ProjectId, Quest, QuestEvent, UserId,
};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};

use super::quests::advance_counter;
use super::{is_fk_violation, parse_ts, ts};
use crate::infrastructure::ports::{AwardOutcome, AwardRepo, ClockPort, RepoError};

pub struct SqliteAwardRepo {
    pool: SqlitePool,
    clock: Arc<dyn ClockPort>,
}

impl SqliteAwardRepo {
    pub fn new(pool: SqlitePool, clock: Arc<dyn ClockPort>) -> Self {
        Self { pool, clock }
    }
}

const AWARD_COLUMNS: &str = "id, user_id, source_type, source_id, points_awarded, xp_awarded, \
     project_id, duration_seconds, occurred_at, created_at";

fn row_to_award(row: &SqliteRow) -> Result<AwardRecord, RepoError> {
    let db = |e: sqlx::Error| RepoError::database("award", e);
    let source_type: String = row.try_get("source_type").map_err(db)?;
    let project_id: Option<i64> = row.try_get("project_id").map_err(db)?;
    let occurred_at: String = row.try_get("occurred_at").map_err(db)?;
    let created_at: String = row.try_get("created_at").map_err(db)?;

    Ok(AwardRecord {
        id: row.try_get("id").map_err(db)?,
        user_id: UserId::new(row.try_get("user_id").map_err(db)?),
        source_type: source_type.parse::<AwardSourceType>()?,
        source_id: row.try_get("source_id").map_err(db)?,
        points_awarded: row.try_get("points_awarded").map_err(db)?,
        xp_awarded: row.try_get("xp_awarded").map_err(db)?,
        project_id: project_id.map(ProjectId::new),
        duration_seconds: row.try_get("duration_seconds").map_err(db)?,
        occurred_at: parse_ts(&occurred_at)?,
        created_at: parse_ts(&created_at)?,
    })
}

/// Append a ledger row on `conn`. `None` means the idempotency key already
/// exists and nothing was written.
pub(super) async fn insert_ledger(
    conn: &mut SqliteConnection,
    award: &NewAward,
    created_at: DateTime<Utc>,
) -> Result<Option<AwardRecord>, RepoError> {
    let row = sqlx::query(&format!(
        r#"
        INSERT INTO award_ledger (user_id, source_type, source_id, points_awarded, xp_awarded,
                                  project_id, duration_seconds, occurred_at, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(user_id, source_type, source_id) DO NOTHING
        RETURNING {AWARD_COLUMNS}
        "#
    ))
    .bind(award.user_id.get())
    .bind(award.source_type.as_str())
    .bind(award.source_id)
    .bind(award.points)
    .bind(award.xp)
    .bind(award.project_id.map(|p| p.get()))
    .bind(award.duration_seconds)
    .bind(ts(award.occurred_at))
    .bind(ts(created_at))
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| {
        if is_fk_violation(&e) {
            RepoError::not_found("User", award.user_id)
        } else {
            RepoError::database("award_insert", e)
        }
    })?;

    row.as_ref().map(row_to_award).transpose()
}

#[async_trait]
impl AwardRepo for SqliteAwardRepo {
    async fn award_once(
        &self,
        award: &NewAward,
        quests: &[Quest],
        events: &[QuestEvent],
    ) -> Result<AwardOutcome, RepoError> {
        let now = self.clock.now();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepoError::database("award_begin", e))?;

        let Some(record) = insert_ledger(&mut tx, award, now).await? else {
            tx.rollback()
                .await
                .map_err(|e| RepoError::database("award_rollback", e))?;
            return Ok(AwardOutcome::AlreadyAwarded);
        };

        let points_after: i64 = sqlx::query_scalar(
            "UPDATE users SET points = points + ? WHERE id = ? RETURNING points",
        )
        .bind(award.points)
        .bind(award.user_id.get())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| RepoError::database("award_credit", e))?;

        // The level gate uses the balance this award produced.
        let level = level_of(points_after);
        let mut completed_quests = Vec::new();
        for quest in quests {
            let fed = events
                .iter()
                .filter(|e| e.user_id == award.user_id && quest.accepts(e, level));
            for event in fed {
                let update = advance_counter(&mut tx, award.user_id, quest, now, |p, at| {
                    p.apply_increment(event.amount, at)
                })
                .await?
                .ok_or_else(|| {
                    RepoError::constraint(format!(
                        "quest {} counter for user {} changed under the award lock",
                        quest.id, award.user_id
                    ))
                })?;
                if update.newly_completed {
                    completed_quests.push(quest.id);
                }
            }
        }

        tx.commit()
            .await
            .map_err(|e| RepoError::database("award_commit", e))?;

        Ok(AwardOutcome::Recorded {
            record,
            points_before: points_after - award.points,
            points_after,
            completed_quests,
        })
    }

    async fn has_award(
        &self,
        user_id: UserId,
        source_type: AwardSourceType,
        source_id: i64,
    ) -> Result<bool, RepoError> {
        let found: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM award_ledger WHERE user_id = ? AND source_type = ? AND source_id = ?",
        )
        .bind(user_id.get())
        .bind(source_type.as_str())
        .bind(source_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepoError::database("award_lookup", e))?;

        Ok(found.is_some())
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<AwardRecord>, RepoError> {
        let rows = sqlx::query(&format!(
            "SELECT {AWARD_COLUMNS} FROM award_ledger WHERE user_id = ? ORDER BY occurred_at, id"
        ))
        .bind(user_id.get())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepoError::database("award_list", e))?;

        rows.iter().map(row_to_award).collect()
    }
}
