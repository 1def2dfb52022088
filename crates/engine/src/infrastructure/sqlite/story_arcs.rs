//! SQLite-backed story arcs and per-user step counters.
//!
//! Arc saves validate the dependency graph inside the write transaction: the
//! upsert runs first and takes the write lock, then the graph is read back and
//! checked before commit.

use async_trait::async_trait;
use labquest_domain::{
    validate_arc_graph, ArcStatus, DomainError, StoryArc, StoryArcId, StoryArcMetadata,
    StoryArcProgress, UserId,
};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use super::{is_fk_violation, is_unique_violation, parse_opt_ts, parse_ts, to_u32, ts};
use crate::infrastructure::ports::{ArcSaveOutcome, RepoError, StoryArcRepo};

const ARC_COLUMNS: &str = "id, code, title, chapter, active, starts_at, ends_at, metadata_json";

pub struct SqliteStoryArcRepo {
    pool: SqlitePool,
}

impl SqliteStoryArcRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn row_to_arc(row: &SqliteRow) -> Result<StoryArc, RepoError> {
    let db = |e: sqlx::Error| RepoError::database("story_arc", e);
    let metadata_json: String = row.try_get("metadata_json").map_err(db)?;
    let metadata: StoryArcMetadata = serde_json::from_str(&metadata_json)
        .map_err(|e| RepoError::serialization(e))?;

    Ok(StoryArc {
        id: StoryArcId::new(row.try_get("id").map_err(db)?),
        code: row.try_get("code").map_err(db)?,
        title: row.try_get("title").map_err(db)?,
        chapter: to_u32(row.try_get("chapter").map_err(db)?, "chapter")?,
        active: row.try_get("active").map_err(db)?,
        starts_at: parse_opt_ts(row.try_get("starts_at").map_err(db)?)?,
        ends_at: parse_opt_ts(row.try_get("ends_at").map_err(db)?)?,
        metadata,
    })
}

fn row_to_progress(row: &SqliteRow) -> Result<StoryArcProgress, RepoError> {
    let db = |e: sqlx::Error| RepoError::database("story_arc_progress", e);
    let status: String = row.try_get("status").map_err(db)?;
    let updated_at: String = row.try_get("updated_at").map_err(db)?;

    Ok(StoryArcProgress {
        user_id: UserId::new(row.try_get("user_id").map_err(db)?),
        arc_id: StoryArcId::new(row.try_get("arc_id").map_err(db)?),
        current_step: to_u32(row.try_get("current_step").map_err(db)?, "current_step")?,
        completed_steps: to_u32(row.try_get("completed_steps").map_err(db)?, "completed_steps")?,
        status: status.parse::<ArcStatus>()?,
        updated_at: parse_ts(&updated_at)?,
    })
}

#[async_trait]
impl StoryArcRepo for SqliteStoryArcRepo {
    async fn list(&self) -> Result<Vec<StoryArc>, RepoError> {
        let rows = sqlx::query(&format!(
            "SELECT {ARC_COLUMNS} FROM story_arcs ORDER BY chapter, code"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepoError::database("story_arc_list", e))?;

        rows.iter().map(row_to_arc).collect()
    }

    async fn save(&self, arc: &StoryArc) -> Result<ArcSaveOutcome, RepoError> {
        let metadata_json = serde_json::to_string(&arc.metadata)
            .map_err(|e| RepoError::serialization(e))?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepoError::database("story_arc_save_begin", e))?;

        let upsert = sqlx::query(
            r#"
            INSERT INTO story_arcs (id, code, title, chapter, active, starts_at, ends_at, metadata_json)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                code = excluded.code,
                title = excluded.title,
                chapter = excluded.chapter,
                active = excluded.active,
                starts_at = excluded.starts_at,
                ends_at = excluded.ends_at,
                metadata_json = excluded.metadata_json
            "#,
        )
        .bind(arc.id.get())
        .bind(&arc.code)
        .bind(&arc.title)
        .bind(i64::from(arc.chapter))
        .bind(arc.active)
        .bind(arc.starts_at.map(ts))
        .bind(arc.ends_at.map(ts))
        .bind(metadata_json)
        .execute(&mut *tx)
        .await;

        if let Err(e) = upsert {
            if !is_unique_violation(&e) {
                return Err(RepoError::database("story_arc_save", e));
            }
            let existing: i64 = sqlx::query_scalar("SELECT id FROM story_arcs WHERE code = ?")
                .bind(&arc.code)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| RepoError::database("story_arc_code_lookup", e))?;
            tx.rollback()
                .await
                .map_err(|e| RepoError::database("story_arc_save_rollback", e))?;
            return Ok(ArcSaveOutcome::DuplicateCode {
                existing: StoryArcId::new(existing),
            });
        }

        let rows = sqlx::query(&format!("SELECT {ARC_COLUMNS} FROM story_arcs ORDER BY id"))
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| RepoError::database("story_arc_save_list", e))?;
        let all = rows.iter().map(row_to_arc).collect::<Result<Vec<_>, _>>()?;

        if let Err(e) = validate_arc_graph(&all) {
            tx.rollback()
                .await
                .map_err(|e| RepoError::database("story_arc_save_rollback", e))?;
            let reason = match e {
                DomainError::Configuration(msg) => msg,
                other => other.to_string(),
            };
            return Ok(ArcSaveOutcome::InvalidGraph(reason));
        }

        tx.commit()
            .await
            .map_err(|e| RepoError::database("story_arc_save_commit", e))?;
        Ok(ArcSaveOutcome::Saved)
    }

    async fn list_progress(&self, user_id: UserId) -> Result<Vec<StoryArcProgress>, RepoError> {
        let rows = sqlx::query(
            r#"
            SELECT user_id, arc_id, current_step, completed_steps, status, updated_at
            FROM story_arc_progress
            WHERE user_id = ?
            ORDER BY arc_id
            "#,
        )
        .bind(user_id.get())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepoError::database("story_arc_progress_list", e))?;

        rows.iter().map(row_to_progress).collect()
    }

    async fn save_progress(
        &self,
        progress: &StoryArcProgress,
        expected_completed: u32,
    ) -> Result<bool, RepoError> {
        let result = sqlx::query(
            r#"
            INSERT INTO story_arc_progress (user_id, arc_id, current_step, completed_steps, status, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id, arc_id) DO UPDATE SET
                current_step = excluded.current_step,
                completed_steps = excluded.completed_steps,
                status = excluded.status,
                updated_at = excluded.updated_at
            WHERE story_arc_progress.completed_steps = ?
            "#,
        )
        .bind(progress.user_id.get())
        .bind(progress.arc_id.get())
        .bind(i64::from(progress.current_step))
        .bind(i64::from(progress.completed_steps))
        .bind(progress.status.as_str())
        .bind(ts(progress.updated_at))
        .bind(i64::from(expected_completed))
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_fk_violation(&e) {
                RepoError::not_found("User", progress.user_id)
            } else {
                RepoError::database("story_arc_progress_save", e)
            }
        })?;

        Ok(result.rows_affected() > 0)
    }
}
