//! SQLite-backed user mirror.

use std::sync::Arc;

use async_trait::async_trait;
use labquest_domain::{Archetype, UserId, UserProfile, UserRole};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use super::ts;
use crate::infrastructure::ports::{ClockPort, RepoError, UserRepo};

pub struct SqliteUserRepo {
    pool: SqlitePool,
    clock: Arc<dyn ClockPort>,
}

impl SqliteUserRepo {
    pub fn new(pool: SqlitePool, clock: Arc<dyn ClockPort>) -> Self {
        Self { pool, clock }
    }
}

pub(super) fn row_to_user(row: &SqliteRow) -> Result<UserProfile, RepoError> {
    let db = |e: sqlx::Error| RepoError::database("user", e);
    let role: String = row.try_get("role").map_err(db)?;
    let archetype: Option<String> = row.try_get("archetype").map_err(db)?;

    Ok(UserProfile {
        id: UserId::new(row.try_get("id").map_err(db)?),
        display_name: row.try_get("display_name").map_err(db)?,
        role: role.parse::<UserRole>()?,
        archetype: archetype.as_deref().map(str::parse::<Archetype>).transpose()?,
        points: row.try_get("points").map_err(db)?,
        coins: row.try_get("coins").map_err(db)?,
        trophies: row.try_get("trophies").map_err(db)?,
    })
}

pub(super) const USER_COLUMNS: &str =
    "id, display_name, role, archetype, points, coins, trophies";

#[async_trait]
impl UserRepo for SqliteUserRepo {
    async fn upsert(&self, profile: &UserProfile) -> Result<UserProfile, RepoError> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO users (id, display_name, role, archetype, points, coins, trophies, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                display_name = excluded.display_name,
                role = excluded.role,
                archetype = excluded.archetype,
                updated_at = excluded.updated_at
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(profile.id.get())
        .bind(&profile.display_name)
        .bind(profile.role.as_str())
        .bind(profile.archetype.map(|a| a.as_str()))
        .bind(profile.points.max(0))
        .bind(profile.coins.max(0))
        .bind(profile.trophies.max(0))
        .bind(ts(self.clock.now()))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RepoError::database("user_upsert", e))?;

        row_to_user(&row)
    }

    async fn get(&self, id: UserId) -> Result<Option<UserProfile>, RepoError> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepoError::database("user_get", e))?;

        row.as_ref().map(row_to_user).transpose()
    }

    async fn list_ids(&self) -> Result<Vec<UserId>, RepoError> {
        let ids: Vec<i64> = sqlx::query_scalar("SELECT id FROM users ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RepoError::database("user_list", e))?;

        Ok(ids.into_iter().map(UserId::new).collect())
    }
}
