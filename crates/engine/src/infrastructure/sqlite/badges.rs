//! SQLite-backed badge catalog and grants.

use async_trait::async_trait;
use labquest_domain::{Badge, BadgeCategory, BadgeCriteria, BadgeId, UserBadge, UserId};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use super::{is_fk_violation, parse_ts, ts};
use crate::infrastructure::ports::{BadgeRepo, RepoError};

pub struct SqliteBadgeRepo {
    pool: SqlitePool,
}

impl SqliteBadgeRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn row_to_badge(row: &SqliteRow) -> Result<Badge, RepoError> {
    let db = |e: sqlx::Error| RepoError::database("badge", e);
    let category: String = row.try_get("category").map_err(db)?;
    let criteria_json: String = row.try_get("criteria_json").map_err(db)?;
    let criteria: BadgeCriteria = serde_json::from_str(&criteria_json)
        .map_err(|e| RepoError::serialization(e))?;

    Ok(Badge {
        id: BadgeId::new(row.try_get("id").map_err(db)?),
        name: row.try_get("name").map_err(db)?,
        description: row.try_get("description").map_err(db)?,
        category: category.parse::<BadgeCategory>()?,
        criteria,
        active: row.try_get("active").map_err(db)?,
    })
}

fn row_to_user_badge(row: &SqliteRow) -> Result<UserBadge, RepoError> {
    let db = |e: sqlx::Error| RepoError::database("user_badge", e);
    let earned_at: String = row.try_get("earned_at").map_err(db)?;
    let earned_by: Option<i64> = row.try_get("earned_by").map_err(db)?;

    Ok(UserBadge {
        user_id: UserId::new(row.try_get("user_id").map_err(db)?),
        badge_id: BadgeId::new(row.try_get("badge_id").map_err(db)?),
        earned_at: parse_ts(&earned_at)?,
        earned_by: earned_by.map(UserId::new),
    })
}

#[async_trait]
impl BadgeRepo for SqliteBadgeRepo {
    async fn list(&self) -> Result<Vec<Badge>, RepoError> {
        let rows = sqlx::query(
            "SELECT id, name, description, category, criteria_json, active FROM badges ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepoError::database("badge_list", e))?;

        rows.iter().map(row_to_badge).collect()
    }

    async fn get(&self, id: BadgeId) -> Result<Option<Badge>, RepoError> {
        let row = sqlx::query(
            "SELECT id, name, description, category, criteria_json, active FROM badges WHERE id = ?",
        )
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepoError::database("badge_get", e))?;

        row.as_ref().map(row_to_badge).transpose()
    }

    async fn save(&self, badge: &Badge) -> Result<(), RepoError> {
        let criteria_json = serde_json::to_string(&badge.criteria)
            .map_err(|e| RepoError::serialization(e))?;

        sqlx::query(
            r#"
            INSERT INTO badges (id, name, description, category, criteria_json, active)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                category = excluded.category,
                criteria_json = excluded.criteria_json,
                active = excluded.active
            "#,
        )
        .bind(badge.id.get())
        .bind(&badge.name)
        .bind(&badge.description)
        .bind(badge.category.as_str())
        .bind(criteria_json)
        .bind(badge.active)
        .execute(&self.pool)
        .await
        .map_err(|e| RepoError::database("badge_save", e))?;

        Ok(())
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<UserBadge>, RepoError> {
        let rows = sqlx::query(
            r#"
            SELECT user_id, badge_id, earned_at, earned_by
            FROM user_badges
            WHERE user_id = ?
            ORDER BY earned_at, badge_id
            "#,
        )
        .bind(user_id.get())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepoError::database("user_badge_list", e))?;

        rows.iter().map(row_to_user_badge).collect()
    }

    async fn grant(&self, grant: &UserBadge) -> Result<bool, RepoError> {
        let result = sqlx::query(
            r#"
            INSERT INTO user_badges (user_id, badge_id, earned_at, earned_by)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(user_id, badge_id) DO NOTHING
            "#,
        )
        .bind(grant.user_id.get())
        .bind(grant.badge_id.get())
        .bind(ts(grant.earned_at))
        .bind(grant.earned_by.map(|u| u.get()))
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_fk_violation(&e) {
                RepoError::not_found("User or Badge", format!("{}/{}", grant.user_id, grant.badge_id))
            } else {
                RepoError::database("badge_grant", e)
            }
        })?;

        Ok(result.rows_affected() > 0)
    }

    async fn holder_count(&self, badge_id: BadgeId) -> Result<u64, RepoError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM user_badges WHERE badge_id = ?")
            .bind(badge_id.get())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| RepoError::database("badge_holders", e))?;

        Ok(u64::try_from(count).unwrap_or(0))
    }
}
