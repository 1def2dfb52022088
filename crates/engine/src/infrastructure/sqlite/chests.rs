//! SQLite-backed chest catalog, inventory and purchase settlement.

use async_trait::async_trait;
use labquest_domain::{
    Chest, ChestDrop, ChestId, ChestOpening, InventoryItem, LootDrop, Rarity, UserId,
};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use super::{is_fk_violation, parse_ts, to_u32, ts};
use crate::infrastructure::ports::{ChestRepo, RepoError, SettleOutcome};

pub struct SqliteChestRepo {
    pool: SqlitePool,
}

impl SqliteChestRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn row_to_chest(row: &SqliteRow) -> Result<Chest, RepoError> {
    let db = |e: sqlx::Error| RepoError::database("chest", e);
    let rarity: String = row.try_get("rarity").map_err(db)?;

    Ok(Chest {
        id: ChestId::new(row.try_get("id").map_err(db)?),
        name: row.try_get("name").map_err(db)?,
        rarity: rarity.parse::<Rarity>()?,
        price_coins: row.try_get("price_coins").map_err(db)?,
        min_drops: to_u32(row.try_get("min_drops").map_err(db)?, "min_drops")?,
        max_drops: to_u32(row.try_get("max_drops").map_err(db)?, "max_drops")?,
        active: row.try_get("active").map_err(db)?,
    })
}

fn row_to_drop(row: &SqliteRow) -> Result<ChestDrop, RepoError> {
    let db = |e: sqlx::Error| RepoError::database("chest_drop", e);
    let rarity: String = row.try_get("rarity").map_err(db)?;

    Ok(ChestDrop {
        item_key: row.try_get("item_key").map_err(db)?,
        item_name: row.try_get("item_name").map_err(db)?,
        rarity: rarity.parse::<Rarity>()?,
        weight: to_u32(row.try_get("weight").map_err(db)?, "weight")?,
        qty_min: to_u32(row.try_get("qty_min").map_err(db)?, "qty_min")?,
        qty_max: to_u32(row.try_get("qty_max").map_err(db)?, "qty_max")?,
        active: row.try_get("active").map_err(db)?,
    })
}

fn row_to_item(row: &SqliteRow) -> Result<InventoryItem, RepoError> {
    let db = |e: sqlx::Error| RepoError::database("inventory", e);
    let rarity: String = row.try_get("rarity").map_err(db)?;
    let acquired_at: String = row.try_get("acquired_at").map_err(db)?;

    Ok(InventoryItem {
        user_id: UserId::new(row.try_get("user_id").map_err(db)?),
        item_key: row.try_get("item_key").map_err(db)?,
        item_name: row.try_get("item_name").map_err(db)?,
        rarity: rarity.parse::<Rarity>()?,
        quantity: row.try_get("quantity").map_err(db)?,
        acquired_at: parse_ts(&acquired_at)?,
    })
}

#[async_trait]
impl ChestRepo for SqliteChestRepo {
    async fn save(&self, chest: &Chest, drops: &[ChestDrop]) -> Result<(), RepoError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepoError::database("chest_save_begin", e))?;

        sqlx::query(
            r#"
            INSERT INTO chests (id, name, rarity, price_coins, min_drops, max_drops, active)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                rarity = excluded.rarity,
                price_coins = excluded.price_coins,
                min_drops = excluded.min_drops,
                max_drops = excluded.max_drops,
                active = excluded.active
            "#,
        )
        .bind(chest.id.get())
        .bind(&chest.name)
        .bind(chest.rarity.as_str())
        .bind(chest.price_coins)
        .bind(i64::from(chest.min_drops))
        .bind(i64::from(chest.max_drops))
        .bind(chest.active)
        .execute(&mut *tx)
        .await
        .map_err(|e| RepoError::database("chest_save", e))?;

        sqlx::query("DELETE FROM chest_drops WHERE chest_id = ?")
            .bind(chest.id.get())
            .execute(&mut *tx)
            .await
            .map_err(|e| RepoError::database("chest_save_drops", e))?;

        for drop in drops {
            sqlx::query(
                r#"
                INSERT INTO chest_drops (chest_id, item_key, item_name, rarity, weight,
                                         qty_min, qty_max, active)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(chest.id.get())
            .bind(&drop.item_key)
            .bind(&drop.item_name)
            .bind(drop.rarity.as_str())
            .bind(i64::from(drop.weight))
            .bind(i64::from(drop.qty_min))
            .bind(i64::from(drop.qty_max))
            .bind(drop.active)
            .execute(&mut *tx)
            .await
            .map_err(|e| RepoError::database("chest_save_drops", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| RepoError::database("chest_save_commit", e))?;
        Ok(())
    }

    async fn get(&self, id: ChestId) -> Result<Option<Chest>, RepoError> {
        let row = sqlx::query(
            "SELECT id, name, rarity, price_coins, min_drops, max_drops, active FROM chests WHERE id = ?",
        )
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepoError::database("chest_get", e))?;

        row.as_ref().map(row_to_chest).transpose()
    }

    async fn list_drops(&self, chest_id: ChestId) -> Result<Vec<ChestDrop>, RepoError> {
        let rows = sqlx::query(
            r#"
            SELECT item_key, item_name, rarity, weight, qty_min, qty_max, active
            FROM chest_drops
            WHERE chest_id = ?
            ORDER BY rowid
            "#,
        )
        .bind(chest_id.get())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepoError::database("chest_drops", e))?;

        rows.iter().map(row_to_drop).collect()
    }

    async fn settle_open(
        &self,
        opening: &ChestOpening,
        drops: &[LootDrop],
    ) -> Result<SettleOutcome, RepoError> {
        let drops_json =
            serde_json::to_string(drops).map_err(|e| RepoError::serialization(e))?;
        let opened_at = ts(opening.opened_at);

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepoError::database("chest_open_begin", e))?;

        let remaining: Option<i64> = sqlx::query_scalar(
            "UPDATE users SET coins = coins - ?1 WHERE id = ?2 AND coins >= ?1 RETURNING coins",
        )
        .bind(opening.spent_coins)
        .bind(opening.user_id.get())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| RepoError::database("chest_open_debit", e))?;

        let Some(remaining_coins) = remaining else {
            tx.rollback()
                .await
                .map_err(|e| RepoError::database("chest_open_rollback", e))?;
            let available: Option<i64> = sqlx::query_scalar("SELECT coins FROM users WHERE id = ?")
                .bind(opening.user_id.get())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| RepoError::database("chest_open_balance", e))?;
            return match available {
                Some(available) => Ok(SettleOutcome::InsufficientFunds { available }),
                None => Err(RepoError::not_found("User", opening.user_id)),
            };
        };

        for drop in drops {
            sqlx::query(
                r#"
                INSERT INTO inventory (user_id, item_key, item_name, rarity, quantity, acquired_at)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(user_id, item_key) DO UPDATE SET
                    quantity = inventory.quantity + excluded.quantity,
                    item_name = excluded.item_name,
                    rarity = excluded.rarity,
                    acquired_at = excluded.acquired_at
                "#,
            )
            .bind(opening.user_id.get())
            .bind(&drop.item_key)
            .bind(&drop.item_name)
            .bind(drop.rarity.as_str())
            .bind(drop.quantity)
            .bind(&opened_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| RepoError::database("chest_open_inventory", e))?;
        }

        sqlx::query(
            r#"
            INSERT INTO chest_openings (user_id, chest_id, quantity, unit_price, spent_coins,
                                        drops_json, opened_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(opening.user_id.get())
        .bind(opening.chest_id.get())
        .bind(i64::from(opening.quantity))
        .bind(opening.unit_price)
        .bind(opening.spent_coins)
        .bind(drops_json)
        .bind(&opened_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_fk_violation(&e) {
                RepoError::not_found("Chest", opening.chest_id)
            } else {
                RepoError::database("chest_open_record", e)
            }
        })?;

        tx.commit()
            .await
            .map_err(|e| RepoError::database("chest_open_commit", e))?;

        Ok(SettleOutcome::Settled { remaining_coins })
    }

    async fn inventory(&self, user_id: UserId) -> Result<Vec<InventoryItem>, RepoError> {
        let rows = sqlx::query(
            r#"
            SELECT user_id, item_key, item_name, rarity, quantity, acquired_at
            FROM inventory
            WHERE user_id = ?
            ORDER BY item_key
            "#,
        )
        .bind(user_id.get())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepoError::database("inventory_list", e))?;

        rows.iter().map(row_to_item).collect()
    }
}
