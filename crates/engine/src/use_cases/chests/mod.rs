//! Chest purchases and loot resolution.

use std::sync::Arc;

use labquest_domain::{
    discounted_unit_price, merge_drops, roll_openings, Chest, ChestDrop, ChestId, ChestOpening,
    GamificationEvent, InventoryItem, OpenChestResult, UserId,
};
use serde::Serialize;

use super::error::EngineError;
use crate::infrastructure::ports::{ChestRepo, ClockPort, RandomPort, SettleOutcome, UserRepo};

/// Result of an open-chest command.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenedChest {
    #[serde(flatten)]
    pub result: OpenChestResult,
    pub events: Vec<GamificationEvent>,
}

pub struct ChestLoot {
    users: Arc<dyn UserRepo>,
    chests: Arc<dyn ChestRepo>,
    random: Arc<dyn RandomPort>,
    clock: Arc<dyn ClockPort>,
}

impl ChestLoot {
    pub fn new(
        users: Arc<dyn UserRepo>,
        chests: Arc<dyn ChestRepo>,
        random: Arc<dyn RandomPort>,
        clock: Arc<dyn ClockPort>,
    ) -> Self {
        Self {
            users,
            chests,
            random,
            clock,
        }
    }

    /// Create or replace a chest together with its drop table.
    pub async fn save(&self, chest: &Chest, drops: &[ChestDrop]) -> Result<(), EngineError> {
        chest.validate_with_drops(drops)?;
        self.chests.save(chest, drops).await?;
        tracing::info!(
            chest_id = %chest.id,
            drops = drops.len(),
            "Chest saved"
        );
        Ok(())
    }

    /// Buy and open `quantity` chests.
    ///
    /// Drops are rolled before the purchase is settled; if the conditional
    /// debit fails nothing is written and the rolls are discarded.
    pub async fn open(
        &self,
        user_id: UserId,
        chest_id: ChestId,
        quantity: u32,
    ) -> Result<OpenedChest, EngineError> {
        if quantity < 1 {
            return Err(EngineError::validation("quantity must be at least 1"));
        }
        let chest = self
            .chests
            .get(chest_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Chest", chest_id))?;
        if !chest.active {
            return Err(EngineError::invalid_state(format!(
                "chest {} is not available",
                chest.name
            )));
        }
        let user = self
            .users
            .get(user_id)
            .await?
            .ok_or_else(|| EngineError::not_found("User", user_id))?;

        let unit_price = discounted_unit_price(chest.price_coins, user.chest_discount_pct());
        let spent_coins = unit_price
            .checked_mul(i64::from(quantity))
            .ok_or_else(|| EngineError::validation("purchase total overflows"))?;
        if user.coins < spent_coins {
            return Err(EngineError::InsufficientFunds {
                required: spent_coins,
                available: user.coins,
            });
        }

        let drop_table = self.chests.list_drops(chest_id).await?;
        let mut rng = |min: i64, max: i64| self.random.gen_range(min, max);
        let drops = merge_drops(roll_openings(&chest, &drop_table, quantity, &mut rng)?);

        let opening = ChestOpening {
            user_id,
            chest_id,
            quantity,
            unit_price,
            spent_coins,
            opened_at: self.clock.now(),
        };
        let remaining_coins = match self.chests.settle_open(&opening, &drops).await? {
            SettleOutcome::Settled { remaining_coins } => remaining_coins,
            SettleOutcome::InsufficientFunds { available } => {
                tracing::debug!(
                    user_id = %user_id,
                    chest_id = %chest_id,
                    required = spent_coins,
                    available,
                    "Chest debit lost to a concurrent spend"
                );
                return Err(EngineError::InsufficientFunds {
                    required: spent_coins,
                    available,
                });
            }
        };

        tracing::info!(
            user_id = %user_id,
            chest_id = %chest_id,
            quantity,
            spent_coins,
            items = drops.len(),
            "Chest opened"
        );

        Ok(OpenedChest {
            result: OpenChestResult {
                spent_coins,
                discounted_unit_price: unit_price,
                drops,
                remaining_coins,
            },
            events: vec![GamificationEvent::ChestOpened {
                user_id,
                chest_id,
                quantity,
                spent_coins,
            }],
        })
    }

    pub async fn inventory(&self, user_id: UserId) -> Result<Vec<InventoryItem>, EngineError> {
        if self.users.get(user_id).await?.is_none() {
            return Err(EngineError::not_found("User", user_id));
        }
        Ok(self.chests.inventory(user_id).await?)
    }
}
