//! Chests, their drop tables and the inventory they fill.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::{ChestId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Rarity {
    Common,
    Uncommon,
    Rare,
    Epic,
    Legendary,
}

impl Rarity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Common => "COMMON",
            Self::Uncommon => "UNCOMMON",
            Self::Rare => "RARE",
            Self::Epic => "EPIC",
            Self::Legendary => "LEGENDARY",
        }
    }
}

impl fmt::Display for Rarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Rarity {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "COMMON" => Ok(Self::Common),
            "UNCOMMON" => Ok(Self::Uncommon),
            "RARE" => Ok(Self::Rare),
            "EPIC" => Ok(Self::Epic),
            "LEGENDARY" => Ok(Self::Legendary),
            other => Err(DomainError::validation(format!("Unknown rarity: {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chest {
    pub id: ChestId,
    pub name: String,
    pub rarity: Rarity,
    pub price_coins: i64,
    pub min_drops: u32,
    pub max_drops: u32,
    pub active: bool,
}

/// One entry of a chest's drop table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChestDrop {
    pub item_key: String,
    pub item_name: String,
    pub rarity: Rarity,
    pub weight: u32,
    pub qty_min: u32,
    pub qty_max: u32,
    pub active: bool,
}

impl Chest {
    /// Range checks for an admin write of a chest and its drop table.
    pub fn validate_with_drops(&self, drops: &[ChestDrop]) -> Result<(), DomainError> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("chest name cannot be empty"));
        }
        if !(0..=MAX_CHEST_PRICE).contains(&self.price_coins) {
            return Err(DomainError::validation(format!(
                "chest price must be between 0 and {MAX_CHEST_PRICE} coins"
            )));
        }
        if self.min_drops > self.max_drops {
            return Err(DomainError::validation(format!(
                "minDrops ({}) exceeds maxDrops ({})",
                self.min_drops, self.max_drops
            )));
        }
        for drop in drops {
            if drop.item_key.trim().is_empty() {
                return Err(DomainError::validation("drop itemKey cannot be empty"));
            }
            if drop.qty_min < 1 || drop.qty_min > drop.qty_max {
                return Err(DomainError::validation(format!(
                    "drop {} needs 1 <= qtyMin <= qtyMax",
                    drop.item_key
                )));
            }
            if drop.active && drop.weight < 1 {
                return Err(DomainError::validation(format!(
                    "active drop {} needs a positive weight",
                    drop.item_key
                )));
            }
        }
        Ok(())
    }
}

/// Upper bound for a configured chest price.
pub const MAX_CHEST_PRICE: i64 = 1_000_000_000;

/// Price after an archetype discount. Rounds down in the user's favor.
///
/// Computed in `i128`; the result never exceeds `price_coins`.
pub fn discounted_unit_price(price_coins: i64, discount_pct: u8) -> i64 {
    let pct = i128::from(discount_pct.min(100));
    let discounted = i128::from(price_coins.max(0)) * (100 - pct) / 100;
    i64::try_from(discounted).unwrap_or(i64::MAX)
}

/// An item produced by one roll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LootDrop {
    pub item_key: String,
    pub item_name: String,
    pub rarity: Rarity,
    pub quantity: i64,
}

/// Accumulated holdings of one item key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryItem {
    pub user_id: UserId,
    pub item_key: String,
    pub item_name: String,
    pub rarity: Rarity,
    pub quantity: i64,
    pub acquired_at: DateTime<Utc>,
}

/// Purchase record written with the coin debit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChestOpening {
    pub user_id: UserId,
    pub chest_id: ChestId,
    pub quantity: u32,
    pub unit_price: i64,
    pub spent_coins: i64,
    pub opened_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenChestResult {
    pub spent_coins: i64,
    pub discounted_unit_price: i64,
    pub drops: Vec<LootDrop>,
    pub remaining_coins: i64,
}
