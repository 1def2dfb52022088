//! Weighted loot resolution.
//!
//! The table is rebuilt from the chest's current drops on every open, so
//! admin edits take effect immediately. Randomness is injected as a
//! `FnMut(min, max) -> value` returning an inclusive uniform integer.

use crate::entities::{Chest, ChestDrop, LootDrop};
use crate::error::DomainError;

/// Cumulative-weight table over the active, positive-weight drops of a chest.
#[derive(Debug)]
pub struct LootTable<'a> {
    entries: Vec<&'a ChestDrop>,
    cumulative: Vec<u64>,
}

impl<'a> LootTable<'a> {
    pub fn build(chest: &Chest, drops: &'a [ChestDrop]) -> Result<Self, DomainError> {
        let mut entries = Vec::new();
        let mut cumulative = Vec::new();
        let mut running = 0u64;

        for drop in drops.iter().filter(|d| d.active && d.weight > 0) {
            running += u64::from(drop.weight);
            entries.push(drop);
            cumulative.push(running);
        }

        if entries.is_empty() {
            return Err(DomainError::configuration(format!(
                "chest {} has no active drops with positive weight",
                chest.id
            )));
        }
        Ok(Self {
            entries,
            cumulative,
        })
    }

    pub fn total_weight(&self) -> u64 {
        self.cumulative.last().copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop for a roll in `[0, total_weight)`. Out-of-range rolls clamp to the
    /// last entry.
    pub fn pick(&self, roll: u64) -> &'a ChestDrop {
        let idx = self
            .cumulative
            .partition_point(|&upper| upper <= roll)
            .min(self.entries.len() - 1);
        self.entries[idx]
    }

    fn sample<R>(&self, rng: &mut R) -> &'a ChestDrop
    where
        R: FnMut(i64, i64) -> i64,
    {
        let max = i64::try_from(self.total_weight()).unwrap_or(i64::MAX) - 1;
        let roll = rng(0, max).clamp(0, max);
        self.pick(roll as u64)
    }
}

/// Roll `openings` chest openings. Each opening draws a uniform drop count in
/// `[min_drops, max_drops]`, then that many weighted samples with replacement,
/// each with a uniform quantity in `[qty_min, qty_max]`.
pub fn roll_openings<R>(
    chest: &Chest,
    drops: &[ChestDrop],
    openings: u32,
    rng: &mut R,
) -> Result<Vec<LootDrop>, DomainError>
where
    R: FnMut(i64, i64) -> i64,
{
    let table = LootTable::build(chest, drops)?;
    let min_drops = i64::from(chest.min_drops.min(chest.max_drops));
    let max_drops = i64::from(chest.max_drops.max(chest.min_drops));

    let mut rolled = Vec::new();
    for _ in 0..openings {
        let count = rng(min_drops, max_drops).clamp(min_drops, max_drops);
        for _ in 0..count {
            let drop = table.sample(rng);
            let qty_min = i64::from(drop.qty_min.max(1));
            let qty_max = i64::from(drop.qty_max).max(qty_min);
            rolled.push(LootDrop {
                item_key: drop.item_key.clone(),
                item_name: drop.item_name.clone(),
                rarity: drop.rarity,
                quantity: rng(qty_min, qty_max).clamp(qty_min, qty_max),
            });
        }
    }
    Ok(rolled)
}

/// Sum quantities per item key, keeping first-seen order.
pub fn merge_drops(drops: Vec<LootDrop>) -> Vec<LootDrop> {
    let mut merged: Vec<LootDrop> = Vec::with_capacity(drops.len());
    for drop in drops {
        match merged.iter_mut().find(|m| m.item_key == drop.item_key) {
            Some(existing) => existing.quantity += drop.quantity,
            None => merged.push(drop),
        }
    }
    merged
}
