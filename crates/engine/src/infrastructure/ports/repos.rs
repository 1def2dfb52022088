//! Repository port traits for database access.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use labquest_domain::*;

use super::error::RepoError;
use super::types::{ArcSaveOutcome, AwardOutcome, ClaimOutcome, ProgressUpdate, SettleOutcome};

// =============================================================================
// Users
// =============================================================================

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserRepo: Send + Sync {
    /// Insert or refresh identity fields. Balances are only taken from
    /// `profile` when the row is first created.
    async fn upsert(&self, profile: &UserProfile) -> Result<UserProfile, RepoError>;
    async fn get(&self, id: UserId) -> Result<Option<UserProfile>, RepoError>;
    async fn list_ids(&self) -> Result<Vec<UserId>, RepoError>;
}

// =============================================================================
// Award Ledger
// =============================================================================

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AwardRepo: Send + Sync {
    /// Record the award, credit points and feed `events` into the matching
    /// `quests` in one transaction, or do nothing if the idempotency key
    /// already exists.
    async fn award_once(
        &self,
        award: &NewAward,
        quests: &[Quest],
        events: &[QuestEvent],
    ) -> Result<AwardOutcome, RepoError>;
    async fn has_award(
        &self,
        user_id: UserId,
        source_type: AwardSourceType,
        source_id: i64,
    ) -> Result<bool, RepoError>;
    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<AwardRecord>, RepoError>;
}

// =============================================================================
// Badges
// =============================================================================

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BadgeRepo: Send + Sync {
    async fn list(&self) -> Result<Vec<Badge>, RepoError>;
    async fn get(&self, id: BadgeId) -> Result<Option<Badge>, RepoError>;
    async fn save(&self, badge: &Badge) -> Result<(), RepoError>;
    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<UserBadge>, RepoError>;
    /// Returns `false` when the user already held the badge.
    async fn grant(&self, grant: &UserBadge) -> Result<bool, RepoError>;
    async fn holder_count(&self, badge_id: BadgeId) -> Result<u64, RepoError>;
}

// =============================================================================
// Quests
// =============================================================================

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QuestRepo: Send + Sync {
    async fn save(&self, quest: &Quest) -> Result<(), RepoError>;
    async fn get(&self, id: QuestId) -> Result<Option<Quest>, RepoError>;
    async fn list_active(&self) -> Result<Vec<Quest>, RepoError>;
    async fn list_progress(&self, user_id: UserId) -> Result<Vec<QuestProgress>, RepoError>;
    /// Atomically raise the counter to `observed` if higher.
    async fn observe(
        &self,
        user_id: UserId,
        quest: &Quest,
        observed: f64,
        now: DateTime<Utc>,
    ) -> Result<ProgressUpdate, RepoError>;
    /// COMPLETED -> CLAIMED plus reward payout and ledger row, in one transaction.
    async fn claim(
        &self,
        user_id: UserId,
        quest: &Quest,
        now: DateTime<Utc>,
    ) -> Result<ClaimOutcome, RepoError>;
}

// =============================================================================
// Chests
// =============================================================================

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChestRepo: Send + Sync {
    /// Replace the chest and its whole drop table.
    async fn save(&self, chest: &Chest, drops: &[ChestDrop]) -> Result<(), RepoError>;
    async fn get(&self, id: ChestId) -> Result<Option<Chest>, RepoError>;
    async fn list_drops(&self, chest_id: ChestId) -> Result<Vec<ChestDrop>, RepoError>;
    /// Conditional coin debit, inventory accumulation and opening record in
    /// one transaction.
    async fn settle_open(
        &self,
        opening: &ChestOpening,
        drops: &[LootDrop],
    ) -> Result<SettleOutcome, RepoError>;
    async fn inventory(&self, user_id: UserId) -> Result<Vec<InventoryItem>, RepoError>;
}

// =============================================================================
// Story Arcs
// =============================================================================

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StoryArcRepo: Send + Sync {
    async fn list(&self) -> Result<Vec<StoryArc>, RepoError>;
    /// Upsert the arc and check the dependency graph and code uniqueness in
    /// the same transaction, so two concurrent saves cannot build a cycle.
    async fn save(&self, arc: &StoryArc) -> Result<ArcSaveOutcome, RepoError>;
    async fn list_progress(&self, user_id: UserId) -> Result<Vec<StoryArcProgress>, RepoError>;
    /// Write `progress` only if the stored step count still equals
    /// `expected_completed`. Returns `false` on a concurrent change.
    async fn save_progress(
        &self,
        progress: &StoryArcProgress,
        expected_completed: u32,
    ) -> Result<bool, RepoError>;
}
