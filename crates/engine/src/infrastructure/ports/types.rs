//! Result types returned by repository ports.
//!
//! Each atomic store operation reports which branch it took so use cases can
//! map the outcome to a result or an error without a second read.

use labquest_domain::{AwardRecord, QuestId, QuestProgress, QuestStatus, StoryArcId, UserProfile};

/// Outcome of an idempotent ledger write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AwardOutcome {
    /// Fresh award; points and quest counters were written in the same
    /// transaction.
    Recorded {
        record: AwardRecord,
        points_before: i64,
        points_after: i64,
        /// Quests this award moved from IN_PROGRESS to COMPLETED.
        completed_quests: Vec<QuestId>,
    },
    /// The (user, source type, source id) key already existed. Nothing changed.
    AlreadyAwarded,
}

/// Result of a write to a quest counter.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    pub progress: QuestProgress,
    /// This write moved the quest from IN_PROGRESS to COMPLETED.
    pub newly_completed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClaimOutcome {
    /// Status moved COMPLETED -> CLAIMED and rewards were paid.
    Claimed {
        progress: QuestProgress,
        user: UserProfile,
    },
    /// Current status was not COMPLETED. `None` means no progress row exists.
    NotClaimable { status: Option<QuestStatus> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleOutcome {
    /// Coins debited and drops added to inventory.
    Settled { remaining_coins: i64 },
    /// The conditional debit matched no row; nothing was written.
    InsufficientFunds { available: i64 },
}

/// Outcome of saving a story arc against the catalog as stored at write time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArcSaveOutcome {
    Saved,
    /// The arc set including this write has a cycle or an unknown
    /// dependency. Nothing was written.
    InvalidGraph(String),
    /// Another arc already uses this code. Nothing was written.
    DuplicateCode { existing: StoryArcId },
}
