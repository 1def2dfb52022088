//! Port traits for infrastructure boundaries.
//!
//! These are the ONLY abstractions in the engine. Everything else is concrete types.
//! Ports exist for:
//! - Database access (the SQLite store could be swapped for another SQL backend)
//! - Clock/Random (for testing)

mod error;
mod repos;
mod testing;
pub mod types;

// =============================================================================
// Repository Ports
// =============================================================================
pub use repos::{AwardRepo, BadgeRepo, ChestRepo, QuestRepo, StoryArcRepo, UserRepo};

pub use types::{ArcSaveOutcome, AwardOutcome, ClaimOutcome, ProgressUpdate, SettleOutcome};

// =============================================================================
// Test-Only Mock Repositories (only available during test builds)
// =============================================================================
#[cfg(test)]
pub use repos::{
    MockAwardRepo, MockBadgeRepo, MockChestRepo, MockQuestRepo, MockStoryArcRepo, MockUserRepo,
};

#[cfg(test)]
pub use testing::{MockClockPort, MockRandomPort};

// =============================================================================
// Testing Ports
// =============================================================================
pub use testing::{ClockPort, RandomPort};

// =============================================================================
// Error Types
// =============================================================================
pub use error::RepoError;
