//! Backend E2E integration tests.
//!
//! These tests drive the fully wired `App` over a real in-memory SQLite store
//! with a fixed clock and seeded randomness:
//! - Activity awards feeding quests and badges
//! - Quest claims and chest purchases against live balances
//! - Story arc gating as progression changes
//! - The HTTP surface end to end
//!
//! ```bash
//! cargo test -p labquest-engine --lib e2e_tests
//! ```

mod e2e_helpers;
mod reward_flow_tests;
mod story_arc_flow_tests;

pub use e2e_helpers::*;
