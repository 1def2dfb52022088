//! LabQuest Engine library.
//!
//! Server-side half of the rewards engine.
//!
//! ## Structure
//!
//! - `use_cases/` - Award, badge, quest, chest and story arc orchestration
//! - `infrastructure/` - Ports plus the SQLite, clock and config adapters
//! - `api/` - HTTP entry points
//! - `app` - Application composition

pub mod api;
pub mod app;
pub mod infrastructure;
pub mod use_cases;

/// E2E integration tests over an in-memory SQLite store.
#[cfg(test)]
mod e2e_tests;

pub use app::App;
