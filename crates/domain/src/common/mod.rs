//! Common utility functions shared across the domain and the engine adapters.
//!
//! # Design Principles
//!
//! - **Pure functions only** - no side effects, no I/O
//! - **Minimal dependencies** - only chrono for datetime utilities

pub mod datetime;

// Re-export commonly used functions at crate root for convenience
pub use datetime::{ceil_days_late, format_timestamp, iso_week_key, parse_datetime};
