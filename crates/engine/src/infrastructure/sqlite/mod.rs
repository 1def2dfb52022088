//! SQLite store for the award ledger and reward state.
//!
//! One database holds everything. Atomic operations run as short sqlx
//! transactions whose first statement is a write, so the write lock is taken
//! up front and WAL readers never block them.

mod awards;
mod badges;
mod chests;
mod quests;
mod story_arcs;
mod users;

#[cfg(test)]
mod integration_tests;

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use labquest_domain::common::{format_timestamp, parse_datetime};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;

use crate::infrastructure::ports::{ClockPort, RepoError};

pub use awards::SqliteAwardRepo;
pub use badges::SqliteBadgeRepo;
pub use chests::SqliteChestRepo;
pub use quests::SqliteQuestRepo;
pub use story_arcs::SqliteStoryArcRepo;
pub use users::SqliteUserRepo;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY,
        display_name TEXT NOT NULL,
        role TEXT NOT NULL,
        archetype TEXT,
        points INTEGER NOT NULL DEFAULT 0 CHECK (points >= 0),
        coins INTEGER NOT NULL DEFAULT 0 CHECK (coins >= 0),
        trophies INTEGER NOT NULL DEFAULT 0 CHECK (trophies >= 0),
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS award_ledger (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL REFERENCES users(id),
        source_type TEXT NOT NULL,
        source_id INTEGER NOT NULL,
        points_awarded INTEGER NOT NULL,
        xp_awarded INTEGER NOT NULL,
        project_id INTEGER,
        duration_seconds INTEGER NOT NULL DEFAULT 0,
        occurred_at TEXT NOT NULL,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS idx_award_ledger_key
        ON award_ledger (user_id, source_type, source_id)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS badges (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        category TEXT NOT NULL,
        criteria_json TEXT NOT NULL,
        active INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS user_badges (
        user_id INTEGER NOT NULL REFERENCES users(id),
        badge_id INTEGER NOT NULL REFERENCES badges(id),
        earned_at TEXT NOT NULL,
        earned_by INTEGER,
        PRIMARY KEY (user_id, badge_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS quests (
        id INTEGER PRIMARY KEY,
        code TEXT NOT NULL UNIQUE,
        title TEXT NOT NULL,
        quest_type TEXT NOT NULL,
        scope TEXT NOT NULL,
        project_id INTEGER,
        min_level INTEGER NOT NULL DEFAULT 0,
        metric TEXT NOT NULL,
        target REAL NOT NULL,
        reward_xp INTEGER NOT NULL DEFAULT 0,
        reward_coins INTEGER NOT NULL DEFAULT 0,
        reward_trophies INTEGER NOT NULL DEFAULT 0,
        active INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS quest_progress (
        user_id INTEGER NOT NULL REFERENCES users(id),
        quest_id INTEGER NOT NULL REFERENCES quests(id),
        progress_value REAL NOT NULL,
        target_value REAL NOT NULL,
        status TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        completed_at TEXT,
        claimed_at TEXT,
        PRIMARY KEY (user_id, quest_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS chests (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        rarity TEXT NOT NULL,
        price_coins INTEGER NOT NULL,
        min_drops INTEGER NOT NULL,
        max_drops INTEGER NOT NULL,
        active INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS chest_drops (
        chest_id INTEGER NOT NULL REFERENCES chests(id) ON DELETE CASCADE,
        item_key TEXT NOT NULL,
        item_name TEXT NOT NULL,
        rarity TEXT NOT NULL,
        weight INTEGER NOT NULL,
        qty_min INTEGER NOT NULL,
        qty_max INTEGER NOT NULL,
        active INTEGER NOT NULL,
        PRIMARY KEY (chest_id, item_key)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS inventory (
        user_id INTEGER NOT NULL REFERENCES users(id),
        item_key TEXT NOT NULL,
        item_name TEXT NOT NULL,
        rarity TEXT NOT NULL,
        quantity INTEGER NOT NULL,
        acquired_at TEXT NOT NULL,
        PRIMARY KEY (user_id, item_key)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS chest_openings (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL REFERENCES users(id),
        chest_id INTEGER NOT NULL REFERENCES chests(id),
        quantity INTEGER NOT NULL,
        unit_price INTEGER NOT NULL,
        spent_coins INTEGER NOT NULL,
        drops_json TEXT NOT NULL,
        opened_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS story_arcs (
        id INTEGER PRIMARY KEY,
        code TEXT NOT NULL UNIQUE,
        title TEXT NOT NULL,
        chapter INTEGER NOT NULL DEFAULT 0,
        active INTEGER NOT NULL,
        starts_at TEXT,
        ends_at TEXT,
        metadata_json TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS story_arc_progress (
        user_id INTEGER NOT NULL REFERENCES users(id),
        arc_id INTEGER NOT NULL REFERENCES story_arcs(id),
        current_step INTEGER NOT NULL,
        completed_steps INTEGER NOT NULL,
        status TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        PRIMARY KEY (user_id, arc_id)
    )
    "#,
];

/// Open (creating if needed) the database file and apply the schema.
pub async fn connect(database_path: &str, max_connections: u32) -> Result<SqlitePool, RepoError> {
    if let Some(parent) = Path::new(database_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| RepoError::database("connect", e))?;
        }
    }

    let options = SqliteConnectOptions::new()
        .filename(database_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5))
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .connect_with(options)
        .await
        .map_err(|e| RepoError::database("connect", e))?;

    ensure_schema(&pool).await?;
    Ok(pool)
}

/// Single-connection in-memory database. The connection is never recycled,
/// since closing it would drop the data.
pub async fn connect_in_memory() -> Result<SqlitePool, RepoError> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .map_err(|e| RepoError::database("connect", e))?
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .map_err(|e| RepoError::database("connect", e))?;

    ensure_schema(&pool).await?;
    Ok(pool)
}

pub async fn ensure_schema(pool: &SqlitePool) -> Result<(), RepoError> {
    for statement in SCHEMA {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(|e| RepoError::database("ensure_schema", e))?;
    }
    Ok(())
}

/// All SQLite repositories sharing one pool.
#[derive(Clone)]
pub struct SqliteRepositories {
    pub users: Arc<SqliteUserRepo>,
    pub awards: Arc<SqliteAwardRepo>,
    pub badges: Arc<SqliteBadgeRepo>,
    pub quests: Arc<SqliteQuestRepo>,
    pub chests: Arc<SqliteChestRepo>,
    pub story_arcs: Arc<SqliteStoryArcRepo>,
}

impl SqliteRepositories {
    pub fn new(pool: SqlitePool, clock: Arc<dyn ClockPort>) -> Self {
        Self {
            users: Arc::new(SqliteUserRepo::new(pool.clone(), clock.clone())),
            awards: Arc::new(SqliteAwardRepo::new(pool.clone(), clock.clone())),
            badges: Arc::new(SqliteBadgeRepo::new(pool.clone())),
            quests: Arc::new(SqliteQuestRepo::new(pool.clone())),
            chests: Arc::new(SqliteChestRepo::new(pool.clone())),
            story_arcs: Arc::new(SqliteStoryArcRepo::new(pool)),
        }
    }
}

// =============================================================================
// Row helpers
// =============================================================================

pub(crate) fn ts(dt: DateTime<Utc>) -> String {
    format_timestamp(dt)
}

pub(crate) fn parse_ts(raw: &str) -> Result<DateTime<Utc>, RepoError> {
    parse_datetime(raw).map_err(|e| RepoError::serialization(format!("bad timestamp {raw}: {e}")))
}

pub(crate) fn parse_opt_ts(raw: Option<String>) -> Result<Option<DateTime<Utc>>, RepoError> {
    raw.as_deref().map(parse_ts).transpose()
}

pub(crate) fn to_u32(value: i64, field: &'static str) -> Result<u32, RepoError> {
    u32::try_from(value).map_err(|_| RepoError::serialization(format!("{field} out of range: {value}")))
}

/// Foreign key failures mean the referenced user/badge/quest does not exist.
pub(crate) fn is_fk_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .is_some_and(|db| db.is_foreign_key_violation())
}

pub(crate) fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .is_some_and(|db| db.is_unique_violation())
}
