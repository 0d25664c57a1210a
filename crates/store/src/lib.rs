//! Durable store adapter.
//!
//! Typed async operations over SQLite (sqlx) for the tables the
//! orchestrator depends on: user_profiles, properties, portfolio_items,
//! analyses, room_features, conversations, messages, action_log.
//!
//! Every user-scoped statement filters on `user_id`; callers never see
//! another user's rows. The schema is an embedded migration run at pool
//! creation, so a fresh database file is immediately usable.

pub mod records;

mod actions;
mod analyses;
mod conversations;
mod portfolio;
mod profiles;
mod properties;

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Sqlite};

use rv_domain::{Error, Result};

pub use analyses::{AnalysisPersistRequest, PersistedAnalysis};
pub use records::*;

/// Map a sqlx failure into the shared error taxonomy.
pub(crate) fn db_err(e: sqlx::Error) -> Error {
    Error::Store(e.to_string())
}

const MIGRATION: &str = r#"
CREATE TABLE IF NOT EXISTS user_profiles (
    id                   TEXT PRIMARY KEY,
    display_name         TEXT,
    region               TEXT,
    fiscal               TEXT NOT NULL DEFAULT '{}',
    budget               TEXT NOT NULL DEFAULT '{}',
    renovation           TEXT NOT NULL DEFAULT '{}',
    preferences          TEXT NOT NULL DEFAULT '{}',
    goals                TEXT NOT NULL DEFAULT '{}',
    fiscal_summary       TEXT,
    budget_summary       TEXT,
    renovation_summary   TEXT,
    preferences_summary  TEXT,
    goals_summary        TEXT,
    profile_summary      TEXT,
    sections_completed   TEXT NOT NULL DEFAULT '[]',
    created_at           TEXT NOT NULL,
    updated_at           TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS properties (
    id            TEXT PRIMARY KEY,
    external_id   TEXT UNIQUE,
    url           TEXT NOT NULL,
    title         TEXT,
    price         INTEGER,
    area_m2       REAL,
    num_rooms     INTEGER,
    num_bathrooms INTEGER,
    location      TEXT,
    description   TEXT,
    image_urls    TEXT NOT NULL DEFAULT '[]',
    price_per_m2  REAL,
    raw_data      TEXT NOT NULL DEFAULT '{}',
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS portfolio_items (
    id            TEXT PRIMARY KEY,
    user_id       TEXT NOT NULL,
    property_id   TEXT NOT NULL,
    nickname      TEXT,
    index_summary TEXT,
    status        TEXT NOT NULL DEFAULT 'saved',
    is_active     INTEGER NOT NULL DEFAULT 0,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL,
    UNIQUE (user_id, property_id)
);
CREATE INDEX IF NOT EXISTS idx_portfolio_user ON portfolio_items(user_id);

CREATE TABLE IF NOT EXISTS analyses (
    id                   TEXT PRIMARY KEY,
    user_id              TEXT NOT NULL,
    property_id          TEXT NOT NULL,
    portfolio_item_id    TEXT,
    analysis_type        TEXT NOT NULL DEFAULT 'renovation',
    result_data          TEXT NOT NULL DEFAULT '{}',
    chat_summary         TEXT,
    detail_summary       TEXT,
    status               TEXT NOT NULL DEFAULT 'completed',
    preferences_snapshot TEXT NOT NULL DEFAULT '{}',
    created_at           TEXT NOT NULL,
    updated_at           TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_analyses_user_property
    ON analyses(user_id, property_id, analysis_type);

CREATE TABLE IF NOT EXISTS room_features (
    id          TEXT PRIMARY KEY,
    property_id TEXT NOT NULL,
    room_type   TEXT NOT NULL,
    room_number INTEGER NOT NULL DEFAULT 1,
    room_label  TEXT NOT NULL,
    features    TEXT NOT NULL DEFAULT '{}',
    images      TEXT NOT NULL DEFAULT '[]',
    created_at  TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_room_features_property ON room_features(property_id);

CREATE TABLE IF NOT EXISTS conversations (
    id            TEXT PRIMARY KEY,
    user_id       TEXT NOT NULL,
    started_at    TEXT NOT NULL,
    ended_at      TEXT,
    summary       TEXT,
    message_count INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_conversations_user ON conversations(user_id);

CREATE TABLE IF NOT EXISTS messages (
    id              TEXT PRIMARY KEY,
    conversation_id TEXT NOT NULL,
    role            TEXT NOT NULL,
    content         TEXT NOT NULL,
    tool_calls      TEXT,
    tool_call_id    TEXT,
    created_at      TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id);

CREATE TABLE IF NOT EXISTS action_log (
    id                TEXT PRIMARY KEY,
    user_id           TEXT NOT NULL,
    conversation_id   TEXT,
    message_id        TEXT,
    action_type       TEXT NOT NULL,
    entity_type       TEXT NOT NULL,
    entity_id         TEXT,
    field_changed     TEXT,
    old_value         TEXT,
    new_value         TEXT,
    trigger_message   TEXT,
    confidence        REAL,
    confirmed_by_user INTEGER NOT NULL DEFAULT 0,
    created_at        TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_action_log_user ON action_log(user_id);
"#;

/// The durable store: one instance per process, cloned into services.
#[derive(Clone)]
pub struct Store {
    pool: Pool<Sqlite>,
}

impl Store {
    /// Connect to the database and run the embedded migration.
    pub async fn connect(database_url: &str) -> Result<Self> {
        Self::connect_with(database_url, 8).await
    }

    /// In-memory database for tests. A single pooled connection: every
    /// connection to `sqlite::memory:` is its own database, so the pool
    /// must never open a second one.
    pub async fn in_memory() -> Result<Self> {
        Self::connect_with("sqlite::memory:", 1).await
    }

    async fn connect_with(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(db_err)?;

        sqlx::raw_sql(MIGRATION)
            .execute(&pool)
            .await
            .map_err(db_err)?;

        tracing::info!(url = %database_url, "store connected");
        Ok(Self { pool })
    }

    pub(crate) fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Close the pool (process shutdown).
    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub(crate) fn new_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    // ── Fast hydration ──────────────────────────────────────────────

    /// One-shot hydration for a new turn: profile + active (non-archived)
    /// portfolio items + the last ended session's summary. Three queries,
    /// never more.
    pub async fn hydrate(&self, user_id: &str) -> Result<HydratedContext> {
        let profile = self.get_profile(user_id).await?;

        let portfolio = sqlx::query_as::<_, PortfolioItemRow>(
            "SELECT * FROM portfolio_items
             WHERE user_id = ? AND status != 'archived'
             ORDER BY created_at ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let last_session_summary: Option<(Option<String>,)> = sqlx::query_as(
            "SELECT summary FROM conversations
             WHERE user_id = ? AND ended_at IS NOT NULL
             ORDER BY ended_at DESC LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(HydratedContext {
            profile,
            portfolio,
            last_session_summary: last_session_summary.and_then(|row| row.0),
        })
    }
}
