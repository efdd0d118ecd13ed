//! SQLite-backed audit trail: version checkpoints and exec events.
//!
//! A version row is written immediately before every exec so a crash
//! mid-exec still leaves a checkpoint; the event row is written only after
//! the exec succeeded.

use std::time::{SystemTime, UNIX_EPOCH};

use sqlx::SqlitePool;

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// One version checkpoint row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct VersionRow {
    pub id: String,
    pub bot_id: String,
    pub created_at: i64,
}

/// One audit event row. `payload` is a JSON document.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EventRow {
    pub id: String,
    pub container_id: String,
    pub kind: String,
    pub payload: String,
    pub created_at: i64,
}

/// Audit store handle. Cheap to clone (pool-backed).
#[derive(Clone)]
pub struct AuditStore {
    pool: SqlitePool,
}

impl AuditStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the `versions` and `events` tables if they don't exist.
    pub async fn init(pool: &SqlitePool) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS versions (
                id         TEXT PRIMARY KEY,
                bot_id     TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )"#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS events (
                id           TEXT PRIMARY KEY,
                container_id TEXT NOT NULL,
                kind         TEXT NOT NULL,
                payload      TEXT NOT NULL,
                created_at   INTEGER NOT NULL
            )"#,
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Record an opaque version checkpoint for a bot. Returns the new id.
    pub async fn create_version(&self, bot_id: &str) -> Result<String, sqlx::Error> {
        let id = uuid::Uuid::new_v4().to_string();
        sqlx::query("INSERT INTO versions (id, bot_id, created_at) VALUES (?, ?, ?)")
            .bind(&id)
            .bind(bot_id)
            .bind(now_ms())
            .execute(&self.pool)
            .await?;
        Ok(id)
    }

    /// Record an audit event against a container.
    pub async fn insert_event(
        &self,
        container_id: &str,
        kind: &str,
        payload: serde_json::Value,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO events (id, container_id, kind, payload, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(container_id)
        .bind(kind)
        .bind(payload.to_string())
        .bind(now_ms())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Version checkpoints for a bot, oldest first.
    pub async fn versions_for(&self, bot_id: &str) -> Result<Vec<VersionRow>, sqlx::Error> {
        sqlx::query_as::<_, VersionRow>(
            "SELECT * FROM versions WHERE bot_id = ? ORDER BY created_at ASC",
        )
        .bind(bot_id)
        .fetch_all(&self.pool)
        .await
    }

    /// Events recorded against a container, oldest first.
    pub async fn events_for(&self, container_id: &str) -> Result<Vec<EventRow>, sqlx::Error> {
        sqlx::query_as::<_, EventRow>(
            "SELECT * FROM events WHERE container_id = ? ORDER BY created_at ASC",
        )
        .bind(container_id)
        .fetch_all(&self.pool)
        .await
    }
}
