use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use rusqlite::{Connection, OptionalExtension, params};
use std::fs;
use std::path::{Path, PathBuf};

use crate::api::models::Conversation;
use crate::error::{ApiError, ApiResult};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS conversations (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        updated_at TEXT,
        raw_json TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS conversations_updated ON conversations(updated_at);
"#;

pub fn default_path() -> Option<PathBuf> {
    let proj = ProjectDirs::from("io", "hichat", "hichat")?;
    Some(proj.data_dir().join("cache.sqlite"))
}

/// Local copy of the conversation list so the CLI can show something
/// before the first fetch returns.
pub struct ConversationCache {
    conn: Connection,
}

impl ConversationCache {
    pub fn open(path: &Path) -> ApiResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| ApiError::Config(format!("{}: {}", parent.display(), e)))?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        Self::with_connection(conn)
    }

    pub fn open_default() -> ApiResult<Self> {
        let path = default_path().ok_or_else(|| ApiError::Config("no data directory".into()))?;
        Self::open(&path)
    }

    pub fn open_in_memory() -> ApiResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> ApiResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    pub fn upsert(&mut self, conversations: &[Conversation]) -> ApiResult<usize> {
        let tx = self.conn.transaction()?;
        for c in conversations {
            let raw = serde_json::to_string(c)?;
            tx.execute(
                r#"
                INSERT INTO conversations (id, name, updated_at, raw_json)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(id) DO UPDATE SET
                    name=excluded.name,
                    updated_at=excluded.updated_at,
                    raw_json=excluded.raw_json
                "#,
                params![c.id, c.display_name(), c.updated_at, raw],
            )?;
        }
        tx.commit()?;
        log::debug!("cached {} conversations", conversations.len());
        Ok(conversations.len())
    }

    /// Most recently updated first. Rows that no longer decode are skipped.
    pub fn recent(&self, limit: usize) -> ApiResult<Vec<Conversation>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, raw_json FROM conversations ORDER BY updated_at DESC, name ASC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (id, raw) = row?;
            match serde_json::from_str(&raw) {
                Ok(c) => out.push(c),
                Err(e) => log::warn!("dropping cached conversation {}: {}", id, e),
            }
        }
        Ok(out)
    }

    pub fn last_updated(&self, id: &str) -> ApiResult<Option<DateTime<Utc>>> {
        let ts: Option<Option<DateTime<Utc>>> = self
            .conn
            .query_row(
                "SELECT updated_at FROM conversations WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(ts.flatten())
    }

    pub fn clear(&self) -> ApiResult<()> {
        self.conn.execute("DELETE FROM conversations", [])?;
        Ok(())
    }
}
