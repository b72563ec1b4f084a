pub mod identities;
pub mod messages;
pub mod tasks;

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// Thread-safe SQLite archive for identities, messages and tasks.
///
/// All access goes through one connection behind an async mutex; the
/// UNIQUE constraint on `identities.external_id` is what makes concurrent
/// get-or-create converge on a single row.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open or create the SQLite database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;

        // WAL for concurrent reads; journal_mode PRAGMA returns the
        // resulting mode, so it has to be a query.
        let _: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;

        Self::run_migrations(&conn)?;

        info!("Store initialized at: {}", path.display());
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;

        Self::run_migrations(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn run_migrations(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "
            -- Conversational identities: users, groups, rooms.
            -- external_id uniqueness is the sole de-duplication point.
            CREATE TABLE IF NOT EXISTS identities (
                id TEXT PRIMARY KEY,
                external_id TEXT NOT NULL UNIQUE,
                kind TEXT NOT NULL,
                display_name TEXT NOT NULL,
                avatar_url TEXT,
                timezone TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            -- Append-only conversation log, inbound and outbound.
            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                identity_id TEXT NOT NULL,
                external_message_id TEXT,
                kind TEXT NOT NULL,
                text TEXT,
                raw TEXT NOT NULL,
                is_from_user INTEGER NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                FOREIGN KEY (identity_id) REFERENCES identities(id)
            );

            CREATE INDEX IF NOT EXISTS idx_messages_identity
                ON messages(identity_id, created_at);

            -- Tasks extracted from free text.
            CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                identity_id TEXT NOT NULL,
                title TEXT NOT NULL,
                due_date TEXT,
                status TEXT NOT NULL,
                priority INTEGER NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                FOREIGN KEY (identity_id) REFERENCES identities(id)
            );

            CREATE INDEX IF NOT EXISTS idx_tasks_identity_status
                ON tasks(identity_id, status);
            ",
        )
        .context("Failed to run migrations")?;

        Ok(())
    }
}
