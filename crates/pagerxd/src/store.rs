//! Durable page persistence
//!
//! One SQLite connection serves every channel, guarded by a lock so
//! all operations are serialized; at paging message rates that is
//! plenty. All SQLite work runs on the blocking pool. An insert that
//! fails is logged and dropped, never retried, and the connection is
//! reopened in place for the next caller.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use log::{error, info, warn};
use rusqlite::{params, Connection};
use tokio::sync::Mutex;
use tokio::task;

use pagerx::PageEvent;

// pages plus a full-text shadow table over recipient and content,
// kept in sync by triggers
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS pages (
    id        INTEGER PRIMARY KEY,
    rx_date   TEXT NOT NULL,
    source    TEXT NOT NULL,
    recipient TEXT NOT NULL,
    content   TEXT NOT NULL
);
CREATE VIRTUAL TABLE IF NOT EXISTS pages_fts USING fts5(
    recipient, content,
    content='pages', content_rowid='id'
);
CREATE TRIGGER IF NOT EXISTS pages_fts_insert AFTER INSERT ON pages BEGIN
    INSERT INTO pages_fts (rowid, recipient, content)
    VALUES (new.id, new.recipient, new.content);
END;
CREATE TRIGGER IF NOT EXISTS pages_fts_delete AFTER DELETE ON pages BEGIN
    INSERT INTO pages_fts (pages_fts, rowid, recipient, content)
    VALUES ('delete', old.id, old.recipient, old.content);
END;
"#;

/// Shared handle to the page database
#[derive(Clone)]
pub struct PageStore {
    path: PathBuf,
    conn: Arc<Mutex<Connection>>,
}

impl PageStore {
    /// Open the database, creating the file if needed
    ///
    /// Blocking; call from the blocking pool in async contexts.
    pub fn connect(path: impl AsRef<Path>) -> rusqlite::Result<Self> {
        let conn = open(path.as_ref())?;
        Ok(Self {
            path: path.as_ref().to_path_buf(),
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create the page table and its full-text index if absent
    ///
    /// Idempotent; safe to call on every startup.
    pub async fn ensure_schema(&self) -> Result<()> {
        let conn = Arc::clone(&self.conn);
        task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            conn.execute_batch(SCHEMA)
        })
        .await
        .context("schema task failed")?
        .context("unable to create page tables")?;
        info!("page tables ready");
        Ok(())
    }

    /// Insert one page, stamping the receive time now
    ///
    /// Delivery is at most once: a failed insert is logged and the
    /// page dropped, and the connection is reopened so the next page
    /// gets a fresh start.
    pub async fn store(&self, event: PageEvent) {
        let path = self.path.clone();
        let conn = Arc::clone(&self.conn);
        let outcome = task::spawn_blocking(move || {
            let mut conn = conn.blocking_lock();
            let rx_date = Utc::now().to_rfc3339();
            let result = conn.execute(
                "INSERT INTO pages (rx_date, source, recipient, content) \
                 VALUES (?1, ?2, ?3, ?4)",
                params![rx_date, event.source, event.recipient, event.content],
            );
            if let Err(err) = result {
                error!("page insert failed, dropping page: {err}");
                match open(&path) {
                    Ok(fresh) => {
                        *conn = fresh;
                        info!("page database connection reopened");
                    }
                    Err(err) => warn!("page database reopen failed: {err}"),
                }
            }
        })
        .await;
        if outcome.is_err() {
            error!("page store task failed");
        }
    }

    #[cfg(test)]
    pub(crate) async fn page_count(&self) -> i64 {
        let conn = Arc::clone(&self.conn);
        task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            conn.query_row("SELECT count(*) FROM pages", [], |row| row.get(0))
                .unwrap()
        })
        .await
        .unwrap()
    }
}

fn open(path: &Path) -> rusqlite::Result<Connection> {
    let conn = Connection::open(path)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(recipient: &str, content: &str) -> PageEvent {
        PageEvent {
            source: "test (POCSAG1200)".to_string(),
            recipient: recipient.to_string(),
            content: content.to_string(),
        }
    }

    fn store_at(dir: &tempfile::TempDir) -> PageStore {
        PageStore::connect(dir.path().join("pages.db")).unwrap()
    }

    #[tokio::test]
    async fn schema_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_at(&dir);
        store.ensure_schema().await.unwrap();
        store.ensure_schema().await.unwrap();
        assert_eq!(store.page_count().await, 0);
    }

    #[tokio::test]
    async fn stores_a_page_with_timestamp_and_fts() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_at(&dir);
        store.ensure_schema().await.unwrap();

        store.store(event("1234567", "Test Message")).await;
        assert_eq!(store.page_count().await, 1);

        let probe = Connection::open(dir.path().join("pages.db")).unwrap();
        let (rx_date, recipient): (String, String) = probe
            .query_row(
                "SELECT rx_date, recipient FROM pages",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(recipient, "1234567");
        assert!(!rx_date.is_empty());

        let hits: i64 = probe
            .query_row(
                "SELECT count(*) FROM pages_fts WHERE pages_fts MATCH 'message'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(hits, 1);
    }

    #[tokio::test]
    async fn failed_insert_is_dropped_and_connection_recovers() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_at(&dir);
        store.ensure_schema().await.unwrap();

        let probe = Connection::open(dir.path().join("pages.db")).unwrap();
        probe
            .execute_batch("ALTER TABLE pages RENAME TO pages_hidden;")
            .unwrap();

        // fails, page dropped, connection reopened
        store.store(event("1", "lost page")).await;

        probe
            .execute_batch("ALTER TABLE pages_hidden RENAME TO pages;")
            .unwrap();

        store.store(event("2", "kept page")).await;
        assert_eq!(store.page_count().await, 1);

        let recipient: String = probe
            .query_row("SELECT recipient FROM pages", [], |row| row.get(0))
            .unwrap();
        assert_eq!(recipient, "2");
    }

    #[tokio::test]
    async fn concurrent_writers_are_serialized() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_at(&dir);
        store.ensure_schema().await.unwrap();

        let mut tasks = Vec::new();
        for writer in 0..8 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                for page in 0..10 {
                    store
                        .store(event(&format!("{writer}"), &format!("page {page}")))
                        .await;
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(store.page_count().await, 80);
    }
}
