//! libSQL-backed enrichment cache.
//!
//! Summarizer responses are keyed by `(task, sha256(text), model_id)` so a
//! re-run over unchanged text does not pay for the same completion twice.

use std::path::Path;

use chrono::Utc;
use libsql::{Connection, Database, params};
use paperflow_shared::{PaperflowError, Result};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Schema steps, applied in order. Step `n` leaves `user_version = n + 1`.
const SCHEMA_STEPS: [&str; 2] = [
    "CREATE TABLE IF NOT EXISTS enrichment_cache (
        id           TEXT PRIMARY KEY,
        task         TEXT NOT NULL,
        content_hash TEXT NOT NULL,
        model_id     TEXT NOT NULL,
        result_json  TEXT NOT NULL,
        created_at   TEXT NOT NULL,
        UNIQUE(task, content_hash, model_id)
    );",
    "ALTER TABLE enrichment_cache ADD COLUMN paper_id TEXT;
     CREATE INDEX IF NOT EXISTS idx_enrichment_paper ON enrichment_cache(paper_id);",
];

/// Hex-encoded SHA-256 of `text`.
pub fn content_hash(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Lookup key for one cached response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey<'a> {
    pub task: &'a str,
    pub content_hash: &'a str,
    pub model_id: &'a str,
}

/// Cache handle wrapping a libSQL database.
pub struct EnrichmentCache {
    _db: Database,
    conn: Connection,
}

fn storage_err(e: libsql::Error) -> PaperflowError {
    PaperflowError::Storage(e.to_string())
}

impl EnrichmentCache {
    /// Open or create a cache database at `path` and bring its schema up
    /// to date. A file written by a newer schema is refused.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PaperflowError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;
        let conn = db.connect().map_err(storage_err)?;

        let cache = Self { _db: db, conn };
        cache.upgrade_schema().await?;
        Ok(cache)
    }

    async fn upgrade_schema(&self) -> Result<()> {
        let current = self.schema_version().await?;
        if current > SCHEMA_STEPS.len() {
            return Err(PaperflowError::Storage(format!(
                "cache schema v{current} is newer than supported v{}",
                SCHEMA_STEPS.len()
            )));
        }

        for (step, sql) in SCHEMA_STEPS.iter().enumerate().skip(current) {
            let version = step + 1;
            tracing::info!(version, "upgrading enrichment cache schema");
            self.conn
                .execute_batch(&format!("BEGIN;\n{sql}\nPRAGMA user_version = {version};\nCOMMIT;"))
                .await
                .map_err(|e| PaperflowError::Storage(format!("cache schema v{version} failed: {e}")))?;
        }
        Ok(())
    }

    /// SQLite `user_version`; 0 for a fresh file.
    async fn schema_version(&self) -> Result<usize> {
        let mut rows = self
            .conn
            .query("PRAGMA user_version", params![])
            .await
            .map_err(storage_err)?;
        let version = match rows.next().await.map_err(storage_err)? {
            Some(row) => row.get::<i64>(0).map_err(storage_err)?,
            None => 0,
        };
        Ok(usize::try_from(version).unwrap_or(0))
    }

    /// Get a cached result, if present.
    pub async fn get(&self, key: &CacheKey<'_>) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT result_json FROM enrichment_cache
                 WHERE task = ?1 AND content_hash = ?2 AND model_id = ?3",
                params![key.task, key.content_hash, key.model_id],
            )
            .await
            .map_err(storage_err)?;

        let Some(row) = rows.next().await.map_err(storage_err)? else {
            return Ok(None);
        };
        row.get::<String>(0).map(Some).map_err(storage_err)
    }

    /// Store a result (upserts).
    pub async fn put(&self, key: &CacheKey<'_>, paper_id: &str, result_json: &str) -> Result<()> {
        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO enrichment_cache (id, task, content_hash, model_id, result_json, created_at, paper_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(task, content_hash, model_id) DO UPDATE SET
                   result_json = excluded.result_json,
                   created_at = excluded.created_at,
                   paper_id = excluded.paper_id",
                params![
                    id.as_str(),
                    key.task,
                    key.content_hash,
                    key.model_id,
                    result_json,
                    now.as_str(),
                    paper_id
                ],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    /// Drop every entry produced for `paper_id`. Returns the number removed.
    pub async fn invalidate_paper(&self, paper_id: &str) -> Result<u64> {
        self.conn
            .execute(
                "DELETE FROM enrichment_cache WHERE paper_id = ?1",
                params![paper_id],
            )
            .await
            .map_err(storage_err)
    }

    /// Number of cached entries.
    pub async fn entry_count(&self) -> Result<u64> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM enrichment_cache", params![])
            .await
            .map_err(storage_err)?;
        match rows.next().await.map_err(storage_err)? {
            Some(row) => row
                .get::<i64>(0)
                .map(|n| n.max(0) as u64)
                .map_err(storage_err),
            None => Ok(0),
        }
    }
}
