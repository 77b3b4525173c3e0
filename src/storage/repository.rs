//! Seen-set repositories
//!
//! A fingerprint lands in the seen set only after the broker confirmed the
//! matching publish. Entries are write-once: saving an existing
//! fingerprint is a no-op.

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection};
use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};

use super::{Database, StorageResult};
use crate::models::Fingerprint;

/// Storage of fingerprints already forwarded
#[async_trait]
pub trait Repository: Send + Sync {
    /// Check if the fingerprint has been forwarded before
    async fn exists(&self, fingerprint: &Fingerprint) -> StorageResult<bool>;

    /// Remember the fingerprint
    async fn save(&self, fingerprint: &Fingerprint) -> StorageResult<()>;
}

/// SQLite implementation of [`Repository`]
pub struct SqliteSeenRepository {
    db: Arc<Database>,
}

impl SqliteSeenRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Number of remembered fingerprints
    pub fn count(&self) -> StorageResult<usize> {
        let count: i64 = self.db.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM seen_postings", [], |row| row.get(0))
        })?;
        Ok(count as usize)
    }

    /// Run a query on the blocking pool so SQLite never stalls a runtime worker
    async fn blocking<T, F>(&self, f: F) -> StorageResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || db.with_conn(f)).await?
    }
}

#[async_trait]
impl Repository for SqliteSeenRepository {
    async fn exists(&self, fingerprint: &Fingerprint) -> StorageResult<bool> {
        let key = fingerprint.as_str().to_string();
        self.blocking(move |conn| {
            conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM seen_postings WHERE fingerprint = ?1)",
                params![key],
                |row| row.get(0),
            )
        })
        .await
    }

    async fn save(&self, fingerprint: &Fingerprint) -> StorageResult<()> {
        let key = fingerprint.as_str().to_string();
        let now = Utc::now().to_rfc3339();
        let inserted = self
            .blocking(move |conn| {
                conn.execute(
                    "INSERT OR IGNORE INTO seen_postings (fingerprint, created_at) VALUES (?1, ?2)",
                    params![key, now],
                )
            })
            .await?;

        if inserted == 0 {
            tracing::debug!(fingerprint = %fingerprint, "Fingerprint already stored");
        }
        Ok(())
    }
}

/// In-memory implementation of [`Repository`]
///
/// Useful for testing without database dependencies.
#[derive(Default)]
pub struct MemorySeenRepository {
    seen: RwLock<HashSet<Fingerprint>>,
}

impl MemorySeenRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.seen.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.seen
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(fingerprint)
    }
}

#[async_trait]
impl Repository for MemorySeenRepository {
    async fn exists(&self, fingerprint: &Fingerprint) -> StorageResult<bool> {
        Ok(self.contains(fingerprint))
    }

    async fn save(&self, fingerprint: &Fingerprint) -> StorageResult<()> {
        self.seen
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(fingerprint.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageError;

    fn fingerprint(n: u8) -> Fingerprint {
        Fingerprint::from_hex(&format!("{:064x}", n)).unwrap()
    }

    // Helper to create test repositories
    fn create_test_repos() -> Vec<Box<dyn Repository>> {
        vec![
            Box::new(SqliteSeenRepository::new(Arc::new(
                Database::in_memory().unwrap(),
            ))),
            Box::new(MemorySeenRepository::new()),
        ]
    }

    #[tokio::test]
    async fn test_save_then_exists() {
        for repo in create_test_repos() {
            assert!(!repo.exists(&fingerprint(1)).await.unwrap());
            repo.save(&fingerprint(1)).await.unwrap();
            assert!(repo.exists(&fingerprint(1)).await.unwrap());
            assert!(!repo.exists(&fingerprint(2)).await.unwrap());
        }
    }

    #[tokio::test]
    async fn test_save_is_write_once() {
        let repo = SqliteSeenRepository::new(Arc::new(Database::in_memory().unwrap()));
        repo.save(&fingerprint(7)).await.unwrap();
        repo.save(&fingerprint(7)).await.unwrap();
        assert_eq!(repo.count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_closed_database() {
        let db = Arc::new(Database::in_memory().unwrap());
        let repo = SqliteSeenRepository::new(Arc::clone(&db));
        db.close().unwrap();

        let err = repo.exists(&fingerprint(1)).await.unwrap_err();
        assert!(matches!(err, StorageError::Closed));
        assert!(repo.save(&fingerprint(1)).await.is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_lookups_share_one_connection() {
        let repo = Arc::new(SqliteSeenRepository::new(Arc::new(
            Database::in_memory().unwrap(),
        )));

        let handles: Vec<_> = (0..16u8)
            .map(|n| {
                let repo = Arc::clone(&repo);
                tokio::spawn(async move {
                    repo.save(&fingerprint(n)).await.unwrap();
                    repo.exists(&fingerprint(n)).await.unwrap()
                })
            })
            .collect();

        for handle in handles {
            assert!(handle.await.unwrap());
        }
        assert_eq!(repo.count().unwrap(), 16);
    }
}
