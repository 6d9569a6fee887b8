// SPDX-FileCopyrightText: 2026 Weft Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the SegmentStore trait.

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::debug;

use weft_config::model::StorageConfig;
use weft_core::types::{GroupKey, HealthStatus, MergedMessage, Segment};
use weft_core::{SegmentStore, WeftError};

use crate::database::Database;
use crate::queries;

/// SQLite-backed segment store.
///
/// Wraps a [`Database`] handle and delegates all query operations to the
/// typed query modules. The database is lazily initialized on the first
/// call to [`SegmentStore::initialize`].
pub struct SqliteStore {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteStore {
    /// Create a new SqliteStore with the given configuration.
    ///
    /// The database connection is not opened until `initialize` is called.
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    /// Returns a reference to the underlying Database, or an error if not
    /// initialized.
    fn db(&self) -> Result<&Database, WeftError> {
        self.db.get().ok_or_else(|| WeftError::Storage {
            source: "store not initialized -- call initialize() first".into(),
        })
    }
}

#[async_trait]
impl SegmentStore for SqliteStore {
    async fn initialize(&self) -> Result<(), WeftError> {
        let db =
            Database::open_with_options(&self.config.database_path, self.config.wal_mode).await?;
        self.db.set(db).map_err(|_| WeftError::Storage {
            source: "store already initialized".into(),
        })?;
        debug!(path = %self.config.database_path, "SQLite store initialized");
        Ok(())
    }

    async fn close(&self) -> Result<(), WeftError> {
        let db = self.db()?;
        db.close().await?;
        debug!("WAL checkpoint complete");
        Ok(())
    }

    async fn health_check(&self) -> Result<HealthStatus, WeftError> {
        let db = self.db()?;
        db.connection()
            .call(|conn| {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(crate::database::map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn upsert_segment(&self, segment: &Segment) -> Result<(), WeftError> {
        queries::segments::upsert_segment(self.db()?, segment).await
    }

    async fn segments_for_group(&self, key: &GroupKey) -> Result<Vec<Segment>, WeftError> {
        queries::segments::segments_for_group(self.db()?, key).await
    }

    async fn insert_merged(&self, message: &MergedMessage) -> Result<bool, WeftError> {
        queries::messages::insert_merged(self.db()?, message).await
    }

    async fn merged_exists(&self, key: &GroupKey) -> Result<bool, WeftError> {
        queries::messages::merged_exists(self.db()?, key).await
    }

    async fn get_merged(&self, key: &GroupKey) -> Result<Option<MergedMessage>, WeftError> {
        queries::messages::get_merged(self.db()?, key).await
    }

    async fn stale_groups(&self, cutoff: i64) -> Result<Vec<GroupKey>, WeftError> {
        queries::segments::stale_groups(self.db()?, cutoff).await
    }

    async fn delete_group(&self, key: &GroupKey) -> Result<u64, WeftError> {
        queries::segments::delete_group(self.db()?, key).await
    }

    async fn merged_messages(
        &self,
        sender: Option<&str>,
        limit: Option<i64>,
    ) -> Result<Vec<MergedMessage>, WeftError> {
        queries::messages::merged_messages(self.db()?, sender, limit).await
    }

    async fn pending_group_count(&self) -> Result<u64, WeftError> {
        queries::segments::pending_group_count(self.db()?).await
    }

    async fn message_count(&self) -> Result<u64, WeftError> {
        queries::messages::message_count(self.db()?).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn make_config(path: &str) -> StorageConfig {
        StorageConfig {
            database_path: path.to_string(),
            wal_mode: true,
        }
    }

    fn make_segment(id: &str, part_index: u32) -> Segment {
        Segment {
            id: id.to_string(),
            sender: "5000123".to_string(),
            logical_id: 42,
            reference: 7,
            part_index,
            part_count: 2,
            payload: format!("part {part_index}"),
            received_at: 1_000,
        }
    }

    #[tokio::test]
    async fn initialize_opens_database_at_configured_path() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("init_test.db");
        let store = SqliteStore::new(make_config(db_path.to_str().unwrap()));

        store.initialize().await.unwrap();
        assert!(db_path.exists(), "database file should be created");
    }

    #[tokio::test]
    async fn initialize_twice_returns_error() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("double_init.db");
        let store = SqliteStore::new(make_config(db_path.to_str().unwrap()));

        store.initialize().await.unwrap();
        let result = store.initialize().await;
        assert!(result.is_err(), "second initialize should fail");
    }

    #[tokio::test]
    async fn health_check_fails_when_not_initialized() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("no_init.db");
        let store = SqliteStore::new(make_config(db_path.to_str().unwrap()));

        let result = store.health_check().await;
        assert!(result.is_err(), "health_check should fail before initialize");
    }

    #[tokio::test]
    async fn health_check_returns_healthy_when_initialized() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("health.db");
        let store = SqliteStore::new(make_config(db_path.to_str().unwrap()));

        store.initialize().await.unwrap();
        let status = store.health_check().await.unwrap();
        assert_eq!(status, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn full_group_lifecycle_through_store() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("lifecycle.db");
        let store = SqliteStore::new(make_config(db_path.to_str().unwrap()));
        store.initialize().await.unwrap();

        let s1 = make_segment("s1", 1);
        let s2 = make_segment("s2", 2);
        let key = s1.group_key();

        store.upsert_segment(&s1).await.unwrap();
        store.upsert_segment(&s2).await.unwrap();
        assert_eq!(store.segments_for_group(&key).await.unwrap().len(), 2);
        assert_eq!(store.pending_group_count().await.unwrap(), 1);

        let message = MergedMessage {
            id: key.merged_id(),
            sender: key.sender.clone(),
            body: "part 1part 2".to_string(),
            completed_at: 2_000,
            group_key: key.canonical(),
            is_multipart: true,
        };
        assert!(store.insert_merged(&message).await.unwrap());
        assert!(store.merged_exists(&key).await.unwrap());
        assert_eq!(store.pending_group_count().await.unwrap(), 0);
        assert_eq!(store.message_count().await.unwrap(), 1);

        let view = store.merged_messages(Some("5000123"), None).await.unwrap();
        assert_eq!(view.len(), 1);
        assert_eq!(view[0].body, "part 1part 2");

        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn concurrent_writers_no_sqlite_busy() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("concurrent.db");
        let store = std::sync::Arc::new(SqliteStore::new(make_config(
            db_path.to_str().unwrap(),
        )));
        store.initialize().await.unwrap();

        // Spawn 10 concurrent tasks all writing through the same store.
        let mut handles = Vec::new();
        for i in 0..10i64 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let mut seg = make_segment(&format!("c-{i}"), 1);
                seg.logical_id = i;
                store.upsert_segment(&seg).await
            }));
        }

        for handle in handles {
            let result = handle.await.unwrap();
            assert!(result.is_ok(), "concurrent write failed: {result:?}");
        }

        assert_eq!(store.pending_group_count().await.unwrap(), 10);
        store.close().await.unwrap();
    }
}
