//! The hash index store: one row per known remote file, plus the duplicate
//! group rollups derived from them.
//!
//! Writes (`insert`, `remove`, `set_local_path`, `rebuild`) take the writer
//! lock shared by every handle of the same [`Database`] and run inside one
//! SQLite transaction each. Dropping a write future before it commits rolls
//! the transaction back, so a cancelled insert leaves neither a record nor a
//! group change behind. Reads go straight to the pool and, thanks to WAL,
//! observe either the state before a write or the state after it.

use crate::Database;
use crate::aggregate::{self, GroupChange, InsertOutcome};
use crate::error::{ErrorKind, Result, classify_write};
use crate::models::{DuplicateGroup, FileRecord, GroupKey, HashKind, RecordRow, normalize_hash};
use crate::queries::{self, into_records, sql_limit, sql_offset};
use exn::{OptionExt, ResultExt};
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::instrument;

/// Result of removing a record from the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoveOutcome {
    /// The record as it was stored before removal.
    pub record: FileRecord,
    pub group: GroupChange,
}

/// Summary of a from-scratch rebuild of the duplicate groups.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebuildReport {
    pub records_scanned: u64,
    /// Records without any checksum; they cannot join a group.
    pub records_skipped: u64,
    /// Group rows written by the rebuild.
    pub groups_rebuilt: u64,
    /// Groups that did not exist before the rebuild.
    pub groups_created: u64,
    /// Groups that existed before but are not backed by two or more records.
    pub groups_dropped: u64,
    /// Groups that existed before with wrong counters.
    pub groups_repaired: u64,
}

/// Store for [`FileRecord`]s and their [`DuplicateGroup`] rollups.
#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
    writer: Arc<Mutex<()>>,
}
impl From<&Database> for Store {
    fn from(db: &Database) -> Self {
        Self { pool: db.pool().clone(), writer: db.writer() }
    }
}
impl Store {
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // =========================================================================
    // Insert
    // =========================================================================

    /// Register a file record and update its duplicate group atomically.
    ///
    /// Insert is not upsert: returns [`ErrorKind::DuplicateKey`] if the
    /// `remote_id` is already indexed, leaving the store unchanged.
    #[instrument(skip_all, fields(remote_id = %record.remote_id))]
    pub async fn insert(&self, record: &FileRecord) -> Result<InsertOutcome> {
        let row = RecordRow::try_from(record)?;
        let _guard = self.writer.lock().await;
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::StorageUnavailable)?;
        if queries::fetch_record(&mut tx, &record.remote_id).await?.is_some() {
            exn::bail!(ErrorKind::DuplicateKey(record.remote_id.clone()));
        }
        let inserted = sqlx::query(include_str!("../queries/insert_record.sql"))
            .bind(row.remote_id)
            .bind(row.name)
            .bind(row.size_bytes)
            .bind(row.primary_hash)
            .bind(row.secondary_hash)
            .bind(row.source_id)
            .bind(row.content_type)
            .bind(row.ingested_at)
            .bind(row.local_path)
            .execute(&mut *tx)
            .await;
        if let Err(err) = inserted {
            let kind = classify_write(&err, &record.remote_id);
            return Err(err).or_raise(|| kind);
        }
        let outcome = aggregate::record_added(&mut tx, record).await?;
        tx.commit().await.or_raise(|| ErrorKind::StorageUnavailable)?;
        Ok(outcome)
    }

    /// Backfill the local path of a file once it has been transferred.
    #[instrument(skip_all, fields(remote_id = %remote_id.as_ref()))]
    pub async fn set_local_path(&self, remote_id: impl AsRef<str>, path: impl AsRef<str>) -> Result<()> {
        let remote_id = remote_id.as_ref();
        let _guard = self.writer.lock().await;
        let result = sqlx::query(include_str!("../queries/set_local_path.sql"))
            .bind(path.as_ref())
            .bind(remote_id)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::StorageUnavailable)?;
        if result.rows_affected() == 0 {
            exn::bail!(ErrorKind::NotFound(remote_id.to_string()));
        }
        Ok(())
    }

    // =========================================================================
    // Get/Fetch
    // =========================================================================

    /// Get a record by the identifier the remote storage assigned to it.
    pub async fn lookup_by_remote_id(&self, remote_id: impl AsRef<str>) -> Result<Option<FileRecord>> {
        let mut conn = self.pool.acquire().await.or_raise(|| ErrorKind::StorageUnavailable)?;
        queries::fetch_record(&mut conn, remote_id.as_ref()).await
    }

    /// Get records whose checksum of the given kind matches.
    ///
    /// Ordered oldest first (the canonical copy), ties broken by `remote_id`.
    /// A `None` limit returns every match. This is a raw lookup on the hash
    /// column: a secondary lookup also returns records that carry a primary
    /// checksum.
    pub async fn lookup_by_hash(
        &self,
        hash_value: impl AsRef<str>,
        kind: HashKind,
        limit: Option<usize>,
        offset: usize,
    ) -> Result<Vec<FileRecord>> {
        let Some(hash_value) = normalize_hash(hash_value) else {
            return Ok(Vec::new());
        };
        let mut conn = self.pool.acquire().await.or_raise(|| ErrorKind::StorageUnavailable)?;
        queries::fetch_by_hash(&mut conn, &hash_value, kind, limit, offset).await
    }

    /// Get records listed from one remote storage location, oldest first.
    pub async fn lookup_by_source(
        &self,
        source_id: impl AsRef<str>,
        limit: Option<usize>,
        offset: usize,
    ) -> Result<Vec<FileRecord>> {
        let rows: Vec<RecordRow> = sqlx::query_as(include_str!("../queries/lookup_by_source.sql"))
            .bind(source_id.as_ref())
            .bind(sql_limit(limit)?)
            .bind(sql_offset(offset)?)
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::StorageUnavailable)?;
        into_records(rows)
    }

    /// Get the stored duplicate group for a key, if it has two or more members.
    pub async fn group(&self, key: &GroupKey) -> Result<Option<DuplicateGroup>> {
        let mut conn = self.pool.acquire().await.or_raise(|| ErrorKind::StorageUnavailable)?;
        queries::fetch_group(&mut conn, key).await
    }

    // =========================================================================
    // Delete
    // =========================================================================

    /// Remove a record and update (or dissolve) its duplicate group atomically.
    #[instrument(skip_all, fields(remote_id = %remote_id.as_ref()))]
    pub async fn remove(&self, remote_id: impl AsRef<str>) -> Result<RemoveOutcome> {
        let remote_id = remote_id.as_ref();
        let _guard = self.writer.lock().await;
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::StorageUnavailable)?;
        let record = queries::fetch_record(&mut tx, remote_id)
            .await?
            .ok_or_raise(|| ErrorKind::NotFound(remote_id.to_string()))?;
        sqlx::query(include_str!("../queries/delete_by_remote_id.sql"))
            .bind(remote_id)
            .execute(&mut *tx)
            .await
            .or_raise(|| ErrorKind::StorageUnavailable)?;
        let group = aggregate::record_removed(&mut tx, &record).await?;
        tx.commit().await.or_raise(|| ErrorKind::StorageUnavailable)?;
        Ok(RemoveOutcome { record, group })
    }

    // =========================================================================
    // Rebuild
    // =========================================================================

    /// Recompute every duplicate group from the file records.
    ///
    /// Runs in one transaction under the writer lock: concurrent readers keep
    /// seeing the previous groups until the rebuilt set commits. Groups that
    /// survive keep their `created_at`; groups the rebuild creates take the
    /// ingestion time of their second member, so rebuilding twice yields the
    /// same rows.
    #[instrument(skip_all)]
    pub async fn rebuild(&self) -> Result<RebuildReport> {
        let _guard = self.writer.lock().await;
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::StorageUnavailable)?;
        let (scanned, _, unhashed): (i64, i64, i64) = sqlx::query_as(include_str!("../queries/record_totals.sql"))
            .fetch_one(&mut *tx)
            .await
            .or_raise(|| ErrorKind::StorageUnavailable)?;
        let mut previous = queries::fetch_all_groups(&mut tx)
            .await?
            .into_iter()
            .map(|group| (group.key(), group))
            .collect::<BTreeMap<_, _>>();
        let derived = queries::derive_groups(&mut tx).await?;
        sqlx::query(include_str!("../queries/delete_all_groups.sql"))
            .execute(&mut *tx)
            .await
            .or_raise(|| ErrorKind::StorageUnavailable)?;
        let mut report = RebuildReport {
            records_scanned: u64::try_from(scanned).or_raise(|| ErrorKind::InvalidData("record count"))?,
            records_skipped: u64::try_from(unhashed).or_raise(|| ErrorKind::InvalidData("record count"))?,
            ..RebuildReport::default()
        };
        for mut group in derived {
            match previous.remove(&group.key()) {
                Some(old) => {
                    if !old.same_counters(&group) {
                        report.groups_repaired += 1;
                    }
                    group.created_at = old.created_at;
                },
                None => report.groups_created += 1,
            }
            aggregate::store_group(&mut tx, &group).await?;
            report.groups_rebuilt += 1;
        }
        report.groups_dropped = previous.len() as u64;
        tx.commit().await.or_raise(|| ErrorKind::StorageUnavailable)?;
        tracing::info!(
            scanned = report.records_scanned,
            skipped = report.records_skipped,
            rebuilt = report.groups_rebuilt,
            created = report.groups_created,
            dropped = report.groups_dropped,
            repaired = report.groups_repaired,
            "rebuilt duplicate groups"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::InboundDescriptor;
    use time::{Duration, UtcDateTime};

    async fn store() -> Store {
        let db = Database::connect_in_memory().await.unwrap();
        Store::from(&db)
    }

    fn record(remote_id: &str, primary: Option<&str>, secondary: Option<&str>, size: u64, age: i64) -> FileRecord {
        let mut descriptor = InboundDescriptor::new(remote_id, format!("{remote_id}.bin"), size, "drive", "application/octet-stream");
        if let Some(hash) = primary {
            descriptor = descriptor.with_primary_hash(hash);
        }
        if let Some(hash) = secondary {
            descriptor = descriptor.with_secondary_hash(hash);
        }
        let base = UtcDateTime::from_unix_timestamp(1_760_000_000).unwrap();
        descriptor.into_record(base + Duration::seconds(age))
    }

    #[tokio::test]
    async fn test_insert_and_lookup() {
        let store = store().await;
        let f1 = record("f1", Some("aaa"), None, 100, 0);
        assert_eq!(store.insert(&f1).await.unwrap(), InsertOutcome::Unique(GroupKey::new("aaa", HashKind::Primary)));
        assert_eq!(store.lookup_by_remote_id("f1").await.unwrap(), Some(f1));
        assert_eq!(store.lookup_by_remote_id("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_duplicate_key_leaves_store_unchanged() {
        let store = store().await;
        let first = record("f1", Some("aaa"), None, 100, 0);
        store.insert(&first).await.unwrap();
        let second = record("f1", Some("bbb"), None, 999, 5);
        let err = store.insert(&second).await.unwrap_err();
        assert_eq!(*err, ErrorKind::DuplicateKey("f1".to_string()));
        assert_eq!(store.lookup_by_remote_id("f1").await.unwrap(), Some(first));
        assert!(store.lookup_by_hash("bbb", HashKind::Primary, None, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_group_forms_and_extends() {
        let store = store().await;
        store.insert(&record("f1", Some("aaa"), None, 100, 0)).await.unwrap();
        let formed = store.insert(&record("f2", Some("aaa"), None, 100, 1)).await.unwrap();
        let InsertOutcome::Formed(group) = formed else { panic!("expected a new group, got {formed:?}") };
        assert_eq!((group.member_count, group.total_size_bytes, group.wasted_bytes), (2, 200, 100));
        let extended = store.insert(&record("f3", Some("aaa"), None, 100, 2)).await.unwrap();
        let InsertOutcome::Extended(group) = extended else { panic!("expected a grown group, got {extended:?}") };
        assert_eq!((group.member_count, group.total_size_bytes, group.wasted_bytes), (3, 300, 200));
    }

    #[tokio::test]
    async fn test_formed_group_matches_stored_row() {
        let store = store().await;
        store.insert(&record("f1", Some("aaa"), None, 100, 0)).await.unwrap();
        let formed = store.insert(&record("f2", Some("aaa"), None, 100, 1)).await.unwrap();
        let InsertOutcome::Formed(group) = formed else { panic!("expected a new group, got {formed:?}") };
        assert_eq!(group.created_at.nanosecond(), 0);
        assert_eq!(store.group(&group.key()).await.unwrap(), Some(group));
    }

    #[tokio::test]
    async fn test_unhashed_records_never_group() {
        let store = store().await;
        assert_eq!(store.insert(&record("f1", None, None, 10, 0)).await.unwrap(), InsertOutcome::Unhashed);
        assert_eq!(store.insert(&record("f2", None, None, 10, 1)).await.unwrap(), InsertOutcome::Unhashed);
        assert!(store.lookup_by_remote_id("f2").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_records_with_both_hashes_only_join_primary_group() {
        let store = store().await;
        store.insert(&record("f1", Some("aaa"), Some("sss"), 10, 0)).await.unwrap();
        let outcome = store.insert(&record("f2", Some("bbb"), Some("sss"), 10, 1)).await.unwrap();
        assert_eq!(outcome, InsertOutcome::Unique(GroupKey::new("bbb", HashKind::Primary)));
        assert_eq!(store.group(&GroupKey::new("sss", HashKind::Secondary)).await.unwrap(), None);
        // The raw secondary lookup still sees both.
        assert_eq!(store.lookup_by_hash("sss", HashKind::Secondary, None, 0).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_lookup_by_hash_orders_oldest_first_with_remote_id_tiebreak() {
        let store = store().await;
        store.insert(&record("c", Some("aaa"), None, 1, 10)).await.unwrap();
        store.insert(&record("b", Some("aaa"), None, 1, 0)).await.unwrap();
        store.insert(&record("a", Some("aaa"), None, 1, 10)).await.unwrap();
        let ids = |records: Vec<FileRecord>| records.into_iter().map(|r| r.remote_id).collect::<Vec<_>>();
        let all = store.lookup_by_hash("AAA", HashKind::Primary, None, 0).await.unwrap();
        assert_eq!(ids(all), ["b", "a", "c"]);
        let page = store.lookup_by_hash("aaa", HashKind::Primary, Some(1), 1).await.unwrap();
        assert_eq!(ids(page), ["a"]);
        assert!(store.lookup_by_hash("", HashKind::Primary, None, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_wasted_bytes_follow_canonical_member() {
        let store = store().await;
        store.insert(&record("new", Some("aaa"), None, 50, 10)).await.unwrap();
        // Older record arrives later and becomes the canonical copy.
        let outcome = store.insert(&record("old", Some("aaa"), None, 70, 0)).await.unwrap();
        assert_eq!(outcome.group().map(|g| g.wasted_bytes), Some(50));
    }

    #[tokio::test]
    async fn test_remove_shrinks_then_dissolves() {
        let store = store().await;
        for (id, age) in [("f1", 0), ("f2", 1), ("f3", 2)] {
            store.insert(&record(id, Some("aaa"), None, 100, age)).await.unwrap();
        }
        let key = GroupKey::new("aaa", HashKind::Primary);
        let removed = store.remove("f1").await.unwrap();
        assert_eq!(removed.record.remote_id, "f1");
        let GroupChange::Shrunk(group) = removed.group else { panic!("expected shrink") };
        assert_eq!((group.member_count, group.total_size_bytes, group.wasted_bytes), (2, 200, 100));
        assert_eq!(store.remove("f2").await.unwrap().group, GroupChange::Dissolved(key.clone()));
        assert_eq!(store.group(&key).await.unwrap(), None);
        assert!(store.lookup_by_remote_id("f3").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_remove_missing_is_not_found() {
        let store = store().await;
        let err = store.remove("ghost").await.unwrap_err();
        assert_eq!(*err, ErrorKind::NotFound("ghost".to_string()));
    }

    #[tokio::test]
    async fn test_set_local_path() {
        let store = store().await;
        store.insert(&record("f1", Some("aaa"), None, 1, 0)).await.unwrap();
        store.set_local_path("f1", "/downloads/f1.bin").await.unwrap();
        let stored = store.lookup_by_remote_id("f1").await.unwrap().unwrap();
        assert_eq!(stored.local_path.as_deref(), Some("/downloads/f1.bin"));
        let err = store.set_local_path("ghost", "/tmp/x").await.unwrap_err();
        assert_eq!(*err, ErrorKind::NotFound("ghost".to_string()));
    }

    #[tokio::test]
    async fn test_lookup_by_source() {
        let store = store().await;
        store.insert(&record("f1", Some("aaa"), None, 1, 0)).await.unwrap();
        let mut other = record("f2", Some("bbb"), None, 1, 1);
        other.source_id = "shared".to_string();
        store.insert(&other).await.unwrap();
        let found = store.lookup_by_source("shared", None, 0).await.unwrap();
        assert_eq!(found, vec![other]);
    }

    #[tokio::test]
    async fn test_rebuild_repairs_and_drops() {
        let store = store().await;
        store.insert(&record("f1", Some("aaa"), None, 100, 0)).await.unwrap();
        store.insert(&record("f2", Some("aaa"), None, 100, 1)).await.unwrap();
        store.insert(&record("f3", None, None, 5, 2)).await.unwrap();
        // Corrupt the derived state behind the store's back.
        sqlx::query("UPDATE duplicate_groups SET member_count = 7")
            .execute(store.pool())
            .await
            .unwrap();
        sqlx::query("INSERT INTO duplicate_groups VALUES ('zzz', 'secondary', 2, 2, 1, 0)")
            .execute(store.pool())
            .await
            .unwrap();
        let report = store.rebuild().await.unwrap();
        assert_eq!(report, RebuildReport {
            records_scanned: 3,
            records_skipped: 1,
            groups_rebuilt: 1,
            groups_created: 0,
            groups_dropped: 1,
            groups_repaired: 1,
        });
        let group = store.group(&GroupKey::new("aaa", HashKind::Primary)).await.unwrap().unwrap();
        assert_eq!(group.member_count, 2);
    }

    #[tokio::test]
    async fn test_rebuild_dates_new_groups_by_second_member() {
        let store = store().await;
        store.insert(&record("f1", Some("aaa"), None, 1, 0)).await.unwrap();
        store.insert(&record("f2", Some("aaa"), None, 1, 30)).await.unwrap();
        sqlx::query("DELETE FROM duplicate_groups").execute(store.pool()).await.unwrap();
        let report = store.rebuild().await.unwrap();
        assert_eq!(report.groups_created, 1);
        let group = store.group(&GroupKey::new("aaa", HashKind::Primary)).await.unwrap().unwrap();
        assert_eq!(group.created_at, record("f2", None, None, 0, 30).ingested_at);
    }
}
