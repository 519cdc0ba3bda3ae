//! Read-only projections over the index: efficiency metrics and duplicate
//! listings for the command surface.

use crate::Database;
use crate::error::{ErrorKind, Result};
use crate::links::{GroupLink, LinkGenerator};
use crate::models::{DuplicateGroup, FileRecord, GroupKey, GroupRow, HashKind, normalize_hash};
use crate::queries::{self, sql_limit, sql_offset};
use exn::ResultExt;
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use tracing::instrument;

/// Duplicate totals for one [`HashKind`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KindStats {
    pub group_count: u64,
    pub duplicate_file_count: u64,
    pub wasted_bytes: u64,
}

/// Index-wide totals.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GlobalStats {
    pub total_files: u64,
    pub total_size_bytes: u64,
    /// Records without any checksum; retained for identifier lookups only.
    pub unhashed_files: u64,
    pub duplicate_group_count: u64,
    /// Copies beyond the canonical one, summed over every group.
    pub duplicate_file_count: u64,
    pub wasted_bytes: u64,
    /// Share of stored bytes that are not redundant copies; `0.0` for an
    /// empty index.
    pub efficiency_percent: f64,
    pub by_kind: BTreeMap<HashKind, KindStats>,
}

/// File count and size for one remote storage location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceStats {
    pub source_id: String,
    pub file_count: u64,
    pub total_size_bytes: u64,
}

#[derive(Debug, Clone)]
pub struct Reporter {
    pool: SqlitePool,
}
impl From<&Database> for Reporter {
    fn from(db: &Database) -> Self {
        Self { pool: db.pool().clone() }
    }
}
impl Reporter {
    /// Totals over records and groups, read from a single snapshot.
    #[instrument(skip_all)]
    pub async fn global_stats(&self) -> Result<GlobalStats> {
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::StorageUnavailable)?;
        let (total_files, total_size_bytes, unhashed_files): (i64, i64, i64) =
            sqlx::query_as(include_str!("../queries/record_totals.sql"))
                .fetch_one(&mut *tx)
                .await
                .or_raise(|| ErrorKind::StorageUnavailable)?;
        let per_kind: Vec<(String, i64, i64, i64)> = sqlx::query_as(include_str!("../queries/group_totals.sql"))
            .fetch_all(&mut *tx)
            .await
            .or_raise(|| ErrorKind::StorageUnavailable)?;
        tx.commit().await.or_raise(|| ErrorKind::StorageUnavailable)?;

        let mut stats = GlobalStats {
            total_files: count(total_files, "file count")?,
            total_size_bytes: count(total_size_bytes, "total size")?,
            unhashed_files: count(unhashed_files, "file count")?,
            by_kind: HashKind::ALL.into_iter().map(|kind| (kind, KindStats::default())).collect(),
            ..GlobalStats::default()
        };
        for (kind, groups, duplicates, wasted) in per_kind {
            let kind_stats = KindStats {
                group_count: count(groups, "group count")?,
                duplicate_file_count: count(duplicates, "duplicate count")?,
                wasted_bytes: count(wasted, "wasted size")?,
            };
            stats.duplicate_group_count += kind_stats.group_count;
            stats.duplicate_file_count += kind_stats.duplicate_file_count;
            stats.wasted_bytes += kind_stats.wasted_bytes;
            stats.by_kind.insert(kind.parse()?, kind_stats);
        }
        stats.efficiency_percent = efficiency(stats.total_size_bytes, stats.wasted_bytes);
        Ok(stats)
    }

    /// Groups of one kind, most wasted bytes first; ties go to the older group.
    pub async fn list_groups(&self, kind: HashKind, limit: Option<usize>, offset: usize) -> Result<Vec<DuplicateGroup>> {
        let rows: Vec<GroupRow> = sqlx::query_as(include_str!("../queries/list_groups.sql"))
            .bind(kind.as_str())
            .bind(sql_limit(limit)?)
            .bind(sql_offset(offset)?)
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::StorageUnavailable)?;
        rows.into_iter().map(DuplicateGroup::try_from).collect()
    }

    /// Records counted by the group, canonical copy first.
    ///
    /// Empty when the hash is unknown or no longer duplicated.
    pub async fn list_group_members(&self, hash_value: impl AsRef<str>, kind: HashKind) -> Result<Vec<FileRecord>> {
        let Some(hash_value) = normalize_hash(hash_value) else {
            return Ok(Vec::new());
        };
        let mut conn = self.pool.acquire().await.or_raise(|| ErrorKind::StorageUnavailable)?;
        let members = queries::fetch_members(&mut conn, &GroupKey::new(hash_value, kind)).await?;
        // A single record is not a group.
        Ok(if members.len() < 2 { Vec::new() } else { members })
    }

    /// Group members with a download link rendered for each.
    pub async fn list_group_links(
        &self,
        hash_value: impl AsRef<str>,
        kind: HashKind,
        links: &LinkGenerator,
    ) -> Result<Vec<GroupLink>> {
        self.list_group_members(hash_value, kind).await?.into_iter().map(|record| links.link(record)).collect()
    }

    /// File count and size per remote storage location, largest first.
    pub async fn source_breakdown(&self) -> Result<Vec<SourceStats>> {
        let rows: Vec<(String, i64, i64)> = sqlx::query_as(include_str!("../queries/source_breakdown.sql"))
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::StorageUnavailable)?;
        rows.into_iter()
            .map(|(source_id, files, size)| {
                Ok(SourceStats {
                    source_id,
                    file_count: count(files, "file count")?,
                    total_size_bytes: count(size, "total size")?,
                })
            })
            .collect()
    }
}

fn count(value: i64, field: &'static str) -> Result<u64> {
    u64::try_from(value).or_raise(|| ErrorKind::InvalidData(field))
}

fn efficiency(total: u64, wasted: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    100.0 * total.saturating_sub(wasted) as f64 / total as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Store;
    use crate::links::DEFAULT_LINK_TEMPLATE;
    use crate::models::InboundDescriptor;
    use rstest::rstest;
    use time::{Duration, UtcDateTime};

    async fn setup() -> (Store, Reporter) {
        let db = Database::connect_in_memory().await.unwrap();
        (Store::from(&db), Reporter::from(&db))
    }

    async fn ingest(store: &Store, remote_id: &str, primary: Option<&str>, secondary: Option<&str>, size: u64, age: i64) {
        let mut descriptor = InboundDescriptor::new(remote_id, format!("{remote_id}.zip"), size, "drive", "application/zip");
        descriptor.primary_hash = primary.map(str::to_string);
        descriptor.secondary_hash = secondary.map(str::to_string);
        let ingested = UtcDateTime::from_unix_timestamp(1_760_000_000).unwrap() + Duration::seconds(age);
        store.insert(&descriptor.into_record(ingested)).await.unwrap();
    }

    #[rstest]
    #[case(0, 0, 0.0)]
    #[case(200, 0, 100.0)]
    #[case(200, 100, 50.0)]
    #[case(400, 300, 25.0)]
    fn test_efficiency(#[case] total: u64, #[case] wasted: u64, #[case] expected: f64) {
        assert!((efficiency(total, wasted) - expected).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_empty_index() {
        let (_, reporter) = setup().await;
        let stats = reporter.global_stats().await.unwrap();
        assert_eq!(stats.total_files, 0);
        assert_eq!(stats.duplicate_group_count, 0);
        assert_eq!(stats.efficiency_percent, 0.0);
        assert_eq!(stats.by_kind.len(), 2);
    }

    #[tokio::test]
    async fn test_global_stats_split_by_kind() {
        let (store, reporter) = setup().await;
        ingest(&store, "p1", Some("aaa"), None, 100, 0).await;
        ingest(&store, "p2", Some("aaa"), None, 100, 1).await;
        ingest(&store, "p3", Some("aaa"), None, 100, 2).await;
        ingest(&store, "s1", None, Some("sss"), 50, 3).await;
        ingest(&store, "s2", None, Some("sss"), 50, 4).await;
        ingest(&store, "u1", None, None, 10, 5).await;
        let stats = reporter.global_stats().await.unwrap();
        assert_eq!(stats.total_files, 6);
        assert_eq!(stats.total_size_bytes, 410);
        assert_eq!(stats.unhashed_files, 1);
        assert_eq!(stats.duplicate_group_count, 2);
        assert_eq!(stats.duplicate_file_count, 3);
        assert_eq!(stats.wasted_bytes, 250);
        assert_eq!(stats.by_kind[&HashKind::Primary], KindStats {
            group_count: 1,
            duplicate_file_count: 2,
            wasted_bytes: 200
        });
        assert_eq!(stats.by_kind[&HashKind::Secondary], KindStats {
            group_count: 1,
            duplicate_file_count: 1,
            wasted_bytes: 50
        });
        assert!((stats.efficiency_percent - 100.0 * 160.0 / 410.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_list_groups_orders_by_waste_then_age() {
        let (store, reporter) = setup().await;
        ingest(&store, "a1", Some("aaa"), None, 10, 0).await;
        ingest(&store, "a2", Some("aaa"), None, 10, 1).await;
        ingest(&store, "b1", Some("bbb"), None, 90, 2).await;
        ingest(&store, "b2", Some("bbb"), None, 90, 3).await;
        ingest(&store, "c1", Some("ccc"), None, 10, 4).await;
        ingest(&store, "c2", Some("ccc"), None, 10, 5).await;
        // "aaa" and "ccc" waste the same; "aaa" formed first (or in the same
        // second, where the hash breaks the tie).
        let groups = reporter.list_groups(HashKind::Primary, None, 0).await.unwrap();
        let hashes = groups.iter().map(|g| g.hash_value.as_str()).collect::<Vec<_>>();
        assert_eq!(hashes, ["bbb", "aaa", "ccc"]);
        let page = reporter.list_groups(HashKind::Primary, Some(1), 1).await.unwrap();
        assert_eq!(page.len(), 1);
        assert!(reporter.list_groups(HashKind::Secondary, None, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_group_members_only_counts_contributors() {
        let (store, reporter) = setup().await;
        ingest(&store, "s1", None, Some("sss"), 5, 0).await;
        ingest(&store, "s2", None, Some("sss"), 5, 1).await;
        // Has a primary hash, so it belongs to the primary group "ppp" instead.
        ingest(&store, "s3", Some("ppp"), Some("sss"), 5, 2).await;
        let members = reporter.list_group_members("SSS", HashKind::Secondary).await.unwrap();
        let ids = members.iter().map(|r| r.remote_id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, ["s1", "s2"]);
        assert!(reporter.list_group_members("ppp", HashKind::Primary).await.unwrap().is_empty());
        assert!(reporter.list_group_members("", HashKind::Primary).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_group_links() {
        let (store, reporter) = setup().await;
        ingest(&store, "f1", Some("aaa"), None, 5, 0).await;
        ingest(&store, "f2", Some("aaa"), None, 5, 1).await;
        let links: LinkGenerator = DEFAULT_LINK_TEMPLATE.parse().unwrap();
        let rendered = reporter.list_group_links("aaa", HashKind::Primary, &links).await.unwrap();
        let urls = rendered.iter().map(|l| l.link.as_str()).collect::<Vec<_>>();
        assert_eq!(urls, [
            "https://drive.google.com/uc?id=f1&export=download",
            "https://drive.google.com/uc?id=f2&export=download",
        ]);
    }

    #[tokio::test]
    async fn test_source_breakdown() {
        let (store, reporter) = setup().await;
        ingest(&store, "f1", Some("aaa"), None, 5, 0).await;
        ingest(&store, "f2", Some("bbb"), None, 7, 1).await;
        let breakdown = reporter.source_breakdown().await.unwrap();
        assert_eq!(breakdown, vec![SourceStats { source_id: "drive".to_string(), file_count: 2, total_size_bytes: 12 }]);
    }
}
