//! Statement text and the small fetch helpers shared by the store, resolver,
//! aggregator and reporter.
//!
//! Every helper takes a bare connection so callers can run it either on a
//! pooled connection or inside an open transaction.

use crate::error::{ErrorKind, Result};
use crate::models::{DuplicateGroup, FileRecord, GroupKey, GroupRow, HashKind, RecordRow};
use exn::ResultExt;
use sqlx::SqliteConnection;

/// Statements whose hash column depends on the [`HashKind`].
pub(crate) struct KindQueries {
    /// Raw index lookup on the hash column, paginated.
    pub(crate) lookup: &'static str,
    /// Records contributing to the group of that kind.
    pub(crate) members: &'static str,
    pub(crate) count_members: &'static str,
    pub(crate) canonical_size: &'static str,
}

const PRIMARY: KindQueries = KindQueries {
    lookup: include_str!("../queries/lookup_by_primary_hash.sql"),
    members: include_str!("../queries/members_primary.sql"),
    count_members: include_str!("../queries/count_members_primary.sql"),
    canonical_size: include_str!("../queries/canonical_size_primary.sql"),
};
const SECONDARY: KindQueries = KindQueries {
    lookup: include_str!("../queries/lookup_by_secondary_hash.sql"),
    members: include_str!("../queries/members_secondary.sql"),
    count_members: include_str!("../queries/count_members_secondary.sql"),
    canonical_size: include_str!("../queries/canonical_size_secondary.sql"),
};

pub(crate) fn for_kind(kind: HashKind) -> &'static KindQueries {
    match kind {
        HashKind::Primary => &PRIMARY,
        HashKind::Secondary => &SECONDARY,
    }
}

/// SQLite reads a negative `LIMIT` as unbounded.
pub(crate) fn sql_limit(limit: Option<usize>) -> Result<i64> {
    limit.map_or(Ok(-1), |limit| i64::try_from(limit).or_raise(|| ErrorKind::InvalidData("limit")))
}

pub(crate) fn sql_offset(offset: usize) -> Result<i64> {
    i64::try_from(offset).or_raise(|| ErrorKind::InvalidData("offset"))
}

pub(crate) fn into_records(rows: Vec<RecordRow>) -> Result<Vec<FileRecord>> {
    rows.into_iter().map(FileRecord::try_from).collect()
}

pub(crate) async fn fetch_record(conn: &mut SqliteConnection, remote_id: &str) -> Result<Option<FileRecord>> {
    let row: Option<RecordRow> = sqlx::query_as(include_str!("../queries/get_by_remote_id.sql"))
        .bind(remote_id)
        .fetch_optional(&mut *conn)
        .await
        .or_raise(|| ErrorKind::StorageUnavailable)?;
    row.map(FileRecord::try_from).transpose()
}

pub(crate) async fn fetch_by_hash(
    conn: &mut SqliteConnection,
    hash_value: &str,
    kind: HashKind,
    limit: Option<usize>,
    offset: usize,
) -> Result<Vec<FileRecord>> {
    let rows: Vec<RecordRow> = sqlx::query_as(for_kind(kind).lookup)
        .bind(hash_value)
        .bind(sql_limit(limit)?)
        .bind(sql_offset(offset)?)
        .fetch_all(&mut *conn)
        .await
        .or_raise(|| ErrorKind::StorageUnavailable)?;
    into_records(rows)
}

pub(crate) async fn fetch_members(conn: &mut SqliteConnection, key: &GroupKey) -> Result<Vec<FileRecord>> {
    let rows: Vec<RecordRow> = sqlx::query_as(for_kind(key.hash_kind).members)
        .bind(&key.hash_value)
        .fetch_all(&mut *conn)
        .await
        .or_raise(|| ErrorKind::StorageUnavailable)?;
    into_records(rows)
}

pub(crate) async fn fetch_group(conn: &mut SqliteConnection, key: &GroupKey) -> Result<Option<DuplicateGroup>> {
    let row: Option<GroupRow> = sqlx::query_as(include_str!("../queries/get_group.sql"))
        .bind(&key.hash_value)
        .bind(key.hash_kind.as_str())
        .fetch_optional(&mut *conn)
        .await
        .or_raise(|| ErrorKind::StorageUnavailable)?;
    row.map(DuplicateGroup::try_from).transpose()
}

pub(crate) async fn fetch_all_groups(conn: &mut SqliteConnection) -> Result<Vec<DuplicateGroup>> {
    let rows: Vec<GroupRow> = sqlx::query_as(include_str!("../queries/list_all_groups.sql"))
        .fetch_all(&mut *conn)
        .await
        .or_raise(|| ErrorKind::StorageUnavailable)?;
    rows.into_iter().map(DuplicateGroup::try_from).collect()
}

/// Duplicate groups as they should be, recomputed from the file records.
pub(crate) async fn derive_groups(conn: &mut SqliteConnection) -> Result<Vec<DuplicateGroup>> {
    let rows: Vec<GroupRow> = sqlx::query_as(include_str!("../queries/derive_groups.sql"))
        .fetch_all(&mut *conn)
        .await
        .or_raise(|| ErrorKind::StorageUnavailable)?;
    rows.into_iter().map(DuplicateGroup::try_from).collect()
}
