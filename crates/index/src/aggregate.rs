//! Incremental maintenance of the `duplicate_groups` rollups.
//!
//! These functions run inside the transaction that inserted or deleted the
//! file record, so a reader sees either both changes or neither. An existing
//! group is updated from its own counters; only when no group row exists yet
//! are the (at most one) earlier members counted. The canonical member's size
//! comes from an indexed `LIMIT 1` lookup on the group's hash column.

use crate::error::{ErrorKind, Result};
use crate::models::{DuplicateGroup, FileRecord, GroupKey, GroupRow};
use crate::queries::{self, for_kind};
use exn::ResultExt;
use sqlx::SqliteConnection;
use time::UtcDateTime;

/// What registering a record did to its duplicate group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The record has no checksum and never joins a group.
    Unhashed,
    /// First record with this checksum; no group yet.
    Unique(GroupKey),
    /// The record was the second member: a new group now exists.
    Formed(DuplicateGroup),
    /// The record joined an existing group.
    Extended(DuplicateGroup),
}
impl InsertOutcome {
    /// The group the record joined, if it is now a duplicate.
    pub fn group(&self) -> Option<&DuplicateGroup> {
        match self {
            Self::Formed(group) | Self::Extended(group) => Some(group),
            Self::Unhashed | Self::Unique(_) => None,
        }
    }
}

/// What removing a record did to its duplicate group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupChange {
    /// The record was not a member of any group.
    Unaffected,
    /// The group lost a member but still has at least two.
    Shrunk(DuplicateGroup),
    /// The group fell below two members and its row was deleted.
    Dissolved(GroupKey),
}

/// Update the group of a record that was just inserted on `conn`.
pub(crate) async fn record_added(conn: &mut SqliteConnection, record: &FileRecord) -> Result<InsertOutcome> {
    let Some(key) = record.group_key() else {
        return Ok(InsertOutcome::Unhashed);
    };
    if let Some(mut group) = queries::fetch_group(conn, &key).await? {
        group.member_count += 1;
        group.total_size_bytes += record.size_bytes;
        group.wasted_bytes = wasted_bytes(conn, &key, group.total_size_bytes).await?;
        store_group(conn, &group).await?;
        tracing::debug!(hash = %key.hash_value, kind = %key.hash_kind, members = group.member_count, "duplicate group extended");
        return Ok(InsertOutcome::Extended(group));
    }
    // Members counted here include the record just inserted.
    let (member_count, total_size_bytes) = count_members(conn, &key).await?;
    if member_count < 2 {
        return Ok(InsertOutcome::Unique(key));
    }
    if member_count > 2 {
        tracing::warn!(
            hash = %key.hash_value,
            kind = %key.hash_kind,
            members = member_count,
            "duplicate group row was missing for existing duplicates; a rebuild is advised"
        );
    }
    let group = DuplicateGroup {
        hash_value: key.hash_value.clone(),
        hash_kind: key.hash_kind,
        member_count,
        total_size_bytes,
        wasted_bytes: wasted_bytes(conn, &key, total_size_bytes).await?,
        // Stored with second precision.
        created_at: UtcDateTime::now()
            .replace_nanosecond(0)
            .or_raise(|| ErrorKind::InvalidData("group creation date"))?,
    };
    store_group(conn, &group).await?;
    tracing::debug!(hash = %key.hash_value, kind = %key.hash_kind, "duplicate group formed");
    Ok(InsertOutcome::Formed(group))
}

/// Update the group of a record that was just deleted on `conn`.
pub(crate) async fn record_removed(conn: &mut SqliteConnection, record: &FileRecord) -> Result<GroupChange> {
    let Some(key) = record.group_key() else {
        return Ok(GroupChange::Unaffected);
    };
    let Some(mut group) = queries::fetch_group(conn, &key).await? else {
        return Ok(GroupChange::Unaffected);
    };
    if group.member_count <= 2 {
        sqlx::query(include_str!("../queries/delete_group.sql"))
            .bind(&key.hash_value)
            .bind(key.hash_kind.as_str())
            .execute(&mut *conn)
            .await
            .or_raise(|| ErrorKind::StorageUnavailable)?;
        tracing::debug!(hash = %key.hash_value, kind = %key.hash_kind, "duplicate group dissolved");
        return Ok(GroupChange::Dissolved(key));
    }
    group.member_count -= 1;
    group.total_size_bytes = group.total_size_bytes.saturating_sub(record.size_bytes);
    group.wasted_bytes = wasted_bytes(conn, &key, group.total_size_bytes).await?;
    store_group(conn, &group).await?;
    tracing::debug!(hash = %key.hash_value, kind = %key.hash_kind, members = group.member_count, "duplicate group shrunk");
    Ok(GroupChange::Shrunk(group))
}

async fn count_members(conn: &mut SqliteConnection, key: &GroupKey) -> Result<(u64, u64)> {
    let (count, total): (i64, i64) = sqlx::query_as(for_kind(key.hash_kind).count_members)
        .bind(&key.hash_value)
        .fetch_one(&mut *conn)
        .await
        .or_raise(|| ErrorKind::StorageUnavailable)?;
    Ok((
        u64::try_from(count).or_raise(|| ErrorKind::InvalidData("member count"))?,
        u64::try_from(total).or_raise(|| ErrorKind::InvalidData("total size"))?,
    ))
}

/// Everything except the canonical (oldest) member is wasted.
async fn wasted_bytes(conn: &mut SqliteConnection, key: &GroupKey, total_size_bytes: u64) -> Result<u64> {
    let canonical: Option<i64> = sqlx::query_scalar(for_kind(key.hash_kind).canonical_size)
        .bind(&key.hash_value)
        .fetch_optional(&mut *conn)
        .await
        .or_raise(|| ErrorKind::StorageUnavailable)?;
    let canonical = canonical
        .map(|size| u64::try_from(size).or_raise(|| ErrorKind::InvalidData("file size")))
        .transpose()?
        .unwrap_or_default();
    Ok(total_size_bytes.saturating_sub(canonical))
}

pub(crate) async fn store_group(conn: &mut SqliteConnection, group: &DuplicateGroup) -> Result<()> {
    let row = GroupRow::try_from(group)?;
    sqlx::query(include_str!("../queries/upsert_group.sql"))
        .bind(row.hash_value)
        .bind(row.hash_kind)
        .bind(row.member_count)
        .bind(row.total_size_bytes)
        .bind(row.wasted_bytes)
        .bind(row.created_at)
        .execute(&mut *conn)
        .await
        .or_raise(|| ErrorKind::StorageUnavailable)?;
    Ok(())
}
