use crate::error::{Error, ErrorKind};
use crate::models::{HashKind, normalize_hash};
use exn::ResultExt;
use time::UtcDateTime;

/// Identifies a duplicate group: one hash value under one hash kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupKey {
    pub hash_value: String,
    pub hash_kind: HashKind,
}
impl GroupKey {
    pub fn new(hash_value: impl Into<String>, hash_kind: HashKind) -> Self {
        Self { hash_value: hash_value.into(), hash_kind }
    }

    /// Key for a checksum as typed or listed remotely. Blank checksums name
    /// no group.
    pub fn normalized(hash_value: impl AsRef<str>, hash_kind: HashKind) -> Option<Self> {
        normalize_hash(hash_value).map(|hash| Self::new(hash, hash_kind))
    }

    /// Primary checksum if present, otherwise secondary, otherwise no group.
    pub(crate) fn for_hashes(primary: Option<&str>, secondary: Option<&str>) -> Option<Self> {
        match (primary.and_then(normalize_hash), secondary.and_then(normalize_hash)) {
            (Some(hash), _) => Some(Self::new(hash, HashKind::Primary)),
            (None, Some(hash)) => Some(Self::new(hash, HashKind::Secondary)),
            (None, None) => None,
        }
    }
}

/// Aggregate over two or more file records sharing one [`GroupKey`].
///
/// Derived state: always re-derivable from the file records themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateGroup {
    pub hash_value: String,
    pub hash_kind: HashKind,
    pub member_count: u64,
    pub total_size_bytes: u64,
    /// Total size minus the size of the canonical (oldest) member.
    pub wasted_bytes: u64,
    /// When the group first reached two members.
    pub created_at: UtcDateTime,
}
impl DuplicateGroup {
    pub fn key(&self) -> GroupKey {
        GroupKey::new(self.hash_value.clone(), self.hash_kind)
    }

    /// Copies beyond the canonical one.
    pub fn extra_copies(&self) -> u64 {
        self.member_count.saturating_sub(1)
    }

    /// Same counters, ignoring `created_at`.
    pub fn same_counters(&self, other: &Self) -> bool {
        self.key() == other.key()
            && self.member_count == other.member_count
            && self.total_size_bytes == other.total_size_bytes
            && self.wasted_bytes == other.wasted_bytes
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct GroupRow {
    pub(crate) hash_value: String,
    pub(crate) hash_kind: String,
    pub(crate) member_count: i64,
    pub(crate) total_size_bytes: i64,
    pub(crate) wasted_bytes: i64,
    pub(crate) created_at: i64,
}
impl TryFrom<&DuplicateGroup> for GroupRow {
    type Error = Error;
    fn try_from(group: &DuplicateGroup) -> Result<Self, Self::Error> {
        Ok(Self {
            hash_value: group.hash_value.clone(),
            hash_kind: group.hash_kind.as_str().to_string(),
            member_count: i64::try_from(group.member_count).or_raise(|| ErrorKind::InvalidData("member count"))?,
            total_size_bytes: i64::try_from(group.total_size_bytes)
                .or_raise(|| ErrorKind::InvalidData("total size"))?,
            wasted_bytes: i64::try_from(group.wasted_bytes).or_raise(|| ErrorKind::InvalidData("wasted size"))?,
            created_at: group.created_at.unix_timestamp(),
        })
    }
}
impl TryFrom<GroupRow> for DuplicateGroup {
    type Error = Error;
    fn try_from(row: GroupRow) -> Result<Self, Self::Error> {
        Ok(Self {
            hash_value: row.hash_value,
            hash_kind: row.hash_kind.parse()?,
            member_count: u64::try_from(row.member_count).or_raise(|| ErrorKind::InvalidData("member count"))?,
            total_size_bytes: u64::try_from(row.total_size_bytes).or_raise(|| ErrorKind::InvalidData("total size"))?,
            wasted_bytes: u64::try_from(row.wasted_bytes).or_raise(|| ErrorKind::InvalidData("wasted size"))?,
            created_at: UtcDateTime::from_unix_timestamp(row.created_at)
                .or_raise(|| ErrorKind::InvalidData("group creation date"))?,
        })
    }
}
