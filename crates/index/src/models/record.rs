use crate::error::{Error, ErrorKind};
use crate::models::{GroupKey, HashKind, normalize_hash};
use exn::ResultExt;
use time::UtcDateTime;

/// Metadata about a remote file, supplied by the transfer pipeline after it
/// fetched the remote listing and before any bytes are transferred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundDescriptor {
    /// Identifier assigned by the remote storage system.
    pub remote_id: String,
    pub name: String,
    pub size_bytes: u64,
    /// Higher-trust checksum (hex), e.g. MD5.
    pub primary_hash: Option<String>,
    /// Lower-trust checksum (hex), e.g. SHA-1. Only consulted when the
    /// primary checksum is absent or unmatched.
    pub secondary_hash: Option<String>,
    /// Remote storage location the file was listed from.
    pub source_id: String,
    pub content_type: String,
}
impl InboundDescriptor {
    pub fn new(
        remote_id: impl Into<String>,
        name: impl Into<String>,
        size_bytes: u64,
        source_id: impl Into<String>,
        content_type: impl Into<String>,
    ) -> Self {
        Self {
            remote_id: remote_id.into(),
            name: name.into(),
            size_bytes,
            primary_hash: None,
            secondary_hash: None,
            source_id: source_id.into(),
            content_type: content_type.into(),
        }
    }

    pub fn with_primary_hash(self, hash: impl AsRef<str>) -> Self {
        Self { primary_hash: normalize_hash(hash), ..self }
    }

    pub fn with_secondary_hash(self, hash: impl AsRef<str>) -> Self {
        Self { secondary_hash: normalize_hash(hash), ..self }
    }

    /// The duplicate group a file with these checksums would belong to.
    pub fn group_key(&self) -> Option<GroupKey> {
        GroupKey::for_hashes(self.primary_hash.as_deref(), self.secondary_hash.as_deref())
    }

    /// Turn the descriptor into the record registered once the file has been
    /// transferred (or the transfer was short-circuited).
    pub fn into_record(self, ingested_at: UtcDateTime) -> FileRecord {
        FileRecord {
            remote_id: self.remote_id,
            name: self.name,
            size_bytes: self.size_bytes,
            primary_hash: self.primary_hash.and_then(normalize_hash),
            secondary_hash: self.secondary_hash.and_then(normalize_hash),
            source_id: self.source_id,
            content_type: self.content_type,
            ingested_at,
            local_path: None,
        }
    }
}

/// One known remote file.
///
/// Never updated once stored, except for [`local_path`](Self::local_path)
/// which is backfilled if the file was actually transferred locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub remote_id: String,
    pub name: String,
    pub size_bytes: u64,
    pub primary_hash: Option<String>,
    pub secondary_hash: Option<String>,
    pub source_id: String,
    pub content_type: String,
    pub ingested_at: UtcDateTime,
    pub local_path: Option<String>,
}
impl FileRecord {
    pub fn with_local_path(self, path: impl Into<String>) -> Self {
        Self { local_path: Some(path.into()), ..self }
    }

    /// The duplicate group this record contributes to.
    ///
    /// A record carrying both checksums only ever counts towards its primary
    /// group; records carrying neither never join a group.
    pub fn group_key(&self) -> Option<GroupKey> {
        GroupKey::for_hashes(self.primary_hash.as_deref(), self.secondary_hash.as_deref())
    }

    pub fn hash(&self, kind: HashKind) -> Option<&str> {
        match kind {
            HashKind::Primary => self.primary_hash.as_deref(),
            HashKind::Secondary => self.secondary_hash.as_deref(),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct RecordRow {
    pub(crate) remote_id: String,
    pub(crate) name: String,
    pub(crate) size_bytes: i64,
    pub(crate) primary_hash: Option<String>,
    pub(crate) secondary_hash: Option<String>,
    pub(crate) source_id: String,
    pub(crate) content_type: String,
    pub(crate) ingested_at: i64,
    pub(crate) local_path: Option<String>,
}
impl TryFrom<&FileRecord> for RecordRow {
    type Error = Error;
    fn try_from(record: &FileRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            remote_id: record.remote_id.clone(),
            name: record.name.clone(),
            size_bytes: i64::try_from(record.size_bytes).or_raise(|| ErrorKind::InvalidData("file size"))?,
            primary_hash: record.primary_hash.as_deref().and_then(normalize_hash),
            secondary_hash: record.secondary_hash.as_deref().and_then(normalize_hash),
            source_id: record.source_id.clone(),
            content_type: record.content_type.clone(),
            ingested_at: record.ingested_at.unix_timestamp(),
            local_path: record.local_path.clone(),
        })
    }
}
impl TryFrom<RecordRow> for FileRecord {
    type Error = Error;
    fn try_from(row: RecordRow) -> Result<Self, Self::Error> {
        Ok(Self {
            remote_id: row.remote_id,
            name: row.name,
            size_bytes: u64::try_from(row.size_bytes).or_raise(|| ErrorKind::InvalidData("file size"))?,
            primary_hash: row.primary_hash,
            secondary_hash: row.secondary_hash,
            source_id: row.source_id,
            content_type: row.content_type,
            ingested_at: UtcDateTime::from_unix_timestamp(row.ingested_at)
                .or_raise(|| ErrorKind::InvalidData("ingestion date"))?,
            local_path: row.local_path,
        })
    }
}
