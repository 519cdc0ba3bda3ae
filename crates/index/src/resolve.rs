//! The duplicate resolver: decides, before any bytes are transferred, whether
//! an inbound file is already known.

use crate::Database;
use crate::error::{ErrorKind, Result};
use crate::models::{FileRecord, HashKind, InboundDescriptor, normalize_hash};
use crate::queries;
use exn::ResultExt;
use sqlx::SqlitePool;
use tracing::instrument;

/// Outcome of checking an [`InboundDescriptor`] against the index.
///
/// A duplicate is a normal verdict, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// The remote identifier is already indexed.
    ExactMatch(FileRecord),
    /// Other records share the candidate's content checksum.
    ContentMatch {
        /// Never empty; oldest (canonical) first.
        records: Vec<FileRecord>,
        kind: HashKind,
    },
    NoMatch,
}
impl Verdict {
    /// The stored record the caller would short-circuit to.
    pub fn canonical(&self) -> Option<&FileRecord> {
        match self {
            Self::ExactMatch(record) => Some(record),
            Self::ContentMatch { records, .. } => records.first(),
            Self::NoMatch => None,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        !matches!(self, Self::NoMatch)
    }
}

/// Read-only matcher over the hash index.
#[derive(Debug, Clone)]
pub struct Resolver {
    pool: SqlitePool,
}
impl From<&Database> for Resolver {
    fn from(db: &Database) -> Self {
        Self { pool: db.pool().clone() }
    }
}
impl Resolver {
    /// Match by remote identifier, then primary checksum, then secondary
    /// checksum; the first stage that finds anything decides the verdict.
    ///
    /// A primary match is authoritative: the secondary checksum is only
    /// consulted when the primary one is absent or matched nothing. All
    /// stages read the same snapshot. Storage failures are returned as errors,
    /// never as [`Verdict::NoMatch`].
    #[instrument(skip_all, fields(remote_id = %candidate.remote_id))]
    pub async fn resolve(&self, candidate: &InboundDescriptor) -> Result<Verdict> {
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::StorageUnavailable)?;
        if let Some(record) = queries::fetch_record(&mut tx, &candidate.remote_id).await? {
            tracing::debug!("remote id already indexed");
            return Ok(Verdict::ExactMatch(record));
        }
        let checksums = [
            (HashKind::Primary, candidate.primary_hash.as_deref()),
            (HashKind::Secondary, candidate.secondary_hash.as_deref()),
        ];
        for (kind, hash) in checksums {
            let Some(hash) = hash.and_then(normalize_hash) else {
                continue;
            };
            let records = queries::fetch_by_hash(&mut tx, &hash, kind, None, 0).await?;
            if !records.is_empty() {
                tracing::debug!(hash_kind = %kind, matches = records.len(), "content already indexed");
                return Ok(Verdict::ContentMatch { records, kind });
            }
        }
        Ok(Verdict::NoMatch)
    }
}
