//! Administrative operations: single-record removal, full group rebuilds and
//! consistency checks of the derived group state.

use crate::Database;
use crate::error::{ErrorKind, Result};
use crate::models::{DuplicateGroup, GroupKey};
use crate::queries;
use crate::store::{RebuildReport, RemoveOutcome, Store};
use derive_more::Display;
use exn::ResultExt;
use std::collections::BTreeMap;
use tracing::instrument;

/// A difference between a stored group row and the group recomputed from the
/// file records.
#[derive(Debug, Display, Clone, PartialEq, Eq)]
pub enum Discrepancy {
    /// Two or more records share a key but no group row exists.
    #[display("missing {} group {} ({} members)", expected.hash_kind, expected.hash_value, expected.member_count)]
    Missing { expected: DuplicateGroup },
    /// A group row exists without two or more records behind it.
    #[display("orphaned {} group {}", stored.hash_kind, stored.hash_value)]
    Orphaned { stored: DuplicateGroup },
    /// A group row exists with counters that disagree with its records.
    #[display(
        "drifted {} group {}: stored {}/{}/{}, expected {}/{}/{} (members/total/wasted)",
        stored.hash_kind, stored.hash_value,
        stored.member_count, stored.total_size_bytes, stored.wasted_bytes,
        expected.member_count, expected.total_size_bytes, expected.wasted_bytes
    )]
    Drifted { stored: DuplicateGroup, expected: DuplicateGroup },
}
impl Discrepancy {
    pub fn key(&self) -> GroupKey {
        match self {
            Self::Missing { expected } => expected.key(),
            Self::Orphaned { stored } | Self::Drifted { stored, .. } => stored.key(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Maintenance {
    store: Store,
}
impl From<&Database> for Maintenance {
    fn from(db: &Database) -> Self {
        Self { store: Store::from(db) }
    }
}
impl Maintenance {
    /// Remove one record; [`ErrorKind::NotFound`] is passed up unchanged.
    pub async fn remove_record(&self, remote_id: impl AsRef<str>) -> Result<RemoveOutcome> {
        self.store.remove(remote_id).await
    }

    pub async fn rebuild_all(&self) -> Result<RebuildReport> {
        self.store.rebuild().await
    }

    /// Compare every stored group with a from-scratch recomputation.
    ///
    /// Read-only: discrepancies are reported, never corrected. Stored and
    /// recomputed groups are read from the same snapshot. A group's
    /// `created_at` is not compared.
    #[instrument(skip_all)]
    pub async fn verify_consistency(&self) -> Result<Vec<Discrepancy>> {
        let mut tx = self.store.pool().begin().await.or_raise(|| ErrorKind::StorageUnavailable)?;
        let stored = queries::fetch_all_groups(&mut tx).await?;
        let expected = queries::derive_groups(&mut tx).await?;
        tx.commit().await.or_raise(|| ErrorKind::StorageUnavailable)?;

        let mut expected = expected.into_iter().map(|group| (group.key(), group)).collect::<BTreeMap<_, _>>();
        let mut discrepancies = Vec::new();
        for stored in stored {
            match expected.remove(&stored.key()) {
                None => discrepancies.push(Discrepancy::Orphaned { stored }),
                Some(expected) if !stored.same_counters(&expected) => {
                    discrepancies.push(Discrepancy::Drifted { stored, expected });
                },
                Some(_) => {},
            }
        }
        discrepancies.extend(expected.into_values().map(|expected| Discrepancy::Missing { expected }));
        discrepancies.sort_by_key(Discrepancy::key);
        if !discrepancies.is_empty() {
            tracing::warn!(count = discrepancies.len(), "duplicate groups drifted from file records");
        }
        Ok(discrepancies)
    }

    /// Like [`verify_consistency`](Self::verify_consistency), but any drift is
    /// an [`ErrorKind::Inconsistent`] error.
    pub async fn check_consistency(&self) -> Result<()> {
        let discrepancies = self.verify_consistency().await?;
        if !discrepancies.is_empty() {
            exn::bail!(ErrorKind::Inconsistent(discrepancies.len()));
        }
        Ok(())
    }
}
