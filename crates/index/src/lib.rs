//! Content-addressable duplicate detection for a file-transfer pipeline.
//!
//! Before fetching a remote file, the pipeline asks the [`Resolver`] whether
//! equivalent content is already stored. After a transfer (or an accepted
//! short-circuit) it registers the file with the [`Store`]. The command
//! surface reads efficiency metrics through the [`Reporter`] and repairs the
//! index through [`Maintenance`].
//!
//! # Architecture
//! The SQLite database holds two tables:
//! - **File records**: one per known remote file, keyed by the identifier the
//!   remote storage assigned to it and indexed on both checksums and on the
//!   storage location it was listed from.
//! - **Duplicate groups**: one per `(hash value, hash kind)` shared by two or
//!   more records. This is derived state, maintained incrementally inside the
//!   transaction of every insert and removal, and always re-derivable from the
//!   file records with [`Store::rebuild`].
//!
//! A record contributes to at most one group: its primary checksum's if it
//! has one, otherwise its secondary checksum's.
//!
//! All handles are created from one [`Database`], opened at process start and
//! closed at shutdown. Handles derived from the same database share a writer
//! lock; reads never take it.

mod aggregate;
mod db;
pub mod error;
mod links;
mod maintenance;
mod models;
mod queries;
mod resolve;
mod stats;
mod store;

pub use crate::aggregate::{GroupChange, InsertOutcome};
pub use crate::db::{Database, PoolSettings};
pub use crate::links::{DEFAULT_LINK_TEMPLATE, GroupLink, LinkGenerator};
pub use crate::maintenance::{Discrepancy, Maintenance};
pub use crate::models::{DuplicateGroup, FileRecord, GroupKey, HashKind, InboundDescriptor};
pub use crate::resolve::{Resolver, Verdict};
pub use crate::stats::{GlobalStats, KindStats, Reporter, SourceStats};
pub use crate::store::{RebuildReport, RemoveOutcome, Store};
