mod group;
mod kind;
mod record;

pub use self::group::{DuplicateGroup, GroupKey};
pub(crate) use self::group::GroupRow;
pub use self::kind::HashKind;
pub(crate) use self::record::RecordRow;
pub use self::record::{FileRecord, InboundDescriptor};

/// Checksums arrive as hex from the remote; case and surrounding whitespace
/// carry no meaning. Blank values count as absent.
pub(crate) fn normalize_hash(hash: impl AsRef<str>) -> Option<String> {
    let hash = hash.as_ref().trim();
    (!hash.is_empty()).then(|| hash.to_ascii_lowercase())
}
