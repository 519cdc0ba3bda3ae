use crate::error::{Error, ErrorKind};
use derive_more::Display;
use std::str::FromStr;

/// Which of a file's two checksums a lookup or duplicate group refers to.
///
/// `Primary` is the higher-trust checksum (e.g. MD5 from the remote) and
/// always takes precedence. `Secondary` (e.g. SHA-1) is only a fallback key
/// for files that have no primary checksum.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HashKind {
    #[display("primary")]
    Primary,
    #[display("secondary")]
    Secondary,
}

impl HashKind {
    pub const ALL: [HashKind; 2] = [HashKind::Primary, HashKind::Secondary];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Secondary => "secondary",
        }
    }
}

impl FromStr for HashKind {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "primary" | "md5" => Ok(Self::Primary),
            "secondary" | "sha1" => Ok(Self::Secondary),
            _ => exn::bail!(ErrorKind::InvalidData("hash kind")),
        }
    }
}
