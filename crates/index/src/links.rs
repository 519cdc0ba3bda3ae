//! Download links for duplicate group members.
//!
//! Links are rendered from a user-configured [upon] template, one per member
//! record. The template syntax follows upon's Mustache-like conventions
//! (`{{ variable }}`).
//!
//! # Template Variables
//!
//! | Variable     | Type             | Description                           |
//! |--------------|------------------|---------------------------------------|
//! | `remote_id`  | `String`         | Identifier assigned by remote storage |
//! | `name`       | `String`         | File name as listed remotely          |
//! | `source_id`  | `String`         | Remote storage location               |
//! | `local_path` | `Option<String>` | Local copy, if the file was fetched   |
//!
//! ```
//! use dupeguard_index::LinkGenerator;
//!
//! let links: LinkGenerator = "https://example.com/files/{{ remote_id }}".parse().unwrap();
//! # let record = dupeguard_index::InboundDescriptor::new("1AbC", "a.pdf", 1, "drive", "application/pdf")
//! #     .into_record(time::UtcDateTime::now());
//! assert_eq!(links.generate(&record).unwrap(), "https://example.com/files/1AbC");
//! ```

use crate::error::{Error, ErrorKind, Result};
use crate::models::FileRecord;
use exn::ResultExt;
use std::fmt;
use std::str::FromStr;
use time::UtcDateTime;
use upon::{Engine, Template};

/// Link template used when none is configured.
pub const DEFAULT_LINK_TEMPLATE: &str = "https://drive.google.com/uc?id={{ remote_id }}&export=download";

/// One member of a duplicate group, with its rendered download link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupLink {
    pub remote_id: String,
    pub name: String,
    pub size_bytes: u64,
    pub ingested_at: UtcDateTime,
    pub local_path: Option<String>,
    pub link: String,
}

/// Renders download links for [`FileRecord`]s from a template string.
///
/// Constructed via [`FromStr`], which compiles the template eagerly so syntax
/// errors surface at creation time rather than at render time.
pub struct LinkGenerator {
    engine: Engine<'static>,
    template: Template<'static>,
    source: String,
}
impl FromStr for LinkGenerator {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let engine = Engine::new();
        let template = engine.compile(s.to_string()).or_raise(|| ErrorKind::Template)?;
        Ok(Self { engine, template, source: s.to_string() })
    }
}
impl fmt::Debug for LinkGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkGenerator").field("template", &self.source).finish()
    }
}
impl LinkGenerator {
    pub fn generate(&self, record: &FileRecord) -> Result<String> {
        let link = self
            .template
            .render(&self.engine, Self::parameters(record))
            .to_string()
            .or_raise(|| ErrorKind::Template)?;
        Ok(link.trim().to_string())
    }

    pub fn link(&self, record: FileRecord) -> Result<GroupLink> {
        let link = self.generate(&record)?;
        Ok(GroupLink {
            remote_id: record.remote_id,
            name: record.name,
            size_bytes: record.size_bytes,
            ingested_at: record.ingested_at,
            local_path: record.local_path,
            link,
        })
    }

    fn parameters(record: &FileRecord) -> upon::Value {
        upon::value! {
            remote_id: &record.remote_id,
            name: &record.name,
            source_id: &record.source_id,
            local_path: record.local_path.as_deref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::InboundDescriptor;

    fn record() -> FileRecord {
        InboundDescriptor::new("1AbC", "report.pdf", 42, "team-drive", "application/pdf").into_record(UtcDateTime::now())
    }

    #[test]
    fn test_default_template() {
        let link = DEFAULT_LINK_TEMPLATE.parse::<LinkGenerator>().unwrap().generate(&record()).unwrap();
        assert_eq!(link, "https://drive.google.com/uc?id=1AbC&export=download");
    }

    #[test]
    fn test_all_variables() {
        let links: LinkGenerator = "{{ source_id }}/{{ name }}/{{ remote_id }}".parse().unwrap();
        assert_eq!(links.generate(&record()).unwrap(), "team-drive/report.pdf/1AbC");
    }

    #[test]
    fn test_optional_local_path() {
        let links: LinkGenerator = "{% if local_path %}file://{{ local_path }}{% else %}{{ remote_id }}{% endif %}"
            .parse()
            .unwrap();
        assert_eq!(links.generate(&record()).unwrap(), "1AbC");
        let fetched = record().with_local_path("/srv/report.pdf");
        assert_eq!(links.generate(&fetched).unwrap(), "file:///srv/report.pdf");
    }

    #[test]
    fn test_link_keeps_member_details() {
        let links: LinkGenerator = DEFAULT_LINK_TEMPLATE.parse().unwrap();
        let link = links.link(record().with_local_path("/srv/report.pdf")).unwrap();
        assert_eq!(link.remote_id, "1AbC");
        assert_eq!(link.size_bytes, 42);
        assert_eq!(link.local_path.as_deref(), Some("/srv/report.pdf"));
    }

    #[test]
    fn test_invalid_template() {
        let err = "{{ remote_id".parse::<LinkGenerator>().unwrap_err();
        assert_eq!(*err, ErrorKind::Template);
    }

    #[test]
    fn test_unknown_variable_fails_at_render() {
        let links: LinkGenerator = "{{ checksum }}".parse().unwrap();
        let err = links.generate(&record()).unwrap_err();
        assert_eq!(*err, ErrorKind::Template);
    }
}
