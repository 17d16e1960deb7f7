//! Archive entry models.

use crate::integrity::Integrity;
use time::OffsetDateTime;

/// Whether an entry is a file read from the archive or a directory.
///
/// Directories are always synthesized from the paths of admitted files;
/// directory records inside the tarball itself are ignored, because plenty
/// of published tarballs omit them entirely.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntryKind {
    File,
    Directory,
}

/// Metadata computed for every admitted file while its payload streams past.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileMeta {
    /// Content type derived from the file extension
    pub content_type: &'static str,
    /// Subresource Integrity digest of the payload
    pub integrity: Integrity,
    /// Modification time recorded in the tar header
    pub last_modified: OffsetDateTime,
    /// Payload length in bytes
    pub size: u64,
}

/// A single file or directory inside a package tarball.
///
/// `name` is relative to the package root (the archive's top-level directory
/// has already been stripped). `content` is only ever populated for the
/// entry that answered the search.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub name: String,
    pub kind: EntryKind,
    pub meta: Option<FileMeta>,
    pub content: Option<Vec<u8>>,
}
impl ArchiveEntry {
    pub(crate) fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::Directory,
            meta: None,
            content: None,
        }
    }

    pub(crate) fn file(name: impl Into<String>, meta: FileMeta, content: Option<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::File,
            meta: Some(meta),
            content,
        }
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    pub fn is_directory(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    /// Payload length, or `None` for directories.
    pub fn size(&self) -> Option<u64> {
        self.meta.as_ref().map(|meta| meta.size)
    }
}
