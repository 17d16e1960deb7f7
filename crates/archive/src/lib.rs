//! Streaming entry search over package tarballs.
//!
//! A package tarball is read exactly once, entry by entry. Each entry is
//! either admitted into the result set (it lives under the requested path)
//! or drained and forgotten. Only the single entry that answers the request
//! keeps its payload in memory; every other admitted entry is hashed and
//! measured on the way through, then released.
//!
//! Registries don't agree on the name of the top-level directory inside a
//! tarball (`package/` is common, but not universal) so the first path
//! segment of every entry is stripped before matching.

mod content_type;
mod entry;
pub mod error;
#[cfg(any(test, feature = "fixtures"))]
pub mod fixtures;
mod integrity;
mod search;

pub use crate::content_type::content_type;
pub use crate::entry::{ArchiveEntry, EntryKind, FileMeta};
pub use crate::integrity::Integrity;
pub use crate::search::{SearchResult, search_entries, search_tarball, strip_leading_segment};
