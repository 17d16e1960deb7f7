//! The entry search engine.

use crate::content_type::content_type;
use crate::entry::{ArchiveEntry, FileMeta};
use crate::error::{ErrorKind, Result};
use crate::integrity::DigestWriter;
use exn::ResultExt;
use pkgcdn_compress::Compression;
use std::collections::BTreeMap;
use std::io::{Read, copy, sink};
use tar::{Archive, Entry};
use time::OffsetDateTime;
use tracing::instrument;

/// Everything a single traversal learned about the requested path.
///
/// `entries` holds every admitted file plus the synthesized directories
/// above them, keyed by name (so iteration is in path order, which is what
/// a directory listing wants anyway).
#[derive(Debug, Default)]
pub struct SearchResult {
    pub entries: BTreeMap<String, ArchiveEntry>,
    found: Option<String>,
}
impl SearchResult {
    /// The entry that answered the search, if any.
    pub fn found(&self) -> Option<&ArchiveEntry> {
        self.found.as_ref().and_then(|name| self.entries.get(name))
    }

    /// Take ownership of the entry that answered the search, if any.
    pub fn into_found(mut self) -> Option<ArchiveEntry> {
        self.found.and_then(|name| self.entries.remove(&name))
    }

    /// Immediate children of a directory entry, in path order.
    pub fn children<'a>(&'a self, directory: &'a str) -> impl Iterator<Item = &'a ArchiveEntry> + 'a {
        self.entries.values().filter(move |entry| parent(&entry.name).unwrap_or("") == directory && !entry.name.is_empty())
    }
}

/// Strip the first path segment (and its separator) from a tar entry name.
///
/// Most tarballs use `package/` as the top-level directory, but some use
/// their own (e.g. `firebase_npm/`), so whatever comes first is discarded.
///
/// ```
/// use pkgcdn_archive::strip_leading_segment;
///
/// assert_eq!(strip_leading_segment("package/lib/index.js"), "lib/index.js");
/// assert_eq!(strip_leading_segment("firebase_npm/app.js"), "app.js");
/// assert_eq!(strip_leading_segment("package"), "");
/// ```
pub fn strip_leading_segment(name: &str) -> &str {
    name.split_once('/').map(|(_, rest)| rest).unwrap_or("")
}

fn parent(name: &str) -> Option<&str> {
    name.rfind('/').map(|index| &name[..index])
}

struct Search<'a> {
    requested: &'a str,
    wants_index: bool,
    result: SearchResult,
}
impl<'a> Search<'a> {
    fn new(requested: &'a str, wants_index: bool) -> Self {
        let mut result = SearchResult::default();
        if requested.is_empty() {
            result.entries.insert(String::new(), ArchiveEntry::directory(""));
            result.found = Some(String::new());
        }
        Self { requested, wants_index, result }
    }

    /// Whether a file name answers the request. Outside of index-page
    /// requests, `foo/index` also resolves `foo/index.js` then
    /// `foo/index.json`, the way CommonJS `require()` would.
    fn matches(&self, name: &str) -> bool {
        name.strip_prefix(self.requested).is_some_and(|rest| {
            rest.is_empty() || (!self.wants_index && (rest == ".js" || rest == ".json"))
        })
    }

    /// The first candidate in archive order wins; later candidates never
    /// replace it.
    fn claim(&mut self, name: &str) {
        if self.result.found.is_none() {
            self.result.found = Some(name.to_string());
        }
    }

    fn synthesize_directories(&mut self, name: &str) {
        let mut current = parent(name);
        while let Some(directory) = current {
            if !self.result.entries.contains_key(directory) {
                self.result.entries.insert(directory.to_string(), ArchiveEntry::directory(directory));
                if directory == self.requested {
                    self.claim(directory);
                }
            }
            current = parent(directory);
        }
    }

    fn visit<R: Read>(&mut self, mut entry: Entry<'_, R>) -> Result<()> {
        let header = entry.header();
        let is_file = header.entry_type().is_file();
        let mtime = header.mtime().or_raise(|| ErrorKind::Stream)?;
        let name = strip_leading_segment(&String::from_utf8_lossy(&entry.path_bytes())).to_string();

        // Duplicate names keep their first occurrence, same as found-entries.
        if !is_file || !name.starts_with(self.requested) || self.result.entries.contains_key(&name) {
            copy(&mut entry, &mut sink()).or_raise(|| ErrorKind::Stream)?;
            return Ok(());
        }

        self.synthesize_directories(&name);
        let found = self.result.found.is_none() && self.matches(&name);
        let mut digest = DigestWriter::new(found);
        copy(&mut entry, &mut digest).or_raise(|| ErrorKind::Stream)?;
        let (integrity, size, content) = digest.finish();
        let meta = FileMeta {
            content_type: content_type(&name),
            integrity,
            last_modified: i64::try_from(mtime)
                .ok()
                .and_then(|secs| OffsetDateTime::from_unix_timestamp(secs).ok())
                .unwrap_or(OffsetDateTime::UNIX_EPOCH),
            size,
        };
        if found {
            self.claim(&name);
        }
        self.result.entries.insert(name.clone(), ArchiveEntry::file(name, meta, content));
        Ok(())
    }
}

/// Search a decompressed tar stream for `requested`.
///
/// Every regular file whose name (first segment stripped) starts with
/// `requested` is admitted, so a single pass serves both an exact file
/// lookup and a directory listing. Entries that aren't admitted are drained
/// before the next one is read. Any read error aborts the whole search.
#[instrument(skip(tarball))]
pub fn search_entries<R: Read>(tarball: R, requested: &str, wants_index: bool) -> Result<SearchResult> {
    let mut search = Search::new(requested, wants_index);
    let mut archive = Archive::new(tarball);
    for entry in archive.entries().or_raise(|| ErrorKind::Stream)? {
        search.visit(entry.or_raise(|| ErrorKind::Stream)?)?;
    }
    tracing::debug!(
        admitted = search.result.entries.len(),
        found = search.result.found.is_some(),
        "archive traversal complete"
    );
    Ok(search.result)
}

/// Like [`search_entries`], but accepts the raw tarball bytes as served by
/// the registry and only decompresses them if they are actually gzipped.
pub fn search_tarball<R: Read + Send>(tarball: R, requested: &str, wants_index: bool) -> Result<SearchResult> {
    let (_, reader) = Compression::sniff_reader(tarball).or_raise(|| ErrorKind::Stream)?;
    search_entries(reader, requested, wants_index)
}
