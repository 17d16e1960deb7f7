//! Turning a cache hit into a headered byte stream.

use crate::error::{ErrorKind, Result};
use crate::layout::CacheLayout;
use pkgcdn_archive::content_type;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::io::ReaderStream;
use tracing::instrument;

/// Package versions are immutable once published, so every cached file can be
/// cached downstream forever.
pub const CACHE_CONTROL: &str = "public, max-age=31536000, immutable";

/// IMF-fixdate, e.g. `Sat, 26 Oct 1985 08:15:00 GMT`.
const HTTP_DATE: &[BorrowedFormatItem<'static>] =
    format_description!("[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT");

#[derive(Debug)]
pub enum Cached {
    Served(ServedFile),
    Miss,
}

impl Cached {
    pub fn is_miss(&self) -> bool {
        matches!(self, Self::Miss)
    }

    pub fn served(self) -> Option<ServedFile> {
        match self {
            Self::Served(file) => Some(file),
            Self::Miss => None,
        }
    }
}

/// Response headers for a cached package file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheHeaders {
    pub content_length: u64,
    pub content_type: &'static str,
    pub last_modified: OffsetDateTime,
    /// Strong validator derived from size and modification time (in
    /// milliseconds), both hex-encoded.
    pub etag: String,
}

impl CacheHeaders {
    fn new(path: &Path, size: u64, modified: SystemTime) -> Self {
        let millis = modified.duration_since(UNIX_EPOCH).map(|since| since.as_millis()).unwrap_or_default();
        Self {
            content_length: size,
            content_type: content_type(path),
            last_modified: OffsetDateTime::from(modified),
            etag: format!("\"{size:x}-{millis:x}\""),
        }
    }

    pub fn cache_control(&self) -> &'static str {
        CACHE_CONTROL
    }

    /// `Last-Modified` rendered as an HTTP-date, truncated to whole seconds.
    pub fn last_modified_http(&self) -> String {
        http_date(self.last_modified)
    }

    /// Header name/value pairs in the order they should be written.
    pub fn to_pairs(&self) -> [(&'static str, String); 5] {
        [
            ("Content-Length", self.content_length.to_string()),
            ("Content-Type", self.content_type.to_string()),
            ("Cache-Control", CACHE_CONTROL.to_string()),
            ("Last-Modified", self.last_modified_http()),
            ("ETag", self.etag.clone()),
        ]
    }
}

fn http_date(at: OffsetDateTime) -> String {
    // Only fails for years outside 0..=9999, which no filesystem hands back.
    at.to_offset(UtcOffset::UTC).format(HTTP_DATE).unwrap_or_default()
}

/// An opened cache file, positioned at its first byte.
///
/// The file handle is released when the body has been consumed, or when this
/// value (or the stream made from it) is dropped.
#[derive(Debug)]
pub struct ServedFile {
    path: PathBuf,
    headers: CacheHeaders,
    file: File,
}

impl ServedFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn headers(&self) -> &CacheHeaders {
        &self.headers
    }

    /// The body as a stream of `Bytes` chunks.
    pub fn into_stream(self) -> ReaderStream<File> {
        ReaderStream::new(self.file)
    }

    /// Copy the whole body into `writer`. Streaming errors are logged here
    /// and handed back to the caller; nothing else is notified.
    #[instrument(skip_all, fields(path = %self.path.display()))]
    pub async fn copy_to<W: AsyncWrite + Unpin>(self, writer: &mut W) -> Result<u64> {
        let Self { path, mut file, .. } = self;
        let copied = match tokio::io::copy(&mut file, writer).await {
            Ok(copied) => copied,
            Err(e) => {
                tracing::error!(error = %e, "streaming cached file failed");
                exn::bail!(ErrorKind::from_io(e, &path));
            },
        };
        if let Err(e) = writer.flush().await {
            tracing::error!(error = %e, "flushing cached file failed");
            exn::bail!(ErrorKind::Io(e));
        }
        Ok(copied)
    }

    /// Read the whole body into memory.
    pub async fn into_bytes(self) -> Result<Vec<u8>> {
        let Self { path, mut file, headers } = self;
        let mut buffer = Vec::with_capacity(usize::try_from(headers.content_length).unwrap_or_default());
        if let Err(e) = file.read_to_end(&mut buffer).await {
            tracing::error!(error = %e, path = %path.display(), "reading cached file failed");
            exn::bail!(ErrorKind::from_io(e, &path));
        }
        Ok(buffer)
    }
}

/// Serves package files that have already been extracted into the cache.
#[derive(Debug, Clone)]
pub struct CacheServer {
    layout: CacheLayout,
}

impl CacheServer {
    pub fn new(layout: CacheLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &CacheLayout {
        &self.layout
    }

    /// Look up `file` inside an extracted package version.
    ///
    /// Anything short of an openable regular file is a [`Cached::Miss`]:
    /// an invalid or escaping path, a missing file, a permissions problem,
    /// or a directory.
    #[instrument(skip(self))]
    pub async fn serve_from_cache(&self, name: &str, version: &str, file: &str) -> Cached {
        let path = match self.layout.file_path(name, version, file) {
            Ok(path) => path,
            Err(err) => {
                tracing::debug!(error = %err, "path rejected, treating as cache miss");
                return Cached::Miss;
            },
        };
        let handle = match File::open(&path).await {
            Ok(handle) => handle,
            Err(e) => {
                tracing::debug!(error = %e, path = %path.display(), "cache miss");
                return Cached::Miss;
            },
        };
        let metadata = match handle.metadata().await {
            Ok(metadata) if metadata.is_file() => metadata,
            Ok(_) => {
                tracing::debug!(path = %path.display(), "not a regular file, treating as cache miss");
                return Cached::Miss;
            },
            Err(e) => {
                tracing::debug!(error = %e, path = %path.display(), "stat failed, treating as cache miss");
                return Cached::Miss;
            },
        };
        let modified = metadata.modified().unwrap_or(UNIX_EPOCH);
        let headers = CacheHeaders::new(&path, metadata.len(), modified);
        tracing::info!(path = %path.display(), size = headers.content_length, "cache hit");
        Cached::Served(ServedFile { path, headers, file: handle })
    }
}
