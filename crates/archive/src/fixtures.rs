//! In-memory tarball builder for tests.
//!
//! Enabled for this crate's own tests and, through the `fixtures` feature,
//! for other crates' dev dependencies.

use pkgcdn_compress::Compression;
use tar::{Builder, EntryType, Header};

/// Builds a tarball the way registries publish them.
///
/// Panics on any error. If test setup is wrong, then test should not pass.
///
/// # Example
///
/// ```ignore
/// use pkgcdn_archive::fixtures::TarballBuilder;
///
/// let tgz = TarballBuilder::new()
///     .file("package/package.json", r#"{"name":"demo"}"#)
///     .file("package/index.js", "module.exports = 42;")
///     .into_tgz();
/// assert!(!tgz.is_empty());
/// ```
pub struct TarballBuilder {
    builder: Builder<Vec<u8>>,
    mtime: u64,
}

impl TarballBuilder {
    pub fn new() -> Self {
        Self {
            builder: Builder::new(Vec::new()),
            // 1985-10-26T08:15:00Z, the timestamp npm pins every entry to.
            mtime: 499_162_500,
        }
    }

    /// Set the modification time for entries appended after this call.
    pub fn mtime(mut self, secs: u64) -> Self {
        self.mtime = secs;
        self
    }

    pub fn file(mut self, path: &str, data: impl AsRef<[u8]>) -> Self {
        let data = data.as_ref();
        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Regular);
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(self.mtime);
        self.builder.append_data(&mut header, path, data).expect("append file to tarball");
        self
    }

    pub fn directory(mut self, path: &str) -> Self {
        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Directory);
        header.set_size(0);
        header.set_mode(0o755);
        header.set_mtime(self.mtime);
        self.builder.append_data(&mut header, path, std::io::empty()).expect("append directory to tarball");
        self
    }

    /// Finish the archive and return the uncompressed tar bytes.
    pub fn into_tar(self) -> Vec<u8> {
        self.builder.into_inner().expect("finish tarball")
    }

    /// Finish the archive and return it gzip-compressed.
    pub fn into_tgz(self) -> Vec<u8> {
        Compression::Gzip.compress(&self.into_tar()).expect("gzip tarball")
    }
}

impl Default for TarballBuilder {
    fn default() -> Self {
        Self::new()
    }
}
