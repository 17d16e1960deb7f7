//! Decompression for registry tarballs with automatic format detection.
//!
//! Package registries serve `.tgz` archives, but mirrors and hand-rolled
//! registries occasionally hand out a bare `.tar`. This crate hides the
//! difference behind a [`Compression`] enum, providing:
//!
//! - **Format detection** from magic bytes ([`Compression::from_magic_bytes`])
//! - **In-memory** compression for building archives ([`Compression::compress`])
//! - **Streaming** decompression via wrapped readers ([`Compression::wrap_reader`])
//! - **Sniff-then-stream** via [`Compression::sniff_reader`], which peeks at
//!   the first bytes of a stream and only decompresses when the gzip magic is
//!   present (the "gunzip-maybe" behaviour every consumer of a tarball needs)
//!
//! Everything here is synchronous [`std::io::Read`]; async callers bridge onto
//! a blocking worker before handing a reader over.

mod construct;
pub mod error;
mod ops;
mod peekable;
mod util;

/// A supported compression format. Defaults to [`None`](Self::None)
/// (uncompressed).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Compression {
    /// Uncompressed
    #[default]
    None,
    /// Gzip compression (.gz, .tgz)
    Gzip,
}

#[cfg(test)]
mod tests {
    use crate::Compression;

    #[test]
    fn compression_default() {
        assert_eq!(Compression::default(), Compression::None);
    }
}
