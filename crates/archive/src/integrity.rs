//! Subresource Integrity digests.
//!
//! Registries publish `sha512` integrity strings for whole tarballs; for
//! individual files the `sha384-<base64>` form is what browsers accept in
//! `<script integrity="...">`, so that is what gets computed per entry.

use data_encoding::BASE64;
use sha2::{Digest, Sha384};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::io::{Result as IoResult, Write};

const ALGORITHM: &str = "sha384";

/// An SRI digest string, e.g. `sha384-OLBgp1GsljhM2TJ+sbHjaiH9txEUvgdDTAzHv2P24donTt6/529l+9Ua0vFImLlb`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Integrity(String);

impl Integrity {
    /// Digest an in-memory payload.
    pub fn of(data: &[u8]) -> Self {
        Self::from_hasher(Sha384::new_with_prefix(data))
    }

    fn from_hasher(hasher: Sha384) -> Self {
        Self(format!("{ALGORITHM}-{}", BASE64.encode(&hasher.finalize())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
impl Display for Integrity {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&self.0)
    }
}
impl AsRef<str> for Integrity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A [`Write`] sink that digests and measures everything written to it,
/// optionally keeping a copy of the bytes.
///
/// Used as the target of [`std::io::copy`] when draining a tar entry, so the
/// payload never needs to be held in memory unless `retain` was requested.
pub(crate) struct DigestWriter {
    hasher: Sha384,
    size: u64,
    retained: Option<Vec<u8>>,
}
impl DigestWriter {
    pub(crate) fn new(retain: bool) -> Self {
        Self {
            hasher: Sha384::new(),
            size: 0,
            retained: retain.then(Vec::new),
        }
    }

    pub(crate) fn finish(self) -> (Integrity, u64, Option<Vec<u8>>) {
        (Integrity::from_hasher(self.hasher), self.size, self.retained)
    }
}
impl Write for DigestWriter {
    fn write(&mut self, buf: &[u8]) -> IoResult<usize> {
        self.hasher.update(buf);
        self.size += buf.len() as u64;
        if let Some(retained) = self.retained.as_mut() {
            retained.extend_from_slice(buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> IoResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::copy;

    #[test]
    fn test_known_digest() {
        // echo -n "" | openssl dgst -sha384 -binary | base64
        assert_eq!(
            Integrity::of(b"").as_str(),
            "sha384-OLBgp1GsljhM2TJ+sbHjaiH9txEUvgdDTAzHv2P24donTt6/529l+9Ua0vFImLlb"
        );
    }

    #[test]
    fn test_writer_matches_in_memory_digest() {
        let data = vec![42u8; 100_000];
        let mut writer = DigestWriter::new(false);
        copy(&mut data.as_slice(), &mut writer).unwrap();
        let (integrity, size, retained) = writer.finish();
        assert_eq!(integrity, Integrity::of(&data));
        assert_eq!(size, 100_000);
        assert!(retained.is_none());
    }

    #[test]
    fn test_writer_retains_when_asked() {
        let mut writer = DigestWriter::new(true);
        writer.write_all(b"module.exports = 1;").unwrap();
        let (_, size, retained) = writer.finish();
        assert_eq!(size, 19);
        assert_eq!(retained.as_deref(), Some(&b"module.exports = 1;"[..]));
    }
}
