//! Extracting a package tarball into the cache.
//!
//! Runs synchronously; callers feeding it from async code wrap it in
//! `spawn_blocking` with a bridged reader.

use crate::error::{ErrorKind, Result};
use crate::path::validate as validate_path;
use exn::ResultExt;
use pkgcdn_archive::strip_leading_segment;
use pkgcdn_compress::Compression;
use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;
use std::time::{Duration, SystemTime};
use tar::Archive;
use tempfile::NamedTempFile;
use tracing::instrument;

const COPY_BUFFER: usize = 64 * 1024;

/// What an extraction wrote.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UnpackSummary {
    pub files: u64,
    pub bytes: u64,
    /// Entries whose names would have escaped the package directory.
    pub skipped: u64,
}

/// Extract every regular file in `tarball` under `content_dir`, stripping the
/// first path segment of each entry name and preserving modification times.
///
/// Each file is written to a temporary sibling and renamed into place, so a
/// concurrent reader (or a second extraction of the same version) never sees
/// a partially written file. When two extractions race, the last rename wins;
/// both write identical bytes.
#[instrument(skip(tarball), fields(content_dir = %content_dir.display()))]
pub fn unpack<R: Read + Send>(tarball: R, content_dir: &Path) -> Result<UnpackSummary> {
    let (_, reader) = Compression::sniff_reader(tarball).map_err(ErrorKind::compression)?;
    let mut archive = Archive::new(reader);
    let mut summary = UnpackSummary::default();
    for entry in archive.entries().or_raise(|| ErrorKind::InvalidArchive)? {
        let mut entry = entry.or_raise(|| ErrorKind::InvalidArchive)?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let name = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
        let Ok(relative) = validate_path(strip_leading_segment(&name)) else {
            tracing::warn!(entry = %name, "skipping tarball entry outside the package root");
            summary.skipped += 1;
            continue;
        };
        let mtime = entry.header().mtime().unwrap_or_default();
        let target = content_dir.join(relative);
        // `validate_path` never returns an empty path, so there's always a parent.
        let parent = target.parent().unwrap_or(content_dir);
        fs::create_dir_all(parent).map_err(|e| ErrorKind::from_io(e, parent))?;

        let mut temporary = NamedTempFile::new_in(parent).map_err(|e| ErrorKind::from_io(e, parent))?;
        let written = copy_entry(&mut entry, &mut temporary)?;
        // A short read means the stream ended mid-entry; never persist a partial file.
        if written != entry.size() {
            exn::bail!(ErrorKind::InvalidArchive);
        }
        temporary
            .as_file()
            .set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(mtime))
            .map_err(|e| ErrorKind::from_io(e, &target))?;
        temporary.persist(&target).map_err(|e| ErrorKind::from_io(e.error, &target))?;

        tracing::trace!(path = %target.display(), size = written, "extracted");
        summary.files += 1;
        summary.bytes += written;
    }
    tracing::debug!(files = summary.files, bytes = summary.bytes, skipped = summary.skipped, "extraction complete");
    Ok(summary)
}

/// Copy one entry's payload into `file`. Read failures (corrupt deflate data,
/// a body that broke off mid-download) mean the tarball is unusable; write
/// failures are the cache's own.
fn copy_entry<R: Read>(entry: &mut R, file: &mut NamedTempFile) -> Result<u64> {
    let mut buffer = vec![0; COPY_BUFFER];
    let mut written = 0;
    loop {
        let read = match entry.read(&mut buffer) {
            Ok(0) => return Ok(written),
            Ok(read) => read,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e).or_raise(|| ErrorKind::InvalidArchive),
        };
        file.write_all(&buffer[..read]).map_err(|e| ErrorKind::from_io(e, file.path()))?;
        written += read as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkgcdn_archive::fixtures::TarballBuilder;
    use rstest::rstest;
    use std::time::UNIX_EPOCH;

    fn mtime_of(path: &Path) -> u64 {
        fs::metadata(path).unwrap().modified().unwrap().duration_since(UNIX_EPOCH).unwrap().as_secs()
    }

    #[test]
    fn extracts_with_leading_segment_stripped() {
        let dir = tempfile::tempdir().unwrap();
        let tgz = TarballBuilder::new()
            .file("package/package.json", r#"{"name":"demo"}"#)
            .file("package/lib/index.js", "module.exports = 1;")
            .into_tgz();

        let summary = unpack(tgz.as_slice(), dir.path()).unwrap();
        assert_eq!(summary, UnpackSummary { files: 2, bytes: 34, skipped: 0 });
        assert_eq!(fs::read_to_string(dir.path().join("package.json")).unwrap(), r#"{"name":"demo"}"#);
        assert_eq!(fs::read_to_string(dir.path().join("lib/index.js")).unwrap(), "module.exports = 1;");
    }

    #[test]
    fn preserves_modification_times() {
        let dir = tempfile::tempdir().unwrap();
        let tgz = TarballBuilder::new()
            .file("package/old.js", "old")
            .mtime(1_700_000_000)
            .file("package/new.js", "new")
            .into_tgz();

        unpack(tgz.as_slice(), dir.path()).unwrap();
        assert_eq!(mtime_of(&dir.path().join("old.js")), 499_162_500);
        assert_eq!(mtime_of(&dir.path().join("new.js")), 1_700_000_000);
    }

    #[test]
    fn accepts_uncompressed_tarballs_and_other_top_level_names() {
        let dir = tempfile::tempdir().unwrap();
        let tar = TarballBuilder::new().file("firebase_npm/app.js", "app").into_tar();

        unpack(tar.as_slice(), dir.path()).unwrap();
        assert_eq!(fs::read(dir.path().join("app.js")).unwrap(), b"app");
    }

    #[test]
    fn skips_directories_and_escaping_entries() {
        let dir = tempfile::tempdir().unwrap();
        let content = dir.path().join("content");
        let mut tar = TarballBuilder::new().directory("package/lib/").file("package/lib/a.js", "a").into_tar();
        // The tar builder refuses `..` in paths, so patch the name in place:
        // `package/x/../../evil.js` after stripping is `x/../../evil.js`.
        let mut builder = tar::Builder::new(Vec::new());
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Regular);
        header.set_size(4);
        header.set_mode(0o644);
        {
            let name = b"package/x/../../evil.js";
            let gnu = header.as_gnu_mut().unwrap();
            gnu.name[..name.len()].copy_from_slice(name);
        }
        header.set_cksum();
        builder.append(&header, &b"evil"[..]).unwrap();
        let evil = builder.into_inner().unwrap();
        // Splice the evil entry in front of the well-formed archive.
        let mut spliced = evil[..evil.len() - 1024].to_vec();
        spliced.append(&mut tar);

        let summary = unpack(spliced.as_slice(), &content).unwrap();
        assert_eq!(summary.files, 1);
        assert_eq!(summary.skipped, 1);
        assert!(content.join("lib/a.js").is_file());
        assert!(!dir.path().join("evil.js").exists());
    }

    #[test]
    fn reextraction_overwrites_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let tgz = TarballBuilder::new().file("package/index.js", "same").into_tgz();

        unpack(tgz.as_slice(), dir.path()).unwrap();
        unpack(tgz.as_slice(), dir.path()).unwrap();
        assert_eq!(fs::read(dir.path().join("index.js")).unwrap(), b"same");
        // No temporary files left behind.
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn unwritable_root_fails_extraction() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("cache");
        fs::write(&blocker, b"not a directory").unwrap();
        let tgz = TarballBuilder::new().file("package/index.js", "x").into_tgz();

        assert!(unpack(tgz.as_slice(), &blocker.join("react")).is_err());
    }

    #[test]
    fn truncated_archive_fails() {
        let dir = tempfile::tempdir().unwrap();
        let tar = TarballBuilder::new().file("package/big.js", vec![b'x'; 4096]).into_tar();

        let err = unpack(&tar[..1024], dir.path()).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidArchive));
    }

    /// Replays `head`, then fails the way a broken inflater or a dropped
    /// connection surfaces through the byte fork.
    struct BrokenMidway {
        head: io::Cursor<Vec<u8>>,
        kind: io::ErrorKind,
    }

    impl Read for BrokenMidway {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.head.read(buf)? {
                0 => Err(io::Error::new(self.kind, "stream broke off")),
                read => Ok(read),
            }
        }
    }

    #[rstest]
    #[case(io::ErrorKind::InvalidInput)]
    #[case(io::ErrorKind::Other)]
    fn read_failure_inside_an_entry_is_an_invalid_archive(#[case] kind: io::ErrorKind) {
        let dir = tempfile::tempdir().unwrap();
        let tar = TarballBuilder::new().file("package/big.js", vec![b'x'; 4096]).into_tar();
        // Header plus part of the payload, then the failure.
        let broken = BrokenMidway { head: io::Cursor::new(tar[..1024].to_vec()), kind };

        let err = unpack(broken, dir.path()).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidArchive), "{err:?}");
        assert!(!dir.path().join("big.js").exists());
    }
}
