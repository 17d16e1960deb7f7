//! Where a package version lives on disk.

use crate::error::{ErrorKind, Result};
use crate::path::validate as validate_path;
use std::path::{Path, PathBuf};

/// Name of the directory every file of a package tarball lives under once the
/// tarball's own top-level directory has been stripped.
const CONTENT_DIR: &str = "package";

/// Deterministic mapping from `(name, version, file)` to a location inside the
/// cache root:
///
/// ```text
/// {root}/{name}/{name}-{version}/package/{file}
/// ```
///
/// Scoped names (`@scope/name`) nest one directory deeper on both sides, which
/// is harmless since the mapping is only ever computed, never parsed back.
#[derive(Debug, Clone)]
pub struct CacheLayout {
    root: PathBuf,
}

impl CacheLayout {
    /// The root is not created here; extraction creates directories lazily.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidPath`](ErrorKind::InvalidPath) if the root is not absolute.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_absolute() {
            exn::bail!(ErrorKind::InvalidPath(root));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `{root}/{name}/{name}-{version}`
    pub fn package_dir(&self, name: &str, version: &str) -> Result<PathBuf> {
        let name_dir = Self::checked(name)?;
        // A separator in the version would smuggle in extra path segments.
        if version.is_empty() || version.contains(['/', '\\']) {
            exn::bail!(ErrorKind::InvalidPath(PathBuf::from(version)));
        }
        let versioned = format!("{name}-{version}");
        let versioned_dir = Self::checked(&versioned)?;
        Ok(self.root.join(name_dir).join(versioned_dir))
    }

    /// `{root}/{name}/{name}-{version}/package`
    pub fn content_dir(&self, name: &str, version: &str) -> Result<PathBuf> {
        Ok(self.package_dir(name, version)?.join(CONTENT_DIR))
    }

    /// Location of a single package file. Leading and trailing slashes on
    /// `file` are ignored; anything resolving outside the package is rejected.
    pub fn file_path(&self, name: &str, version: &str, file: &str) -> Result<PathBuf> {
        let relative = validate_path(file)?;
        Ok(self.content_dir(name, version)?.join(relative))
    }

    /// Names must already be in normal form; a name that only validates after
    /// normalization (`a/../b`) would alias another package's directory.
    fn checked(segment: &str) -> Result<PathBuf> {
        let validated = validate_path(segment)?;
        if validated != Path::new(segment) {
            exn::bail!(ErrorKind::InvalidPath(PathBuf::from(segment)));
        }
        Ok(validated)
    }
}
