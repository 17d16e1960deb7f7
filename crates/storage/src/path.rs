//! Path validation for package files.
//!
//! Every path that reaches the filesystem (tarball member names on the way in,
//! requested file paths on the way out) is funnelled through [`validate`] so it
//! can never escape the package directory it is joined onto.

use std::path::{Component, Path, PathBuf};

use crate::error::{ErrorKind, Result};

/// Validates a package-relative path for security and correctness.
/// Ensures that paths don't escape the package root (no `..` traversal).
///
/// > **Note:** This does **not** normalize backslashes, non-UTF8 bytes, or
/// >           platform-specific weirdness. Null bytes are explicitly rejected.
///
/// # Returns
/// Returns the normalized path if valid, or [`InvalidPath`](crate::error::ErrorKind::InvalidPath)
/// if invalid.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use pkgcdn_storage::validate_path;
/// // Valid paths
/// assert!(validate_path("dist/index.js").is_ok());
/// assert!(validate_path("/lib/es/index.d.ts").is_ok());
/// assert!(validate_path("src/../index.js").is_ok()); // (never leaves package root)
/// // Invalid paths
/// assert!(validate_path("../../etc/passwd").is_err());
/// assert!(validate_path("a/../../b").is_err()); // (leaves package root)
/// assert!(validate_path("a\0b").is_err());
/// // Paths get resolved
/// assert_eq!(
///     validate_path("/wrong/../still-wrong/.././dist//./index.js/").unwrap(),
///     Path::new("dist/index.js")
/// );
/// ```
pub fn validate(path: impl AsRef<Path>) -> Result<PathBuf> {
    // Rust's component parser already handles repeated separators and `.`
    // segments, and never splits on a backslash outside Windows.
    let mut components = Vec::new();
    for component in path.as_ref().components() {
        match component {
            Component::Normal(s) => {
                // Null bytes pass through Path::components() on Unix but cause
                // truncation in C-based syscalls.
                if s.as_encoded_bytes().contains(&0) {
                    exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf()));
                }
                components.push(s)
            },
            Component::CurDir | Component::RootDir => {},
            Component::Prefix(_) => exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf())),
            Component::ParentDir => {
                if components.pop().is_none() {
                    exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf()));
                }
            },
        }
    }
    match components.is_empty() {
        true => exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf())),
        false => Ok(components.into_iter().collect()),
    }
}
