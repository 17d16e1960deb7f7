//! Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction. Errors from the component crates
//! are kept as children in the tree.

use derive_more::{Display, Error};

/// A package file error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for package file operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Configuration could not be loaded or doesn't describe a usable setup.
    #[display("configuration error")]
    Config,
    /// The package, version or file doesn't exist.
    #[display("not found: {_0}")]
    NotFound(#[error(not(source))] String),
    /// The registry or tarball host failed or answered unexpectedly.
    #[display("registry error")]
    Registry,
    /// The tarball could not be decompressed or read.
    #[display("tarball stream error")]
    Stream,
    /// External source substitution failed for a reason other than the map
    /// not covering the request.
    #[display("external source substitution failed")]
    External,
    /// Writing the resolved file out failed.
    #[display("output error")]
    Output,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Registry | Self::Stream | Self::External)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
