//! Registry Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A registry error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for registry operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The HTTP client could not be constructed.
    #[display("could not build HTTP client")]
    Client,
    /// Transport-level failure talking to the registry or tarball host.
    #[display("network error")]
    Network,
    /// Registry metadata request answered with something other than 200 or 404.
    #[display("registry responded with HTTP {status}: {body}")]
    Registry { status: u16, body: String },
    /// Tarball download answered with something other than 200.
    #[display("tarball request responded with HTTP {status}: {body}")]
    Fetch { status: u16, body: String },
    /// The registry document for a package doesn't have the expected shape.
    #[display("invalid registry metadata for {_0}")]
    InvalidMetadata(#[error(not(source))] String),
    /// The package, version or dist-tag doesn't exist.
    #[display("not found: {_0}")]
    NotFound(#[error(not(source))] String),
    #[display("invalid URL: {_0}")]
    InvalidUrl(#[error(not(source))] String),
    /// The tarball body could not be read or demultiplexed.
    #[display("tarball stream failed")]
    Stream,
    /// Extracting the tarball into the cache failed. The in-memory entry
    /// stream is unaffected.
    #[display("writing tarball to the cache failed")]
    CacheWrite,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network | Self::Stream | Self::CacheWrite => true,
            Self::Registry { status, .. } | Self::Fetch { status, .. } => *status >= 500,
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
