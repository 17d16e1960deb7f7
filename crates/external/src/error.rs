//! External Source Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// An external source error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for external source resolution.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// ### Not found
/// The map was loaded but has nothing for this request. Callers fall back to
/// the unsubstituted path.
/// - [`ErrorKind::PackageNotMapped`]
/// - [`ErrorKind::RangeNotSatisfied`]
/// - [`ErrorKind::FileTypeNotMapped`]
/// - [`ErrorKind::SourceNotMapped`]
/// - [`ErrorKind::SolutionNotMapped`]
///
/// ### Map problems
/// - [`ErrorKind::Registry`]
/// - [`ErrorKind::MapUnavailable`]
/// - [`ErrorKind::InvalidMap`]
/// - [`ErrorKind::MisalignedMap`]
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Fetching the map package's metadata or tarball failed.
    #[display("could not fetch the external map package")]
    Registry,
    /// The map package, its `latest` version, or the map document inside it is missing.
    #[display("external map unavailable: {_0}")]
    MapUnavailable(#[error(not(source))] String),
    /// The map document isn't valid JSON of the expected shape.
    #[display("external map is malformed")]
    InvalidMap,
    #[display("invalid version range: {_0}")]
    InvalidRange(#[error(not(source))] String),
    #[display("package not in external map: {_0}")]
    PackageNotMapped(#[error(not(source))] String),
    #[display("no range in the external map is satisfied by {package}@{version}")]
    RangeNotSatisfied { package: String, version: String },
    #[display("file type not in external map: {_0}")]
    FileTypeNotMapped(#[error(not(source))] String),
    #[display("source not in any solution: {_0}")]
    SourceNotMapped(#[error(not(source))] String),
    #[display("solution not in external map: {_0}")]
    SolutionNotMapped(#[error(not(source))] String),
    /// Solution lists in the same bucket aren't the same length.
    #[display("solution {solution} has no entry at index {index}")]
    MisalignedMap { solution: String, index: usize },
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Registry)
    }

    /// The map simply has no substitution for the request.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::PackageNotMapped(_)
                | Self::RangeNotSatisfied { .. }
                | Self::FileTypeNotMapped(_)
                | Self::SourceNotMapped(_)
                | Self::SolutionNotMapped(_)
        )
    }
}
