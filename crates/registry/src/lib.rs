//! Registry access: package metadata and tarball downloads.
//!
//! [`RegistryClient`] answers "what versions of this package exist and where
//! are their tarballs". [`TarballFetcher`] downloads one of those tarballs,
//! searching it in memory for the caller while extracting it into the cache
//! from the same byte stream.

mod client;
pub mod error;
mod fetch;
mod models;

pub use crate::client::{RegistryClient, encode_package_name};
pub use crate::fetch::{Extraction, TarballFetcher, TarballStream};
pub use crate::models::{Dist, PackageDescriptor, PackageInfo, VersionManifest};
