//! The on-disk package cache.
//!
//! There is no manifest or database: a package version extracted under the
//! [`CacheLayout`] *is* the cache, and a file existing at its derived path is
//! the cache-hit signal. Files are written once per package version and never
//! invalidated.

pub mod error;
mod layout;
mod path;
mod serve;
mod unpack;

pub use crate::layout::CacheLayout;
pub use crate::path::validate as validate_path;
pub use crate::serve::{CACHE_CONTROL, CacheHeaders, CacheServer, Cached, ServedFile};
pub use crate::unpack::{UnpackSummary, unpack};
