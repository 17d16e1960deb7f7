//! External source substitution.
//!
//! Some packages are also distributed by alternate providers ("solutions")
//! under different file names. A JSON map, published as a package of its
//! own, records which file of each solution corresponds to which file of
//! every other, per package and version range. [`ExternalResolver`] fetches
//! that map and answers "what is `solution`'s name for this file?".

pub mod error;
mod map;
mod range;
mod resolver;

pub use crate::map::{ExternalMap, RangeBucket, Solutions};
pub use crate::range::NpmRange;
pub use crate::resolver::ExternalResolver;
