//! The external source map document.
//!
//! ```json
//! {
//!   "react": {
//!     "^16.0.0": {
//!       "js": {
//!         "unpkg":    ["umd/react.production.min.js", "umd/react.development.js"],
//!         "jsdelivr": ["dist/react.min.js",           "dist/react.js"]
//!       }
//!     }
//!   }
//! }
//! ```
//!
//! Package name, then version range, then file extension, then solution name,
//! then an ordered list of source files. Element `i` of every solution list
//! in a bucket is the substitute for element `i` of every other. Object key
//! order matters at the range level (first satisfied range wins) and at the
//! solution level (first list containing the source wins), so both are kept
//! in document order.

use crate::error::{ErrorKind, Result};
use crate::range::NpmRange;
use exn::ResultExt;
use serde::de::{Deserialize, Deserializer, MapAccess, Visitor};
use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;
use std::path::Path;

/// A JSON object with its keys in document order. A repeated key keeps its
/// first position and its last value.
#[derive(Debug, Clone)]
struct Ordered<T>(Vec<(String, T)>);

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Ordered<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct OrderedVisitor<T>(PhantomData<T>);

        impl<'de, T: Deserialize<'de>> Visitor<'de> for OrderedVisitor<T> {
            type Value = Ordered<T>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a JSON object")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<Self::Value, A::Error> {
                let mut entries: Vec<(String, T)> = Vec::with_capacity(access.size_hint().unwrap_or_default());
                while let Some((key, value)) = access.next_entry::<String, T>()? {
                    match entries.iter_mut().find(|(existing, _)| *existing == key) {
                        Some(slot) => slot.1 = value,
                        None => entries.push((key, value)),
                    }
                }
                Ok(Ordered(entries))
            }
        }

        deserializer.deserialize_map(OrderedVisitor(PhantomData))
    }
}

type RawMap = BTreeMap<String, Ordered<BTreeMap<String, Ordered<Vec<String>>>>>;

/// Solution lists for one file type, in document order.
#[derive(Debug, Clone)]
pub struct Solutions(Vec<(String, Vec<String>)>);

impl Solutions {
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(name, _)| name.as_str())
    }

    pub fn get(&self, solution: &str) -> Option<&[String]> {
        self.0.iter().find(|(name, _)| name == solution).map(|(_, sources)| sources.as_slice())
    }

    /// Position of `source` in the first solution list that contains it.
    fn position(&self, source: &str) -> Option<usize> {
        self.0.iter().find_map(|(_, sources)| sources.iter().position(|candidate| candidate == source))
    }
}

#[derive(Debug, Clone)]
pub struct RangeBucket {
    pub range: NpmRange,
    pub file_types: BTreeMap<String, Solutions>,
}

/// A loaded, read-only external source map.
#[derive(Debug, Clone, Default)]
pub struct ExternalMap {
    packages: BTreeMap<String, Vec<RangeBucket>>,
}

impl ExternalMap {
    /// Parse a map document. Range keys that aren't valid npm ranges are
    /// dropped with a warning rather than failing the whole map.
    pub fn from_slice(document: &[u8]) -> Result<Self> {
        let raw: RawMap = serde_json::from_slice(document).or_raise(|| ErrorKind::InvalidMap)?;
        let mut packages = BTreeMap::new();
        for (package, ranges) in raw {
            let mut buckets = Vec::with_capacity(ranges.0.len());
            for (range, file_types) in ranges.0 {
                let range = match NpmRange::parse(&range) {
                    Ok(range) => range,
                    Err(err) => {
                        tracing::warn!(%package, %range, error = %err, "dropping unparsable range from external map");
                        continue;
                    },
                };
                let file_types = file_types.into_iter().map(|(kind, solutions)| (kind, Solutions(solutions.0))).collect();
                buckets.push(RangeBucket { range, file_types });
            }
            packages.insert(package, buckets);
        }
        Ok(Self { packages })
    }

    pub fn packages(&self) -> impl Iterator<Item = &str> {
        self.packages.keys().map(String::as_str)
    }

    /// Range buckets for `package`, in document order.
    pub fn ranges(&self, package: &str) -> Option<&[RangeBucket]> {
        self.packages.get(package).map(Vec::as_slice)
    }

    /// Pick the substitute for `source` from `solution`'s list.
    ///
    /// The first range (in document order) satisfied by `version` is used.
    /// Within it, the bucket is chosen by `source`'s extension, and the
    /// index of `source` in the first list containing it selects the
    /// element of `solution`'s list.
    pub fn resolve(&self, package: &str, version: &str, source: &str, solution: &str) -> Result<&str> {
        let Some(buckets) = self.packages.get(package) else {
            exn::bail!(ErrorKind::PackageNotMapped(package.to_string()));
        };
        let Some(bucket) = buckets.iter().find(|bucket| bucket.range.satisfied_by(version)) else {
            exn::bail!(ErrorKind::RangeNotSatisfied { package: package.to_string(), version: version.to_string() });
        };
        let file_type = extension(source);
        let Some(solutions) = file_type.and_then(|file_type| bucket.file_types.get(file_type)) else {
            exn::bail!(ErrorKind::FileTypeNotMapped(file_type.unwrap_or_default().to_string()));
        };
        let Some(index) = solutions.position(source) else {
            exn::bail!(ErrorKind::SourceNotMapped(source.to_string()));
        };
        let Some(substitutes) = solutions.get(solution) else {
            exn::bail!(ErrorKind::SolutionNotMapped(solution.to_string()));
        };
        match substitutes.get(index) {
            Some(substitute) => Ok(substitute.as_str()),
            None => exn::bail!(ErrorKind::MisalignedMap { solution: solution.to_string(), index }),
        }
    }
}

/// The file-type key: the extension without its dot, for the last path
/// segment only. Dotfiles and extensionless names have none.
fn extension(source: &str) -> Option<&str> {
    Path::new(source).extension().and_then(|extension| extension.to_str())
}
