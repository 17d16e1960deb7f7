//! Typed registry documents.
//!
//! Only the fields this crate needs are modelled. Registries return a great
//! deal more (readmes, maintainers, every historical manifest in full) and
//! all of it is ignored during deserialization.

use serde::Deserialize;
use std::collections::BTreeMap;
use url::Url;

/// The package document served at `{registry}/{name}`.
#[derive(Debug, Clone, Deserialize)]
pub struct PackageInfo {
    pub name: String,
    #[serde(rename = "dist-tags", default)]
    pub dist_tags: BTreeMap<String, String>,
    #[serde(default)]
    pub versions: BTreeMap<String, VersionManifest>,
}

impl PackageInfo {
    /// Resolve an exact version or a dist-tag (`latest`, `next`, ...).
    ///
    /// Exact versions take precedence, though a tag that parses as a version
    /// is rejected by registries anyway.
    pub fn manifest(&self, version_or_tag: &str) -> Option<&VersionManifest> {
        self.versions.get(version_or_tag).or_else(|| {
            let version = self.dist_tags.get(version_or_tag)?;
            self.versions.get(version)
        })
    }

    pub fn latest(&self) -> Option<&VersionManifest> {
        self.manifest("latest")
    }
}

/// A single published version.
#[derive(Debug, Clone, Deserialize)]
pub struct VersionManifest {
    pub name: String,
    pub version: String,
    pub dist: Dist,
}

impl VersionManifest {
    pub fn descriptor(&self) -> PackageDescriptor {
        PackageDescriptor { name: self.name.clone(), version: self.version.clone(), tarball: self.dist.tarball.clone() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Dist {
    pub tarball: Url,
    #[serde(default)]
    pub integrity: Option<String>,
    #[serde(default)]
    pub shasum: Option<String>,
}

/// Identifies exactly one published archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageDescriptor {
    pub name: String,
    pub version: String,
    pub tarball: Url,
}

impl PackageDescriptor {
    pub fn new(name: impl Into<String>, version: impl Into<String>, tarball: Url) -> Self {
        Self { name: name.into(), version: version.into(), tarball }
    }
}
