//! Serve individual files out of registry-hosted package tarballs.
//!
//! [`PackageFiles`] ties the component crates together: the on-disk cache is
//! consulted first, and only on a miss is the package's tarball downloaded.
//! The download is searched in memory for the requested file while being
//! extracted into the cache in parallel, so the next request for any file of
//! that version is a cache hit.

pub mod error;
mod package_ref;

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use pkgcdn_archive::{ArchiveEntry, SearchResult};
use pkgcdn_config::Config;
use pkgcdn_external::ExternalResolver;
use pkgcdn_registry::{RegistryClient, TarballFetcher, VersionManifest};
use pkgcdn_storage::{CacheHeaders, CacheLayout, CacheServer, Cached, ServedFile};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::instrument;

pub use crate::package_ref::PackageRef;

/// A file ready to be sent to a client.
#[derive(Debug)]
pub enum Resolved {
    /// Opened from the cache, with response headers.
    Cached(ServedFile),
    /// Taken from the in-memory search because the cache couldn't be
    /// populated.
    Entry(ArchiveEntry),
}

impl Resolved {
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Cached(file) => file.headers().content_type,
            Self::Entry(entry) => entry.meta.as_ref().map_or("application/octet-stream", |meta| meta.content_type),
        }
    }

    /// Cache headers, only available for files served from disk.
    pub fn headers(&self) -> Option<&CacheHeaders> {
        match self {
            Self::Cached(file) => Some(file.headers()),
            Self::Entry(_) => None,
        }
    }

    pub async fn into_bytes(self) -> Result<Vec<u8>> {
        match self {
            Self::Cached(file) => file.into_bytes().await.or_raise(|| ErrorKind::Output),
            Self::Entry(entry) => Ok(entry.content.unwrap_or_default()),
        }
    }

    /// Write the whole body into `writer`, returning the number of bytes
    /// written.
    pub async fn copy_to<W: AsyncWrite + Unpin>(self, writer: &mut W) -> Result<u64> {
        match self {
            Self::Cached(file) => file.copy_to(writer).await.or_raise(|| ErrorKind::Output),
            Self::Entry(entry) => {
                let content = entry.content.unwrap_or_default();
                writer.write_all(&content).await.or_raise(|| ErrorKind::Output)?;
                writer.flush().await.or_raise(|| ErrorKind::Output)?;
                Ok(content.len() as u64)
            },
        }
    }
}

/// Package file lookups backed by the cache, the registry and the external
/// source map.
#[derive(Debug, Clone)]
pub struct PackageFiles {
    server: CacheServer,
    fetcher: TarballFetcher,
    external: ExternalResolver,
}

impl PackageFiles {
    pub fn new(config: &Config) -> Result<Self> {
        let client =
            RegistryClient::new(&config.registry.url, &config.registry.user_agent).or_raise(|| ErrorKind::Config)?;
        let layout = CacheLayout::new(&config.cache.dir).or_raise(|| ErrorKind::Config)?;
        let fetcher = TarballFetcher::new(client, layout.clone(), config.cache.fork_buffer);
        let external = ExternalResolver::new(fetcher.clone(), &config.external.package, &config.external.path);
        Ok(Self { server: CacheServer::new(layout), fetcher, external })
    }

    pub fn cache(&self) -> &CacheServer {
        &self.server
    }

    /// Resolve `path` inside `name@version_or_tag`.
    ///
    /// `path` may omit a trailing `.js` or `.json`, even when a directory of
    /// the same name exists. A directory is never served. A file found that
    /// way next to a directory is only served from the cache, since only the
    /// first match's payload is kept in memory.
    #[instrument(skip(self))]
    pub async fn resolve(&self, name: &str, version_or_tag: &str, path: &str) -> Result<Resolved> {
        let path = normalize(path);
        if let Cached::Served(file) = self.server.serve_from_cache(name, version_or_tag, path).await {
            return Ok(Resolved::Cached(file));
        }

        let manifest = self.manifest(name, version_or_tag).await?;
        let version = manifest.version.as_str();
        if version != version_or_tag
            && let Cached::Served(file) = self.server.serve_from_cache(name, version, path).await
        {
            return Ok(Resolved::Cached(file));
        }

        let stream = self.fetcher.fetch_tarball(&manifest.descriptor()).await.or_raise(|| ErrorKind::Registry)?;
        let (result, extraction) = stream.search(path, false).await.or_raise(|| ErrorKind::Stream)?;
        let script = result.found().is_some_and(ArchiveEntry::is_directory).then(|| script_for(&result, path)).flatten();
        let Some(entry) = result.into_found().filter(ArchiveEntry::is_file).or(script) else {
            exn::bail!(ErrorKind::NotFound(format!("{name}@{version}/{path}")));
        };

        let extracted = match extraction.wait().await {
            Ok(_) => true,
            Err(err) => {
                tracing::warn!(error = ?err, "cache not populated");
                false
            },
        };
        // The search may have answered `index` with `index.js`.
        if extracted && let Cached::Served(file) = self.server.serve_from_cache(name, version, &entry.name).await {
            return Ok(Resolved::Cached(file));
        }
        match entry.content {
            Some(_) => {
                tracing::warn!(file = %entry.name, "serving from memory");
                Ok(Resolved::Entry(entry))
            },
            None => exn::bail!(ErrorKind::NotFound(format!("{name}@{version}/{}", entry.name))),
        }
    }

    /// Everything under the directory `path` of `name@version_or_tag`.
    ///
    /// Use [`SearchResult::children`] for the immediate contents. `path` may
    /// also name a single file, in which case only that file is found.
    #[instrument(skip(self))]
    pub async fn list(&self, name: &str, version_or_tag: &str, path: &str) -> Result<SearchResult> {
        let path = normalize(path);
        let manifest = self.manifest(name, version_or_tag).await?;
        let stream = self.fetcher.fetch_tarball(&manifest.descriptor()).await.or_raise(|| ErrorKind::Registry)?;
        let (result, extraction) = stream.search(path, true).await.or_raise(|| ErrorKind::Stream)?;
        if let Err(err) = extraction.wait().await {
            tracing::warn!(error = ?err, "cache not populated while listing");
        }
        match result.found() {
            Some(_) => Ok(result),
            None => exn::bail!(ErrorKind::NotFound(format!("{name}@{}/{path}", manifest.version))),
        }
    }

    /// The `solution` substitute for `path` in `name@version`, according to
    /// the external source map.
    #[instrument(skip(self))]
    pub async fn switch(&self, name: &str, version: &str, path: &str, solution: &str) -> Result<String> {
        let source = normalize(path);
        match self.external.resolve_external_source(name, version, source, solution).await {
            Ok(substitute) => Ok(substitute),
            Err(err) if err.is_not_found() => {
                let kind = ErrorKind::NotFound(format!("{solution} substitute for {name}@{version}/{source}"));
                Err(err.raise(kind))
            },
            Err(err) => Err(err.raise(ErrorKind::External)),
        }
    }

    /// [`resolve`](Self::resolve), after substituting `path` through
    /// [`switch`](Self::switch) when a solution is given. A failed
    /// substitution is logged and the original path is served instead.
    #[instrument(skip(self))]
    pub async fn resolve_switched(
        &self,
        name: &str,
        version_or_tag: &str,
        path: &str,
        solution: Option<&str>,
    ) -> Result<Resolved> {
        let Some(solution) = solution else {
            return self.resolve(name, version_or_tag, path).await;
        };
        // Ranges in the map only match concrete versions.
        let version = match semver::Version::parse(version_or_tag) {
            Ok(_) => version_or_tag.to_string(),
            Err(_) => self.manifest(name, version_or_tag).await?.version,
        };
        let path = match self.switch(name, &version, path, solution).await {
            Ok(substitute) => substitute,
            Err(err) => {
                tracing::warn!(error = ?err, "external substitution failed, serving the requested path");
                normalize(path).to_string()
            },
        };
        self.resolve(name, &version, &path).await
    }

    async fn manifest(&self, name: &str, version_or_tag: &str) -> Result<VersionManifest> {
        match self.fetcher.client().fetch_manifest(name, version_or_tag).await {
            Ok(manifest) => Ok(manifest),
            Err(err) if err.is_not_found() => Err(err.raise(ErrorKind::NotFound(format!("{name}@{version_or_tag}")))),
            Err(err) => Err(err.raise(ErrorKind::Registry)),
        }
    }
}

/// `{path}.js`, then `{path}.json`, among the files the search admitted.
fn script_for(result: &SearchResult, path: &str) -> Option<ArchiveEntry> {
    [".js", ".json"]
        .iter()
        .filter_map(|extension| result.entries.get(&format!("{path}{extension}")))
        .find(|entry| entry.is_file())
        .cloned()
}

/// Request paths arrive with a leading `/`; package-relative names don't
/// have one, and directories don't keep a trailing one.
fn normalize(path: &str) -> &str {
    path.trim_matches('/')
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkgcdn_archive::fixtures::TarballBuilder;
    use pkgcdn_archive::search_tarball;
    use rstest::rstest;

    #[test]
    fn script_next_to_directory() {
        let tarball = TarballBuilder::new()
            .file("package/lib/index.js", "module.exports = 42;")
            .file("package/lib.json", "{}")
            .file("package/lib.js", "module.exports = 1;")
            .into_tar();
        let result = search_tarball(tarball.as_slice(), "lib", false).unwrap();
        assert!(result.found().unwrap().is_directory());
        assert_eq!(script_for(&result, "lib").unwrap().name, "lib.js");
        assert!(script_for(&result, "lib/index").is_none());
    }

    #[rstest]
    #[case("/index.js", "index.js")]
    #[case("lib/", "lib")]
    #[case("/", "")]
    #[case("", "")]
    #[case("/lib/util/pad.js", "lib/util/pad.js")]
    fn normalizes_request_paths(#[case] path: &str, #[case] expected: &str) {
        assert_eq!(normalize(path), expected);
    }
}
