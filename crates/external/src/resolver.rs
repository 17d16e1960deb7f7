use crate::error::{ErrorKind, Result};
use crate::map::ExternalMap;
use exn::ResultExt;
use pkgcdn_registry::TarballFetcher;
use tracing::instrument;

/// Resolves file substitutions against the external map published in a
/// well-known package.
///
/// The map is fetched fresh for every resolution; there is no caching across
/// calls, so a newly published map takes effect immediately.
#[derive(Debug, Clone)]
pub struct ExternalResolver {
    fetcher: TarballFetcher,
    package: String,
    path: String,
}

impl ExternalResolver {
    /// `package` publishes the map; `path` locates the JSON document inside
    /// that package's tarball.
    pub fn new(fetcher: TarballFetcher, package: impl Into<String>, path: impl Into<String>) -> Self {
        Self { fetcher, package: package.into(), path: path.into() }
    }

    /// Fetch and parse the map from the `latest` version of the map package.
    #[instrument(skip(self), fields(package = %self.package))]
    pub async fn load_map(&self) -> Result<ExternalMap> {
        let client = self.fetcher.client();
        let Some(info) = client.fetch_package_info(&self.package).await.or_raise(|| ErrorKind::Registry)? else {
            exn::bail!(ErrorKind::MapUnavailable(format!("package {} does not exist", self.package)));
        };
        let Some(manifest) = info.latest() else {
            exn::bail!(ErrorKind::MapUnavailable(format!("package {} has no latest version", self.package)));
        };
        tracing::debug!(version = %manifest.version, "loading external map");

        let stream = self.fetcher.fetch_tarball(&manifest.descriptor()).await.or_raise(|| ErrorKind::Registry)?;
        // Extraction into the cache carries on in the background.
        let (result, _extraction) = stream.search(&self.path, false).await.or_raise(|| ErrorKind::Registry)?;
        let Some(document) = result.into_found().and_then(|entry| entry.content) else {
            exn::bail!(ErrorKind::MapUnavailable(format!("{} not found in {}", self.path, self.package)));
        };
        ExternalMap::from_slice(&document)
    }

    /// Pick the `solution` substitute for `source` in `package@version`.
    #[instrument(skip(self))]
    pub async fn resolve_external_source(
        &self,
        package: &str,
        version: &str,
        source: &str,
        solution: &str,
    ) -> Result<String> {
        let map = self.load_map().await?;
        let substitute = map.resolve(package, version, source, solution)?;
        tracing::debug!(%substitute, "external source resolved");
        Ok(substitute.to_string())
    }
}
