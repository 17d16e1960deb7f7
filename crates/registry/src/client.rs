//! Registry metadata client.

use crate::error::{ErrorKind, Result};
use crate::models::{PackageInfo, VersionManifest};
use exn::ResultExt;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::header::{ACCEPT, HeaderValue};
use reqwest::{Client, StatusCode};
use tracing::instrument;
use url::Url;

/// Left alone by `encodeURIComponent`: `A-Z a-z 0-9 - _ . ! ~ * ' ( )`.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Talks to a package registry over HTTP.
///
/// Holds two clients: a pooled keep-alive client for `https` endpoints, and
/// one with pooling disabled for plain `http` endpoints. Requests are
/// dispatched on the scheme of the URL being requested, so a registry on
/// `https` serving tarballs from an `http` mirror (or vice versa) works.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    base_url: String,
    pooled: Client,
    unpooled: Client,
}

impl RegistryClient {
    pub fn new(base_url: &str, user_agent: &str) -> Result<Self> {
        Url::parse(base_url).or_raise(|| ErrorKind::InvalidUrl(base_url.to_string()))?;
        let pooled = Client::builder().user_agent(user_agent).build().or_raise(|| ErrorKind::Client)?;
        let unpooled = Client::builder()
            .user_agent(user_agent)
            .pool_max_idle_per_host(0)
            .build()
            .or_raise(|| ErrorKind::Client)?;
        Ok(Self { base_url: base_url.trim_end_matches('/').to_string(), pooled, unpooled })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The HTTP client appropriate for `url`'s scheme.
    pub(crate) fn http_for(&self, url: &Url) -> &Client {
        match url.scheme() {
            "http" => &self.unpooled,
            _ => &self.pooled,
        }
    }

    /// Fetch the registry document for `name`.
    ///
    /// Returns `Ok(None)` when the registry doesn't know the package.
    #[instrument(skip(self))]
    pub async fn fetch_package_info(&self, name: &str) -> Result<Option<PackageInfo>> {
        let address = format!("{}/{}", self.base_url, encode_package_name(name));
        let url = Url::parse(&address).or_raise(|| ErrorKind::InvalidUrl(address.clone()))?;
        tracing::debug!(%url, "fetching package metadata");

        let response = self
            .http_for(&url)
            .get(url.clone())
            .header(ACCEPT, HeaderValue::from_static("application/json"))
            .send()
            .await
            .or_raise(|| ErrorKind::Network)?;
        match response.status() {
            StatusCode::OK => {},
            StatusCode::NOT_FOUND => {
                tracing::debug!("package not found in registry");
                return Ok(None);
            },
            status => {
                let body = response.text().await.unwrap_or_default();
                exn::bail!(ErrorKind::Registry { status: status.as_u16(), body });
            },
        }
        let body = response.bytes().await.or_raise(|| ErrorKind::Network)?;
        let info = serde_json::from_slice(&body).or_raise(|| ErrorKind::InvalidMetadata(name.to_string()))?;
        Ok(Some(info))
    }

    /// Resolve `version_or_tag` of `name` to its manifest, treating an
    /// unknown package and an unknown version the same way.
    pub async fn fetch_manifest(&self, name: &str, version_or_tag: &str) -> Result<VersionManifest> {
        let Some(info) = self.fetch_package_info(name).await? else {
            exn::bail!(ErrorKind::NotFound(name.to_string()));
        };
        match info.manifest(version_or_tag) {
            Some(manifest) => Ok(manifest.clone()),
            None => exn::bail!(ErrorKind::NotFound(format!("{name}@{version_or_tag}"))),
        }
    }
}

/// Encode a package name for use as a single registry URL path segment.
///
/// Scoped names keep their leading `@` so the registry recognises them; the
/// rest of the name (including the scope separator) is percent-encoded.
///
/// ```
/// use pkgcdn_registry::encode_package_name;
///
/// assert_eq!(encode_package_name("left-pad"), "left-pad");
/// assert_eq!(encode_package_name("@babel/core"), "@babel%2Fcore");
/// ```
pub fn encode_package_name(name: &str) -> String {
    match name.strip_prefix('@') {
        Some(scoped) => format!("@{}", encode_component(scoped)),
        None => encode_component(name),
    }
}

fn encode_component(input: &str) -> String {
    utf8_percent_encode(input, URI_COMPONENT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const LEFT_PAD: &str = r#"{
        "name": "left-pad",
        "dist-tags": { "latest": "1.3.0" },
        "versions": {
            "1.3.0": {
                "name": "left-pad",
                "version": "1.3.0",
                "dist": { "tarball": "https://registry.npmjs.org/left-pad/-/left-pad-1.3.0.tgz" }
            }
        }
    }"#;

    fn client(server: &MockServer) -> RegistryClient {
        RegistryClient::new(&server.uri(), "pkgcdn-test").unwrap()
    }

    #[rstest]
    #[case("react", "react")]
    #[case("lodash.merge", "lodash.merge")]
    #[case("@babel/core", "@babel%2Fcore")]
    #[case("@my-org/my-pkg", "@my-org%2Fmy-pkg")]
    #[case("weird name", "weird%20name")]
    #[case("a/b", "a%2Fb")]
    #[case("ünïcode", "%C3%BCn%C3%AFcode")]
    #[case("it's(ok)!~*", "it's(ok)!~*")]
    #[case("a+b&c=d", "a%2Bb%26c%3Dd")]
    #[case("100%", "100%25")]
    fn encodes_package_names(#[case] name: &str, #[case] expected: &str) {
        assert_eq!(encode_package_name(name), expected);
    }

    #[rstest]
    #[case("http://registry.internal", "http://registry.internal")]
    #[case("https://registry.npmjs.org/", "https://registry.npmjs.org")]
    fn trims_base_url(#[case] base: &str, #[case] expected: &str) {
        assert_eq!(RegistryClient::new(base, "ua").unwrap().base_url(), expected);
    }

    #[test]
    fn rejects_invalid_base_url() {
        let err = RegistryClient::new("not a url", "ua").unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidUrl(_)));
    }

    #[tokio::test]
    async fn fetches_package_info() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/left-pad"))
            .and(header("accept", "application/json"))
            .respond_with(ResponseTemplate::new(200).set_body_string(LEFT_PAD))
            .expect(1)
            .mount(&server)
            .await;

        let info = client(&server).fetch_package_info("left-pad").await.unwrap().unwrap();
        assert_eq!(info.name, "left-pad");
        assert_eq!(info.latest().unwrap().version, "1.3.0");
    }

    #[tokio::test]
    async fn requests_scoped_names_encoded() {
        let server = MockServer::start().await;
        let document = r#"{"name": "@babel/core", "dist-tags": {}, "versions": {}}"#;
        Mock::given(method("GET"))
            .and(path("/@babel%2Fcore"))
            .respond_with(ResponseTemplate::new(200).set_body_string(document))
            .expect(1)
            .mount(&server)
            .await;

        let info = client(&server).fetch_package_info("@babel/core").await.unwrap().unwrap();
        assert_eq!(info.name, "@babel/core");
    }

    #[tokio::test]
    async fn missing_package_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string(r#"{"error":"Not found"}"#))
            .mount(&server)
            .await;

        assert!(client(&server).fetch_package_info("does-not-exist").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn server_error_carries_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
            .mount(&server)
            .await;

        let err = client(&server).fetch_package_info("left-pad").await.unwrap_err();
        assert_eq!(&*err, &ErrorKind::Registry { status: 500, body: "upstream exploded".to_string() });
    }

    #[tokio::test]
    async fn malformed_document_is_invalid_metadata() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>captive portal</html>"))
            .mount(&server)
            .await;

        let err = client(&server).fetch_package_info("left-pad").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidMetadata(name) if name == "left-pad"));
    }

    #[tokio::test]
    async fn unreachable_registry_is_a_network_error() {
        let client = RegistryClient::new("http://127.0.0.1:1", "ua").unwrap();
        let err = client.fetch_package_info("left-pad").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Network));
    }

    #[tokio::test]
    async fn fetch_manifest_resolves_tags() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/left-pad"))
            .respond_with(ResponseTemplate::new(200).set_body_string(LEFT_PAD))
            .mount(&server)
            .await;
        let client = client(&server);

        assert_eq!(client.fetch_manifest("left-pad", "latest").await.unwrap().version, "1.3.0");
        let err = client.fetch_manifest("left-pad", "2.0.0").await.unwrap_err();
        assert!(err.is_not_found());
        let err = client.fetch_manifest("missing", "latest").await.unwrap_err();
        assert!(err.is_not_found());
    }
}
