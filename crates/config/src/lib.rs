//! Layered configuration.
//!
//! Sources, lowest precedence first:
//!
//! 1. Built-in defaults.
//! 2. An optional configuration file (`.toml`, `.yaml`/`.yml` or `.json`).
//! 3. The bare `CACHE_DIR` and `REGISTRY_URL` environment variables.
//! 4. `PKGCDN_`-prefixed environment variables, using `__` to nest
//!    (`PKGCDN_CACHE__FORK_BUFFER=32`).

pub mod error;

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

const DEFAULT_REGISTRY: &str = "https://registry.npmjs.org";
const DEFAULT_USER_AGENT: &str = concat!("pkgcdn/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub registry: RegistryConfig,
    pub cache: CacheConfig,
    pub external: ExternalConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Base URL of the package registry.
    pub url: String,
    pub user_agent: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Root of the extracted-package cache. Relative paths are resolved
    /// against the working directory at load time.
    pub dir: PathBuf,
    /// Capacity, in chunks, of each branch of the tarball byte fork.
    pub fork_buffer: usize,
}

/// Where the external source map is published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExternalConfig {
    pub package: String,
    /// Path of the JSON document inside that package's tarball.
    pub path: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_REGISTRY.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { dir: PathBuf::from(".cache"), fork_buffer: 16 }
    }
}

impl Default for ExternalConfig {
    fn default() -> Self {
        Self { package: "@shein/webpack-external-map".to_string(), path: "storage/external.json".to_string() }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self { registry: RegistryConfig::default(), cache: CacheConfig::default(), external: ExternalConfig::default() }
    }
}

impl Config {
    /// The layered sources, before extraction. Exposed so callers (and tests)
    /// can merge additional providers on top.
    pub fn figment(file: Option<&Path>) -> Result<Figment> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(file) = file {
            if !file.is_file() {
                exn::bail!(ErrorKind::NotFound(file.to_path_buf()));
            }
            let extension = file.extension().and_then(|ext| ext.to_str()).map(str::to_ascii_lowercase);
            figment = match extension.as_deref() {
                Some("toml") => figment.merge(Toml::file(file)),
                Some("yaml" | "yml") => figment.merge(Yaml::file(file)),
                Some("json") => figment.merge(Json::file(file)),
                _ => exn::bail!(ErrorKind::UnsupportedFormat(file.to_path_buf())),
            };
        }
        let legacy = Env::raw().only(&["CACHE_DIR", "REGISTRY_URL"]).map(|key| {
            match key.as_str().eq_ignore_ascii_case("CACHE_DIR") {
                true => "cache.dir".into(),
                false => "registry.url".into(),
            }
        });
        Ok(figment.merge(legacy).merge(Env::prefixed("PKGCDN_").split("__")))
    }

    /// Load configuration from every source, then validate it.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        Self::from_figment(Self::figment(file)?)
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let mut config: Config = figment.extract().map_err(|err| ErrorKind::Invalid(err.to_string()))?;
        if config.cache.dir.is_relative() {
            let cwd = std::env::current_dir().or_raise(|| ErrorKind::WorkingDirectory)?;
            config.cache.dir = cwd.join(&config.cache.dir);
        }
        config.validate()?;
        tracing::debug!(registry = %config.registry.url, cache = %config.cache.dir.display(), "configuration loaded");
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        match Url::parse(&self.registry.url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {},
            _ => exn::bail!(ErrorKind::Invalid(format!("registry URL must be an http(s) URL: {}", self.registry.url))),
        }
        if self.cache.fork_buffer == 0 {
            exn::bail!(ErrorKind::Invalid("cache.fork_buffer must be at least 1".to_string()));
        }
        if self.external.package.is_empty() || self.external.path.is_empty() {
            exn::bail!(ErrorKind::Invalid("external.package and external.path must not be empty".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use rstest::rstest;

    fn load(file: Option<&str>) -> std::result::Result<Config, figment::Error> {
        Config::load(file.map(Path::new)).map_err(|err| figment::Error::from(err.to_string()))
    }

    #[test]
    fn defaults() {
        Jail::expect_with(|jail| {
            let config = load(None)?;
            assert_eq!(config.registry.url, "https://registry.npmjs.org");
            assert_eq!(config.cache.dir, jail.directory().join(".cache"));
            assert_eq!(config.cache.fork_buffer, 16);
            assert_eq!(config.external.package, "@shein/webpack-external-map");
            assert_eq!(config.external.path, "storage/external.json");
            assert!(config.registry.user_agent.starts_with("pkgcdn/"));
            Ok(())
        });
    }

    #[rstest]
    #[case("pkgcdn.toml", "[cache]\ndir = \"/srv/cache\"\nfork_buffer = 4\n")]
    #[case("pkgcdn.yaml", "cache:\n  dir: /srv/cache\n  fork_buffer: 4\n")]
    #[case("pkgcdn.yml", "cache:\n  dir: /srv/cache\n  fork_buffer: 4\n")]
    #[case("pkgcdn.json", r#"{"cache": {"dir": "/srv/cache", "fork_buffer": 4}}"#)]
    fn file_formats(#[case] name: &'static str, #[case] contents: &'static str) {
        Jail::expect_with(|jail| {
            jail.create_file(name, contents)?;
            let config = load(Some(name))?;
            assert_eq!(config.cache.dir, Path::new("/srv/cache"));
            assert_eq!(config.cache.fork_buffer, 4);
            // Untouched sections keep their defaults.
            assert_eq!(config.external, ExternalConfig::default());
            Ok(())
        });
    }

    #[test]
    fn legacy_environment_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file("pkgcdn.toml", "[registry]\nurl = \"https://file.example\"\n")?;
            jail.set_env("CACHE_DIR", "/env/cache");
            jail.set_env("REGISTRY_URL", "http://registry.internal:4873");
            let config = load(Some("pkgcdn.toml"))?;
            assert_eq!(config.cache.dir, Path::new("/env/cache"));
            assert_eq!(config.registry.url, "http://registry.internal:4873");
            Ok(())
        });
    }

    #[test]
    fn prefixed_environment_wins() {
        Jail::expect_with(|jail| {
            jail.set_env("CACHE_DIR", "/legacy");
            jail.set_env("PKGCDN_CACHE__DIR", "/prefixed");
            jail.set_env("PKGCDN_EXTERNAL__PACKAGE", "@acme/external-map");
            let config = load(None)?;
            assert_eq!(config.cache.dir, Path::new("/prefixed"));
            assert_eq!(config.external.package, "@acme/external-map");
            Ok(())
        });
    }

    #[test]
    fn relative_cache_dir_resolves_against_working_directory() {
        Jail::expect_with(|jail| {
            jail.set_env("CACHE_DIR", "var/cache");
            let config = load(None)?;
            assert_eq!(config.cache.dir, jail.directory().join("var/cache"));
            Ok(())
        });
    }

    #[test]
    fn missing_file_is_an_error() {
        Jail::expect_with(|_| {
            let err = Config::load(Some(Path::new("absent.toml"))).unwrap_err();
            assert!(matches!(&*err, ErrorKind::NotFound(_)));
            Ok(())
        });
    }

    #[test]
    fn unsupported_extension_is_an_error() {
        Jail::expect_with(|jail| {
            jail.create_file("pkgcdn.ini", "cache=/x")?;
            let err = Config::load(Some(Path::new("pkgcdn.ini"))).unwrap_err();
            assert!(matches!(&*err, ErrorKind::UnsupportedFormat(_)));
            Ok(())
        });
    }

    #[rstest]
    #[case("PKGCDN_CACHE__FORK_BUFFER", "0")]
    #[case("REGISTRY_URL", "ftp://registry.example")]
    #[case("REGISTRY_URL", "not a url")]
    fn invalid_values(#[case] key: &'static str, #[case] value: &'static str) {
        Jail::expect_with(|jail| {
            jail.set_env(key, value);
            let err = Config::load(None).unwrap_err();
            assert!(matches!(&*err, ErrorKind::Invalid(_)));
            Ok(())
        });
    }
}
