//! Configuration for the worker, its network client and its on-disk cache.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::{Origin, Url};

use crate::error::{Error, Result};

/// Cache generation used when none is configured. Bump it to force every
/// client to drop its stores and re-download the assets.
pub const DEFAULT_VERSION: &str = "smcp-v1";

/// Scope the relative asset paths resolve against by default.
pub const DEFAULT_SCOPE: &str = "http://localhost:8000/";

/// Assets pre-cached at install time, relative to the worker scope.
pub const DEFAULT_ASSETS: [&str; 17] = [
    "./index.html",
    "./module1.html",
    "./module2.html",
    "./module3.html",
    "./module4.html",
    "./module5.html",
    "./module6.html",
    "./module7.html",
    "./module8.html",
    "./module9.html",
    "./module10.html",
    "./module11.html",
    "./module12.html",
    "./module13.html",
    "./module14.html",
    "./manifest.json",
    "./icon.svg",
];

/// What the worker caches and under which generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Version tag naming the active cache store.
    pub version: String,
    /// URL the worker is registered at; defines its origin.
    pub scope: Url,
    /// Ordered asset paths, relative to `scope`.
    pub assets: Vec<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            version: DEFAULT_VERSION.to_string(),
            scope: Url::parse(DEFAULT_SCOPE).expect("default scope is a valid URL"),
            assets: DEFAULT_ASSETS.iter().map(ToString::to_string).collect(),
        }
    }
}

impl WorkerConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the cache version tag.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Sets the worker scope.
    #[must_use]
    pub fn with_scope(mut self, scope: Url) -> Self {
        self.scope = scope;
        self
    }

    /// Replaces the asset list.
    #[must_use]
    pub fn with_assets<I, S>(mut self, assets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.assets = assets.into_iter().map(Into::into).collect();
        self
    }

    /// Origin of the worker, derived from its scope.
    #[must_use]
    pub fn origin(&self) -> Origin {
        self.scope.origin()
    }

    /// Resolves every asset against the scope, preserving order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if an asset path cannot be resolved.
    pub fn asset_urls(&self) -> Result<Vec<Url>> {
        self.assets
            .iter()
            .map(|asset| {
                self.scope
                    .join(asset)
                    .map_err(|e| Error::Config(format!("asset {asset:?}: {e}")))
            })
            .collect()
    }

    /// Checks the configuration can drive a worker.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an empty version tag, an opaque scope or
    /// an unresolvable asset.
    pub fn validate(&self) -> Result<()> {
        if self.version.trim().is_empty() {
            return Err(Error::Config("version tag must not be empty".to_string()));
        }
        if !self.origin().is_tuple() {
            return Err(Error::Config(format!(
                "scope {} has no network origin",
                self.scope
            )));
        }
        self.asset_urls().map(|_| ())
    }
}

/// Settings for the network fetcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Whole-request timeout in seconds; `0` leaves it to the platform.
    pub timeout_secs: u64,
    /// `User-Agent` header sent with every request.
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent: format!("smcp-sw/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Where the on-disk cache storage lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathConfig {
    /// Root directory holding one sub-directory per cache store.
    pub cache_dir: PathBuf,
}

impl Default for PathConfig {
    fn default() -> Self {
        let cache_dir = dirs::cache_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            cache_dir: cache_dir.join("smcp-sw"),
        }
    }
}

/// Complete application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Worker configuration.
    pub worker: WorkerConfig,
    /// Network configuration.
    pub http: HttpConfig,
    /// Path configuration.
    pub paths: PathConfig,
}

impl AppConfig {
    /// Creates a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Default location of the config file.
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("smcp-sw")
            .join("config.toml")
    }

    /// Loads the config at `path`, writing a default template first if the
    /// file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, written or parsed, or if
    /// the worker section is invalid.
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if !path.exists() {
            let config = Self::default();
            config.save(path)?;
            log::info!("Wrote default config to {}", path.display());
            return Ok(config);
        }
        let text = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&text)?;
        config.worker.validate()?;
        Ok(config)
    }

    /// Writes the config as TOML, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }
}
