//! Configuration for the civic issue tracker
//!
//! Read from `$CIVIC_CONFIG`, else `<config_dir>/civic/config.toml`.
//! A missing file means defaults; a few environment variables override
//! individual values.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Deployment environment; anything but "production" includes
    /// diagnostic detail in API error bodies
    pub environment: String,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub listing: ListingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            server: ServerConfig::default(),
            store: StoreConfig::default(),
            listing: ListingConfig::default(),
        }
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,

    /// Allowed CORS origins; empty allows any origin
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            cors_origins: Vec::new(),
        }
    }
}

/// Issue store settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StoreConfig {
    /// JSON-lines document file; unset keeps issues in memory only
    pub path: Option<PathBuf>,
}

/// Pagination and search limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListingConfig {
    pub default_limit: usize,
    pub max_limit: usize,
    pub search_limit: usize,
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            default_limit: 20,
            max_limit: 100,
            search_limit: 20,
        }
    }
}

impl Config {
    /// Load config from a TOML file
    pub fn load(path: &Path) -> crate::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config =
            toml::from_str(&content).map_err(|e| crate::Error::Config(e.to_string()))?;
        Ok(config)
    }

    /// Load from the default location and apply environment overrides
    pub fn load_default() -> crate::Result<Self> {
        let mut config = match Self::default_path() {
            Some(path) => Self::load(&path)?,
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// `$CIVIC_CONFIG`, else `<config_dir>/civic/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        std::env::var("CIVIC_CONFIG")
            .ok()
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .or_else(|| dirs::config_dir().map(|dir| dir.join("civic").join("config.toml")))
    }

    /// Apply `CIVIC_API_PORT`, `CIVIC_DATA_PATH` and `CIVIC_ENV`
    pub fn apply_env(&mut self) {
        if let Some(port) = std::env::var("CIVIC_API_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
        {
            self.server.port = port;
        }
        if let Ok(path) = std::env::var("CIVIC_DATA_PATH")
            && !path.is_empty()
        {
            self.store.path = Some(PathBuf::from(path));
        }
        if let Ok(env) = std::env::var("CIVIC_ENV")
            && !env.is_empty()
        {
            self.environment = env;
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// Save config to a TOML file
    pub fn save(&self, path: &Path) -> crate::Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| crate::Error::Config(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Generate a default config file with comments
    pub fn default_with_comments() -> String {
        r#"# civic issue tracker configuration

# Deployment environment. Anything other than "production" adds
# diagnostic detail to API error responses.
environment = "development"

[server]
host = "127.0.0.1"
port = 5000

# Allowed CORS origins (empty = any origin)
cors_origins = []

[store]
# JSON-lines document file. Leave unset to keep issues in memory.
# path = "data/issues.jsonl"

[listing]
# Page size when the request does not give one
default_limit = 20

# Largest page size a request may ask for
max_limit = 100

# Results returned by /issues/search when no limit is given
search_limit = 20
"#
        .to_string()
    }
}
