//! Layered configuration for dupeguard.
//!
//! Values are merged from, lowest priority first:
//! 1. built-in defaults,
//! 2. a TOML file (`config.toml` in the platform config directory unless a
//!    path is given explicitly),
//! 3. environment variables prefixed with `DUPEGUARD_`, nested keys separated
//!    by `__` (e.g. `DUPEGUARD_DATABASE__PATH`).
//!
//! The loaded configuration is validated before it is returned.

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use dupeguard_index::{DEFAULT_LINK_TEMPLATE, LinkGenerator, PoolSettings};
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_PREFIX: &str = "DUPEGUARD_";
const CONFIG_FILE: &str = "config.toml";
const DATABASE_FILE: &str = "file_hashes.db";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub listing: ListingConfig,
    pub links: LinksConfig,
    /// Default tracing filter directive, used when `RUST_LOG` is unset.
    pub log_level: LogLevel,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub max_connections: u32,
    pub busy_timeout_ms: u64,
}
impl Default for DatabaseConfig {
    fn default() -> Self {
        let defaults = PoolSettings::default();
        Self {
            path: project_dirs()
                .map(|dirs| dirs.data_dir().join(DATABASE_FILE))
                .unwrap_or_else(|| PathBuf::from(DATABASE_FILE)),
            max_connections: defaults.max_connections,
            busy_timeout_ms: u64::try_from(defaults.busy_timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }
}
impl DatabaseConfig {
    pub fn pool_settings(&self) -> PoolSettings {
        PoolSettings { max_connections: self.max_connections, busy_timeout: Duration::from_millis(self.busy_timeout_ms) }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListingConfig {
    /// Groups listed when no limit is requested.
    pub default_limit: usize,
    /// Upper bound for any requested limit.
    pub max_limit: usize,
}
impl Default for ListingConfig {
    fn default() -> Self {
        Self { default_limit: 10, max_limit: 50 }
    }
}
impl ListingConfig {
    /// The limit to apply for a requested one, kept within `1..=max_limit`.
    pub fn clamp(&self, requested: Option<usize>) -> usize {
        requested.unwrap_or(self.default_limit).clamp(1, self.max_limit.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinksConfig {
    /// Download link template; see [`LinkGenerator`] for the variables.
    pub template: String,
}
impl Default for LinksConfig {
    fn default() -> Self {
        Self { template: DEFAULT_LINK_TEMPLATE.to_string() }
    }
}
impl LinksConfig {
    pub fn generator(&self) -> Result<LinkGenerator> {
        self.template.parse::<LinkGenerator>().or_raise(|| ErrorKind::Invalid("links.template"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogLevel(pub String);
impl Default for LogLevel {
    fn default() -> Self {
        Self("info".to_string())
    }
}
impl AsRef<str> for LogLevel {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Config {
    /// Load from the default sources, or from `file` instead of the default
    /// config file. An explicitly given file must exist.
    #[tracing::instrument(level = "debug")]
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let file = match file {
            Some(path) if !path.is_file() => exn::bail!(ErrorKind::MissingFile(path.to_path_buf())),
            Some(path) => Some(path.to_path_buf()),
            None => Self::default_file(),
        };
        Self::from_figment(Self::figment(file.as_deref()))
    }

    /// The layered sources, without extracting them.
    pub fn figment(file: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(file) = file {
            figment = figment.merge(Toml::file(file));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: Self = figment.extract().or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        tracing::debug!(database = %config.database.path.display(), "configuration loaded");
        Ok(config)
    }

    /// `config.toml` in the platform config directory, if one can be determined.
    pub fn default_file() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE))
    }

    pub fn validate(&self) -> Result<()> {
        if self.database.path.as_os_str().is_empty() {
            exn::bail!(ErrorKind::Invalid("database.path"));
        }
        if self.database.max_connections == 0 {
            exn::bail!(ErrorKind::Invalid("database.max_connections"));
        }
        if self.listing.max_limit == 0 {
            exn::bail!(ErrorKind::Invalid("listing.max_limit"));
        }
        if self.listing.default_limit == 0 || self.listing.default_limit > self.listing.max_limit {
            exn::bail!(ErrorKind::Invalid("listing.default_limit"));
        }
        if self.links.template.trim().is_empty() {
            exn::bail!(ErrorKind::Invalid("links.template"));
        }
        self.links.generator()?;
        if self.log_level.0.trim().is_empty() {
            exn::bail!(ErrorKind::Invalid("log_level"));
        }
        Ok(())
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "dupeguard")
}
