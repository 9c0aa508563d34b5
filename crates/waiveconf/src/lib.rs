//! Configuration loading for the Waive gateway.
//!
//! Configuration is read once at startup and never mutated afterwards. The
//! resulting [`WaiveConfig`] is shared by reference (usually behind an `Arc`)
//! with the HTTP gateway and handed to the worker when it is constructed.
//!
//! # Usage
//!
//! ```rust,no_run
//! use waiveconf::WaiveConfig;
//!
//! let config = WaiveConfig::load().expect("Failed to load config");
//! println!("Assets: {}", config.paths.assets_root.display());
//! println!("HTTP: {}", config.bind.addr());
//! ```
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins):
//! 1. `/etc/waive/config.toml` (system)
//! 2. `~/.config/waive/config.toml` (user)
//! 3. `./waive.toml` (local override, replaced by `--config` when given)
//! 4. Environment variables (`WAIVE_*`)
//!
//! # Example Config
//!
//! ```toml
//! [paths]
//! assets_root = "~/waive/assets"
//! drum_root = "../"
//! synth_root = "../"
//!
//! [assets]
//! drum_group = "drums"
//!
//! [bind]
//! http_port = 5000
//!
//! [bridge]
//! reply_timeout_ms = 120000
//!
//! [telemetry]
//! otlp_endpoint = "127.0.0.1:4317"
//! log_level = "info"
//! ```

pub mod infra;
pub mod loader;

pub use infra::{AssetsConfig, BindConfig, BridgeConfig, PathsConfig, TelemetryConfig};
pub use loader::{discover_config_files_with_override, ConfigSources};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Complete gateway configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct WaiveConfig {
    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub assets: AssetsConfig,

    #[serde(default)]
    pub bind: BindConfig,

    #[serde(default)]
    pub bridge: BridgeConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl WaiveConfig {
    /// Load configuration from all standard sources.
    pub fn load() -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(None)?;
        Ok(config)
    }

    /// Load configuration, letting `config_path` replace the local `./waive.toml`.
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(config_path)?;
        Ok(config)
    }

    /// Load configuration and report which files and env vars contributed.
    pub fn load_with_sources_from(
        config_path: Option<&Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut merged = toml::Table::new();

        for path in loader::discover_config_files_with_override(config_path) {
            let table = loader::read_table(&path)?;
            loader::merge_tables(&mut merged, table);
            sources.files.push(path);
        }

        let mut config = loader::from_table(merged, sources.files.last().map(PathBuf::as_path))?;
        loader::apply_env_overrides(&mut config, &mut sources)?;
        config.expand_paths();
        config.validate()?;

        Ok((config, sources))
    }

    /// Parse a single TOML document on top of the defaults. No env overlay.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let origin = Path::new("<inline>");
        let table = loader::parse_table(contents, origin)?;
        let mut config = loader::from_table(table, Some(origin))?;
        config.expand_paths();
        config.validate()?;
        Ok(config)
    }

    /// Serialize config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        let body = toml::to_string_pretty(self)?;
        Ok(format!("# Waive Configuration\n\n{}", body))
    }

    fn expand_paths(&mut self) {
        let paths = &mut self.paths;
        for path in [
            &mut paths.assets_root,
            &mut paths.drum_root,
            &mut paths.synth_root,
            &mut paths.bassline_root,
            &mut paths.melody_root,
        ] {
            let expanded = loader::expand_path(&path.to_string_lossy());
            *path = expanded;
        }
        // An empty index_file means the built-in page
        paths.index_file = paths
            .index_file
            .take()
            .filter(|index| !index.as_os_str().is_empty())
            .map(|index| loader::expand_path(&index.to_string_lossy()));
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.assets.drum_group.trim().is_empty() {
            return Err(ConfigError::Invalid("assets.drum_group must not be empty".into()));
        }
        if self.assets.sound_group.trim().is_empty() {
            return Err(ConfigError::Invalid("assets.sound_group must not be empty".into()));
        }
        Ok(())
    }
}
