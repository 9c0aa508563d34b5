//! Config file discovery, loading, and environment variable overlay.

use crate::{ConfigError, WaiveConfig};
use std::env;
use std::path::{Path, PathBuf};

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values
    pub env_overrides: Vec<String>,
}

/// Discover config files in standard locations.
pub fn discover_config_files() -> Vec<PathBuf> {
    discover_config_files_with_override(None)
}

/// Discover config files, optionally with a CLI override path.
///
/// If `cli_path` is provided it replaces the local override and is returned
/// whether or not it exists, so a mistyped `--config` fails at read time.
/// Returns paths in load order (system, user, local/cli). The system, user and
/// local files are only returned when present.
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from("/etc/waive/config.toml");
    if system.exists() {
        files.push(system);
    }

    // XDG_CONFIG_HOME or ~/.config
    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("waive/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    if let Some(path) = cli_path {
        files.push(path.to_path_buf());
        return files;
    }

    let local = PathBuf::from("waive.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

/// Read a config file into a raw TOML table.
pub fn read_table(path: &Path) -> Result<toml::Table, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    parse_table(&contents, path)
}

pub(crate) fn parse_table(contents: &str, path: &Path) -> Result<toml::Table, ConfigError> {
    contents.parse().map_err(|e: toml::de::Error| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Deep-merge `overlay` into `base`. Nested tables merge key by key; any other
/// value in `overlay` replaces the one in `base`.
pub fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// Deserialize a merged table; missing sections and fields take their defaults.
pub(crate) fn from_table(
    table: toml::Table,
    origin: Option<&Path>,
) -> Result<WaiveConfig, ConfigError> {
    toml::Value::Table(table)
        .try_into()
        .map_err(|e: toml::de::Error| ConfigError::Parse {
            path: origin.map(Path::to_path_buf).unwrap_or_default(),
            message: e.to_string(),
        })
}

/// Apply environment variable overrides to config.
pub fn apply_env_overrides(
    config: &mut WaiveConfig,
    sources: &mut ConfigSources,
) -> Result<(), ConfigError> {
    apply_env_overrides_from(config, sources, |var| env::var(var).ok())
}

/// Apply overrides from any variable source. Later variables in the list win,
/// so `OTEL_EXPORTER_OTLP_ENDPOINT` beats `WAIVE_OTLP_ENDPOINT` and `RUST_LOG`
/// beats `WAIVE_LOG_LEVEL`.
pub fn apply_env_overrides_from(
    config: &mut WaiveConfig,
    sources: &mut ConfigSources,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), ConfigError> {
    let mut take = |var: &str| {
        let value = lookup(var)?;
        sources.env_overrides.push(var.to_string());
        Some(value)
    };

    let paths = [
        ("WAIVE_ASSETS_ROOT", &mut config.paths.assets_root),
        ("WAIVE_DRUM_ROOT", &mut config.paths.drum_root),
        ("WAIVE_SYNTH_ROOT", &mut config.paths.synth_root),
        ("WAIVE_BASSLINE_ROOT", &mut config.paths.bassline_root),
        ("WAIVE_MELODY_ROOT", &mut config.paths.melody_root),
    ];
    for (var, slot) in paths {
        if let Some(v) = take(var) {
            *slot = PathBuf::from(v);
        }
    }

    if let Some(v) = take("WAIVE_HOST") {
        config.bind.host = v;
    }
    if let Some(v) = take("WAIVE_HTTP_PORT") {
        config.bind.http_port = parse_env("WAIVE_HTTP_PORT", &v)?;
    }
    if let Some(v) = take("WAIVE_REPLY_TIMEOUT_MS") {
        config.bridge.reply_timeout_ms = parse_env("WAIVE_REPLY_TIMEOUT_MS", &v)?;
    }

    if let Some(v) = take("WAIVE_OTLP_ENDPOINT") {
        config.telemetry.otlp_endpoint = v;
    }
    // Also support standard OTEL env var
    if let Some(v) = take("OTEL_EXPORTER_OTLP_ENDPOINT") {
        config.telemetry.otlp_endpoint = v;
    }
    if let Some(v) = take("WAIVE_LOG_LEVEL") {
        config.telemetry.log_level = v;
    }
    if let Some(v) = take("RUST_LOG") {
        config.telemetry.log_level = v;
    }

    Ok(())
}

fn parse_env<T: std::str::FromStr>(var: &str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::Invalid(format!("{}={:?}: {}", var, value, e)))
}

/// Expand `~/` and `$VAR/` prefixes in a path.
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
            return home.join(stripped);
        }
        return PathBuf::from(path);
    }

    if let Some(stripped) = path.strip_prefix('$') {
        return match stripped.split_once('/') {
            Some((var_name, rest)) => env::var(var_name)
                .map(|value| PathBuf::from(value).join(rest))
                .unwrap_or_else(|_| PathBuf::from(path)),
            None => env::var(stripped)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(path)),
        };
    }

    PathBuf::from(path)
}
