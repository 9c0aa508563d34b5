//! Configuration sections. Everything here is fixed once the process starts.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Filesystem roots for assets and the generator engines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Root of the media asset store served by `/sample`, `/drum` and `/sound`.
    /// Default: ./assets
    #[serde(default = "PathsConfig::default_assets_root")]
    pub assets_root: PathBuf,

    /// Drum generator model root.
    /// Default: ../
    #[serde(default = "PathsConfig::default_generator_root")]
    pub drum_root: PathBuf,

    /// Synth generator model root.
    /// Default: ../
    #[serde(default = "PathsConfig::default_generator_root")]
    pub synth_root: PathBuf,

    /// Bassline generator model root.
    /// Default: ../
    #[serde(default = "PathsConfig::default_generator_root")]
    pub bassline_root: PathBuf,

    /// Melody generator model root.
    /// Default: ../
    #[serde(default = "PathsConfig::default_generator_root")]
    pub melody_root: PathBuf,

    /// Optional HTML document served at `/` instead of the built-in page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_file: Option<PathBuf>,
}

impl PathsConfig {
    fn default_assets_root() -> PathBuf {
        PathBuf::from("./assets")
    }

    fn default_generator_root() -> PathBuf {
        PathBuf::from("../")
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            assets_root: Self::default_assets_root(),
            drum_root: Self::default_generator_root(),
            synth_root: Self::default_generator_root(),
            bassline_root: Self::default_generator_root(),
            melody_root: Self::default_generator_root(),
            index_file: None,
        }
    }
}

/// Asset naming rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetsConfig {
    /// Group name whose files are stored pre-transcoded to mp3.
    /// Default: drums
    #[serde(default = "AssetsConfig::default_drum_group")]
    pub drum_group: String,

    /// Group used by the legacy `/sound` route.
    /// Default: synth
    #[serde(default = "AssetsConfig::default_sound_group")]
    pub sound_group: String,
}

impl AssetsConfig {
    fn default_drum_group() -> String {
        "drums".to_string()
    }

    fn default_sound_group() -> String {
        "synth".to_string()
    }
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            drum_group: Self::default_drum_group(),
            sound_group: Self::default_sound_group(),
        }
    }
}

/// HTTP listener.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BindConfig {
    /// Default: 0.0.0.0
    #[serde(default = "BindConfig::default_host")]
    pub host: String,

    /// Default: 5000
    #[serde(default = "BindConfig::default_http_port")]
    pub http_port: u16,
}

impl BindConfig {
    fn default_host() -> String {
        "0.0.0.0".to_string()
    }

    fn default_http_port() -> u16 {
        5000
    }

    /// `host:port` string suitable for `TcpListener::bind`.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.http_port)
    }
}

impl Default for BindConfig {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            http_port: Self::default_http_port(),
        }
    }
}

/// Correlation bridge settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// How long a request waits for the worker's reply, in milliseconds.
    /// Zero waits forever.
    /// Default: 0
    #[serde(default)]
    pub reply_timeout_ms: u64,
}

impl BridgeConfig {
    pub fn reply_timeout(&self) -> Option<Duration> {
        match self.reply_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }
}

/// Telemetry and observability configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// OTLP gRPC endpoint for OpenTelemetry. Empty disables export.
    /// Default: empty
    #[serde(default)]
    pub otlp_endpoint: String,

    /// Log level or `EnvFilter` directive string.
    /// Default: info
    #[serde(default = "TelemetryConfig::default_log_level")]
    pub log_level: String,
}

impl TelemetryConfig {
    fn default_log_level() -> String {
        "info".to_string()
    }

    pub fn otlp_endpoint(&self) -> Option<&str> {
        let endpoint = self.otlp_endpoint.trim();
        (!endpoint.is_empty()).then_some(endpoint)
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            otlp_endpoint: String::new(),
            log_level: Self::default_log_level(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_defaults() {
        let paths = PathsConfig::default();
        assert_eq!(paths.assets_root, PathBuf::from("./assets"));
        assert_eq!(paths.drum_root, PathBuf::from("../"));
        assert_eq!(paths.melody_root, PathBuf::from("../"));
        assert!(paths.index_file.is_none());
    }

    #[test]
    fn test_bind_addr() {
        let bind = BindConfig::default();
        assert_eq!(bind.addr(), "0.0.0.0:5000");
    }

    #[test]
    fn test_reply_timeout_zero_means_forever() {
        assert_eq!(BridgeConfig::default().reply_timeout(), None);
        let bridge = BridgeConfig {
            reply_timeout_ms: 1500,
        };
        assert_eq!(bridge.reply_timeout(), Some(Duration::from_millis(1500)));
    }

    #[test]
    fn test_otlp_endpoint_blank_is_disabled() {
        let mut telemetry = TelemetryConfig::default();
        assert_eq!(telemetry.otlp_endpoint(), None);
        telemetry.otlp_endpoint = "127.0.0.1:4317".to_string();
        assert_eq!(telemetry.otlp_endpoint(), Some("127.0.0.1:4317"));
    }
}
