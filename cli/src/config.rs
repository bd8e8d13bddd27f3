//! Configuration loading and persistence.
//!
//! The bridge reads `config.json` from the platform config directory
//! (`~/.config/tvbridge` on Linux, `~/Library/Application Support/tvbridge`
//! on macOS) and then applies `TVBRIDGE_*` environment overrides. A missing
//! or unreadable file falls back to defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use crate::constants::{REQUEST_TIMEOUT, STATUS_THROTTLE_INTERVAL};
use crate::env;

/// Which media backend drives playback.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Framework-wrapping helper speaking the text-line protocol.
    Helper,
    /// Socket-controlled media player speaking JSON IPC.
    Player,
}

impl BackendKind {
    /// Binary name searched for during discovery.
    pub fn binary_name(self) -> &'static str {
        match self {
            Self::Helper => "tvbridge-testsrc",
            Self::Player => "mpv",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Helper => write!(f, "helper"),
            Self::Player => write!(f, "player"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "helper" | "testsrc" => Ok(Self::Helper),
            "player" | "mpv" => Ok(Self::Player),
            other => Err(format!("unknown backend '{other}' (expected helper or player)")),
        }
    }
}

/// HTTP settings the helper applies to its network source.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(default)]
pub struct HttpSettings {
    /// User agent header.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Referer header.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referer: Option<String>,
    /// Network timeout in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u32>,
}

/// Configuration for the bridge.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct BridgeConfig {
    /// Backend used when the caller does not pick one.
    pub backend: BackendKind,
    /// Explicit helper binary, searched before anything else.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub helper_path: Option<PathBuf>,
    /// Explicit player binary, searched before anything else.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player_path: Option<PathBuf>,
    /// Directory for frame and IPC sockets.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime_dir: Option<PathBuf>,
    /// Per-request reply timeout in milliseconds.
    pub request_timeout_ms: u64,
    /// Minimum spacing between status pushes in milliseconds.
    pub status_throttle_ms: u64,
    /// Network source settings forwarded to the helper.
    pub http: HttpSettings,
    /// Ask the helper for `debug` lines.
    pub debug: bool,
    /// Ask the helper for HTTP-level `debug` lines.
    pub http_debug: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Player,
            helper_path: None,
            player_path: None,
            runtime_dir: None,
            request_timeout_ms: REQUEST_TIMEOUT.as_millis() as u64,
            status_throttle_ms: STATUS_THROTTLE_INTERVAL.as_millis() as u64,
            http: HttpSettings::default(),
            debug: false,
            http_debug: false,
        }
    }
}

impl BridgeConfig {
    /// Returns the configuration directory path.
    ///
    /// `TVBRIDGE_CONFIG_DIR` wins over the platform config directory.
    pub fn config_dir() -> Result<PathBuf> {
        if let Some(dir) = env::non_empty(env::CONFIG_DIR) {
            return Ok(PathBuf::from(dir));
        }
        Ok(dirs::config_dir()
            .context("Could not determine config directory")?
            .join("tvbridge"))
    }

    /// Path of the config file.
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    /// Loads configuration from file, with environment variable overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                if path.exists() {
                    log::warn!("[Config] Ignoring unreadable {}: {e:#}", path.display());
                }
                Self::default()
            }
        };
        config.apply_overrides(env::non_empty);
        Ok(config)
    }

    /// Read a config file without applying overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("Invalid config in {}", path.display()))
    }

    /// Apply overrides from a variable lookup (the process environment in
    /// [`BridgeConfig::load`]).
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(backend) = lookup(env::BACKEND) {
            match backend.parse() {
                Ok(kind) => self.backend = kind,
                Err(e) => log::warn!("[Config] {}: {e}", env::BACKEND),
            }
        }
        if let Some(path) = lookup(env::HELPER_PATH) {
            self.helper_path = Some(PathBuf::from(path));
        }
        if let Some(path) = lookup(env::PLAYER_PATH) {
            self.player_path = Some(PathBuf::from(path));
        }
        if let Some(dir) = lookup(env::RUNTIME_DIR) {
            self.runtime_dir = Some(PathBuf::from(dir));
        }
        if let Some(agent) = lookup(env::HTTP_USER_AGENT) {
            self.http.user_agent = Some(agent);
        }
        if let Some(referer) = lookup(env::HTTP_REFERER) {
            self.http.referer = Some(referer);
        }
        if let Some(timeout) = lookup(env::HTTP_TIMEOUT) {
            if let Ok(secs) = timeout.trim().parse::<u32>() {
                self.http.timeout_secs = Some(secs);
            }
        }
        if let Some(value) = lookup(env::DEBUG) {
            self.debug = env::is_truthy(&value);
        }
        if let Some(value) = lookup(env::HTTP_DEBUG) {
            self.http_debug = env::is_truthy(&value);
        }
    }

    /// Persists the current configuration to disk.
    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::config_path()?;
        self.save_to(&path)?;
        Ok(path)
    }

    /// Write to `path` with owner-only permissions.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("Failed to write {}", path.display()))?;

        #[cfg(unix)]
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;

        Ok(())
    }

    /// Per-request reply timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms.max(1))
    }

    /// Status throttle window.
    pub fn throttle_interval(&self) -> Duration {
        Duration::from_millis(self.status_throttle_ms)
    }

    /// Directory where backend sockets are created.
    ///
    /// Falls back to the user runtime directory, then the temp directory.
    pub fn runtime_dir(&self) -> PathBuf {
        self.runtime_dir
            .clone()
            .or_else(dirs::runtime_dir)
            .unwrap_or_else(std::env::temp_dir)
    }

    /// Configured binary override for a backend.
    pub fn binary_override(&self, kind: BackendKind) -> Option<&Path> {
        match kind {
            BackendKind::Helper => self.helper_path.as_deref(),
            BackendKind::Player => self.player_path.as_deref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = BridgeConfig::default();
        assert_eq!(config.backend, BackendKind::Player);
        assert_eq!(config.request_timeout(), Duration::from_secs(5));
        assert_eq!(config.throttle_interval(), Duration::from_millis(100));
        assert!(!config.debug);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"backend":"helper","http":{"referer":"http://portal/"}}"#).unwrap();

        let config = BridgeConfig::load_from(&path).unwrap();
        assert_eq!(config.backend, BackendKind::Helper);
        assert_eq!(config.http.referer.as_deref(), Some("http://portal/"));
        assert_eq!(config.request_timeout_ms, 5000);
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("TVBRIDGE_BACKEND", "helper"),
            ("TVBRIDGE_HELPER_PATH", "/opt/tv/helper"),
            ("TVBRIDGE_HTTP_TIMEOUT", "15"),
            ("TVBRIDGE_HTTP_USER_AGENT", "TV/1.0"),
            ("TVBRIDGE_DEBUG", "yes"),
        ]
        .into_iter()
        .collect();

        let mut config = BridgeConfig::default();
        config.apply_overrides(|name| vars.get(name).map(|v| (*v).to_string()));

        assert_eq!(config.backend, BackendKind::Helper);
        assert_eq!(config.binary_override(BackendKind::Helper), Some(Path::new("/opt/tv/helper")));
        assert_eq!(config.http.timeout_secs, Some(15));
        assert_eq!(config.http.user_agent.as_deref(), Some("TV/1.0"));
        assert!(config.debug);
        assert!(!config.http_debug);
    }

    #[test]
    fn test_bad_backend_override_is_ignored() {
        let mut config = BridgeConfig::default();
        config.apply_overrides(|name| (name == "TVBRIDGE_BACKEND").then(|| "vlc".to_string()));
        assert_eq!(config.backend, BackendKind::Player);
    }

    #[test]
    fn test_save_to_is_private_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = BridgeConfig {
            backend: BackendKind::Helper,
            status_throttle_ms: 250,
            ..BridgeConfig::default()
        };
        config.save_to(&path).unwrap();

        assert_eq!(BridgeConfig::load_from(&path).unwrap(), config);
        #[cfg(unix)]
        assert_eq!(fs::metadata(&path).unwrap().permissions().mode() & 0o777, 0o600);
    }

    #[test]
    fn test_backend_kind_parse() {
        assert_eq!("MPV".parse::<BackendKind>(), Ok(BackendKind::Player));
        assert_eq!("helper".parse::<BackendKind>(), Ok(BackendKind::Helper));
        assert!("vlc".parse::<BackendKind>().is_err());
    }
}
