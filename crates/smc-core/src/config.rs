//! Configuration for the messenger core.
//!
//! Stored as TOML. Every section and field has a default, so an empty file
//! (or no file) is a valid configuration.
//!
//! ```toml
//! [identity]
//! data_dir = ""        # Empty = platform data directory
//!
//! [transport]
//! connect_timeout_secs = 10
//! send_timeout_secs = 10
//! bridges = ["obfs4://<hex-key>@bridge.example.net:443"]
//!
//! [probe]
//! stage_timeout_secs = 4
//! default_port = 443
//! doh_endpoints = ["https://cloudflare-dns.com/dns-query"]   # [] = no DoH cross-check
//!
//! [updates]
//! ipns_name = "k51..."
//! publisher_keys = ["ed25519:<hex>"]
//!
//! [logging]
//! level = "info"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use smc_transport::{BridgeDescriptor, ProbeConfig, DEFAULT_DOH_ENDPOINTS};
use smc_updater::UpdaterConfig;

use crate::errors::CoreError;

const IDENTITY_FILE: &str = "identity.json";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoreConfig {
    #[serde(default)]
    pub identity: IdentityConfig,

    #[serde(default)]
    pub transport: TransportConfig,

    #[serde(default)]
    pub probe: ProbeSettings,

    #[serde(default)]
    pub updates: UpdaterConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where the identity lives
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Data directory (empty = platform default)
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Deadline for TCP connect plus handshake
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Deadline for writing one message to the bridge
    #[serde(default = "default_send_timeout")]
    pub send_timeout_secs: u64,

    /// Known bridges as `obfs4://<hex-key>@host:port`
    #[serde(default)]
    pub bridges: Vec<String>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            send_timeout_secs: default_send_timeout(),
            bridges: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeSettings {
    #[serde(default = "default_stage_timeout")]
    pub stage_timeout_secs: u64,

    #[serde(default = "default_probe_port")]
    pub default_port: u16,

    /// DNS-over-HTTPS endpoints consulted when the system resolver fails
    #[serde(default = "default_doh_endpoints")]
    pub doh_endpoints: Vec<String>,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            stage_timeout_secs: default_stage_timeout(),
            default_port: default_probe_port(),
            doh_endpoints: default_doh_endpoints(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_send_timeout() -> u64 {
    10
}

fn default_stage_timeout() -> u64 {
    4
}

fn default_probe_port() -> u16 {
    443
}

fn default_doh_endpoints() -> Vec<String> {
    DEFAULT_DOH_ENDPOINTS.iter().map(|e| e.to_string()).collect()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl CoreConfig {
    pub fn load_from_file(path: &Path) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CoreError::Config(format!("failed to read {}: {e}", path.display())))?;
        let config: Self = toml::from_str(&content).map_err(|e| CoreError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<(), CoreError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| CoreError::Config(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load `path` if given, else the default location if it exists, else
    /// defaults.
    pub fn load_from(custom_path: Option<&Path>) -> Result<Self, CoreError> {
        if let Some(path) = custom_path {
            return Self::load_from_file(path);
        }
        match Self::default_path() {
            Some(path) if path.exists() => Self::load_from_file(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn default_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join("core.toml"))
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.transport.connect_timeout_secs == 0 {
            return Err(CoreError::Config(
                "connect_timeout_secs must be greater than 0".into(),
            ));
        }
        if self.transport.send_timeout_secs == 0 {
            return Err(CoreError::Config(
                "send_timeout_secs must be greater than 0".into(),
            ));
        }
        if self.probe.stage_timeout_secs == 0 {
            return Err(CoreError::Config(
                "stage_timeout_secs must be greater than 0".into(),
            ));
        }
        if self.probe.default_port == 0 {
            return Err(CoreError::Config("default_port must not be 0".into()));
        }
        if let Some(bad) = self
            .probe
            .doh_endpoints
            .iter()
            .find(|e| !e.starts_with("https://") && !e.starts_with("http://"))
        {
            return Err(CoreError::Config(format!("invalid DoH endpoint '{bad}'")));
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(CoreError::Config(format!(
                "Invalid log level '{}'. Valid values: {:?}",
                self.logging.level, valid_levels
            )));
        }

        self.bridges()?;
        self.updates
            .validate()
            .map_err(|e| CoreError::Config(e.to_string()))?;
        Ok(())
    }

    /// Data directory, or `None` when no platform directory can be found.
    pub fn data_dir(&self) -> Option<PathBuf> {
        self.identity
            .data_dir
            .clone()
            .filter(|p| !p.as_os_str().is_empty())
            .or_else(|| project_dirs().map(|dirs| dirs.data_dir().to_path_buf()))
    }

    pub fn identity_path(&self) -> Option<PathBuf> {
        self.data_dir().map(|dir| dir.join(IDENTITY_FILE))
    }

    pub fn bridges(&self) -> Result<Vec<BridgeDescriptor>, CoreError> {
        self.transport
            .bridges
            .iter()
            .map(|url| BridgeDescriptor::from_url(url).map_err(CoreError::from))
            .collect()
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.transport.connect_timeout_secs)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.transport.send_timeout_secs)
    }

    pub fn probe_config(&self) -> ProbeConfig {
        ProbeConfig {
            stage_timeout: Duration::from_secs(self.probe.stage_timeout_secs),
            default_port: self.probe.default_port,
            doh_endpoints: self.probe.doh_endpoints.clone(),
        }
    }
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("com", "example", "securemessenger")
}

#[cfg(test)]
mod tests {
    use super::*;
    use smc_transport::testing::TEST_BRIDGE_KEY;
    use tempfile::tempdir;

    #[test]
    fn test_empty_file_is_default() {
        let config: CoreConfig = toml::from_str("").unwrap();
        assert_eq!(config, CoreConfig::default());
        assert!(config.validate().is_ok());
        assert_eq!(config.connect_timeout(), Duration::from_secs(10));
        assert_eq!(config.send_timeout(), Duration::from_secs(10));
        assert_eq!(config.probe_config().stage_timeout, Duration::from_secs(4));
        assert_eq!(config.probe_config().doh_endpoints.len(), DEFAULT_DOH_ENDPOINTS.len());
    }

    #[test]
    fn test_partial_sections() {
        let config: CoreConfig = toml::from_str(
            r#"
            [probe]
            stage_timeout_secs = 2
            doh_endpoints = []

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();
        assert_eq!(config.probe.stage_timeout_secs, 2);
        assert_eq!(config.probe.default_port, 443);
        assert!(config.probe.doh_endpoints.is_empty());
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.transport, TransportConfig::default());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = CoreConfig::default();
        config.logging.level = "verbose".into();
        assert!(config.validate().is_err());

        let mut config = CoreConfig::default();
        config.transport.connect_timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = CoreConfig::default();
        config.transport.send_timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = CoreConfig::default();
        config.probe.doh_endpoints = vec!["dns.example/dns-query".into()];
        assert!(config.validate().is_err());

        let mut config = CoreConfig::default();
        config.transport.bridges = vec!["obfs4://nothex@bridge:443".into()];
        assert!(config.validate().is_err());

        let mut config = CoreConfig::default();
        config.updates.publisher_keys = vec!["ed25519:00".into()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bridges_parse() {
        let mut config = CoreConfig::default();
        config.transport.bridges = vec![format!("obfs4://{TEST_BRIDGE_KEY}@192.0.2.1:443")];
        let bridges = config.bridges().unwrap();
        assert_eq!(bridges.len(), 1);
        assert_eq!(bridges[0].addr(), "192.0.2.1:443");
    }

    #[test]
    fn test_explicit_data_dir() {
        let dir = tempdir().unwrap();
        let mut config = CoreConfig::default();
        config.identity.data_dir = Some(dir.path().to_path_buf());
        assert_eq!(config.identity_path(), Some(dir.path().join("identity.json")));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("conf").join("core.toml");

        let mut config = CoreConfig::default();
        config.logging.level = "warn".into();
        config.updates.ipns_name = Some("k51name".into());
        config.save_to_file(&path).unwrap();

        assert_eq!(CoreConfig::load_from(Some(&path)).unwrap(), config);
    }
}
