//! Configuration for update checks.
//!
//! Lives under `[updates]` in the core config file and can also be loaded
//! on its own.

use std::path::Path;
use std::time::Duration;

use ed25519_dalek::VerifyingKey;
use serde::{Deserialize, Serialize};

use crate::error::UpdateError;
use crate::source::ManifestPointer;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdaterConfig {
    /// Whether update checks run at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// IPFS HTTP gateways, tried in order
    #[serde(default = "default_gateways")]
    pub gateways: Vec<String>,

    /// IPNS name the publisher points at the latest manifest
    #[serde(default)]
    pub ipns_name: Option<String>,

    /// Fixed manifest CID, used instead of `ipns_name` when set
    #[serde(default)]
    pub manifest_cid: Option<String>,

    /// Pinned manifest signing keys.
    /// Format: "ed25519:<hex_public_key>"
    #[serde(default)]
    pub publisher_keys: Vec<String>,

    /// Overrides the running version (defaults to the crate version)
    #[serde(default)]
    pub current_version: Option<String>,

    /// Per-request deadline in seconds
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            gateways: default_gateways(),
            ipns_name: None,
            manifest_cid: None,
            publisher_keys: Vec::new(),
            current_version: None,
            fetch_timeout_secs: default_fetch_timeout(),
        }
    }
}

impl UpdaterConfig {
    pub fn load_from_file(path: &Path) -> Result<Self, UpdateError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self =
            toml::from_str(&content).map_err(|e| UpdateError::ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<(), UpdateError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| UpdateError::ConfigError(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), UpdateError> {
        if self.fetch_timeout_secs == 0 {
            return Err(UpdateError::ConfigError(
                "fetch_timeout_secs must be greater than zero".into(),
            ));
        }
        if self.enabled && self.gateways.is_empty() {
            return Err(UpdateError::ConfigError(
                "at least one gateway is required".into(),
            ));
        }
        for gateway in &self.gateways {
            if !(gateway.starts_with("https://") || gateway.starts_with("http://")) {
                return Err(UpdateError::ConfigError(format!(
                    "gateway must be an http(s) URL: {gateway}"
                )));
            }
        }
        self.parse_publisher_keys()?;
        if let Some(version) = &self.current_version {
            crate::version::parse_lenient(version)?;
        }
        Ok(())
    }

    pub fn parse_publisher_keys(&self) -> Result<Vec<VerifyingKey>, UpdateError> {
        self.publisher_keys
            .iter()
            .map(|s| parse_ed25519_key(s))
            .collect()
    }

    /// Where the manifest lives, if anywhere is configured.
    pub fn pointer(&self) -> Option<ManifestPointer> {
        fn non_empty(s: &Option<String>) -> Option<&str> {
            s.as_deref().map(str::trim).filter(|s| !s.is_empty())
        }

        non_empty(&self.manifest_cid)
            .map(|cid| ManifestPointer::Ipfs(cid.to_string()))
            .or_else(|| non_empty(&self.ipns_name).map(|n| ManifestPointer::Ipns(n.to_string())))
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

/// Parse `ed25519:<hex>` into a verifying key.
pub fn parse_ed25519_key(s: &str) -> Result<VerifyingKey, UpdateError> {
    let hex_str = s
        .trim()
        .strip_prefix("ed25519:")
        .ok_or_else(|| UpdateError::ConfigError("key must start with 'ed25519:'".into()))?;

    let bytes = hex::decode(hex_str)
        .map_err(|e| UpdateError::ConfigError(format!("invalid key encoding: {e}")))?;
    let key_bytes: [u8; 32] = bytes.try_into().map_err(|_| {
        UpdateError::ConfigError("Ed25519 public key must be 32 bytes".into())
    })?;

    VerifyingKey::from_bytes(&key_bytes)
        .map_err(|e| UpdateError::ConfigError(format!("invalid Ed25519 public key: {e}")))
}

fn default_true() -> bool {
    true
}

fn default_gateways() -> Vec<String> {
    vec![
        "https://ipfs.io".to_string(),
        "https://dweb.link".to_string(),
        "https://cloudflare-ipfs.com".to_string(),
    ]
}

fn default_fetch_timeout() -> u64 {
    15
}
