//! Update checker - fetch, verify, compare.
//!
//! Only a fetch failure is reported as such. A manifest that fails
//! verification, is malformed, or is not newer all end up as `NoUpdate`,
//! with the reason in the log.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use semver::Version;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::UpdaterConfig;
use crate::error::UpdateError;
use crate::manifest::{ManifestVerifier, UpdateCandidate};
use crate::source::{ContentSource, GatewaySource, StaticSource};
use crate::version::parse_lenient;

/// Result of one update check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateCheck {
    UpdateAvailable(UpdateCandidate),
    NoUpdate,
    FetchError(String),
}

impl UpdateCheck {
    pub fn candidate(&self) -> Option<&UpdateCandidate> {
        match self {
            UpdateCheck::UpdateAvailable(candidate) => Some(candidate),
            _ => None,
        }
    }
}

/// Current state of the checker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum UpdateState {
    #[default]
    Idle,
    Checking,
    UpdateAvailable,
    Error(String),
}

pub struct UpdateChecker {
    verifier: ManifestVerifier,
    source: Arc<dyn ContentSource>,
    current_version: Version,
    deadline: Duration,
    state: RwLock<UpdateState>,
    last_check: RwLock<Option<Instant>>,
    cached: RwLock<Option<UpdateCandidate>>,
}

impl UpdateChecker {
    pub fn new(
        verifier: ManifestVerifier,
        source: Arc<dyn ContentSource>,
        current_version: Version,
        deadline: Duration,
    ) -> Self {
        if verifier.trusted_keys().is_empty() {
            warn!("No manifest signing keys configured - updates will fail verification");
        }
        Self {
            verifier,
            source,
            current_version,
            deadline,
            state: RwLock::new(UpdateState::Idle),
            last_check: RwLock::new(None),
            cached: RwLock::new(None),
        }
    }

    /// Build a checker from config. `fallback_version` is the running
    /// version unless the config overrides it.
    ///
    /// Without a configured manifest pointer every check reports a fetch
    /// error.
    pub fn from_config(
        config: &UpdaterConfig,
        fallback_version: &str,
    ) -> Result<Self, UpdateError> {
        config.validate()?;

        let keys = config.parse_publisher_keys()?;
        let version = parse_lenient(config.current_version.as_deref().unwrap_or(fallback_version))?;

        let source: Arc<dyn ContentSource> = match (config.enabled, config.pointer()) {
            (true, Some(pointer)) => Arc::new(GatewaySource::new(
                config.gateways.clone(),
                pointer,
                config.fetch_timeout(),
            )?),
            (false, _) => Arc::new(StaticSource::unreachable("update checks are disabled")),
            (true, None) => {
                warn!("No IPNS name or manifest CID configured");
                Arc::new(StaticSource::unreachable("no manifest location configured"))
            }
        };

        // Whole-fetch deadline covers every gateway in turn.
        let deadline = config.fetch_timeout() * config.gateways.len().max(1) as u32;

        Ok(Self::new(ManifestVerifier::new(keys), source, version, deadline))
    }

    pub fn current_version(&self) -> &Version {
        &self.current_version
    }

    pub async fn state(&self) -> UpdateState {
        self.state.read().await.clone()
    }

    pub async fn last_check(&self) -> Option<Instant> {
        *self.last_check.read().await
    }

    /// Last candidate reported as available.
    pub async fn cached_update(&self) -> Option<UpdateCandidate> {
        self.cached.read().await.clone()
    }

    async fn set_state(&self, state: UpdateState) {
        *self.state.write().await = state;
    }

    pub async fn check_for_updates(&self) -> UpdateCheck {
        info!(source = %self.source.describe(), "Checking for updates");
        self.set_state(UpdateState::Checking).await;

        let fetched = tokio::time::timeout(self.deadline, self.source.fetch_manifest())
            .await
            .unwrap_or(Err(UpdateError::Timeout));
        let data = match fetched {
            Ok(data) => data,
            Err(e) => {
                warn!(error = %e, "Failed to fetch manifest");
                self.set_state(UpdateState::Error(e.to_string())).await;
                return UpdateCheck::FetchError(e.to_string());
            }
        };

        *self.last_check.write().await = Some(Instant::now());

        let result = match self.evaluate(&data) {
            Ok(Some(candidate)) => {
                *self.cached.write().await = Some(candidate.clone());
                self.set_state(UpdateState::UpdateAvailable).await;
                return UpdateCheck::UpdateAvailable(candidate);
            }
            Ok(None) => UpdateCheck::NoUpdate,
            Err(e) => {
                warn!(error = %e, "Rejected update manifest");
                UpdateCheck::NoUpdate
            }
        };

        // An authentic answer with nothing to offer supersedes any earlier candidate.
        *self.cached.write().await = None;
        self.set_state(UpdateState::Idle).await;
        result
    }

    /// `Ok(None)` when the manifest is authentic but offers nothing to apply.
    fn evaluate(&self, data: &[u8]) -> Result<Option<UpdateCandidate>, UpdateError> {
        let candidate = self.verifier.verify_and_parse(data, Utc::now())?;
        let offered = parse_lenient(&candidate.version)?;

        if offered <= self.current_version {
            info!(
                current = %self.current_version,
                latest = %offered,
                "No update available"
            );
            return Ok(None);
        }

        if let Some(min) = &candidate.min_version {
            let min = parse_lenient(min)?;
            if self.current_version < min {
                info!(
                    current = %self.current_version,
                    min_version = %min,
                    "Running version too old to apply this release directly"
                );
                return Ok(None);
            }
        }

        debug!(content_id = %candidate.content_id, "Verified release manifest");
        info!(current = %self.current_version, latest = %offered, "Update available");
        Ok(Some(candidate))
    }
}
