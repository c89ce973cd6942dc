//! SMC Core - the secure messenger native core.
//!
//! This crate implements:
//! - Process identity with persistent key storage
//! - Outbound message dispatch with per-conversation ordering
//! - Configuration and the error taxonomy seen by hosts
//! - The `Core` context wiring transport, blockage probes and update checks

#![forbid(unsafe_code)]

pub mod config;
pub mod dispatch;
pub mod errors;
pub mod identity;
pub mod keystore;

#[cfg(test)]
mod proptests;

use std::sync::Arc;

use smc_crypto::KeyPair;
use smc_transport::{
    BlockageClassifier, BlockageReport, BridgeDescriptor, FrameSink, SessionConnector,
    TransportManager, TransportStatus,
};
use smc_updater::{UpdateCheck, UpdateChecker};
use tracing::{info, warn};

pub use config::CoreConfig;
pub use dispatch::{DispatchReceipt, MessageDispatcher, OutboundMessage};
pub use errors::{CoreError, CoreResult};
pub use identity::IdentityManager;
pub use keystore::{FileKeyStore, InMemoryKeyStore, KeyStore};

/// Version reported to the update checker unless the config overrides it.
pub const CORE_VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// Core context
// ============================================================================

/// One messenger core: identity, transport session, probes and updates.
pub struct Core {
    config: CoreConfig,
    identity: Arc<IdentityManager>,
    transport: Arc<TransportManager>,
    dispatcher: MessageDispatcher,
    classifier: BlockageClassifier,
    updater: UpdateChecker,
}

impl Core {
    /// Build a core with the production components for `config`.
    pub fn new(config: CoreConfig) -> CoreResult<Self> {
        CoreBuilder::new(config).build()
    }

    pub fn builder(config: CoreConfig) -> CoreBuilder {
        CoreBuilder::new(config)
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn identity(&self) -> &IdentityManager {
        &self.identity
    }

    // ------------------------------------------------------------------------
    // Identity
    // ------------------------------------------------------------------------

    pub fn generate_key_pair(&self) -> CoreResult<KeyPair> {
        self.identity.generate_key_pair()
    }

    pub fn sign_message(&self, message: &str, secret_key_hex: &str) -> CoreResult<String> {
        Ok(smc_crypto::sign_message(message, secret_key_hex)?)
    }

    pub fn verify_signature(
        &self,
        message: &str,
        signature_hex: &str,
        public_key_hex: &str,
    ) -> CoreResult<bool> {
        Ok(smc_crypto::verify_signature(
            message,
            signature_hex,
            public_key_hex,
        )?)
    }

    pub fn reset_identity(&self) -> CoreResult<bool> {
        self.identity.reset_identity()
    }

    // ------------------------------------------------------------------------
    // Network
    // ------------------------------------------------------------------------

    pub async fn check_blockage(&self, target: &str) -> BlockageReport {
        self.classifier.check(target).await
    }

    pub async fn connect_obfs4(&self, bridge_addr: &str, public_key_hex: &str) -> CoreResult<()> {
        let bridge = BridgeDescriptor::new(bridge_addr, public_key_hex)?;
        self.connect_bridge(bridge).await
    }

    pub async fn connect_bridge(&self, bridge: BridgeDescriptor) -> CoreResult<()> {
        self.transport.connect(bridge).await.map_err(|e| {
            warn!(error = %e, "Bridge connection failed");
            CoreError::from(e)
        })
    }

    /// Try configured bridges in order until one connects.
    pub async fn connect_configured(&self) -> CoreResult<BridgeDescriptor> {
        let bridges = self.config.bridges()?;
        let mut last_error = CoreError::Config("no bridges configured".into());
        for bridge in bridges {
            match self.connect_bridge(bridge.clone()).await {
                Ok(()) => return Ok(bridge),
                Err(e) => last_error = e,
            }
        }
        Err(last_error)
    }

    pub async fn disconnect(&self) -> bool {
        self.transport.disconnect().await
    }

    pub fn transport_status(&self) -> TransportStatus {
        self.transport.status()
    }

    pub async fn send_message(&self, chat_id: i64, text: &str) -> CoreResult<DispatchReceipt> {
        self.dispatcher.send_message(chat_id, text).await
    }

    // ------------------------------------------------------------------------
    // Updates
    // ------------------------------------------------------------------------

    pub async fn check_for_updates(&self) -> UpdateCheck {
        self.updater.check_for_updates().await
    }

    pub fn update_checker(&self) -> &UpdateChecker {
        &self.updater
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Assembles a [`Core`], with every component replaceable.
pub struct CoreBuilder {
    config: CoreConfig,
    key_store: Option<Arc<dyn KeyStore>>,
    connector: Option<Arc<dyn SessionConnector>>,
    classifier: Option<BlockageClassifier>,
    updater: Option<UpdateChecker>,
}

impl CoreBuilder {
    pub fn new(config: CoreConfig) -> Self {
        Self {
            config,
            key_store: None,
            connector: None,
            classifier: None,
            updater: None,
        }
    }

    pub fn key_store(mut self, store: Arc<dyn KeyStore>) -> Self {
        self.key_store = Some(store);
        self
    }

    pub fn connector(mut self, connector: Arc<dyn SessionConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn classifier(mut self, classifier: BlockageClassifier) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn update_checker(mut self, checker: UpdateChecker) -> Self {
        self.updater = Some(checker);
        self
    }

    pub fn build(self) -> CoreResult<Core> {
        let config = self.config;
        config.validate()?;

        let key_store = match self.key_store {
            Some(store) => store,
            None => {
                let path = config.identity_path().ok_or_else(|| {
                    CoreError::Config("no data directory available for the key store".into())
                })?;
                Arc::new(FileKeyStore::new(path)) as Arc<dyn KeyStore>
            }
        };
        let identity = Arc::new(IdentityManager::open(key_store)?);

        let transport = match self.connector {
            Some(connector) => TransportManager::new(connector),
            None => TransportManager::obfs4(config.connect_timeout()),
        };
        let transport = Arc::new(transport.with_send_timeout(config.send_timeout()));
        let sink: Arc<dyn FrameSink> = transport.clone();
        let dispatcher = MessageDispatcher::new(identity.clone(), sink);

        let classifier = match self.classifier {
            Some(classifier) => classifier,
            None => BlockageClassifier::new(config.probe_config())?,
        };

        let updater = match self.updater {
            Some(updater) => updater,
            None => UpdateChecker::from_config(&config.updates, CORE_VERSION)?,
        };

        info!(
            identity = identity.has_identity(),
            version = CORE_VERSION,
            "Core initialized"
        );

        Ok(Core {
            config,
            identity,
            transport,
            dispatcher,
            classifier,
            updater,
        })
    }
}
