//! String and bool contract exposed to the host application.
//!
//! A [`HostContext`] owns a multi-threaded tokio runtime and one [`Core`].
//! Network operations block the calling host thread on that runtime. The
//! process-wide context lives in a `OnceLock` and is created by [`init`].
//!
//! Every entry point catches panics and reports them as the operation's
//! failure value.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

use smc_core::{Core, CoreConfig};
use smc_updater::UpdateCheck;
use tokio::runtime::Runtime;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::BoundaryError;

/// Overrides the data directory holding `identity.json` and `core.toml`.
pub const DATA_DIR_ENV: &str = "SMC_DATA_DIR";

const CONFIG_FILE: &str = "core.toml";

// ============================================================================
// Host context
// ============================================================================

pub struct HostContext {
    runtime: Runtime,
    core: Core,
}

impl HostContext {
    pub fn new(config: CoreConfig) -> Result<Self, BoundaryError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("smc-worker")
            .build()
            .map_err(|e| BoundaryError::Init(format!("failed to start runtime: {e}")))?;

        let core = Core::new(config)?;
        Ok(Self { runtime, core })
    }

    pub fn core(&self) -> &Core {
        &self.core
    }

    pub fn generate_key_pair(&self) -> Result<String, BoundaryError> {
        let pair = self.core.generate_key_pair()?;
        Ok(pair.encode().to_string())
    }

    pub fn check_blockage(&self, target: &str) -> String {
        let report = self.runtime.block_on(self.core.check_blockage(target));
        report.verdict.as_str().to_string()
    }

    pub fn connect_obfs4(&self, bridge_addr: &str, public_key: &str) -> bool {
        match self
            .runtime
            .block_on(self.core.connect_obfs4(bridge_addr, public_key))
        {
            Ok(()) => true,
            Err(e) => {
                warn!(bridge = bridge_addr, error = %e, "connectObfs4 failed");
                false
            }
        }
    }

    pub fn check_for_updates(&self) -> String {
        match self.runtime.block_on(self.core.check_for_updates()) {
            UpdateCheck::UpdateAvailable(candidate) => candidate.to_json().unwrap_or_else(|e| {
                error!(error = %e, "Failed to encode update candidate");
                String::new()
            }),
            UpdateCheck::NoUpdate => String::new(),
            UpdateCheck::FetchError(reason) => {
                info!(%reason, "Update check could not reach the channel");
                String::new()
            }
        }
    }

    pub fn send_message(&self, chat_id: i64, text: &str) -> bool {
        match self.runtime.block_on(self.core.send_message(chat_id, text)) {
            Ok(_) => true,
            Err(e) => {
                warn!(chat_id, error = %e, "sendMessage failed");
                false
            }
        }
    }
}

// ============================================================================
// Pure operations
// ============================================================================

pub fn sign_message(message: &str, secret_key: &str) -> Result<String, BoundaryError> {
    guard(
        || Err(BoundaryError::Internal("panic while signing".into())),
        || Ok(smc_crypto::sign_message(message, secret_key)?),
    )
}

pub fn verify_signature(
    message: &str,
    signature: &str,
    public_key: &str,
) -> Result<bool, BoundaryError> {
    guard(
        || Err(BoundaryError::Internal("panic while verifying".into())),
        || Ok(smc_crypto::verify_signature(message, signature, public_key)?),
    )
}

// ============================================================================
// Process-wide context
// ============================================================================

static CONTEXT: OnceLock<HostContext> = OnceLock::new();
static INIT_LOCK: Mutex<()> = Mutex::new(());

/// Bring up the process-wide core. Safe to call repeatedly.
pub fn init() -> bool {
    guard(
        || false,
        || match init_with(load_host_config) {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, "Core initialization failed");
                false
            }
        },
    )
}

fn init_with(
    load_config: impl FnOnce() -> Result<CoreConfig, BoundaryError>,
) -> Result<(), BoundaryError> {
    if CONTEXT.get().is_some() {
        return Ok(());
    }

    // Only one thread builds the context; the others wait and see it set.
    let _building = INIT_LOCK
        .lock()
        .map_err(|_| BoundaryError::Internal("init lock poisoned".into()))?;
    if CONTEXT.get().is_some() {
        return Ok(());
    }

    let config = load_config()?;
    init_logging(&config.logging.level);

    let context = HostContext::new(config)?;
    info!(
        identity = context.core().identity().has_identity(),
        "Host context ready"
    );
    let _ = CONTEXT.set(context);
    Ok(())
}

fn load_host_config() -> Result<CoreConfig, BoundaryError> {
    match std::env::var_os(DATA_DIR_ENV) {
        Some(dir) if !dir.is_empty() => {
            let dir = PathBuf::from(dir);
            let config_path = dir.join(CONFIG_FILE);
            let mut config = if config_path.exists() {
                CoreConfig::load_from_file(&config_path)?
            } else {
                CoreConfig::default()
            };
            config.identity.data_dir = Some(dir);
            Ok(config)
        }
        _ => Ok(CoreConfig::load_from(None)?),
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    // A host that already installed a subscriber keeps it.
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_ansi(false))
        .with(filter)
        .try_init();
}

pub fn context() -> Result<&'static HostContext, BoundaryError> {
    CONTEXT.get().ok_or(BoundaryError::NotInitialized)
}

pub fn generate_key_pair() -> Result<String, BoundaryError> {
    guard(
        || Err(BoundaryError::Internal("panic while generating key pair".into())),
        || context()?.generate_key_pair(),
    )
}

pub fn check_blockage(target: &str) -> String {
    guard(
        || "unknown".to_string(),
        || match context() {
            Ok(ctx) => ctx.check_blockage(target),
            Err(_) => "unknown".to_string(),
        },
    )
}

pub fn connect_obfs4(bridge_addr: &str, public_key: &str) -> bool {
    guard(
        || false,
        || context().is_ok_and(|ctx| ctx.connect_obfs4(bridge_addr, public_key)),
    )
}

pub fn check_for_updates() -> String {
    guard(String::new, || {
        context()
            .map(|ctx| ctx.check_for_updates())
            .unwrap_or_default()
    })
}

pub fn send_message(chat_id: i64, text: &str) -> bool {
    guard(
        || false,
        || context().is_ok_and(|ctx| ctx.send_message(chat_id, text)),
    )
}

/// Run `f`, turning a panic into `on_panic()`.
fn guard<T>(on_panic: impl FnOnce() -> T, f: impl FnOnce() -> T) -> T {
    catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|_| {
        error!("Panic caught at host boundary");
        on_panic()
    })
}
