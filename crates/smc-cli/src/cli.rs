//! CLI command definitions and execution

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use smc_core::{Core, CoreConfig, CoreError};
use smc_crypto::{CryptoError, KeyPair};
use smc_transport::{BlockageVerdict, BridgeDescriptor};
use smc_updater::UpdateCheck;
use tracing::{debug, info};

use crate::output::{OutputFormat, Report};
use crate::ExitCode;

/// Secure messenger core CLI
#[derive(Parser, Debug)]
#[command(name = "smc")]
#[command(version, about = "Secure messenger core CLI - keys, probes, bridges and updates")]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Output format: table, json, quiet
    #[arg(long, default_value = "table", global = true)]
    pub output: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Debug mode (handshake and probe tracing)
    #[arg(long, global = true)]
    pub debug: bool,

    /// Config file path
    #[arg(long, global = true, env = "SMC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory holding identity.json
    #[arg(long, global = true, env = "SMC_DATA_DIR")]
    pub data_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate an Ed25519 key pair
    Keygen(KeygenArgs),
    /// Sign a message with a hex secret key
    Sign(SignArgs),
    /// Verify a hex signature
    Verify(VerifyArgs),
    /// Classify how a host is blocked
    CheckBlockage(CheckBlockageArgs),
    /// Open an obfs4 session to a bridge
    Connect(BridgeArgs),
    /// Connect and send one message
    Send(SendArgs),
    /// Check the update channel for a newer signed release
    CheckUpdates,
    /// Delete the stored identity
    ResetIdentity,
}

#[derive(Args, Debug)]
pub struct KeygenArgs {
    /// Do not install or persist the generated pair
    #[arg(long)]
    pub ephemeral: bool,
}

#[derive(Args, Debug)]
pub struct SignArgs {
    #[arg(long)]
    pub message: String,

    /// Secret key seed, 64 hex characters
    #[arg(long, env = "SMC_SECRET_KEY", hide_env_values = true)]
    pub secret_key: String,
}

#[derive(Args, Debug)]
pub struct VerifyArgs {
    #[arg(long)]
    pub message: String,

    /// Signature, 128 hex characters
    #[arg(long)]
    pub signature: String,

    /// Public key, 64 hex characters
    #[arg(long)]
    pub public_key: String,
}

#[derive(Args, Debug)]
pub struct CheckBlockageArgs {
    /// Host, host:port or URL
    pub target: String,
}

#[derive(Args, Debug)]
pub struct BridgeArgs {
    /// Bridge as obfs4://<hex key>@host:port
    #[arg(long, conflicts_with_all = ["addr", "key"])]
    pub bridge: Option<String>,

    /// Bridge address host:port
    #[arg(long, requires = "key")]
    pub addr: Option<String>,

    /// Bridge X25519 key, 64 hex characters
    #[arg(long, requires = "addr")]
    pub key: Option<String>,
}

impl BridgeArgs {
    /// `None` means fall back to the configured bridge list.
    fn descriptor(&self) -> Result<Option<BridgeDescriptor>, CoreError> {
        match (&self.bridge, &self.addr, &self.key) {
            (Some(url), _, _) => Ok(Some(BridgeDescriptor::from_url(url)?)),
            (None, Some(addr), Some(key)) => Ok(Some(BridgeDescriptor::new(addr, key)?)),
            _ => Ok(None),
        }
    }
}

#[derive(Args, Debug)]
pub struct SendArgs {
    #[command(flatten)]
    pub bridge: BridgeArgs,

    #[arg(long)]
    pub chat: i64,

    #[arg(long)]
    pub text: String,
}

impl Cli {
    /// Execute the CLI command with a pre-loaded configuration
    pub async fn execute_with_config(self, mut config: CoreConfig) -> anyhow::Result<Report> {
        if let Some(dir) = self.data_dir {
            config.identity.data_dir = Some(dir);
        }

        // Pure operations need no core.
        let result = match self.command {
            Commands::Sign(args) => sign(&args),
            Commands::Verify(args) => verify(&args),
            Commands::Keygen(KeygenArgs { ephemeral: true }) => ephemeral_keygen(),
            command => {
                let core = Core::new(config)?;
                run_with_core(&core, command).await
            }
        };

        Ok(result.unwrap_or_else(|e| error_report(&e)))
    }
}

async fn run_with_core(core: &Core, command: Commands) -> Result<Report, CoreError> {
    match command {
        Commands::Keygen(_) => keygen(core),
        Commands::CheckBlockage(args) => Ok(check_blockage(core, &args.target).await),
        Commands::Connect(args) => connect(core, &args).await,
        Commands::Send(args) => send(core, &args).await,
        Commands::CheckUpdates => Ok(check_updates(core).await),
        Commands::ResetIdentity => {
            let removed = core.reset_identity()?;
            Ok(Report::new(ExitCode::Success).row("removed", removed.to_string()))
        }
        Commands::Sign(args) => sign(&args),
        Commands::Verify(args) => verify(&args),
    }
}

// ============================================================================
// Keys and signatures
// ============================================================================

fn keygen(core: &Core) -> Result<Report, CoreError> {
    let had_identity = core.identity().has_identity();
    let pair = core.generate_key_pair()?;
    let installed = !had_identity && core.identity().has_identity();
    info!(installed, "Generated key pair");

    Ok(Report::new(ExitCode::Success)
        .row("public_key", pair.public_key_hex())
        .row("key_pair", pair.encode().to_string())
        .row("installed", installed.to_string()))
}

fn ephemeral_keygen() -> Result<Report, CoreError> {
    let pair = KeyPair::generate()?;
    Ok(Report::new(ExitCode::Success)
        .row("public_key", pair.public_key_hex())
        .row("key_pair", pair.encode().to_string())
        .row("installed", "false"))
}

fn sign(args: &SignArgs) -> Result<Report, CoreError> {
    let signature = smc_crypto::sign_message(&args.message, &args.secret_key)?;
    Ok(Report::new(ExitCode::Success).row("signature", signature))
}

fn verify(args: &VerifyArgs) -> Result<Report, CoreError> {
    let valid = smc_crypto::verify_signature(&args.message, &args.signature, &args.public_key)?;
    let code = if valid {
        ExitCode::Success
    } else {
        ExitCode::VerificationFailed
    };
    Ok(Report::new(code).row("valid", valid.to_string()))
}

// ============================================================================
// Network
// ============================================================================

async fn check_blockage(core: &Core, target: &str) -> Report {
    let report = core.check_blockage(target).await;
    debug!(?report, "Probe finished");

    let code = match report.verdict {
        BlockageVerdict::Reachable => ExitCode::Success,
        BlockageVerdict::Unknown => ExitCode::GeneralError,
        _ => ExitCode::Blocked,
    };
    let mut out = Report::new(code)
        .row("target", report.target)
        .row("verdict", report.verdict.as_str())
        .row("stage", report.stage.as_str())
        .row("elapsed_ms", report.elapsed.as_millis().to_string());
    if let Some(detail) = report.detail {
        out = out.row("detail", detail);
    }
    out
}

async fn open_session(core: &Core, args: &BridgeArgs) -> Result<BridgeDescriptor, CoreError> {
    match args.descriptor()? {
        Some(bridge) => {
            core.connect_bridge(bridge.clone()).await?;
            Ok(bridge)
        }
        None => core.connect_configured().await,
    }
}

async fn connect(core: &Core, args: &BridgeArgs) -> Result<Report, CoreError> {
    let bridge = open_session(core, args).await?;
    let status = core.transport_status();
    Ok(Report::new(ExitCode::Success)
        .row("bridge", bridge.to_url())
        .row("state", status.state.as_str())
        .row("since", status.since.to_rfc3339()))
}

async fn send(core: &Core, args: &SendArgs) -> Result<Report, CoreError> {
    if !core.identity().has_identity() {
        return Err(CoreError::Crypto(CryptoError::NoIdentity));
    }
    let bridge = open_session(core, &args.bridge).await?;
    let receipt = core.send_message(args.chat, &args.text).await?;
    core.disconnect().await;

    Ok(Report::new(ExitCode::Success)
        .row("bridge", bridge.addr())
        .row("chat_id", receipt.chat_id.to_string())
        .row("seq", receipt.seq.to_string())
        .row("frame_len", receipt.frame_len.to_string()))
}

async fn check_updates(core: &Core) -> Report {
    let current = core.update_checker().current_version().to_string();
    match core.check_for_updates().await {
        UpdateCheck::UpdateAvailable(candidate) => Report::new(ExitCode::Success)
            .row("current_version", current)
            .row("available", candidate.version.clone())
            .row("content_id", candidate.content_id.clone())
            .row("published_at", candidate.published_at.to_rfc3339()),
        UpdateCheck::NoUpdate => Report::new(ExitCode::Success)
            .row("current_version", current)
            .row("available", "none"),
        UpdateCheck::FetchError(reason) => Report::new(ExitCode::ConnectionFailed)
            .row("current_version", current)
            .row("error", reason),
    }
}

// ============================================================================
// Errors
// ============================================================================

fn exit_code_for(error: &CoreError) -> ExitCode {
    if error.is_input_error() {
        return ExitCode::InvalidInput;
    }
    match error {
        CoreError::Network(_) => ExitCode::ConnectionFailed,
        CoreError::VerificationFailure(_) => ExitCode::VerificationFailed,
        _ => ExitCode::GeneralError,
    }
}

fn error_report(error: &CoreError) -> Report {
    Report::new(exit_code_for(error)).row("error", error.to_string())
}
