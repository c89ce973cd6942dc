//! SMC CLI - drive the messenger core from a terminal
//!
//! Exercises the same operations the mobile host calls:
//! - Key generation, signing and verification
//! - Blockage probes against arbitrary targets
//! - Bridge connections and message sends
//! - Update checks against the configured channel

pub mod cli;
pub mod output;

pub use cli::Cli;
pub use output::{OutputFormat, Report};

/// Exit codes for CLI operations
///
/// - 0: Success
/// - 1: General error
/// - 2: Verification failed - signature did not verify
/// - 3: Connection failed - bridge, session or update channel unreachable
/// - 4: Invalid input - bad key material or arguments
/// - 5: Blocked - the probed target is not reachable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,
    VerificationFailed = 2,
    ConnectionFailed = 3,
    InvalidInput = 4,
    Blocked = 5,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl ExitCode {
    pub fn to_exit_code(self) -> std::process::ExitCode {
        std::process::ExitCode::from(self as u8)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ExitCode::Success => "SUCCESS",
            ExitCode::GeneralError => "GENERAL_ERROR",
            ExitCode::VerificationFailed => "VERIFICATION_FAILED",
            ExitCode::ConnectionFailed => "CONNECTION_FAILED",
            ExitCode::InvalidInput => "INVALID_INPUT",
            ExitCode::Blocked => "BLOCKED",
        }
    }
}
