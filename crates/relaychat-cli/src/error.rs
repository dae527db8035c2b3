//! CLI error types and exit codes.

use relaychat_core::ConfigError;
use thiserror::Error;

/// CLI-specific error type.
#[derive(Debug, Error)]
pub enum CliError {
    /// Missing or invalid configuration.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The server failed to start or stopped abnormally.
    #[error("Server error: {0}")]
    Server(String),
}

impl CliError {
    /// Map error to a process exit code (see sysexits.h).
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) => 78, // EX_CONFIG
            Self::Server(_) => 1,
        }
    }
}
