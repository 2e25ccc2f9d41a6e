//! Error types for WireGuard key handling and control utility calls.

use thiserror::Error;

/// Result type alias for this crate.
pub type Result<T> = std::result::Result<T, WireGuardError>;

/// Errors that can occur while handling keys or driving `wg` / `wg-quick`.
#[derive(Debug, Error)]
pub enum WireGuardError {
    /// Invalid key format.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Invalid base64 encoding.
    #[error("invalid base64 encoding: {0}")]
    InvalidBase64(String),

    /// Invalid key length.
    #[error("invalid key length: expected 32, got {0}")]
    InvalidKeyLength(usize),

    /// The program could not be started at all.
    #[error("failed to run {command}: {message}")]
    Spawn {
        /// The command line that was attempted.
        command: String,
        /// Underlying OS error.
        message: String,
    },

    /// The program ran but exited unsuccessfully.
    #[error("{command} exited with {exit_code}: {stderr}")]
    CommandFailed {
        /// The command line that was executed.
        command: String,
        /// Exit code, `-1` when killed by a signal.
        exit_code: i32,
        /// Trimmed standard error output.
        stderr: String,
    },

    /// The program did not finish in time.
    #[error("{command} did not finish within {timeout_secs}s")]
    Timeout {
        /// The command line that was executed.
        command: String,
        /// Configured timeout.
        timeout_secs: u64,
    },

    /// Output of `wg show <name> dump` could not be parsed.
    #[error("invalid dump output at line {line}: {message}")]
    InvalidDump {
        /// 1-based line number.
        line: usize,
        /// What was wrong with it.
        message: String,
    },
}

impl WireGuardError {
    /// Returns true for failures produced by running an external program.
    #[must_use]
    pub fn is_tool_failure(&self) -> bool {
        matches!(
            self,
            Self::Spawn { .. } | Self::CommandFailed { .. } | Self::Timeout { .. } | Self::InvalidDump { .. }
        )
    }
}
