//! CLI error types.

use thiserror::Error;

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid or unreadable configuration file.
    #[error("configuration error: {0}")]
    Config(String),

    /// Arguments that clap accepts but that contradict each other.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A command finished with failures.
    #[error("command error: {0}")]
    Command(String),

    /// Output formatting error.
    #[error("format error: {0}")]
    Format(String),

    /// The engine rejected the operation.
    #[error(transparent)]
    Core(#[from] wgman_core::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
