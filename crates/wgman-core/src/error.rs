//! Error types for the reconciliation engine.

use thiserror::Error;
use wgman_wireguard::WireGuardError;

/// Result type alias for this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by the manager, store and synchronizer.
#[derive(Debug, Error)]
pub enum Error {
    /// A referenced interface or peer does not exist.
    #[error("{entity} {key} not found")]
    NotFound {
        /// Kind of record (`interface` or `peer`).
        entity: &'static str,
        /// The id, name or address that was looked up.
        key: String,
    },

    /// A uniqueness constraint would be violated.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Input failed validation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// `wg` or `wg-quick` failed, timed out, or produced unusable output.
    #[error("control utility failed: {0}")]
    ExternalToolFailure(#[from] WireGuardError),

    /// Every usable host in the subnet is taken.
    #[error("no free address left in {network}")]
    AddressSpaceExhausted {
        /// The exhausted subnet.
        network: String,
    },

    /// The entity store could not be read or written.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem error while writing configuration.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Builds a [`Error::NotFound`] for an interface.
    pub fn interface_not_found(key: impl ToString) -> Self {
        Self::NotFound {
            entity: "interface",
            key: key.to_string(),
        }
    }

    /// Builds a [`Error::NotFound`] for a peer.
    pub fn peer_not_found(key: impl ToString) -> Self {
        Self::NotFound {
            entity: "peer",
            key: key.to_string(),
        }
    }

    /// Returns true if the error came from the control utility.
    #[must_use]
    pub fn is_tool_failure(&self) -> bool {
        matches!(self, Self::ExternalToolFailure(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_display() {
        assert_eq!(Error::interface_not_found(7).to_string(), "interface 7 not found");
        assert_eq!(Error::peer_not_found("10.0.0.2").to_string(), "peer 10.0.0.2 not found");
    }

    #[test]
    fn tool_failure_wraps_wireguard_error() {
        let err: Error = WireGuardError::Timeout {
            command: "wg-quick up wg0".into(),
            timeout_secs: 30,
        }
        .into();
        assert!(err.is_tool_failure());
        assert!(err.to_string().starts_with("control utility failed"));
    }

    #[test]
    fn exhausted_display() {
        let err = Error::AddressSpaceExhausted {
            network: "10.0.0.0/30".into(),
        };
        assert_eq!(err.to_string(), "no free address left in 10.0.0.0/30");
    }
}
