//! Error taxonomy for the Faultline workspace.
//!
//! Every failure surfaces as a single terse reason string; callers never
//! receive a partial analysis result alongside an error.

use thiserror::Error;

/// Workspace-wide result alias
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Analyzer error taxonomy
#[derive(Debug, Error)]
pub enum Error {
    /// Caller passed zero events; the analysis is rejected outright
    #[error("events payload is empty")]
    EmptyBatch,

    /// The oracle could not resolve a topology chain for an event
    #[error("topology not found: {0}")]
    TopologyNotFound(String),

    /// Oracle transport or decode failure
    #[error("topology oracle unavailable: {0}")]
    OracleUnavailable(String),

    /// The configured result sink rejected the verdict
    #[error("persisting analysis result failed: {0}")]
    PersistFailed(String),

    /// The caller withdrew the request between suspension points
    #[error("analysis cancelled")]
    Cancelled,

    /// Missing provider or malformed layer configuration
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),
}

impl Error {
    /// Topology lookup miss
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::TopologyNotFound(msg.into())
    }

    /// Oracle transport error
    pub fn oracle(msg: impl Into<String>) -> Self {
        Self::OracleUnavailable(msg.into())
    }

    /// Result sink error
    pub fn persist(msg: impl Into<String>) -> Self {
        Self::PersistFailed(msg.into())
    }

    /// Configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigInvalid(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_strings_are_terse() {
        assert_eq!(Error::EmptyBatch.to_string(), "events payload is empty");
        assert_eq!(
            Error::not_found("host 10.0.0.1").to_string(),
            "topology not found: host 10.0.0.1"
        );
        assert_eq!(Error::Cancelled.to_string(), "analysis cancelled");
    }

    #[test]
    fn test_helper_constructors_pick_variant() {
        assert!(matches!(Error::oracle("x"), Error::OracleUnavailable(_)));
        assert!(matches!(Error::persist("x"), Error::PersistFailed(_)));
        assert!(matches!(Error::config("x"), Error::ConfigInvalid(_)));
    }
}
