//! Crate-level error type for the device simulator
//!
//! Each layer has its own error enum; this one is what crosses component
//! boundaries. Only [`SimulatorError::ProtocolViolation`] is meant to stop the
//! process, everything else is logged by the connection orchestrator.

use crate::api::ApiError;
use crate::config::ConfigError;
use crate::protocol::ShadowError;
use crate::transport::mqtt::MqttError;
use thiserror::Error;

/// Main error type for simulator operations
#[derive(Debug, Error)]
pub enum SimulatorError {
    #[error("Transport error: {0}")]
    Transport(#[from] MqttError),

    #[error("No listener registered for topic {topic}")]
    ProtocolViolation { topic: String },

    #[error("REST API error: {0}")]
    Api(#[from] ApiError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Shadow error: {0}")]
    Shadow(#[from] ShadowError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid payload on {topic}: {message}")]
    InvalidPayload { topic: String, message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl SimulatorError {
    pub fn protocol_violation<S: Into<String>>(topic: S) -> Self {
        Self::ProtocolViolation {
            topic: topic.into(),
        }
    }

    pub fn invalid_payload<T: Into<String>, M: Into<String>>(topic: T, message: M) -> Self {
        Self::InvalidPayload {
            topic: topic.into(),
            message: message.into(),
        }
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether this error must terminate the simulated device
    pub fn is_fatal(&self) -> bool {
        matches!(self, SimulatorError::ProtocolViolation { .. })
    }
}

/// Result type for simulator operations
pub type SimulatorResult<T> = Result<T, SimulatorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_protocol_violations_are_fatal() {
        assert!(SimulatorError::protocol_violation("a/b").is_fatal());
        assert!(!SimulatorError::internal("boom").is_fatal());
        assert!(!SimulatorError::invalid_payload("a/b", "not json").is_fatal());
        assert!(!SimulatorError::Transport(MqttError::PublishFailed("x".into())).is_fatal());
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            SimulatorError::protocol_violation("prod/t/d/jobs/rcv").to_string(),
            "No listener registered for topic prod/t/d/jobs/rcv"
        );
        assert_eq!(
            SimulatorError::internal("unexpected state").to_string(),
            "Internal error: unexpected state"
        );
        assert_eq!(
            SimulatorError::invalid_payload("t", "bad").to_string(),
            "Invalid payload on t: bad"
        );
    }
}
