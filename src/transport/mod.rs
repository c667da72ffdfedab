//! Transport layer for device/control-plane communication
//!
//! The [`Transport`] trait is the single adapter over the underlying
//! publish/subscribe client: every component publishes and subscribes through
//! it, and connection lifecycle changes arrive as [`TransportEvent`]s.

pub mod mqtt;

use mqtt::MqttError;

/// Transport trait for device communication
///
/// Abstracts the MQTT client so the device session, job manager and
/// orchestrator can be driven by a mock in tests.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Queue a payload for at-least-once delivery
    ///
    /// Resolves once the client has queued the packet for the broker, not on
    /// the broker's PUBACK; redelivery until acknowledged is left to the
    /// client. Fails straight away when the link is not connected.
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), MqttError>;

    /// Subscribe to a topic filter with at-least-once delivery
    async fn subscribe(&self, topic: &str) -> Result<(), MqttError>;

    /// Close the connection
    async fn disconnect(&self) -> Result<(), MqttError>;

    /// Check if transport is currently connected
    fn is_connected(&self) -> bool;
}

/// Lifecycle and data events emitted by a transport
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// First successful connection
    Connect,
    /// Connection re-established after it was lost
    Reconnect,
    /// Connection lost or closed by the broker
    Close,
    /// Transport-level error; the client keeps trying to reconnect
    Error(String),
    /// Message received on a subscribed topic
    Message { topic: String, payload: Vec<u8> },
}

impl TransportEvent {
    pub fn name(&self) -> &'static str {
        match self {
            TransportEvent::Connect => "connect",
            TransportEvent::Reconnect => "reconnect",
            TransportEvent::Close => "close",
            TransportEvent::Error(_) => "error",
            TransportEvent::Message { .. } => "message",
        }
    }
}

/// Type alias for MQTT transport
pub type MqttTransport = mqtt::MqttClient;
