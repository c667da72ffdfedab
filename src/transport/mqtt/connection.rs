//! Pure connection state management for the MQTT client
//!
//! Connection options, TLS material loading and the reconnection backoff
//! pattern. Nothing in here touches the network.

use crate::config::MqttSection;
use rumqttc::v5::MqttOptions;
use rumqttc::{TlsConfiguration, Transport as RumqttcTransport};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Default port for MQTT over TLS
pub const MQTTS_PORT: u16 = 8883;

/// Connection state for MQTT client
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    /// Initial state - waiting for the first ConnAck
    Connecting,
    /// Successfully connected and ready for operations
    Connected,
    /// Disconnected with reason; the event loop keeps retrying
    Disconnected(String),
    /// Closed by the local side
    Closed,
}

impl ConnectionState {
    pub fn can_publish(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

/// Reconnection configuration
///
/// rumqttc reconnects on the next poll after an error; this only throttles
/// how fast the event loop is polled again.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Backoff pattern in milliseconds
    pub backoff_pattern: Vec<u64>,
    /// Delay to use after pattern is exhausted
    pub sustained_delay: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            backoff_pattern: vec![250, 500, 1000, 2500],
            sustained_delay: 5000,
        }
    }
}

impl ReconnectConfig {
    /// Delay before the given (1-based) poll attempt after an error
    pub fn calculate_backoff_delay(&self, attempt: u32) -> u64 {
        let index = attempt.saturating_sub(1) as usize;
        self.backoff_pattern
            .get(index)
            .copied()
            .unwrap_or(self.sustained_delay)
    }
}

/// MQTT transport errors
#[derive(Debug, Error)]
pub enum MqttError {
    #[error("Connection failed")]
    ConnectionFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Publishing failed")]
    PublishFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Subscription failed")]
    SubscriptionFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Serialization error")]
    SerializationError(#[source] serde_json::Error),
    #[error("Invalid broker endpoint: {0}")]
    InvalidBrokerUrl(String),
    #[error("Failed to read TLS material {path}: {source}")]
    TlsMaterial {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Missing setting: {0}")]
    MissingSetting(&'static str),
    #[error("Not connected - current state: {state:?}")]
    NotConnected { state: ConnectionState },
}

/// Broker host and port from either a bare host name or a URL
///
/// Bare hosts (as returned by the account endpoint) use the MQTT over TLS
/// port.
pub fn parse_endpoint(endpoint: &str) -> Result<(String, u16), MqttError> {
    if !endpoint.contains("://") {
        let host = endpoint.trim().trim_end_matches('/');
        if host.is_empty() || host.contains('/') {
            return Err(MqttError::InvalidBrokerUrl(endpoint.to_string()));
        }
        return match host.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| MqttError::InvalidBrokerUrl(endpoint.to_string()))?;
                Ok((host.to_string(), port))
            }
            None => Ok((host.to_string(), MQTTS_PORT)),
        };
    }

    let url =
        Url::parse(endpoint).map_err(|_| MqttError::InvalidBrokerUrl(endpoint.to_string()))?;
    let host = url
        .host_str()
        .ok_or_else(|| MqttError::InvalidBrokerUrl(endpoint.to_string()))?;
    let port = url
        .port()
        .unwrap_or(if url.scheme() == "mqtt" { 1883 } else { MQTTS_PORT });

    Ok((host.to_string(), port))
}

fn uses_tls(endpoint: &str) -> bool {
    !endpoint.starts_with("mqtt://") && !endpoint.starts_with("tcp://")
}

fn read_material(path: &Path) -> Result<Vec<u8>, MqttError> {
    std::fs::read(path).map_err(|source| MqttError::TlsMaterial {
        path: path.display().to_string(),
        source,
    })
}

/// Build mutual-TLS settings from the configured PEM files
pub fn tls_configuration(config: &MqttSection) -> Result<TlsConfiguration, MqttError> {
    let ca_path = config
        .ca_cert_path
        .as_deref()
        .ok_or(MqttError::MissingSetting("mqtt.ca_cert_path"))?;
    let ca = read_material(ca_path)?;

    let client_auth = match (&config.client_cert_path, &config.private_key_path) {
        (Some(cert), Some(key)) => Some((read_material(cert)?, read_material(key)?)),
        (None, None) => None,
        _ => {
            return Err(MqttError::MissingSetting(
                "mqtt.client_cert_path and mqtt.private_key_path must be set together",
            ))
        }
    };

    Ok(TlsConfiguration::Simple {
        ca,
        alpn: None,
        client_auth,
    })
}

/// Pure function to configure MQTT options from config
///
/// The client id is the device id: the broker authorizes the certificate
/// against it.
pub fn configure_mqtt_options(
    device_id: &str,
    config: &MqttSection,
) -> Result<MqttOptions, MqttError> {
    let endpoint = config
        .endpoint
        .as_deref()
        .ok_or(MqttError::MissingSetting("mqtt.endpoint"))?;
    let (host, port) = parse_endpoint(endpoint)?;

    let mut mqtt_options = MqttOptions::new(device_id, host, port);

    if uses_tls(endpoint) {
        let transport = RumqttcTransport::tls_with_config(tls_configuration(config)?);
        mqtt_options.set_transport(transport);
    }

    mqtt_options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));
    mqtt_options.set_clean_start(true);

    Ok(mqtt_options)
}
