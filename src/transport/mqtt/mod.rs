//! MQTT client implementation for the simulated device
//!
//! Split into pure and impure halves:
//!
//! - [`connection`] - Connection options, TLS material and backoff settings
//! - [`message_handler`] - Event routing and lifecycle translation
//! - [`client`] - The event loop task and the [`Transport`](crate::transport::Transport) impl
//!
//! # Usage
//!
//! ```rust,no_run
//! use device_simulator::config::MqttSection;
//! use device_simulator::transport::mqtt::MqttClient;
//! use device_simulator::transport::{Transport, TransportEvent};
//!
//! # tokio_test::block_on(async {
//! let config = MqttSection {
//!     endpoint: Some("mqtt://localhost:1883".to_string()),
//!     ..MqttSection::default()
//! };
//!
//! let client = MqttClient::new("nrfsim-1", &config)?;
//! let mut events = client.start().await?;
//! while let Some(event) = events.recv().await {
//!     if event == TransportEvent::Connect {
//!         client.subscribe("prod/tenant/#").await?;
//!     }
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```

pub mod client;
pub mod connection;
pub mod message_handler;

pub use client::MqttClient;
pub use connection::{configure_mqtt_options, ConnectionState, MqttError, ReconnectConfig};
pub use message_handler::{EventRoute, LinkTracker, MessageHandler};
