//! Impure I/O operations for MQTT client
//!
//! Owns the rumqttc event loop task and exposes the [`Transport`] operations.
//! rumqttc reconnects by itself on the next poll after a failure, so the
//! supervisor here only throttles polling and reports lifecycle changes.

use super::connection::{configure_mqtt_options, ConnectionState, MqttError, ReconnectConfig};
use super::message_handler::{EventRoute, LinkTracker, MessageHandler};
use crate::config::MqttSection;
use crate::transport::{Transport, TransportEvent};
use async_trait::async_trait;
use rumqttc::v5::{mqttbytes::QoS, AsyncClient, EventLoop};
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Capacity of the rumqttc request channel and of the lifecycle event channel
const CHANNEL_CAPACITY: usize = 64;

/// MQTT transport client for one simulated device
pub struct MqttClient {
    device_id: String,
    client: AsyncClient,
    event_loop: Mutex<Option<EventLoop>>,
    event_loop_handle: Mutex<Option<JoinHandle<()>>>,
    state_tx: watch::Sender<ConnectionState>,
    state_rx: watch::Receiver<ConnectionState>,
    shutdown_tx: watch::Sender<bool>,
    reconnect_config: ReconnectConfig,
}

impl MqttClient {
    pub fn new(device_id: &str, config: &MqttSection) -> Result<Self, MqttError> {
        let mqtt_options = configure_mqtt_options(device_id, config)?;
        let (client, event_loop) = AsyncClient::new(mqtt_options, CHANNEL_CAPACITY);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            device_id: device_id.to_string(),
            client,
            event_loop: Mutex::new(Some(event_loop)),
            event_loop_handle: Mutex::new(None),
            state_tx,
            state_rx,
            shutdown_tx,
            reconnect_config: ReconnectConfig::default(),
        })
    }

    pub fn with_reconnect_config(mut self, reconnect_config: ReconnectConfig) -> Self {
        self.reconnect_config = reconnect_config;
        self
    }

    /// Start polling the broker connection
    ///
    /// Returns the stream of lifecycle and message events. Can only be called
    /// once per client.
    pub async fn start(&self) -> Result<mpsc::Receiver<TransportEvent>, MqttError> {
        let event_loop = self.event_loop.lock().await.take().ok_or_else(|| {
            MqttError::ConnectionFailed("Event loop already started".into())
        })?;

        let (events_tx, events_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let supervisor = EventLoopSupervisor {
            device_id: self.device_id.clone(),
            event_loop,
            events_tx,
            state_tx: self.state_tx.clone(),
            shutdown_rx: self.shutdown_tx.subscribe(),
            reconnect_config: self.reconnect_config.clone(),
            tracker: LinkTracker::default(),
        };

        info!(device_id = %self.device_id, "Starting MQTT event loop");
        let handle = tokio::spawn(supervisor.run());
        *self.event_loop_handle.lock().await = Some(handle);

        Ok(events_rx)
    }

    /// Get current connection state
    pub fn connection_state(&self) -> ConnectionState {
        self.state_rx.borrow().clone()
    }

    fn check_connection_state(&self) -> Result<(), MqttError> {
        let state = self.connection_state();
        if !state.can_publish() {
            return Err(MqttError::NotConnected { state });
        }
        Ok(())
    }

    async fn stop_event_loop(&self) {
        let Some(handle) = self.event_loop_handle.lock().await.take() else {
            return;
        };

        // Give the loop time to flush the DISCONNECT packet
        let mut handle = handle;
        match tokio::time::timeout(Duration::from_secs(2), &mut handle).await {
            Ok(Ok(())) => info!("Event loop task shut down gracefully"),
            Ok(Err(e)) if !e.is_cancelled() => warn!("Event loop task ended with error: {}", e),
            Ok(Err(_)) => {}
            Err(_) => {
                warn!("Event loop task didn't shut down gracefully, forcing abort");
                let _ = self.shutdown_tx.send(true);
                handle.abort();
            }
        }
    }
}

#[async_trait]
impl Transport for MqttClient {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), MqttError> {
        self.check_connection_state()?;

        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|e| MqttError::PublishFailed(Box::new(e)))
    }

    async fn subscribe(&self, topic: &str) -> Result<(), MqttError> {
        self.check_connection_state()?;

        self.client
            .subscribe(topic, QoS::AtLeastOnce)
            .await
            .map_err(|e| MqttError::SubscriptionFailed(Box::new(e)))?;
        debug!(target: "mqtt_transport", "Subscribed to: {}", topic);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), MqttError> {
        let result = self
            .client
            .disconnect()
            .await
            .map_err(|e| MqttError::ConnectionFailed(Box::new(e)));

        self.stop_event_loop().await;
        let _ = self.state_tx.send(ConnectionState::Closed);
        info!(device_id = %self.device_id, "MQTT client disconnected");
        result
    }

    fn is_connected(&self) -> bool {
        self.connection_state().can_publish()
    }
}

/// Background task polling the rumqttc event loop
struct EventLoopSupervisor {
    device_id: String,
    event_loop: EventLoop,
    events_tx: mpsc::Sender<TransportEvent>,
    state_tx: watch::Sender<ConnectionState>,
    shutdown_rx: watch::Receiver<bool>,
    reconnect_config: ReconnectConfig,
    tracker: LinkTracker,
}

impl EventLoopSupervisor {
    async fn run(mut self) {
        let mut failed_polls = 0u32;

        loop {
            tokio::select! {
                _ = self.shutdown_rx.changed() => {
                    if *self.shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping MQTT event loop");
                        break;
                    }
                }

                event_result = self.event_loop.poll() => {
                    match event_result {
                        Ok(event) => {
                            failed_polls = 0;
                            let route = MessageHandler::route_mqtt_event(&event);
                            let stop = route == EventRoute::LocalDisconnect;
                            if !self.process_route(route).await || stop {
                                break;
                            }
                        }
                        Err(e) => {
                            failed_polls += 1;
                            if !self.handle_poll_error(e, failed_polls).await {
                                break;
                            }
                        }
                    }
                }
            }
        }

        let _ = self.state_tx.send(ConnectionState::Closed);
        info!(device_id = %self.device_id, "MQTT event loop stopped");
    }

    /// Returns false once nobody listens for events anymore
    async fn forward(&mut self, events: Vec<TransportEvent>) -> bool {
        for event in events {
            if self.events_tx.send(event).await.is_err() {
                warn!("Transport event receiver dropped, stopping MQTT event loop");
                return false;
            }
        }
        true
    }

    async fn process_route(&mut self, route: EventRoute) -> bool {
        match &route {
            EventRoute::ConnectionAcknowledged => {
                let _ = self.state_tx.send(ConnectionState::Connected);
            }
            EventRoute::Disconnected(reason) => {
                warn!(reason = %reason, "Broker sent DISCONNECT");
                let _ = self
                    .state_tx
                    .send(ConnectionState::Disconnected(reason.clone()));
            }
            EventRoute::SubscriptionConfirmed {
                packet_id,
                return_codes,
            } => {
                debug!(target: "mqtt_transport", packet_id, "Subscription confirmed: {}", return_codes);
            }
            EventRoute::InfrastructureEvent(event) => {
                debug!(target: "mqtt_transport", "MQTT event: {}", event);
            }
            EventRoute::MessageReceived { .. }
            | EventRoute::LocalDisconnect
            | EventRoute::OutgoingEvent => {}
        }

        let events = self.tracker.translate(route);
        self.forward(events).await
    }

    async fn handle_poll_error(
        &mut self,
        error: rumqttc::v5::ConnectionError,
        failed_polls: u32,
    ) -> bool {
        let reason = error.to_string();
        error!(device_id = %self.device_id, "MQTT event loop error: {}", reason);
        let _ = self
            .state_tx
            .send(ConnectionState::Disconnected(reason.clone()));

        let events = self.tracker.translate_error(reason);
        if !self.forward(events).await {
            return false;
        }

        let delay_ms = self.reconnect_config.calculate_backoff_delay(failed_polls);
        info!(
            attempt = failed_polls,
            delay_ms, "Reconnecting to broker after delay"
        );
        self.interruptible_sleep(delay_ms).await
    }

    /// Returns true if sleep completed, false if shutdown requested
    async fn interruptible_sleep(&mut self, delay_ms: u64) -> bool {
        tokio::select! {
            _ = self.shutdown_rx.changed() => {
                if *self.shutdown_rx.borrow() {
                    info!("Shutdown signal received during reconnection delay, stopping");
                    return false;
                }
                true
            }
            _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_config() -> MqttSection {
        MqttSection {
            endpoint: Some("mqtt://localhost:1883".to_string()),
            ..MqttSection::default()
        }
    }

    #[tokio::test]
    async fn test_new_client_is_not_connected() {
        let client = MqttClient::new("nrfsim-test", &local_config()).unwrap();
        assert_eq!(client.connection_state(), ConnectionState::Connecting);
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_publish_before_connack_fails() {
        let client = MqttClient::new("nrfsim-test", &local_config()).unwrap();
        let result = client.publish("a/b", b"{}".to_vec()).await;
        assert!(matches!(
            result,
            Err(MqttError::NotConnected {
                state: ConnectionState::Connecting
            })
        ));

        let result = client.subscribe("a/b").await;
        assert!(matches!(result, Err(MqttError::NotConnected { .. })));
    }

    #[tokio::test]
    async fn test_event_loop_starts_once() {
        let client = MqttClient::new("nrfsim-test", &local_config()).unwrap();
        let _events = client.start().await.unwrap();
        assert!(client.start().await.is_err());
        let _ = client.shutdown_tx.send(true);
    }

    #[test]
    fn test_invalid_endpoint() {
        let config = MqttSection {
            endpoint: Some("broker:notaport".to_string()),
            ..MqttSection::default()
        };
        assert!(matches!(
            MqttClient::new("nrfsim-test", &config),
            Err(MqttError::InvalidBrokerUrl(_))
        ));
    }
}
