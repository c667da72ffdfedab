//! Device session: the connected device as seen by the rest of the simulator
//!
//! Wraps the transport, owns the topic set and the listener registry, and
//! renders the device twin.

use super::identity::DeviceIdentity;
use super::listeners::{DispatchOutcome, IncomingMessage, ListenerRegistry, TopicListener};
use crate::error::SimulatorResult;
use crate::protocol::{build_shadow_document, AppMessage, ShadowProfile, TopicSet};
use crate::transport::Transport;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

pub struct DeviceSession<T: Transport> {
    identity: DeviceIdentity,
    topics: TopicSet,
    transport: Arc<T>,
    listeners: ListenerRegistry,
    keep_alive_secs: u64,
}

impl<T: Transport> DeviceSession<T> {
    pub fn new(
        identity: DeviceIdentity,
        topics: TopicSet,
        transport: Arc<T>,
        keep_alive_secs: u64,
    ) -> Self {
        Self {
            identity,
            topics,
            transport,
            listeners: ListenerRegistry::new(),
            keep_alive_secs,
        }
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn device_id(&self) -> &str {
        &self.identity.device_id
    }

    pub fn topics(&self) -> &TopicSet {
        &self.topics
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Serialize `payload` as JSON and hand it to the transport
    ///
    /// Returns once the transport has queued the message (see
    /// [`Transport::publish`]).
    pub async fn publish<P: Serialize + ?Sized>(
        &self,
        topic: &str,
        payload: &P,
    ) -> SimulatorResult<()> {
        let body = serde_json::to_vec(payload)?;
        self.transport.publish(topic, body.clone()).await?;
        info!(
            direction = "outgoing",
            topic,
            payload = %String::from_utf8_lossy(&body),
            "Published message"
        );
        Ok(())
    }

    pub async fn subscribe(&self, topic: &str) -> SimulatorResult<()> {
        self.transport.subscribe(topic).await?;
        info!(topic, "Subscribed");
        Ok(())
    }

    /// Stamp an application message and publish it on the telemetry topic
    pub async fn send_message(&self, timestamp: i64, message: &AppMessage) -> SimulatorResult<()> {
        let stamped = message.stamped(timestamp);
        self.publish(&self.topics.d2c, &stamped).await
    }

    /// Publish the initial device twin for `profile`
    ///
    /// Callers guard against repeated initialization.
    pub async fn init_shadow(
        &self,
        app_fw_version: &str,
        profile: &ShadowProfile,
    ) -> SimulatorResult<()> {
        let document = build_shadow_document(app_fw_version, profile, self.keep_alive_secs)?;
        info!(profile = %profile, "Initializing device shadow");
        self.publish(&self.topics.shadow_update, &document).await
    }

    pub fn register_listener(&self, topic: &str, listener: Arc<dyn TopicListener>) -> bool {
        self.listeners.register(topic, listener)
    }

    pub fn unregister_listener(&self, topic: &str) -> bool {
        self.listeners.unregister(topic)
    }

    pub fn has_listener(&self, topic: &str) -> bool {
        self.listeners.contains(topic)
    }

    pub async fn dispatch(&self, message: IncomingMessage) -> SimulatorResult<DispatchOutcome> {
        self.listeners.dispatch(message).await
    }
}
