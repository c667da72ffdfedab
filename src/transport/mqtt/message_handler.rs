//! Pure message routing logic for MQTT events
//!
//! Classifies raw rumqttc events and turns them into the transport lifecycle
//! events the orchestrator consumes.

use crate::transport::TransportEvent;
use rumqttc::v5::mqttbytes::v5::Packet;
use rumqttc::v5::Event;
use rumqttc::Outgoing;

/// Pure message routing decisions based on MQTT events
pub struct MessageHandler;

impl MessageHandler {
    /// Route MQTT event to appropriate handler (pure routing decision)
    pub fn route_mqtt_event(event: &Event) -> EventRoute {
        match event {
            Event::Incoming(incoming) => match incoming {
                Packet::ConnAck(_) => EventRoute::ConnectionAcknowledged,
                Packet::Publish(publish) => EventRoute::MessageReceived {
                    topic: String::from_utf8_lossy(&publish.topic).to_string(),
                    payload: publish.payload.to_vec(),
                },
                Packet::Disconnect(disconnect) => {
                    EventRoute::Disconnected(format!("{:?}", disconnect.reason_code))
                }
                Packet::SubAck(suback) => EventRoute::SubscriptionConfirmed {
                    packet_id: suback.pkid,
                    return_codes: format!("{:?}", suback.return_codes),
                },
                other => EventRoute::InfrastructureEvent(format!("{other:?}")),
            },
            Event::Outgoing(Outgoing::Disconnect) => EventRoute::LocalDisconnect,
            Event::Outgoing(_) => EventRoute::OutgoingEvent,
        }
    }
}

/// Routing decisions for MQTT events
#[derive(Debug, Clone, PartialEq)]
pub enum EventRoute {
    /// Connection acknowledged - ready to publish/subscribe
    ConnectionAcknowledged,
    /// Message received on subscribed topic
    MessageReceived { topic: String, payload: Vec<u8> },
    /// Broker sent a DISCONNECT
    Disconnected(String),
    /// Our own DISCONNECT went out; the event loop should stop
    LocalDisconnect,
    /// Subscription confirmed with return codes
    SubscriptionConfirmed {
        packet_id: u16,
        return_codes: String,
    },
    /// Infrastructure event (PingResp, PubAck, etc.)
    InfrastructureEvent(String),
    /// Outgoing event (handled automatically)
    OutgoingEvent,
}

/// Tracks link status across the event stream so the first ConnAck becomes
/// `Connect`, later ones `Reconnect`, and each lost link exactly one `Close`
#[derive(Debug, Default)]
pub struct LinkTracker {
    ever_connected: bool,
    connected: bool,
}

impl LinkTracker {
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn on_connack(&mut self) -> TransportEvent {
        let event = if self.ever_connected {
            TransportEvent::Reconnect
        } else {
            TransportEvent::Connect
        };
        self.ever_connected = true;
        self.connected = true;
        event
    }

    /// `Close` if the link was up, nothing if it was already down
    pub fn on_connection_lost(&mut self) -> Option<TransportEvent> {
        if self.connected {
            self.connected = false;
            Some(TransportEvent::Close)
        } else {
            None
        }
    }

    /// Lifecycle events produced by a routed MQTT event
    pub fn translate(&mut self, route: EventRoute) -> Vec<TransportEvent> {
        match route {
            EventRoute::ConnectionAcknowledged => vec![self.on_connack()],
            EventRoute::MessageReceived { topic, payload } => {
                vec![TransportEvent::Message { topic, payload }]
            }
            EventRoute::Disconnected(_) | EventRoute::LocalDisconnect => {
                self.on_connection_lost().into_iter().collect()
            }
            EventRoute::SubscriptionConfirmed { .. }
            | EventRoute::InfrastructureEvent(_)
            | EventRoute::OutgoingEvent => Vec::new(),
        }
    }

    /// Lifecycle events produced by a failed poll
    pub fn translate_error(&mut self, error: String) -> Vec<TransportEvent> {
        let mut events = vec![TransportEvent::Error(error)];
        events.extend(self.on_connection_lost());
        events
    }
}
