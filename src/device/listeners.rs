//! Per-topic message handlers
//!
//! At most one handler per topic. Registering on an occupied topic keeps the
//! existing handler, so a topic's meaning cannot change mid-session.

use crate::error::SimulatorResult;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Decoded inbound message handed to a listener
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingMessage {
    pub topic: String,
    pub payload: Value,
}

/// Asynchronous handler bound to a single topic
#[async_trait]
pub trait TopicListener: Send + Sync {
    async fn on_message(&self, message: IncomingMessage) -> SimulatorResult<()>;
}

/// What happened to a dispatched message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Handled,
    NoListener,
}

#[derive(Default)]
pub struct ListenerRegistry {
    listeners: Mutex<HashMap<String, Arc<dyn TopicListener>>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when the topic already had a listener (which is kept)
    pub fn register(&self, topic: &str, listener: Arc<dyn TopicListener>) -> bool {
        let mut listeners = self.lock();
        if listeners.contains_key(topic) {
            debug!(topic, "Listener already registered, keeping existing one");
            return false;
        }
        listeners.insert(topic.to_string(), listener);
        true
    }

    /// Returns whether a listener was removed
    pub fn unregister(&self, topic: &str) -> bool {
        self.lock().remove(topic).is_some()
    }

    pub fn contains(&self, topic: &str) -> bool {
        self.lock().contains_key(topic)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Invoke the listener registered for the message's topic
    ///
    /// The map lock is released before the handler runs, so handlers may
    /// register or unregister listeners themselves.
    pub async fn dispatch(&self, message: IncomingMessage) -> SimulatorResult<DispatchOutcome> {
        let listener = self.lock().get(&message.topic).cloned();
        match listener {
            Some(listener) => {
                listener.on_message(message).await?;
                Ok(DispatchOutcome::Handled)
            }
            None => Ok(DispatchOutcome::NoListener),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<dyn TopicListener>>> {
        // A poisoned map is still structurally valid
        self.listeners.lock().unwrap_or_else(|poisoned| {
            warn!("Listener registry lock was poisoned");
            poisoned.into_inner()
        })
    }
}
