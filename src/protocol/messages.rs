//! Application messages sent on the device-to-cloud topic

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Application message as produced by the on-device services
///
/// `ts` is stamped by the device session right before publishing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppMessage {
    pub app_id: String,
    pub message_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Unix timestamp in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ts: Option<i64>,
    /// Service-specific fields carried alongside the standard ones
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AppMessage {
    pub fn new(app_id: impl Into<String>, message_type: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            message_type: message_type.into(),
            message_id: None,
            data: None,
            ts: None,
            extra: Map::new(),
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Copy of this message carrying the given timestamp
    pub fn stamped(&self, ts: i64) -> Self {
        Self {
            ts: Some(ts),
            ..self.clone()
        }
    }
}
