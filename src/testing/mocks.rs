//! Mock implementations for testing
//!
//! `MockTransport` records every publish and subscription and can be forced
//! to fail; `MockDeviceApi` counts control-plane calls and can fail a given
//! number of times before succeeding.

use crate::api::{ApiError, DeviceApi, Team, TeamInfo};
use crate::transport::mqtt::MqttError;
use crate::transport::Transport;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

pub type PublishedMessage = (String, Vec<u8>);

/// Mock transport for testing
#[derive(Debug)]
pub struct MockTransport {
    pub published_messages: Arc<Mutex<Vec<PublishedMessage>>>,
    pub subscriptions: Arc<Mutex<Vec<String>>>,
    pub should_fail: bool,
    connected: AtomicBool,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self {
            published_messages: Arc::default(),
            subscriptions: Arc::default(),
            should_fail: false,
            connected: AtomicBool::new(true),
        }
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failure() -> Self {
        Self {
            should_fail: true,
            ..Default::default()
        }
    }

    pub async fn get_published_messages(&self) -> Vec<PublishedMessage> {
        self.published_messages.lock().await.clone()
    }

    /// Published payloads decoded as JSON, in publish order
    pub async fn get_published_json(&self) -> Vec<(String, Value)> {
        self.published_messages
            .lock()
            .await
            .iter()
            .map(|(topic, payload)| {
                let value = serde_json::from_slice(payload).unwrap_or(Value::Null);
                (topic.clone(), value)
            })
            .collect()
    }

    /// Published JSON payloads for one topic
    pub async fn get_published_json_on(&self, topic: &str) -> Vec<Value> {
        self.get_published_json()
            .await
            .into_iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, value)| value)
            .collect()
    }

    pub async fn get_subscriptions(&self) -> Vec<String> {
        self.subscriptions.lock().await.clone()
    }

    pub async fn clear_history(&self) {
        self.published_messages.lock().await.clear();
        self.subscriptions.lock().await.clear();
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), MqttError> {
        if self.should_fail {
            return Err(MqttError::PublishFailed("Mock publish failure".into()));
        }

        let mut messages = self.published_messages.lock().await;
        messages.push((topic.to_string(), payload));
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<(), MqttError> {
        if self.should_fail {
            return Err(MqttError::SubscriptionFailed(
                "Mock subscription failure".into(),
            ));
        }

        let mut subscriptions = self.subscriptions.lock().await;
        subscriptions.push(topic.to_string());
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), MqttError> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// Mock control-plane client for testing
#[derive(Debug)]
pub struct MockDeviceApi {
    pub associate_calls: AtomicU32,
    pub onboard_calls: AtomicU32,
    pub fetch_device_calls: AtomicU32,
    pub team_info_calls: AtomicU32,
    /// Number of leading calls (of any kind) that fail
    fail_times: u32,
    failures: AtomicU32,
    delay: Option<Duration>,
    team_info: TeamInfo,
    pub onboarded_certificates: Arc<Mutex<Vec<(String, String)>>>,
}

impl Default for MockDeviceApi {
    fn default() -> Self {
        Self {
            associate_calls: AtomicU32::new(0),
            onboard_calls: AtomicU32::new(0),
            fetch_device_calls: AtomicU32::new(0),
            team_info_calls: AtomicU32::new(0),
            fail_times: 0,
            failures: AtomicU32::new(0),
            delay: None,
            team_info: TeamInfo {
                mqtt_endpoint: "mqtt.example.com".to_string(),
                mqtt_messages_topic_prefix: "prod/tenant-1/m/".to_string(),
                team: Team {
                    tenant_id: "tenant-1".to_string(),
                    name: "Mock Team".to_string(),
                },
            },
            onboarded_certificates: Arc::default(),
        }
    }
}

impl MockDeviceApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the first `times` calls with a 503
    pub fn failing(times: u32) -> Self {
        Self {
            fail_times: times,
            ..Default::default()
        }
    }

    /// Make every call take `delay` before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_team_info(mut self, team_info: TeamInfo) -> Self {
        self.team_info = team_info;
        self
    }

    pub fn associate_count(&self) -> u32 {
        self.associate_calls.load(Ordering::SeqCst)
    }

    async fn answer(&self, path: String) -> Result<(), ApiError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let failed_so_far = self.failures.load(Ordering::SeqCst);
        if failed_so_far < self.fail_times {
            self.failures.fetch_add(1, Ordering::SeqCst);
            return Err(ApiError::Status {
                method: "MOCK".to_string(),
                path,
                status: 503,
                body: "Mock control plane failure".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl DeviceApi for MockDeviceApi {
    async fn associate_device(&self, device_id: &str) -> Result<(), ApiError> {
        self.associate_calls.fetch_add(1, Ordering::SeqCst);
        self.answer(format!("v1/association/{device_id}")).await
    }

    async fn onboard_device(&self, device_id: &str, certificate: &str) -> Result<(), ApiError> {
        self.onboard_calls.fetch_add(1, Ordering::SeqCst);
        self.answer(format!("v1/devices/{device_id}")).await?;
        self.onboarded_certificates
            .lock()
            .await
            .push((device_id.to_string(), certificate.to_string()));
        Ok(())
    }

    async fn fetch_device(&self, device_id: &str) -> Result<Value, ApiError> {
        self.fetch_device_calls.fetch_add(1, Ordering::SeqCst);
        self.answer(format!("v1/devices/{device_id}")).await?;
        Ok(json!({ "id": device_id }))
    }

    async fn fetch_team_info(&self) -> Result<TeamInfo, ApiError> {
        self.team_info_calls.fetch_add(1, Ordering::SeqCst);
        self.answer("v1/account".to_string()).await?;
        Ok(self.team_info.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_transport_records_in_order() {
        let transport = MockTransport::new();
        transport.publish("a", b"[1]".to_vec()).await.unwrap();
        transport.publish("b", b"{\"x\":2}".to_vec()).await.unwrap();
        transport.subscribe("c/#").await.unwrap();

        assert_eq!(
            transport.get_published_json().await,
            vec![("a".to_string(), json!([1])), ("b".to_string(), json!({"x": 2}))]
        );
        assert_eq!(transport.get_published_json_on("b").await, vec![json!({"x": 2})]);
        assert_eq!(transport.get_subscriptions().await, vec!["c/#"]);

        transport.clear_history().await;
        assert!(transport.get_published_messages().await.is_empty());
    }

    #[tokio::test]
    async fn test_mock_transport_failure() {
        let transport = MockTransport::with_failure();
        assert!(transport.publish("a", vec![]).await.is_err());
        assert!(transport.subscribe("a").await.is_err());
        assert!(transport.get_published_messages().await.is_empty());
    }

    #[tokio::test]
    async fn test_mock_api_fails_then_succeeds() {
        let api = MockDeviceApi::failing(2);
        assert!(api.associate_device("d").await.is_err());
        assert!(api.associate_device("d").await.is_err());
        assert!(api.associate_device("d").await.is_ok());
        assert_eq!(api.associate_count(), 3);
    }
}
