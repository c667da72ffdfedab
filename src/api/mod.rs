//! REST collaborator for the fleet-management control plane
//!
//! Only the calls the simulated device needs: association of JITP devices,
//! onboarding of self-signed devices, and account/device lookups.

pub mod client;
pub mod retry;

pub use client::RestApiClient;
pub use retry::RetryPolicy;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("{method} {path} returned {status}: {body}")]
    Status {
        method: String,
        path: String,
        status: u16,
        body: String,
    },
    #[error("Invalid API host: {0}")]
    InvalidHost(String),
    #[error("Invalid response body: {0}")]
    InvalidResponse(String),
    #[error("{operation} failed after {attempts} attempts: {last_error}")]
    RetryExhausted {
        operation: String,
        attempts: u32,
        #[source]
        last_error: Box<ApiError>,
    },
}

/// Tenant ("team") information returned by the account endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamInfo {
    pub mqtt_endpoint: String,
    pub mqtt_messages_topic_prefix: String,
    pub team: Team,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    pub tenant_id: String,
    pub name: String,
}

/// Control-plane operations used by the device
#[async_trait]
pub trait DeviceApi: Send + Sync {
    /// Associate a just-in-time provisioned device with the account
    async fn associate_device(&self, device_id: &str) -> Result<(), ApiError>;

    /// Register a device together with its self-signed certificate
    async fn onboard_device(&self, device_id: &str, certificate: &str) -> Result<(), ApiError>;

    async fn fetch_device(&self, device_id: &str) -> Result<Value, ApiError>;

    async fn fetch_team_info(&self) -> Result<TeamInfo, ApiError>;
}
