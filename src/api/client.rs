//! reqwest implementation of [`DeviceApi`]

use super::{ApiError, DeviceApi, TeamInfo};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, RequestBuilder, Response};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, error, info};
use url::Url;

/// Ownership code sent when associating; the control plane requires a value
/// but the simulator never uses it
const ASSOCIATION_OWNERSHIP_CODE: &str = "123456";

const DEFAULT_TIMEOUT_MS: u64 = 10_000;

pub struct RestApiClient {
    base_url: Url,
    api_key: String,
    client: reqwest::Client,
}

impl RestApiClient {
    /// Create a client for `host` (with or without scheme) authenticating
    /// with a bearer `api_key`
    pub fn new(host: &str, api_key: impl Into<String>) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .build()?;
        Ok(Self {
            base_url: normalize_base_url(host)?,
            api_key: api_key.into(),
            client,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, ApiError> {
        let url = self
            .base_url
            .join(path)
            .map_err(|e| ApiError::InvalidHost(format!("{}{path}: {e}", self.base_url)))?;
        debug!(method = %method, url = %url, "REST request");
        Ok(self
            .client
            .request(method, url)
            .bearer_auth(&self.api_key))
    }
}

/// Send the request and map non-2xx responses to [`ApiError::Status`]
async fn send_checked(
    method: Method,
    path: &str,
    builder: RequestBuilder,
) -> Result<Response, ApiError> {
    let response = builder.send().await?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ApiError::Status {
        method: method.to_string(),
        path: path.to_string(),
        status: status.as_u16(),
        body,
    })
}

fn normalize_base_url(host: &str) -> Result<Url, ApiError> {
    let host = host.trim();
    if host.is_empty() {
        return Err(ApiError::InvalidHost("empty host".to_string()));
    }
    let with_scheme = if host.contains("://") {
        host.to_string()
    } else {
        format!("https://{host}")
    };
    let mut url =
        Url::parse(&with_scheme).map_err(|e| ApiError::InvalidHost(format!("{host}: {e}")))?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

#[async_trait]
impl DeviceApi for RestApiClient {
    async fn associate_device(&self, device_id: &str) -> Result<(), ApiError> {
        let path = format!("v1/association/{device_id}");
        let builder = self
            .request(Method::PUT, &path)?
            .header(CONTENT_TYPE, "application/json")
            .body(ASSOCIATION_OWNERSHIP_CODE);
        match send_checked(Method::PUT, &path, builder).await {
            Ok(_) => {
                info!(device_id, "JITP device {} successfully associated.", device_id);
                Ok(())
            }
            Err(e) => {
                error!(device_id, error = %e, "JITP device {} failed to associate.", device_id);
                Err(e)
            }
        }
    }

    async fn onboard_device(&self, device_id: &str, certificate: &str) -> Result<(), ApiError> {
        let path = format!("v1/devices/{device_id}");
        let builder = self
            .request(Method::POST, &path)?
            .json(&json!({ "certificate": certificate }));
        match send_checked(Method::POST, &path, builder).await {
            Ok(_) => {
                info!(device_id, "Device {} successfully onboarded.", device_id);
                Ok(())
            }
            Err(e) => {
                error!(device_id, error = %e, "Device {} failed to onboard.", device_id);
                Err(e)
            }
        }
    }

    async fn fetch_device(&self, device_id: &str) -> Result<Value, ApiError> {
        let path = format!("v1/devices/{device_id}");
        let builder = self.request(Method::GET, &path)?;
        let response = send_checked(Method::GET, &path, builder).await?;
        response
            .json::<Value>()
            .await
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))
    }

    async fn fetch_team_info(&self) -> Result<TeamInfo, ApiError> {
        let path = "v1/account";
        let builder = self.request(Method::GET, path)?;
        let response = send_checked(Method::GET, path, builder).await?;
        response
            .json::<TeamInfo>()
            .await
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))
    }
}
