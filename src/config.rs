//! Configuration for a simulated device
//!
//! Loaded from a TOML file and then overridden by CLI flags (which fall back to
//! environment variables). Every section is optional so a device can be run
//! from flags alone.

use crate::api::TeamInfo;
use crate::device::{CertificateType, DeviceIdentity, DeviceType};
use crate::jobs::FailureScenario;
use crate::protocol::{ShadowProfile, TopicSet};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default configuration file locations, tried in order
pub const DEFAULT_CONFIG_PATHS: [&str; 2] = ["device-sim.toml", "config/device-sim.toml"];

pub const DEFAULT_API_HOST: &str = "https://api.nrfcloud.com";

/// Stages the control plane is deployed to
const KNOWN_STAGES: [&str; 3] = ["dev", "beta", "prod"];

static DEVICE_ID_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9._:-]+$").expect("device id pattern is a valid regex")
});

/// Main simulator configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SimulatorConfig {
    #[serde(default)]
    pub device: DeviceSection,
    #[serde(default)]
    pub mqtt: MqttSection,
    #[serde(default)]
    pub api: ApiSection,
    #[serde(default)]
    pub jobs: JobsSection,
}

/// Device section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceSection {
    /// Device identifier (must match [A-Za-z0-9._:-]+)
    #[serde(default = "generate_device_id")]
    pub id: String,
    #[serde(default)]
    pub device_type: DeviceType,
    #[serde(default)]
    pub certificate_type: CertificateType,
    /// Skip the association call for JITP devices
    #[serde(default)]
    pub prevent_jitp_association: bool,
    #[serde(default = "default_app_fw_version")]
    pub app_fw_version: String,
    /// `atv2`, `mss`, or a path to a JSON device twin document
    pub shadow_profile: Option<String>,
}

impl Default for DeviceSection {
    fn default() -> Self {
        Self {
            id: generate_device_id(),
            device_type: DeviceType::default(),
            certificate_type: CertificateType::default(),
            prevent_jitp_association: false,
            app_fw_version: default_app_fw_version(),
            shadow_profile: None,
        }
    }
}

fn generate_device_id() -> String {
    format!("nrfsim-{}", uuid::Uuid::new_v4())
}

fn default_app_fw_version() -> String {
    "1.0.0".to_string()
}

impl DeviceSection {
    pub fn identity(&self) -> DeviceIdentity {
        DeviceIdentity::new(&self.id, self.device_type, self.certificate_type)
    }

    /// Resolve the configured shadow profile, reading custom documents from disk
    pub fn resolve_shadow_profile(&self) -> Result<Option<ShadowProfile>, ConfigError> {
        let Some(profile) = self.shadow_profile.as_deref() else {
            return Ok(None);
        };

        if let Ok(nominal) = profile.parse::<ShadowProfile>() {
            return Ok(Some(nominal));
        }

        let path = Path::new(profile);
        let content = std::fs::read_to_string(path)?;
        let document = serde_json::from_str(&content).map_err(|source| {
            ConfigError::InvalidShadowDocument {
                path: path.to_path_buf(),
                source,
            }
        })?;
        Ok(Some(ShadowProfile::Custom(document)))
    }
}

/// MQTT section
///
/// Endpoint, prefix and tenant may be left out and fetched from the
/// account endpoint at startup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MqttSection {
    /// Broker endpoint, either a bare host or an `mqtts://host:port` URL
    pub endpoint: Option<String>,
    pub messages_prefix: Option<String>,
    pub tenant_id: Option<String>,
    /// Derived from the API host when absent
    pub stage: Option<String>,
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
    pub ca_cert_path: Option<PathBuf>,
    pub client_cert_path: Option<PathBuf>,
    pub private_key_path: Option<PathBuf>,
}

impl Default for MqttSection {
    fn default() -> Self {
        Self {
            endpoint: None,
            messages_prefix: None,
            tenant_id: None,
            stage: None,
            keep_alive_secs: default_keep_alive(),
            ca_cert_path: None,
            client_cert_path: None,
            private_key_path: None,
        }
    }
}

fn default_keep_alive() -> u64 {
    30
}

/// REST API section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiSection {
    #[serde(default = "default_api_host")]
    pub host: String,
    /// Environment variable containing the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

impl Default for ApiSection {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            api_key_env: default_api_key_env(),
        }
    }
}

fn default_api_host() -> String {
    DEFAULT_API_HOST.to_string()
}

fn default_api_key_env() -> String {
    "API_KEY".to_string()
}

/// Job execution section
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct JobsSection {
    /// Preset name (`reject`) or explicit status list (`["QUEUED", "REJECTED"]`)
    pub failure_scenario: Option<FailureScenario>,
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),
    #[error("Invalid device ID format: {0}")]
    InvalidDeviceId(String),
    #[error("Missing required setting: {0}")]
    MissingField(&'static str),
    #[error("Invalid shadow document {}: {source}", path.display())]
    InvalidShadowDocument {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SimulatorConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: SimulatorConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the first default config file that exists, or built-in defaults
    pub fn load_default() -> Result<Self, ConfigError> {
        match DEFAULT_CONFIG_PATHS
            .iter()
            .map(Path::new)
            .find(|path| path.exists())
        {
            Some(path) => Self::load_from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_device_id(&self.device.id)?;
        if self.mqtt.keep_alive_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "mqtt.keep_alive_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Stage prefix for job topics; explicit setting wins over derivation
    pub fn stage(&self) -> String {
        self.mqtt
            .stage
            .clone()
            .unwrap_or_else(|| derive_stage(&self.api.host))
    }

    /// Topics for this device. Requires messages prefix and tenant id.
    pub fn topic_set(&self) -> Result<TopicSet, ConfigError> {
        let messages_prefix = self
            .mqtt
            .messages_prefix
            .as_deref()
            .ok_or(ConfigError::MissingField("mqtt.messages_prefix"))?;
        let tenant_id = self
            .mqtt
            .tenant_id
            .as_deref()
            .ok_or(ConfigError::MissingField("mqtt.tenant_id"))?;

        Ok(TopicSet::new(
            &self.device.id,
            messages_prefix,
            &self.stage(),
            tenant_id,
        ))
    }

    /// Whether endpoint, prefix or tenant must be fetched from the account API
    pub fn needs_team_info(&self) -> bool {
        self.mqtt.endpoint.is_none()
            || self.mqtt.messages_prefix.is_none()
            || self.mqtt.tenant_id.is_none()
    }

    /// Fill endpoint, messages prefix and tenant id from the account
    /// endpoint, keeping whatever was configured explicitly
    pub fn merge_team_info(&mut self, info: &TeamInfo) {
        self.mqtt
            .endpoint
            .get_or_insert_with(|| info.mqtt_endpoint.clone());
        self.mqtt
            .messages_prefix
            .get_or_insert_with(|| info.mqtt_messages_topic_prefix.clone());
        self.mqtt
            .tenant_id
            .get_or_insert_with(|| info.team.tenant_id.clone());
    }

    /// Get the REST API key from its environment variable
    pub fn api_key(&self) -> Result<String, ConfigError> {
        std::env::var(&self.api.api_key_env)
            .map_err(|_| ConfigError::EnvVarNotFound(self.api.api_key_env.clone()))
    }
}

/// Derive the deployment stage from the REST API host
///
/// `api.nrfcloud.com` is production; `api.<stage>.nrfcloud.com` names its
/// stage, and sub-account hosts with any other label default to `dev`.
pub fn derive_stage(api_host: &str) -> String {
    let host = url::Url::parse(api_host)
        .ok()
        .and_then(|url| url.host_str().map(str::to_string))
        .unwrap_or_else(|| api_host.to_string());

    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() == 3 {
        return "prod".to_string();
    }

    match labels.get(1) {
        Some(stage) if KNOWN_STAGES.contains(stage) => stage.to_string(),
        _ => "dev".to_string(),
    }
}

/// Device ids end up in topic names, so MQTT wildcards and level
/// separators are rejected
pub fn validate_device_id(device_id: &str) -> Result<(), ConfigError> {
    if !DEVICE_ID_PATTERN.is_match(device_id) {
        return Err(ConfigError::InvalidDeviceId(format!(
            "Device ID '{device_id}' must match pattern [A-Za-z0-9._:-]+"
        )));
    }
    Ok(())
}
