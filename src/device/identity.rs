//! Identity of the simulated device

use serde::{Deserialize, Serialize};
use std::fmt;

/// How the control plane manages the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    /// Individually managed endpoint with shadow and jobs
    #[default]
    Generic,
    /// Tenant-wide MQTT bridge; receives traffic for topics it never registered
    Team,
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceType::Generic => f.write_str("Generic"),
            DeviceType::Team => f.write_str("MQTT Team"),
        }
    }
}

/// Provisioning mode of the device certificate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CertificateType {
    #[default]
    SelfSigned,
    /// Just-In-Time Provisioning: unknown to the control plane until first
    /// connection, which the broker drops once while registering it
    Jitp,
}

impl fmt::Display for CertificateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CertificateType::SelfSigned => f.write_str("self-signed"),
            CertificateType::Jitp => f.write_str("jitp"),
        }
    }
}

/// Immutable identity, created once at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub device_id: String,
    pub device_type: DeviceType,
    pub certificate_type: CertificateType,
}

impl DeviceIdentity {
    pub fn new(
        device_id: impl Into<String>,
        device_type: DeviceType,
        certificate_type: CertificateType,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            device_type,
            certificate_type,
        }
    }

    pub fn is_team(&self) -> bool {
        self.device_type == DeviceType::Team
    }

    pub fn is_jitp(&self) -> bool {
        self.certificate_type == CertificateType::Jitp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Wrapper {
        device_type: DeviceType,
        certificate_type: CertificateType,
    }

    #[test]
    fn test_identity_enums_deserialize_from_config_strings() {
        let parsed: Wrapper =
            toml::from_str("device_type = \"team\"\ncertificate_type = \"jitp\"").unwrap();
        assert_eq!(parsed.device_type, DeviceType::Team);
        assert_eq!(parsed.certificate_type, CertificateType::Jitp);

        let parsed: Wrapper =
            toml::from_str("device_type = \"generic\"\ncertificate_type = \"self-signed\"")
                .unwrap();
        assert_eq!(parsed.device_type, DeviceType::Generic);
        assert_eq!(parsed.certificate_type, CertificateType::SelfSigned);
    }

    #[test]
    fn test_identity_predicates() {
        let identity = DeviceIdentity::new("d", DeviceType::Team, CertificateType::Jitp);
        assert!(identity.is_team());
        assert!(identity.is_jitp());

        let identity = DeviceIdentity::new("d", DeviceType::default(), CertificateType::default());
        assert!(!identity.is_team());
        assert!(!identity.is_jitp());
    }
}
