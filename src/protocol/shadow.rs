//! Device twin ("shadow") documents
//!
//! The nominal profiles mirror what real Asset Tracker v2 and Multi-Service
//! Sample firmware report on first connection. A caller may instead supply a
//! complete pre-built document.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Marker injected into every document so the control plane can tell
/// simulated twins apart from real ones
pub const SIMULATOR_MARKER: &str = "simulator";

/// Profile used to render the initial device twin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ShadowProfile {
    /// `atv2`
    AssetTrackerV2,
    /// `mss`
    MultiServiceSample,
    /// Arbitrary pre-built document
    Custom(Value),
}

impl ShadowProfile {
    pub fn label(&self) -> &'static str {
        match self {
            ShadowProfile::AssetTrackerV2 => "atv2",
            ShadowProfile::MultiServiceSample => "mss",
            ShadowProfile::Custom(_) => "custom",
        }
    }
}

impl fmt::Display for ShadowProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ShadowProfile {
    type Err = ShadowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "atv2" => Ok(ShadowProfile::AssetTrackerV2),
            "mss" => Ok(ShadowProfile::MultiServiceSample),
            other => Err(ShadowError::UnknownProfile(other.to_string())),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ShadowError {
    #[error("Unknown shadow profile: {0}")]
    UnknownProfile(String),
    #[error("Shadow document must contain an object at state.reported")]
    MissingReportedState,
}

/// Render the device twin for a profile and mark it as simulator-generated
pub fn build_shadow_document(
    app_version: &str,
    profile: &ShadowProfile,
    keep_alive_secs: u64,
) -> Result<Value, ShadowError> {
    let mut document = match profile {
        ShadowProfile::AssetTrackerV2 => nominal_document(app_version, keep_alive_secs, true),
        ShadowProfile::MultiServiceSample => {
            nominal_document(app_version, keep_alive_secs, false)
        }
        ShadowProfile::Custom(document) => document.clone(),
    };

    let reported = document
        .get_mut("state")
        .and_then(|state| state.get_mut("reported"))
        .and_then(Value::as_object_mut)
        .ok_or(ShadowError::MissingReportedState)?;
    reported.insert(SIMULATOR_MARKER.to_string(), Value::Bool(true));

    Ok(document)
}

fn nominal_document(app_version: &str, keep_alive_secs: u64, asset_tracker: bool) -> Value {
    let app_version = if app_version.is_empty() {
        "1.0.0"
    } else {
        app_version
    };
    let (app_name, fota) = if asset_tracker {
        ("asset_tracker_v2", json!(["BOOT", "MODEM", "APP"]))
    } else {
        ("nrf_cloud_multi_service", json!(["MODEM", "APP"]))
    };

    let mut reported = Map::new();
    reported.insert(
        "connection".to_string(),
        json!({ "status": "connected", "keepalive": keep_alive_secs }),
    );
    reported.insert(
        "control".to_string(),
        json!({ "alertsEn": true, "logLvl": 3 }),
    );
    if asset_tracker {
        reported.insert(
            "config".to_string(),
            json!({
                "activeMode": true,
                "locationTimeout": 300,
                "activeWaitTime": 300,
                "movementResolution": 120,
                "movementTimeout": 3600,
                "accThreshAct": 4,
                "accThreshInact": 4,
                "accTimeoutInact": 60,
                "nod": []
            }),
        );
    }
    reported.insert(
        "device".to_string(),
        json!({
            "deviceInfo": {
                "appVersion": app_version,
                "batteryVoltage": 5191,
                "appName": app_name,
                "imei": "358299840010349",
                "board": "nrf9161dk_nrf9161",
                "sdkVer": "v2.6.0-571-gf927cd6b1473",
                "zephyrVer": "v3.5.99-ncs1-4957-g54b4e400ed8f",
                "hwVer": "nRF9161 LACA ADA"
            },
            "networkInfo": {
                "supportedBands": "(1,2,3,4,5,8,12,13,18,19,20,25,26,28,66,85)",
                "networkMode": "LTE-M GPS",
                "ipAddress": "10.160.33.51",
                "ueMode": 2,
                "rsrp": -58
            },
            "simInfo": {
                "uiccMode": 1,
                "iccid": "",
                "imsi": "204080813516718"
            },
            "serviceInfo": {
                "fota_v2": fota
            },
            "connectionInfo": {
                "protocol": "MQTT",
                "method": "LTE"
            }
        }),
    );

    json!({ "state": { "reported": reported } })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reported(document: &Value) -> &Value {
        &document["state"]["reported"]
    }

    #[test]
    fn test_every_profile_is_marked_as_simulated() {
        let profiles = vec![
            ShadowProfile::AssetTrackerV2,
            ShadowProfile::MultiServiceSample,
            ShadowProfile::Custom(json!({ "state": { "reported": { "foo": 1 } } })),
        ];

        for profile in profiles {
            let document = build_shadow_document("2.0.0", &profile, 30).unwrap();
            let text = serde_json::to_string(&document).unwrap();
            let parsed: Value = serde_json::from_str(&text).unwrap();
            assert_eq!(reported(&parsed)[SIMULATOR_MARKER], Value::Bool(true));
        }
    }

    #[test]
    fn test_asset_tracker_profile() {
        let document = build_shadow_document("1.2.3", &ShadowProfile::AssetTrackerV2, 30).unwrap();
        let reported = reported(&document);

        assert_eq!(reported["connection"]["status"], "connected");
        assert_eq!(reported["connection"]["keepalive"], 30);
        assert_eq!(reported["device"]["deviceInfo"]["appVersion"], "1.2.3");
        assert_eq!(reported["device"]["deviceInfo"]["appName"], "asset_tracker_v2");
        assert_eq!(
            reported["device"]["serviceInfo"]["fota_v2"],
            json!(["BOOT", "MODEM", "APP"])
        );
        assert!(reported["config"].is_object());
    }

    #[test]
    fn test_multi_service_profile_has_no_config_section() {
        let document =
            build_shadow_document("", &ShadowProfile::MultiServiceSample, 60).unwrap();
        let reported = reported(&document);

        assert_eq!(reported["device"]["deviceInfo"]["appVersion"], "1.0.0");
        assert_eq!(
            reported["device"]["deviceInfo"]["appName"],
            "nrf_cloud_multi_service"
        );
        assert_eq!(
            reported["device"]["serviceInfo"]["fota_v2"],
            json!(["MODEM", "APP"])
        );
        assert!(reported.get("config").is_none());
    }

    #[test]
    fn test_custom_document_is_kept_verbatim() {
        let custom = json!({ "state": { "reported": { "custom": "value" } }, "version": 3 });
        let document =
            build_shadow_document("1.0.0", &ShadowProfile::Custom(custom), 30).unwrap();

        assert_eq!(document["version"], 3);
        assert_eq!(reported(&document)["custom"], "value");
    }

    #[test]
    fn test_custom_document_without_reported_state_is_rejected() {
        let result = build_shadow_document(
            "1.0.0",
            &ShadowProfile::Custom(json!({ "state": {} })),
            30,
        );
        assert_eq!(result, Err(ShadowError::MissingReportedState));
    }

    #[test]
    fn test_profile_parsing() {
        assert_eq!("atv2".parse(), Ok(ShadowProfile::AssetTrackerV2));
        assert_eq!("MSS".parse(), Ok(ShadowProfile::MultiServiceSample));
        assert!(matches!(
            "tracker".parse::<ShadowProfile>(),
            Err(ShadowError::UnknownProfile(_))
        ));
    }
}
