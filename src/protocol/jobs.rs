//! Job (firmware-update) wire model
//!
//! Inbound notifications are JSON arrays `[jobId, firmwareType, fileSize, host, path]`,
//! outbound updates are `[jobId, statusCode, message]`. Unknown numeric codes are
//! tolerated and only surface in log output.

use serde::ser::SerializeTuple;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Job execution status as understood by the control plane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Queued,
    InProgress,
    Failed,
    Succeeded,
    TimedOut,
    Canceled,
    Rejected,
    Downloading,
}

impl JobStatus {
    pub const ALL: [JobStatus; 8] = [
        JobStatus::Queued,
        JobStatus::InProgress,
        JobStatus::Failed,
        JobStatus::Succeeded,
        JobStatus::TimedOut,
        JobStatus::Canceled,
        JobStatus::Rejected,
        JobStatus::Downloading,
    ];

    /// Numeric code used on the wire
    pub fn code(self) -> u8 {
        match self {
            JobStatus::Queued => 0,
            JobStatus::InProgress => 1,
            JobStatus::Failed => 2,
            JobStatus::Succeeded => 3,
            JobStatus::TimedOut => 4,
            JobStatus::Canceled => 5,
            JobStatus::Rejected => 6,
            JobStatus::Downloading => 7,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|s| i64::from(s.code()) == code)
    }

    pub fn name(self) -> &'static str {
        match self {
            JobStatus::Queued => "QUEUED",
            JobStatus::InProgress => "IN_PROGRESS",
            JobStatus::Failed => "FAILED",
            JobStatus::Succeeded => "SUCCEEDED",
            JobStatus::TimedOut => "TIMED_OUT",
            JobStatus::Canceled => "CANCELED",
            JobStatus::Rejected => "REJECTED",
            JobStatus::Downloading => "DOWNLOADING",
        }
    }

    /// Statuses after which the device never publishes another update
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded
                | JobStatus::Failed
                | JobStatus::TimedOut
                | JobStatus::Canceled
                | JobStatus::Rejected
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.code())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_uppercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|status| status.name() == normalized)
            .ok_or_else(|| format!("Unknown job status: {s}"))
    }
}

/// Human-readable name for a raw status code, falling back to the code itself
pub fn status_name(code: i64) -> String {
    JobStatus::from_code(code)
        .map(|s| s.name().to_string())
        .unwrap_or_else(|| code.to_string())
}

/// Firmware image kinds a job can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirmwareType {
    App,
    Modem,
    Boot,
}

impl FirmwareType {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(FirmwareType::App),
            1 => Some(FirmwareType::Modem),
            2 => Some(FirmwareType::Boot),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            FirmwareType::App => "APP",
            FirmwareType::Modem => "MODEM",
            FirmwareType::Boot => "BOOT",
        }
    }
}

/// Human-readable firmware type for a raw code, falling back to the code itself
pub fn firmware_name(code: i64) -> String {
    FirmwareType::from_code(code)
        .map(|t| t.name().to_string())
        .unwrap_or_else(|| code.to_string())
}

/// Decoded job notification received on the jobs-receive topic
#[derive(Debug, Clone, PartialEq)]
pub struct JobNotification {
    pub job_id: String,
    /// Raw firmware type code; see [`FirmwareType::from_code`]
    pub firmware_type: i64,
    pub file_size: f64,
    pub host: String,
    pub path: String,
}

impl JobNotification {
    /// Decode the inbound tuple. Anything that is not a well-formed
    /// 5-element array yields `None`.
    pub fn decode(payload: &Value) -> Option<Self> {
        if !payload.is_array() {
            return None;
        }

        let (job_id, firmware_type, file_size, host, path): (String, i64, f64, String, String) =
            serde_json::from_value(payload.clone()).ok()?;

        Some(Self {
            job_id,
            firmware_type,
            file_size,
            host,
            path,
        })
    }

    pub fn firmware_name(&self) -> String {
        firmware_name(self.firmware_type)
    }

    /// Download location as advertised by the control plane (`<host><path>`)
    pub fn location(&self) -> String {
        format!("{}{}", self.host, self.path)
    }
}

/// Outbound status update: `[jobId, statusCode, message]`
#[derive(Debug, Clone, PartialEq)]
pub struct JobUpdate {
    pub job_id: String,
    pub status: JobStatus,
    pub message: String,
}

impl Serialize for JobUpdate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(3)?;
        tuple.serialize_element(&self.job_id)?;
        tuple.serialize_element(&self.status.code())?;
        tuple.serialize_element(&self.message)?;
        tuple.end()
    }
}

/// Job request payload: `[jobId]`, or `[""]` to ask for the latest queued job
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobRequest(pub [String; 1]);

impl JobRequest {
    pub fn latest_queued() -> Self {
        Self([String::new()])
    }

    pub fn for_job(job_id: &str) -> Self {
        Self([job_id.to_string()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_codes_are_wire_compatible() {
        assert_eq!(JobStatus::Queued.code(), 0);
        assert_eq!(JobStatus::InProgress.code(), 1);
        assert_eq!(JobStatus::Failed.code(), 2);
        assert_eq!(JobStatus::Succeeded.code(), 3);
        assert_eq!(JobStatus::TimedOut.code(), 4);
        assert_eq!(JobStatus::Canceled.code(), 5);
        assert_eq!(JobStatus::Rejected.code(), 6);
        assert_eq!(JobStatus::Downloading.code(), 7);
    }

    #[test]
    fn test_status_from_code_and_name() {
        for status in JobStatus::ALL {
            assert_eq!(JobStatus::from_code(i64::from(status.code())), Some(status));
            assert_eq!(status.name().parse::<JobStatus>(), Ok(status));
        }
        assert_eq!(JobStatus::from_code(42), None);
        assert_eq!("timed-out".parse::<JobStatus>(), Ok(JobStatus::TimedOut));
        assert!("finished".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_unknown_codes_fall_back_to_raw_value() {
        assert_eq!(status_name(7), "DOWNLOADING");
        assert_eq!(status_name(99), "99");
        assert_eq!(firmware_name(1), "MODEM");
        assert_eq!(firmware_name(9), "9");
    }

    #[test]
    fn test_decode_notification() {
        let payload = json!(["job-1", 0, 1024, "host", "/path"]);
        let job = JobNotification::decode(&payload).expect("valid tuple");

        assert_eq!(job.job_id, "job-1");
        assert_eq!(job.firmware_name(), "APP");
        assert_eq!(job.file_size, 1024.0);
        assert_eq!(job.location(), "host/path");
    }

    #[test]
    fn test_decode_tolerates_unknown_firmware_type() {
        let payload = json!(["job-2", 17, 10, "h", "/p"]);
        let job = JobNotification::decode(&payload).expect("valid tuple");
        assert_eq!(job.firmware_name(), "17");
    }

    #[test]
    fn test_decode_rejects_malformed_payloads() {
        assert!(JobNotification::decode(&Value::Null).is_none());
        assert!(JobNotification::decode(&json!({})).is_none());
        assert!(JobNotification::decode(&json!([])).is_none());
        assert!(JobNotification::decode(&json!([""])).is_none());
        assert!(JobNotification::decode(&json!(["job", "APP", 1, "h", "/p"])).is_none());
        assert!(JobNotification::decode(&json!(["job", 0, 1, "h"])).is_none());
    }

    #[test]
    fn test_update_serializes_as_tuple() {
        let update = JobUpdate {
            job_id: "job-1".to_string(),
            status: JobStatus::Downloading,
            message: "downloading".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&update).unwrap(),
            json!(["job-1", 7, "downloading"])
        );
    }

    #[test]
    fn test_request_payloads() {
        assert_eq!(
            serde_json::to_value(JobRequest::latest_queued()).unwrap(),
            json!([""])
        );
        assert_eq!(
            serde_json::to_value(JobRequest::for_job("job-9")).unwrap(),
            json!(["job-9"])
        );
    }
}
