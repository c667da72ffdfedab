//! Configuration loading and validation tests
//!
//! Tests focus on behavior of loading files from disk and the errors a user
//! sees, not on TOML parsing details.

use device_simulator::config::{ConfigError, SimulatorConfig};
use device_simulator::device::{CertificateType, DeviceType};
use device_simulator::jobs::{path_name, FailureScenario, JobExecutionPath};
use device_simulator::protocol::JobStatus;
use std::io::Write;
use tempfile::NamedTempFile;

fn write_config(content: &str) -> NamedTempFile {
    let mut temp_file = NamedTempFile::new().unwrap();
    writeln!(temp_file, "{content}").unwrap();
    temp_file
}

#[test]
fn test_config_loads_successfully_from_valid_toml() {
    let temp_file = write_config(
        r#"
[device]
id = "nrfsim-42"
certificate_type = "jitp"
app_fw_version = "1.2.3"
shadow_profile = "atv2"

[mqtt]
endpoint = "broker.example.com"
messages_prefix = "prod/tenant-1/m/"
tenant_id = "tenant-1"
ca_cert_path = "certs/ca.pem"
client_cert_path = "certs/device.crt"
private_key_path = "certs/device.key"

[jobs]
failure_scenario = "download-timeout"
"#,
    );

    let config = SimulatorConfig::load_from_file(temp_file.path()).unwrap();

    assert_eq!(config.device.id, "nrfsim-42");
    assert_eq!(config.device.device_type, DeviceType::Generic);
    assert_eq!(config.device.certificate_type, CertificateType::Jitp);
    assert_eq!(config.device.app_fw_version, "1.2.3");
    assert!(!config.needs_team_info());
    assert_eq!(config.stage(), "prod");
    assert_eq!(
        config.jobs.failure_scenario,
        Some(FailureScenario::Path(JobExecutionPath::DownloadTimeout))
    );
    assert_eq!(
        path_name(config.jobs.failure_scenario.as_ref()),
        "End with a TIME_OUT"
    );

    let topics = config.topic_set().unwrap();
    assert_eq!(topics.jobs.receive, "prod/tenant-1/nrfsim-42/jobs/rcv");
    assert_eq!(topics.d2c, "prod/tenant-1/m/d/nrfsim-42/d2c");
}

#[test]
fn test_explicit_status_list_scenario() {
    let temp_file = write_config(
        r#"
[jobs]
failure_scenario = ["QUEUED", "DOWNLOADING", "FAILED"]
"#,
    );

    let config = SimulatorConfig::load_from_file(temp_file.path()).unwrap();
    assert_eq!(
        config.jobs.failure_scenario,
        Some(FailureScenario::Sequence(vec![
            JobStatus::Queued,
            JobStatus::Downloading,
            JobStatus::Failed,
        ]))
    );
}

#[test]
fn test_invalid_device_id_is_rejected() {
    let temp_file = write_config(
        r#"
[device]
id = "bad/device#id"
"#,
    );

    let result = SimulatorConfig::load_from_file(temp_file.path());
    assert!(matches!(result, Err(ConfigError::InvalidDeviceId(_))));
}

#[test]
fn test_zero_keep_alive_is_rejected() {
    let temp_file = write_config(
        r#"
[mqtt]
keep_alive_secs = 0
"#,
    );

    let result = SimulatorConfig::load_from_file(temp_file.path());
    assert!(matches!(result, Err(ConfigError::InvalidConfig(_))));
}

#[test]
fn test_malformed_toml_is_reported() {
    let temp_file = write_config("[device\nid = ");

    let result = SimulatorConfig::load_from_file(temp_file.path());
    assert!(matches!(result, Err(ConfigError::TomlParse(_))));
}

#[test]
fn test_unknown_failure_scenario_is_reported() {
    let temp_file = write_config(
        r#"
[jobs]
failure_scenario = "explode"
"#,
    );

    assert!(SimulatorConfig::load_from_file(temp_file.path()).is_err());
}

#[test]
fn test_missing_file_is_reported() {
    let result = SimulatorConfig::load_from_file(std::path::Path::new(
        "/nonexistent/device-sim.toml",
    ));
    assert!(matches!(result, Err(ConfigError::FileRead(_))));
}

#[test]
fn test_missing_api_key_variable() {
    let temp_file = write_config(
        r#"
[api]
api_key_env = "DEVICE_SIM_TEST_KEY_THAT_IS_NOT_SET"
"#,
    );

    let config = SimulatorConfig::load_from_file(temp_file.path()).unwrap();
    match config.api_key() {
        Err(ConfigError::EnvVarNotFound(name)) => {
            assert_eq!(name, "DEVICE_SIM_TEST_KEY_THAT_IS_NOT_SET");
        }
        other => panic!("expected missing env var, got {other:?}"),
    }
}
