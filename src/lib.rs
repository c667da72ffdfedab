//! Device simulator for a cloud fleet-management control plane
//!
//! Emulates, from the device side, an IoT endpoint talking to the control
//! plane over MQTT: connecting with mutual TLS, onboarding (association of
//! just-in-time provisioned devices), publishing its device twin, and
//! executing firmware-update jobs, including deliberately injected failure
//! paths.
//!
//! # Overview
//!
//! - [`protocol`]: topic namespace, job tuples, device twin documents
//! - [`device`]: device identity, listener registry and session
//! - [`jobs`]: the per-job state machine and its manager
//! - [`orchestrator`]: reacts to transport events and drives onboarding,
//!   shadow initialization and the job flow
//! - [`transport`]: the MQTT adapter
//! - [`api`]: the REST collaborator used for onboarding
//!
//! # Quick Start
//!
//! ```rust
//! use device_simulator::jobs::{next_status, FailureScenario};
//! use device_simulator::protocol::{JobStatus, TopicSet};
//!
//! let topics = TopicSet::new("nrfsim-1", "prod/tenant/m/", "prod", "tenant");
//! assert_eq!(topics.jobs.request, "prod/tenant/nrfsim-1/jobs/req");
//!
//! let scenario: FailureScenario = "QUEUED,REJECTED".parse().unwrap();
//! assert_eq!(
//!     next_status(JobStatus::Queued, Some(&scenario)),
//!     Some(JobStatus::Rejected)
//! );
//! ```

pub mod api;
pub mod config;
pub mod device;
pub mod error;
pub mod jobs;
pub mod observability;
pub mod orchestrator;
pub mod protocol;
pub mod testing;
pub mod transport;

pub use api::{ApiError, DeviceApi, RestApiClient, RetryPolicy};
pub use config::*;
pub use device::{DeviceIdentity, DeviceSession};
pub use error::{SimulatorError, SimulatorResult};
pub use jobs::{FailureScenario, JobExecutionPath, JobsManager};
pub use orchestrator::{Orchestrator, OrchestratorSettings};
pub use protocol::*;
pub use transport::mqtt::MqttClient;
pub use transport::{Transport, TransportEvent};
