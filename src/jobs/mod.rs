//! Firmware-update job execution

pub mod manager;
pub mod state_machine;

pub use manager::JobsManager;
pub use state_machine::{
    next_status, path_name, status_message, FailureScenario, JobExecutionPath, JobTransition,
};
