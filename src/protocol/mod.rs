//! Wire-level model of the device/control-plane protocol
//!
//! Topic derivation, job tuples, device twin documents and application
//! messages. Everything here is pure data; I/O lives in `device` and `transport`.

pub mod jobs;
pub mod messages;
pub mod shadow;
pub mod topics;

pub use jobs::{FirmwareType, JobNotification, JobRequest, JobStatus, JobUpdate};
pub use messages::AppMessage;
pub use shadow::{build_shadow_document, ShadowError, ShadowProfile};
pub use topics::{JobTopics, TopicSet};
