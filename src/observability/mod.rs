//! Structured logging for the simulated device
//!
//! Every outgoing publish and every incoming message is logged at INFO with
//! its topic and payload; per-device and per-job context is carried by spans.

pub mod logging;

pub use logging::{init_default_logging, init_default_logging_with, init_logging, LogFormat};

// Span macros for structured logging
pub use logging::{device_span, job_span, mqtt_span};
