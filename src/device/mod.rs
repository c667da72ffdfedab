//! The simulated device: identity, listener registry and session

pub mod identity;
pub mod listeners;
pub mod session;

pub use identity::{CertificateType, DeviceIdentity, DeviceType};
pub use listeners::{DispatchOutcome, IncomingMessage, ListenerRegistry, TopicListener};
pub use session::DeviceSession;
