//! Testing utilities and mock implementations
//!
//! Test doubles for the transport and the REST collaborator so the session,
//! job and orchestrator logic can be exercised without a broker or network.

pub mod mocks;

pub use mocks::*;
