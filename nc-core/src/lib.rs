//! Network Controller core: the encrypted command/response envelope,
//! onion forwarding chain, command executor, request handler, and the
//! evidence transfer worker.

pub mod chain;
pub mod controller;
pub mod crypto;
pub mod error;
pub mod executor;
pub mod forwarder;
pub mod model;
pub mod ports;
pub mod registry;
pub mod worker;

#[cfg(any(test, feature = "test-support"))]
pub mod mock;

pub use controller::Controller;
pub use error::{NcError, Result};
pub use worker::EvidenceWorker;
