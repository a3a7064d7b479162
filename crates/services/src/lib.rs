//! Service capability contract.
//!
//! Each chat platform implements [`ServicePlugin`] with initialize/terminate
//! lifecycle, a `send` delivery contract, and a bounded outbound queue the
//! exchange consumes. Adapters register into an explicit [`AdapterRegistry`]
//! at process start; there is no dynamic loading of adapter code.

pub mod error;
pub mod plugin;
pub mod registry;
pub mod status;

pub use {
    error::{Error, Result},
    plugin::{OUTBOUND_QUEUE_CAPACITY, ServiceContext, ServicePlugin},
    registry::{AdapterDescriptor, AdapterRegistry},
    status::{ServiceStatus, StatusUpdate},
};
