//! The bridge core: service lifecycle management and message routing.
//!
//! [`ServiceManager`] owns the registry of live adapters and their status
//! machine; [`ExchangeManager`] consumes the merged outbound streams of all
//! running adapters and fans each message out to the peer threads of its
//! connection.

pub mod error;
pub mod exchange;
pub mod manager;

#[cfg(test)]
pub(crate) mod testing;

pub use {
    error::{Error, Result},
    exchange::ExchangeManager,
    manager::{InstanceSnapshot, ServiceManager},
};
