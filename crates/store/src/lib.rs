//! Durable record of configured service instances, threads, connections, and
//! message history.
//!
//! Entities reference each other by ID only; relations are resolved through
//! explicit lookup calls, never embedded object graphs. Every operation is a
//! fallible remote call from the caller's point of view.

pub mod contract;
pub mod entities;
pub mod error;
pub mod sqlite;

pub use {
    contract::{BridgeStore, InstanceStore, MessageHistory, TopologyStore},
    entities::{
        ConnectionRecord, MessageRecord, NewMessage, NewServiceInstance, NewThread,
        ServiceInstanceRecord, ThreadRecord,
    },
    error::{Error, Result},
    sqlite::SqliteBridgeStore,
};
