//! Data-access contract the bridge core depends on.
//!
//! Split by concern: instance configuration, thread/connection topology, and
//! message history. `BridgeStore` bundles all three for callers that hold a
//! single store handle.

use async_trait::async_trait;

use crate::{
    Result,
    entities::{
        ConnectionRecord, MessageRecord, NewMessage, NewServiceInstance, NewThread,
        ServiceInstanceRecord, ThreadRecord,
    },
};

/// Persistence of configured service instances.
#[async_trait]
pub trait InstanceStore: Send + Sync {
    async fn list_instances(&self) -> Result<Vec<ServiceInstanceRecord>>;

    /// Instances the service manager must instantiate at startup.
    async fn find_enabled_instances(&self) -> Result<Vec<ServiceInstanceRecord>>;

    async fn get_instance(&self, id: i64) -> Result<Option<ServiceInstanceRecord>>;

    /// Lookup by the operator-facing `(module, instance)` pair.
    async fn find_instance_by_name(
        &self,
        module_name: &str,
        instance_name: &str,
    ) -> Result<Option<ServiceInstanceRecord>>;

    /// Insert a new instance. Fails with [`crate::Error::Conflict`] if the
    /// `(module, instance)` pair is taken.
    async fn create_instance(&self, instance: NewServiceInstance) -> Result<ServiceInstanceRecord>;

    /// Flip the enabled flag. Fails with [`crate::Error::NotFound`] for an
    /// unknown ID.
    async fn set_instance_enabled(&self, id: i64, enabled: bool) -> Result<()>;

    /// Replace the instance configuration and mark it configured.
    async fn set_instance_config(&self, id: i64, config: serde_json::Value) -> Result<()>;

    /// Remove the instance and its threads.
    async fn remove_instance(&self, id: i64) -> Result<()>;
}

/// Persistence of the thread/connection routing topology.
#[async_trait]
pub trait TopologyStore: Send + Sync {
    async fn list_connections(&self) -> Result<Vec<ConnectionRecord>>;

    async fn find_connection_by_name(&self, name: &str) -> Result<Option<ConnectionRecord>>;

    async fn create_connection(&self, name: &str) -> Result<ConnectionRecord>;

    /// Remove a connection and its member threads.
    async fn remove_connection(&self, id: i64) -> Result<()>;

    /// Resolve the thread owned by `service_id` with the given external ID,
    /// if it is mapped into any connection.
    async fn find_thread(&self, service_id: i64, external_id: &str)
    -> Result<Option<ThreadRecord>>;

    /// All member threads of a connection, with their owning service IDs.
    /// Membership order is irrelevant to routing.
    async fn threads_of_connection(&self, connection_id: i64) -> Result<Vec<ThreadRecord>>;

    async fn create_thread(&self, thread: NewThread) -> Result<ThreadRecord>;

    async fn remove_thread(&self, id: i64) -> Result<()>;
}

/// Append-only message history.
#[async_trait]
pub trait MessageHistory: Send + Sync {
    /// Persist one routed message. Insert-only; messages are never mutated.
    async fn append_message(&self, message: NewMessage) -> Result<MessageRecord>;

    /// Most recent messages routed within a connection, newest first.
    async fn recent_messages(&self, connection_id: i64, limit: u32) -> Result<Vec<MessageRecord>>;
}

/// The full data-access surface of the bridge core.
pub trait BridgeStore: InstanceStore + TopologyStore + MessageHistory {}

impl<T: InstanceStore + TopologyStore + MessageHistory> BridgeStore for T {}
