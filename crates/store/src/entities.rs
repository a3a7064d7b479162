//! Persisted entity records.
//!
//! `*Record` types are rows read back from the store; `New*` types are the
//! insert payloads (the store assigns the numeric ID).

use {
    chatplug_common::types::Attachment,
    serde::{Deserialize, Serialize},
};

/// A configured adapter instance.
///
/// Runtime status is not persisted; it lives in the service manager's
/// registry for as long as the bridge runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInstanceRecord {
    pub id: i64,
    /// Adapter module this instance is built from (e.g. "console").
    pub module_name: String,
    /// Human-chosen name, unique per module.
    pub instance_name: String,
    pub configured: bool,
    pub enabled: bool,
    pub primary_mode: bool,
    /// Adapter-specific configuration, shaped by the adapter's config schema.
    pub config: serde_json::Value,
}

/// Insert payload for a service instance.
#[derive(Debug, Clone)]
pub struct NewServiceInstance {
    pub module_name: String,
    pub instance_name: String,
    pub enabled: bool,
    pub primary_mode: bool,
    pub config: serde_json::Value,
}

/// A platform-side conversation, owned by one service instance and one
/// connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadRecord {
    pub id: i64,
    /// Thread ID in the owning platform's namespace.
    pub external_id: String,
    pub name: String,
    pub service_id: i64,
    pub connection_id: i64,
}

/// Insert payload for a thread.
#[derive(Debug, Clone)]
pub struct NewThread {
    pub external_id: String,
    pub name: String,
    pub service_id: i64,
    pub connection_id: i64,
}

/// A named group of threads treated as one cross-platform conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionRecord {
    pub id: i64,
    pub name: String,
}

/// One routed chat message, retained for history. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: i64,
    pub content: String,
    pub attachments: Vec<Attachment>,
    pub author_username: String,
    pub author_external_id: String,
    pub author_avatar_url: Option<String>,
    pub origin_service_id: i64,
    pub origin_thread_id: i64,
    pub connection_id: i64,
    /// Unix milliseconds.
    pub created_at: i64,
}

/// Insert payload for a message, written by the exchange after a successful
/// route decision.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub content: String,
    pub attachments: Vec<Attachment>,
    pub author_username: String,
    pub author_external_id: String,
    pub author_avatar_url: Option<String>,
    pub origin_service_id: i64,
    pub origin_thread_id: i64,
    pub connection_id: i64,
    pub created_at: i64,
}
