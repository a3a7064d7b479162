//! Core service plugin trait. Each messaging platform implements this.

use {
    async_trait::async_trait,
    tokio::sync::mpsc,
    tokio_util::sync::CancellationToken,
};

use chatplug_common::types::{InboundMessage, OutboundMessage};

use crate::Result;

/// Capacity of each adapter's outbound queue. When the queue is full the
/// adapter's producer awaits; inbound platform messages are never dropped.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 64;

/// Everything an adapter needs to run one configured instance: its identity,
/// resolved configuration, the outbound queue into the exchange, and the
/// cancellation token the manager fires on forced shutdown.
#[derive(Clone)]
pub struct ServiceContext {
    pub service_id: i64,
    pub instance_name: String,
    /// Fully-resolved instance of the adapter's config schema.
    pub config: serde_json::Value,
    outbound: mpsc::Sender<InboundMessage>,
    pub cancel: CancellationToken,
}

impl ServiceContext {
    pub fn new(
        service_id: i64,
        instance_name: impl Into<String>,
        config: serde_json::Value,
        outbound: mpsc::Sender<InboundMessage>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            service_id,
            instance_name: instance_name.into(),
            config,
            outbound,
            cancel,
        }
    }

    /// Emit one inbound platform message toward the exchange. Awaits while
    /// the queue is full; fails only once the exchange side is gone.
    pub async fn emit(&self, message: InboundMessage) -> Result<()> {
        self.outbound
            .send(message)
            .await
            .map_err(|_| crate::Error::unavailable("outbound queue closed"))
    }

    /// Clone of the raw queue sender, for adapters that hand it to a
    /// background task.
    pub fn outbound(&self) -> mpsc::Sender<InboundMessage> {
        self.outbound.clone()
    }
}

/// Service capability contract. One implementation per supported platform.
///
/// Adapters hold their runtime state behind interior mutability; the manager
/// shares them as `Arc<dyn ServicePlugin>` across initialize/terminate/send.
#[async_trait]
pub trait ServicePlugin: Send + Sync {
    /// Adapter module identifier (e.g. "console", "irc").
    fn module_name(&self) -> &str;

    /// Human-readable platform name.
    fn display_name(&self) -> &str;

    /// Establish the external connection/session from the instance config.
    ///
    /// The adapter keeps `ctx` for the lifetime of the session and feeds
    /// platform messages into `ctx.emit` until terminated. Any interactive
    /// login exchange is local to the adapter and must not block other
    /// adapters' initialization. Errors map to STARTING → CRASHED in the
    /// manager; they never crash the host process.
    async fn initialize(&self, ctx: ServiceContext) -> Result<()>;

    /// Request graceful shutdown of the external session.
    ///
    /// Must be an idempotent no-op on an already terminated or crashed
    /// instance.
    async fn terminate(&self) -> Result<()>;

    /// Deliver one routed message to the platform thread with the given
    /// external ID. Fails with [`crate::Error::Delivery`]; does not change
    /// the adapter's status.
    async fn send(&self, message: &OutboundMessage, target_external_id: &str) -> Result<()>;
}
