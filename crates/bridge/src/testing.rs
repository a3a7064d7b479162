//! Scripted mock adapter and store helpers shared by the bridge tests.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;

use {
    chatplug_common::types::{InboundMessage, OutboundMessage},
    chatplug_services::{
        AdapterDescriptor, Error, Result, ServiceContext, ServicePlugin,
    },
    chatplug_store::SqliteBridgeStore,
};

pub async fn test_store() -> SqliteBridgeStore {
    let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
    SqliteBridgeStore::init(&pool).await.unwrap();
    SqliteBridgeStore::new(pool)
}

#[derive(Default)]
struct MockState {
    fail_initialize: AtomicBool,
    fail_initialize_once: AtomicBool,
    fail_terminate: AtomicBool,
    fail_send_to: Mutex<Option<String>>,
    slow_send: Mutex<Option<(String, Duration)>>,
    sent: Mutex<Vec<(OutboundMessage, String)>>,
    terminations: AtomicUsize,
    context: Mutex<Option<ServiceContext>>,
}

/// A scripted adapter: records every `send`, can be told to fail
/// initialization, termination, or delivery to one target, and lets the
/// test emit inbound messages through the context captured at initialize.
#[derive(Clone, Default)]
pub struct MockAdapter {
    state: Arc<MockState>,
}

impl MockAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_initialize(self) -> Self {
        self.state.fail_initialize.store(true, Ordering::SeqCst);
        self
    }

    pub fn fail_initialize_once(self) -> Self {
        self.state.fail_initialize_once.store(true, Ordering::SeqCst);
        self
    }

    pub fn fail_terminate(self) -> Self {
        self.state.fail_terminate.store(true, Ordering::SeqCst);
        self
    }

    pub fn fail_send_to(self, target: &str) -> Self {
        *self.state.fail_send_to.lock().unwrap() = Some(target.to_string());
        self
    }

    /// Delay `send` of the message with the given content, simulating a
    /// platform that is slow for one delivery.
    pub fn slow_send_for(self, content: &str, delay: Duration) -> Self {
        *self.state.slow_send.lock().unwrap() = Some((content.to_string(), delay));
        self
    }

    pub fn descriptor(&self, module: &str) -> AdapterDescriptor {
        AdapterDescriptor {
            module_name: module.into(),
            display_name: module.to_uppercase(),
            config_schema: serde_json::json!({"type": "object"}),
        }
    }

    /// Factory closure for the adapter registry; every built plugin shares
    /// this adapter's scripted state.
    pub fn factory(
        &self,
        module: &str,
    ) -> impl Fn() -> Box<dyn ServicePlugin> + Send + Sync + 'static {
        let state = Arc::clone(&self.state);
        let module = module.to_string();
        move || {
            Box::new(MockPlugin {
                module: module.clone(),
                state: Arc::clone(&state),
            })
        }
    }

    /// Sends recorded so far, as (message, target external ID) pairs.
    pub fn sent(&self) -> Vec<(OutboundMessage, String)> {
        self.state.sent.lock().unwrap().clone()
    }

    pub fn terminations(&self) -> usize {
        self.state.terminations.load(Ordering::SeqCst)
    }

    /// Emit an inbound platform message through the context captured at
    /// initialize, as the real adapter's read loop would.
    pub async fn emit(&self, message: InboundMessage) {
        let ctx = self
            .state
            .context
            .lock()
            .unwrap()
            .clone()
            .expect("adapter not initialized");
        ctx.emit(message).await.expect("outbound queue closed");
    }
}

struct MockPlugin {
    module: String,
    state: Arc<MockState>,
}

#[async_trait]
impl ServicePlugin for MockPlugin {
    fn module_name(&self) -> &str {
        &self.module
    }

    fn display_name(&self) -> &str {
        &self.module
    }

    async fn initialize(&self, ctx: ServiceContext) -> Result<()> {
        if self.state.fail_initialize_once.swap(false, Ordering::SeqCst)
            || self.state.fail_initialize.load(Ordering::SeqCst)
        {
            return Err(Error::authentication("bad credentials"));
        }
        *self.state.context.lock().unwrap() = Some(ctx);
        Ok(())
    }

    async fn terminate(&self) -> Result<()> {
        self.state.terminations.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_terminate.load(Ordering::SeqCst) {
            return Err(Error::unavailable("refusing to log out"));
        }
        Ok(())
    }

    async fn send(&self, message: &OutboundMessage, target_external_id: &str) -> Result<()> {
        if self.state.fail_send_to.lock().unwrap().as_deref() == Some(target_external_id) {
            return Err(Error::delivery(target_external_id, "platform rejected"));
        }
        let delay = match self.state.slow_send.lock().unwrap().as_ref() {
            Some((content, delay)) if *content == message.content => Some(*delay),
            _ => None,
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.state
            .sent
            .lock()
            .unwrap()
            .push((message.clone(), target_external_id.to_string()));
        Ok(())
    }
}
