//! Exchange manager: the routing core.
//!
//! One inbound message from adapter `S` / thread `T` becomes N-1 deliveries
//! to the other threads of `T`'s connection. Routing decisions are serialized
//! over a single merged stream; dispatch is concurrent across targets, FIFO
//! within each target, and independently failing. A thread never receives its
//! own outbound message.

use std::{
    collections::{HashMap, hash_map::Entry},
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use {
    tokio::{sync::mpsc, task::JoinSet},
    tokio_stream::{StreamExt, StreamMap, wrappers::ReceiverStream},
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use {
    chatplug_common::types::{InboundMessage, OutboundMessage},
    chatplug_store::{BridgeStore, MessageHistory, NewMessage, TopologyStore},
};

use crate::{Result, manager::ServiceManager};

/// Capacity of each target adapter's dispatch queue. A target that falls
/// this far behind applies backpressure to intake; messages are never
/// reordered or dropped to catch up.
const DISPATCH_QUEUE_CAPACITY: usize = 64;

/// One queued delivery for a target adapter's drain task.
type Dispatch = (OutboundMessage, String);

fn unix_now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Consumes the merged outbound stream of every running adapter and fans
/// each message out to the peer threads of its connection.
pub struct ExchangeManager {
    store: Arc<dyn BridgeStore>,
    manager: Arc<ServiceManager>,
    cancel: CancellationToken,
}

impl ExchangeManager {
    pub fn new(store: Arc<dyn BridgeStore>, manager: Arc<ServiceManager>) -> Self {
        Self {
            store,
            manager,
            cancel: CancellationToken::new(),
        }
    }

    /// Token that stops the exchange loop; fired by the shutdown path.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the exchange loop until cancelled or every source stream ends.
    ///
    /// Taking one message from the merge point is the only suspension point
    /// of the routing path; the routing decision for that message runs to
    /// completion before the next is taken. Deliveries go through one queue
    /// per target adapter, drained by a dedicated task in `inflight`, so
    /// messages reach each target in the order they were routed. No routing
    /// or delivery error terminates this loop.
    pub async fn run(&self) -> Result<()> {
        let sources = self.manager.take_sources();
        let mut streams: StreamMap<i64, ReceiverStream<InboundMessage>> = StreamMap::new();
        for (service_id, rx) in sources {
            streams.insert(service_id, ReceiverStream::new(rx));
        }

        info!(sources = streams.len(), "exchange loop started");

        let mut inflight: JoinSet<()> = JoinSet::new();
        let mut dispatchers: HashMap<i64, mpsc::Sender<Dispatch>> = HashMap::new();
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                Some(joined) = inflight.join_next(), if !inflight.is_empty() => {
                    if let Err(e) = joined {
                        warn!("dispatch task panicked: {e}");
                    }
                },
                next = streams.next() => match next {
                    Some((service_id, message)) => {
                        self.route(service_id, message, &mut dispatchers, &mut inflight).await;
                    },
                    // Every adapter stream has ended.
                    None => break,
                },
            }
        }

        // Close the per-target queues so the drain tasks flush queued
        // deliveries and exit.
        drop(dispatchers);
        while let Some(joined) = inflight.join_next().await {
            if let Err(e) = joined {
                warn!("dispatch task panicked: {e}");
            }
        }

        info!("exchange loop stopped");
        Ok(())
    }

    /// Route one message: resolve topology, persist, enqueue per target.
    async fn route(
        &self,
        service_id: i64,
        message: InboundMessage,
        dispatchers: &mut HashMap<i64, mpsc::Sender<Dispatch>>,
        inflight: &mut JoinSet<()>,
    ) {
        // 1. Resolve the origin thread and its connection.
        let origin = match self
            .store
            .find_thread(service_id, &message.origin_external_id)
            .await
        {
            Ok(Some(thread)) => thread,
            Ok(None) => {
                warn!(
                    service_id,
                    thread = %message.origin_external_id,
                    "dropping message from thread with no connection"
                );
                return;
            },
            Err(e) => {
                warn!(service_id, "topology lookup failed, dropping message: {e}");
                return;
            },
        };

        // 2. Fan-out set: every other thread of the connection.
        let members = match self.store.threads_of_connection(origin.connection_id).await {
            Ok(members) => members,
            Err(e) => {
                warn!(
                    connection_id = origin.connection_id,
                    "fan-out lookup failed, dropping message: {e}"
                );
                return;
            },
        };
        let targets: Vec<_> = members.into_iter().filter(|t| t.id != origin.id).collect();

        // 3. Persist once; a persistence failure must never lose the
        // delivery attempt, so it only costs a durability warning.
        if let Err(e) = self
            .store
            .append_message(NewMessage {
                content: message.content.clone(),
                attachments: message.attachments.clone(),
                author_username: message.author.username.clone(),
                author_external_id: message.author.external_id.clone(),
                author_avatar_url: message.author.avatar_url.clone(),
                origin_service_id: service_id,
                origin_thread_id: origin.id,
                connection_id: origin.connection_id,
                created_at: unix_now_ms(),
            })
            .await
        {
            warn!(
                connection_id = origin.connection_id,
                "message not persisted, delivering anyway: {e}"
            );
        }

        if targets.is_empty() {
            debug!(
                connection_id = origin.connection_id,
                "connection has no other threads, nothing to deliver"
            );
            return;
        }

        // 4. Enqueue one delivery per target. Each target adapter has its
        // own dispatch queue drained by a single task, so deliveries to a
        // target stay in routing order while targets fail and lag
        // independently of each other.
        let outbound = OutboundMessage {
            content: message.content,
            attachments: message.attachments,
            author: message.author,
            origin_instance: self
                .manager
                .instance_name(service_id)
                .unwrap_or_else(|| format!("service-{service_id}")),
            origin_name: message.origin_name.or(Some(origin.name)),
        };

        for target in targets {
            let tx = match dispatchers.entry(target.service_id) {
                Entry::Occupied(entry) => entry.get().clone(),
                Entry::Vacant(entry) => {
                    let Some(plugin) = self.manager.plugin(target.service_id) else {
                        warn!(
                            service_id = target.service_id,
                            thread = %target.external_id,
                            "target service not registered, skipping delivery"
                        );
                        continue;
                    };
                    let (tx, mut rx) = mpsc::channel::<Dispatch>(DISPATCH_QUEUE_CAPACITY);
                    let target_service_id = target.service_id;
                    inflight.spawn(async move {
                        while let Some((payload, external_id)) = rx.recv().await {
                            if let Err(e) = plugin.send(&payload, &external_id).await {
                                warn!(
                                    service_id = target_service_id,
                                    thread = %external_id,
                                    "delivery failed: {e}"
                                );
                            }
                        }
                    });
                    entry.insert(tx).clone()
                },
            };
            if tx
                .send((outbound.clone(), target.external_id))
                .await
                .is_err()
            {
                warn!(
                    service_id = target.service_id,
                    "dispatch queue closed, delivery lost"
                );
            }
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::time::Duration;

    use {
        super::*,
        crate::testing::{MockAdapter, test_store},
        chatplug_common::types::Author,
        chatplug_services::AdapterRegistry,
        chatplug_store::{InstanceStore, NewServiceInstance, NewThread, SqliteBridgeStore},
    };

    struct Harness {
        store: Arc<SqliteBridgeStore>,
        manager: Arc<ServiceManager>,
        cancel: CancellationToken,
        loop_handle: tokio::task::JoinHandle<()>,
    }

    impl Harness {
        /// Register the given adapters, create one enabled instance per
        /// adapter, start everything, and spawn the exchange loop.
        async fn start(adapters: &[(&str, MockAdapter)]) -> (Self, Vec<i64>) {
            let store = Arc::new(test_store().await);
            let mut registry = AdapterRegistry::new();
            let mut ids = Vec::new();

            for (module, adapter) in adapters {
                registry.register(adapter.descriptor(module), adapter.factory(module));
                let record = store
                    .create_instance(NewServiceInstance {
                        module_name: (*module).into(),
                        instance_name: format!("{module}-main"),
                        enabled: true,
                        primary_mode: false,
                        config: serde_json::json!({}),
                    })
                    .await
                    .unwrap();
                ids.push(record.id);
            }

            let manager = Arc::new(ServiceManager::new(store.clone(), registry));
            manager.load_instances().await.unwrap();
            manager.start_all().await;

            let exchange = Arc::new(ExchangeManager::new(store.clone(), manager.clone()));
            let cancel = exchange.cancel_token();
            let loop_handle = tokio::spawn({
                let exchange = Arc::clone(&exchange);
                async move {
                    exchange.run().await.unwrap();
                }
            });

            (
                Self {
                    store,
                    manager,
                    cancel,
                    loop_handle,
                },
                ids,
            )
        }

        async fn thread(&self, service_id: i64, connection_id: i64, external_id: &str) {
            self.store
                .create_thread(NewThread {
                    external_id: external_id.into(),
                    name: external_id.into(),
                    service_id,
                    connection_id,
                })
                .await
                .unwrap();
        }

        async fn stop(self) {
            self.cancel.cancel();
            self.loop_handle.await.unwrap();
            self.manager.stop_all().await.unwrap();
        }
    }

    /// Poll until `check` passes or a 2 s deadline expires.
    async fn wait_for(mut check: impl FnMut() -> bool) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while !check() {
            assert!(
                tokio::time::Instant::now() < deadline,
                "condition not reached in time"
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    fn text(origin: &str, content: &str) -> InboundMessage {
        InboundMessage::text(origin, Author::new("u1", "ext-u1"), content)
    }

    #[tokio::test]
    async fn routes_to_the_other_thread_only() {
        let alpha = MockAdapter::new();
        let beta = MockAdapter::new();
        let (h, ids) = Harness::start(&[("alpha", alpha.clone()), ("beta", beta.clone())]).await;

        let conn = h.store.create_connection("general").await.unwrap();
        h.thread(ids[0], conn.id, "a1").await;
        h.thread(ids[1], conn.id, "b1").await;

        alpha.emit(text("a1", "hi")).await;
        wait_for(|| !beta.sent().is_empty()).await;

        let sent = beta.sent();
        assert_eq!(sent.len(), 1);
        let (message, target) = &sent[0];
        assert_eq!(target, "b1");
        assert_eq!(message.content, "hi");
        assert_eq!(message.author.username, "u1");
        assert_eq!(message.origin_instance, "alpha-main");
        // Never an echo back to the origin.
        assert!(alpha.sent().is_empty());

        let history = h.store.recent_messages(conn.id, 10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content, "hi");
        assert_eq!(history[0].origin_service_id, ids[0]);

        h.stop().await;
    }

    #[tokio::test]
    async fn fan_out_reaches_every_peer_thread() {
        let alpha = MockAdapter::new();
        let beta = MockAdapter::new();
        let gamma = MockAdapter::new();
        let (h, ids) = Harness::start(&[
            ("alpha", alpha.clone()),
            ("beta", beta.clone()),
            ("gamma", gamma.clone()),
        ])
        .await;

        let conn = h.store.create_connection("general").await.unwrap();
        h.thread(ids[0], conn.id, "a1").await;
        h.thread(ids[1], conn.id, "b1").await;
        h.thread(ids[2], conn.id, "g1").await;

        alpha.emit(text("a1", "hello all")).await;
        wait_for(|| !beta.sent().is_empty() && !gamma.sent().is_empty()).await;

        // Exactly N-1 sends, one per remaining thread.
        assert_eq!(beta.sent().len(), 1);
        assert_eq!(gamma.sent().len(), 1);
        assert!(alpha.sent().is_empty());

        h.stop().await;
    }

    #[tokio::test]
    async fn single_thread_connection_persists_without_sends() {
        let alpha = MockAdapter::new();
        let (h, ids) = Harness::start(&[("alpha", alpha.clone())]).await;

        let conn = h.store.create_connection("solo").await.unwrap();
        h.thread(ids[0], conn.id, "a1").await;

        alpha.emit(text("a1", "talking to myself")).await;

        // No sends to wait for; poll the history instead.
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while h.store.recent_messages(conn.id, 10).await.unwrap().is_empty() {
            assert!(tokio::time::Instant::now() < deadline, "message never persisted");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert!(alpha.sent().is_empty());
        h.stop().await;
    }

    #[tokio::test]
    async fn unmapped_thread_is_dropped_and_not_persisted() {
        let alpha = MockAdapter::new();
        let beta = MockAdapter::new();
        let (h, ids) = Harness::start(&[("alpha", alpha.clone()), ("beta", beta.clone())]).await;

        let conn = h.store.create_connection("general").await.unwrap();
        h.thread(ids[0], conn.id, "a1").await;
        h.thread(ids[1], conn.id, "b1").await;

        // "a2" is not mapped into any connection.
        alpha.emit(text("a2", "lost")).await;
        // A routed control message proves the dropped one was processed first
        // (FIFO per source).
        alpha.emit(text("a1", "marker")).await;
        wait_for(|| !beta.sent().is_empty()).await;

        assert_eq!(beta.sent().len(), 1);
        assert_eq!(beta.sent()[0].0.content, "marker");
        let history = h.store.recent_messages(conn.id, 10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content, "marker");

        h.stop().await;
    }

    #[tokio::test]
    async fn one_failed_delivery_does_not_suppress_the_rest() {
        let alpha = MockAdapter::new();
        let beta = MockAdapter::new();
        let gamma = MockAdapter::new().fail_send_to("g1");
        let (h, ids) = Harness::start(&[
            ("alpha", alpha.clone()),
            ("beta", beta.clone()),
            ("gamma", gamma.clone()),
        ])
        .await;

        let conn = h.store.create_connection("general").await.unwrap();
        h.thread(ids[0], conn.id, "a1").await;
        h.thread(ids[1], conn.id, "b1").await;
        h.thread(ids[2], conn.id, "g1").await;

        alpha.emit(text("a1", "partial")).await;
        wait_for(|| !beta.sent().is_empty()).await;

        assert_eq!(beta.sent().len(), 1);
        assert!(gamma.sent().is_empty());
        // The message is persisted regardless of the failed target.
        let history = h.store.recent_messages(conn.id, 10).await.unwrap();
        assert_eq!(history.len(), 1);

        h.stop().await;
    }

    #[tokio::test]
    async fn messages_from_one_source_are_routed_in_order() {
        let alpha = MockAdapter::new();
        let beta = MockAdapter::new();
        let (h, ids) = Harness::start(&[("alpha", alpha.clone()), ("beta", beta.clone())]).await;

        let conn = h.store.create_connection("general").await.unwrap();
        h.thread(ids[0], conn.id, "a1").await;
        h.thread(ids[1], conn.id, "b1").await;

        for i in 0..5 {
            alpha.emit(text("a1", &format!("m{i}"))).await;
        }
        wait_for(|| beta.sent().len() == 5).await;

        let delivered: Vec<_> = beta.sent().iter().map(|(m, _)| m.content.clone()).collect();
        assert_eq!(delivered, vec!["m0", "m1", "m2", "m3", "m4"]);

        let history = h.store.recent_messages(conn.id, 10).await.unwrap();
        let contents: Vec<_> = history.iter().rev().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m0", "m1", "m2", "m3", "m4"]);

        h.stop().await;
    }

    #[tokio::test]
    async fn slow_delivery_does_not_reorder_a_targets_queue() {
        let alpha = MockAdapter::new();
        // The first message is slow to deliver; the second must still arrive
        // after it, not overtake it.
        let beta = MockAdapter::new().slow_send_for("m0", Duration::from_millis(200));
        let (h, ids) = Harness::start(&[("alpha", alpha.clone()), ("beta", beta.clone())]).await;

        let conn = h.store.create_connection("general").await.unwrap();
        h.thread(ids[0], conn.id, "a1").await;
        h.thread(ids[1], conn.id, "b1").await;

        alpha.emit(text("a1", "m0")).await;
        alpha.emit(text("a1", "m1")).await;
        wait_for(|| beta.sent().len() == 2).await;

        let delivered: Vec<_> = beta.sent().iter().map(|(m, _)| m.content.clone()).collect();
        assert_eq!(delivered, vec!["m0", "m1"]);

        h.stop().await;
    }

    #[tokio::test]
    async fn attachments_are_forwarded_opaquely() {
        use chatplug_common::types::{Attachment, AttachmentKind};

        let alpha = MockAdapter::new();
        let beta = MockAdapter::new();
        let (h, ids) = Harness::start(&[("alpha", alpha.clone()), ("beta", beta.clone())]).await;

        let conn = h.store.create_connection("general").await.unwrap();
        h.thread(ids[0], conn.id, "a1").await;
        h.thread(ids[1], conn.id, "b1").await;

        let mut message = text("a1", "see attached");
        message.attachments.push(Attachment {
            kind: AttachmentKind::File,
            url: "https://example.com/notes.pdf".into(),
            name: "notes.pdf".into(),
        });
        alpha.emit(message).await;
        wait_for(|| !beta.sent().is_empty()).await;

        let (delivered, _) = &beta.sent()[0];
        assert_eq!(delivered.attachments.len(), 1);
        assert_eq!(delivered.attachments[0].url, "https://example.com/notes.pdf");

        h.stop().await;
    }
}
