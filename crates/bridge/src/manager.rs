//! Service manager: adapter instantiation, lifecycle, and status registry.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, RwLock},
    time::Duration,
};

use {
    tokio::{
        sync::{broadcast, mpsc},
        task::JoinSet,
    },
    tokio_util::sync::CancellationToken,
    tracing::{error, info, warn},
};

use {
    chatplug_common::types::InboundMessage,
    chatplug_services::{
        AdapterDescriptor, AdapterRegistry, OUTBOUND_QUEUE_CAPACITY, ServiceContext,
        ServicePlugin, ServiceStatus, StatusUpdate,
    },
    chatplug_store::{BridgeStore, InstanceStore, ServiceInstanceRecord},
};

use crate::{Error, Result};

/// How long `stop_all` lets in-flight adapter work drain before forcing
/// resource release.
const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Capacity of the status-update broadcast channel; slow observers miss old
/// transitions rather than blocking the manager.
const STATUS_EVENT_CAPACITY: usize = 128;

struct ManagedService {
    record: ServiceInstanceRecord,
    plugin: Arc<dyn ServicePlugin>,
    status: ServiceStatus,
    /// Kept for re-initialize; holds the outbound sender so the exchange
    /// stream stays open for the lifetime of the registration.
    context: ServiceContext,
    cancel: CancellationToken,
}

/// Read-only view of one registered instance.
#[derive(Debug, Clone)]
pub struct InstanceSnapshot {
    pub id: i64,
    pub module_name: String,
    pub instance_name: String,
    pub status: ServiceStatus,
}

/// Owns every live adapter: loads enabled instances from the store,
/// initializes and terminates them, and tracks their status machine. The
/// registry is mutated only here; the exchange reads it for routing lookups.
pub struct ServiceManager {
    store: Arc<dyn BridgeStore>,
    registry: AdapterRegistry,
    services: RwLock<HashMap<i64, ManagedService>>,
    /// Receivers created at load time, handed to the exchange merge point.
    pending_sources: Mutex<Vec<(i64, mpsc::Receiver<InboundMessage>)>>,
    status_tx: broadcast::Sender<StatusUpdate>,
    drain_timeout: Duration,
}

impl ServiceManager {
    pub fn new(store: Arc<dyn BridgeStore>, registry: AdapterRegistry) -> Self {
        let (status_tx, _) = broadcast::channel(STATUS_EVENT_CAPACITY);
        Self {
            store,
            registry,
            services: RwLock::new(HashMap::new()),
            pending_sources: Mutex::new(Vec::new()),
            status_tx,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// Descriptors of every registered adapter implementation. Pure
    /// discovery, no I/O.
    pub fn available_adapters(&self) -> Vec<AdapterDescriptor> {
        self.registry.descriptors().into_iter().cloned().collect()
    }

    /// Subscribe to status transition events.
    pub fn subscribe_status(&self) -> broadcast::Receiver<StatusUpdate> {
        self.status_tx.subscribe()
    }

    /// Populate the registry from persisted enabled instances.
    ///
    /// An instance whose adapter module is missing is logged and skipped;
    /// the remaining instances load normally. Returns the number of
    /// instances registered.
    pub async fn load_instances(&self) -> Result<usize> {
        let instances = self.store.find_enabled_instances().await?;
        let mut loaded = 0;

        for record in instances {
            let Some(plugin) = self.registry.build(&record.module_name) else {
                warn!(
                    module = %record.module_name,
                    instance = %record.instance_name,
                    "skipping instance: adapter module not registered"
                );
                continue;
            };

            let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
            let cancel = CancellationToken::new();
            let context = ServiceContext::new(
                record.id,
                record.instance_name.clone(),
                record.config.clone(),
                tx,
                cancel.clone(),
            );

            info!(
                module = %record.module_name,
                instance = %record.instance_name,
                "service instance enabled, registering"
            );

            if let Ok(mut sources) = self.pending_sources.lock() {
                sources.push((record.id, rx));
            }
            if let Ok(mut services) = self.services.write() {
                services.insert(record.id, ManagedService {
                    plugin: Arc::from(plugin),
                    status: ServiceStatus::Starting,
                    context,
                    cancel,
                    record,
                });
                loaded += 1;
            }
        }

        Ok(loaded)
    }

    /// Drain the outbound receivers accumulated by `load_instances`, for the
    /// exchange merge point. Each receiver is handed out exactly once.
    pub fn take_sources(&self) -> Vec<(i64, mpsc::Receiver<InboundMessage>)> {
        match self.pending_sources.lock() {
            Ok(mut sources) => std::mem::take(&mut *sources),
            Err(_) => Vec::new(),
        }
    }

    /// Live adapter for a registered instance.
    pub fn plugin(&self, id: i64) -> Option<Arc<dyn ServicePlugin>> {
        self.services
            .read()
            .ok()
            .and_then(|s| s.get(&id).map(|m| Arc::clone(&m.plugin)))
    }

    pub fn status(&self, id: i64) -> Option<ServiceStatus> {
        self.services.read().ok().and_then(|s| s.get(&id).map(|m| m.status))
    }

    pub fn instance_name(&self, id: i64) -> Option<String> {
        self.services
            .read()
            .ok()
            .and_then(|s| s.get(&id).map(|m| m.record.instance_name.clone()))
    }

    /// Snapshot of all currently registered instances.
    pub fn instances(&self) -> Vec<InstanceSnapshot> {
        let Ok(services) = self.services.read() else {
            return Vec::new();
        };
        let mut list: Vec<_> = services
            .values()
            .map(|m| InstanceSnapshot {
                id: m.record.id,
                module_name: m.record.module_name.clone(),
                instance_name: m.record.instance_name.clone(),
                status: m.status,
            })
            .collect();
        list.sort_by_key(|s| s.id);
        list
    }

    fn set_status(&self, id: i64, next: ServiceStatus) {
        if let Ok(mut services) = self.services.write()
            && let Some(managed) = services.get_mut(&id)
        {
            if !managed.status.can_transition_to(next) {
                error!(
                    instance = %managed.record.instance_name,
                    from = %managed.status,
                    to = %next,
                    "illegal status transition suppressed"
                );
                return;
            }
            managed.status = next;
            info!(instance = %managed.record.instance_name, status = %next, "status change");
            let _ = self.status_tx.send(StatusUpdate {
                service_id: id,
                status: next,
            });
        }
    }

    /// Initialize every registered adapter concurrently.
    ///
    /// Each initialization is independent: one adapter's failure confines to
    /// that instance (status CRASHED) and neither delays nor fails the
    /// others. Returns when all have settled.
    pub async fn start_all(&self) {
        let pending: Vec<(i64, Arc<dyn ServicePlugin>, ServiceContext)> = {
            let Ok(services) = self.services.read() else {
                return;
            };
            services
                .values()
                .filter(|m| m.status == ServiceStatus::Starting)
                .map(|m| (m.record.id, Arc::clone(&m.plugin), m.context.clone()))
                .collect()
        };

        let mut set = JoinSet::new();
        for (id, plugin, context) in pending {
            set.spawn(async move { (id, plugin.initialize(context).await) });
        }

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((id, Ok(()))) => self.set_status(id, ServiceStatus::Running),
                Ok((id, Err(e))) => {
                    warn!(service_id = id, "initialization failed: {e}");
                    self.set_status(id, ServiceStatus::Crashed);
                },
                Err(e) => error!("initialization task panicked: {e}"),
            }
        }
    }

    /// Explicit operator-triggered re-initialize of a crashed or shut down
    /// instance. The only way out of a terminal state.
    pub async fn restart(&self, id: i64) -> Result<()> {
        let (plugin, context) = {
            let mut services = self
                .services
                .write()
                .map_err(|_| Error::UnknownInstance { id })?;
            let managed = services.get_mut(&id).ok_or(Error::UnknownInstance { id })?;
            let Some(starting) = managed.status.reinitialize() else {
                return Err(Error::NotRestartable {
                    id,
                    status: managed.status.to_string(),
                });
            };
            managed.status = starting;
            (Arc::clone(&managed.plugin), managed.context.clone())
        };

        let _ = self.status_tx.send(StatusUpdate {
            service_id: id,
            status: ServiceStatus::Starting,
        });

        match plugin.initialize(context).await {
            Ok(()) => {
                self.set_status(id, ServiceStatus::Running);
                Ok(())
            },
            Err(e) => {
                warn!(service_id = id, "re-initialization failed: {e}");
                self.set_status(id, ServiceStatus::Crashed);
                Err(e.into())
            },
        }
    }

    /// Terminate every registered adapter concurrently, wait for all to
    /// settle within the drain timeout, then clear the registry.
    ///
    /// Idempotent: with an empty registry this is a no-op. The process may
    /// only exit cleanly after this returns.
    pub async fn stop_all(&self) -> Result<()> {
        let pending: Vec<(i64, Arc<dyn ServicePlugin>, ServiceStatus, CancellationToken)> = {
            let Ok(services) = self.services.read() else {
                return Ok(());
            };
            services
                .values()
                .map(|m| {
                    (
                        m.record.id,
                        Arc::clone(&m.plugin),
                        m.status,
                        m.cancel.clone(),
                    )
                })
                .collect()
        };

        let mut failed = 0;
        let mut set = JoinSet::new();
        for (id, plugin, status, cancel) in pending {
            if status == ServiceStatus::Running {
                self.set_status(id, ServiceStatus::Terminating);
            }
            let timeout = self.drain_timeout;
            set.spawn(async move {
                let result = tokio::time::timeout(timeout, plugin.terminate()).await;
                // Force-release regardless of outcome.
                cancel.cancel();
                (id, status, result)
            });
        }

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((id, was, result)) => {
                    match result {
                        Ok(Ok(())) => {},
                        Ok(Err(e)) => {
                            warn!(service_id = id, "terminate failed: {e}");
                            failed += 1;
                        },
                        Err(_) => {
                            warn!(service_id = id, "terminate timed out, forcing release");
                            failed += 1;
                        },
                    }
                    if was == ServiceStatus::Running {
                        self.set_status(id, ServiceStatus::Shutdown);
                    }
                },
                Err(e) => {
                    error!("terminate task panicked: {e}");
                    failed += 1;
                },
            }
        }

        if let Ok(mut services) = self.services.write() {
            services.clear();
        }

        if failed > 0 {
            Err(Error::ShutdownIncomplete { failed })
        } else {
            Ok(())
        }
    }
}
