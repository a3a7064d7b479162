//! Operator command handlers.
//!
//! Thin command/parameter plumbing: every handler validates its input,
//! calls into the store or the bridge, and reports the outcome. No routing
//! logic lives here.

use std::sync::Arc;

use {
    anyhow::{Context, bail},
    clap::Subcommand,
    tracing::{info, warn},
};

use {
    chatplug_bridge::{ExchangeManager, ServiceManager},
    chatplug_console::ConsolePlugin,
    chatplug_services::AdapterRegistry,
    chatplug_store::{
        InstanceStore, MessageHistory, NewServiceInstance, NewThread, ServiceInstanceRecord,
        SqliteBridgeStore, TopologyStore,
    },
};

#[derive(Subcommand)]
pub enum InstanceAction {
    /// List configured service instances.
    List,
    /// Create a new service instance for an adapter module.
    Add {
        /// Adapter module name (see `chatplug adapters`).
        module: String,
        /// Instance name, unique per module.
        name: String,
        /// Adapter configuration as a JSON object.
        #[arg(long, default_value = "{}")]
        config: String,
        /// Create the instance disabled.
        #[arg(long)]
        disabled: bool,
        /// Mark the instance as the primary for its module.
        #[arg(long)]
        primary: bool,
    },
    Remove {
        module: String,
        name: String,
    },
    Enable {
        module: String,
        name: String,
    },
    Disable {
        module: String,
        name: String,
    },
}

#[derive(Subcommand)]
pub enum ConnectionAction {
    /// List connections and their member threads.
    List,
    /// Create a new connection with the given name.
    Add { name: String },
    Remove { name: String },
}

#[derive(Subcommand)]
pub enum ThreadAction {
    /// Map a platform thread into a connection.
    Add {
        /// Connection name.
        #[arg(short, long)]
        connection: String,
        /// Adapter module name of the owning instance.
        #[arg(short, long)]
        service: String,
        /// Instance name of the owning instance.
        #[arg(short, long)]
        instance: String,
        /// External thread ID in the platform's namespace.
        #[arg(short, long)]
        thread: String,
        /// Display name; defaults to the external ID.
        #[arg(long)]
        name: Option<String>,
    },
    /// Remove a thread from a connection.
    Remove {
        #[arg(short, long)]
        connection: String,
        #[arg(short, long)]
        service: String,
        #[arg(short, long)]
        instance: String,
        #[arg(short, long)]
        thread: String,
    },
}

/// Adapter implementations compiled into this binary.
pub fn builtin_adapters() -> AdapterRegistry {
    let mut registry = AdapterRegistry::new();
    registry.register(ConsolePlugin::descriptor(), || Box::new(ConsolePlugin::new()));
    registry
}

pub fn list_adapters() {
    for descriptor in builtin_adapters().descriptors() {
        println!("  {} ({})", descriptor.module_name, descriptor.display_name);
    }
}

/// Run the bridge until interrupted, then shut down every adapter.
pub async fn start_bridge(store: Arc<SqliteBridgeStore>) -> anyhow::Result<()> {
    let registry = builtin_adapters();
    let manager = Arc::new(ServiceManager::new(store.clone(), registry));

    let loaded = manager.load_instances().await?;
    if loaded == 0 {
        warn!("no enabled service instances; add one with `chatplug instances add`");
    }

    let mut status_rx = manager.subscribe_status();
    tokio::spawn(async move {
        while let Ok(update) = status_rx.recv().await {
            info!(
                service_id = update.service_id,
                status = %update.status,
                "service status"
            );
        }
    });

    manager.start_all().await;

    let exchange = Arc::new(ExchangeManager::new(store, Arc::clone(&manager)));
    let cancel = exchange.cancel_token();
    let mut exchange_loop = tokio::spawn({
        let exchange = Arc::clone(&exchange);
        async move { exchange.run().await }
    });

    let exchange_result = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("interrupt received, logging out");
            cancel.cancel();
            (&mut exchange_loop).await
        },
        // All adapter streams ended on their own (every adapter stopped).
        joined = &mut exchange_loop => joined,
    };

    manager.stop_all().await?;
    exchange_outcome(exchange_result)?;
    info!("logged out");
    Ok(())
}

/// Map the exchange task's join result to the operator-facing outcome. A
/// panicked exchange task must surface as a non-zero exit, not vanish.
fn exchange_outcome(
    joined: Result<chatplug_bridge::Result<()>, tokio::task::JoinError>,
) -> anyhow::Result<()> {
    match joined {
        Ok(result) => Ok(result?),
        Err(e) => bail!("exchange task panicked: {e}"),
    }
}

async fn resolve_instance(
    store: &SqliteBridgeStore,
    module: &str,
    name: &str,
) -> anyhow::Result<ServiceInstanceRecord> {
    store
        .find_instance_by_name(module, name)
        .await?
        .with_context(|| format!("no instance '{name}' for module '{module}'"))
}

pub async fn handle_instances(
    store: Arc<SqliteBridgeStore>,
    action: InstanceAction,
) -> anyhow::Result<()> {
    match action {
        InstanceAction::List => {
            let instances = store.list_instances().await?;
            if instances.is_empty() {
                println!("No service instances configured.");
            }
            for inst in instances {
                let state = if inst.enabled { "enabled" } else { "disabled" };
                println!(
                    "  #{} {}/{} [{}]{}",
                    inst.id,
                    inst.module_name,
                    inst.instance_name,
                    state,
                    if inst.primary_mode { " primary" } else { "" },
                );
            }
        },
        InstanceAction::Add {
            module,
            name,
            config,
            disabled,
            primary,
        } => {
            if !builtin_adapters().contains(&module) {
                bail!("unknown adapter module '{module}'; see `chatplug adapters`");
            }
            let config: serde_json::Value =
                serde_json::from_str(&config).context("--config must be a JSON object")?;
            let record = store
                .create_instance(NewServiceInstance {
                    module_name: module,
                    instance_name: name,
                    enabled: !disabled,
                    primary_mode: primary,
                    config,
                })
                .await?;
            println!(
                "Added instance {}/{} (#{})",
                record.module_name, record.instance_name, record.id
            );
        },
        InstanceAction::Remove { module, name } => {
            let record = resolve_instance(&store, &module, &name).await?;
            store.remove_instance(record.id).await?;
            println!("Removed instance {module}/{name}");
        },
        InstanceAction::Enable { module, name } => {
            let record = resolve_instance(&store, &module, &name).await?;
            store.set_instance_enabled(record.id, true).await?;
            println!("Enabled instance {module}/{name}");
        },
        InstanceAction::Disable { module, name } => {
            let record = resolve_instance(&store, &module, &name).await?;
            store.set_instance_enabled(record.id, false).await?;
            println!("Disabled instance {module}/{name}");
        },
    }
    Ok(())
}

pub async fn handle_connections(
    store: Arc<SqliteBridgeStore>,
    action: ConnectionAction,
) -> anyhow::Result<()> {
    match action {
        ConnectionAction::List => {
            let connections = store.list_connections().await?;
            if connections.is_empty() {
                println!("No connections configured.");
            }
            for conn in connections {
                println!("  {} (#{})", conn.name, conn.id);
                for thread in store.threads_of_connection(conn.id).await? {
                    println!(
                        "    thread {} (service #{}, external id {})",
                        thread.name, thread.service_id, thread.external_id
                    );
                }
            }
        },
        ConnectionAction::Add { name } => {
            let record = store.create_connection(&name).await?;
            println!("Added connection {} (#{})", record.name, record.id);
        },
        ConnectionAction::Remove { name } => {
            let conn = store
                .find_connection_by_name(&name)
                .await?
                .with_context(|| format!("no connection named '{name}'"))?;
            store.remove_connection(conn.id).await?;
            println!("Removed connection {name}");
        },
    }
    Ok(())
}

pub async fn handle_threads(
    store: Arc<SqliteBridgeStore>,
    action: ThreadAction,
) -> anyhow::Result<()> {
    match action {
        ThreadAction::Add {
            connection,
            service,
            instance,
            thread,
            name,
        } => {
            let conn = store
                .find_connection_by_name(&connection)
                .await?
                .with_context(|| format!("no connection named '{connection}'"))?;
            let owner = resolve_instance(&store, &service, &instance).await?;
            let record = store
                .create_thread(NewThread {
                    name: name.unwrap_or_else(|| thread.clone()),
                    external_id: thread,
                    service_id: owner.id,
                    connection_id: conn.id,
                })
                .await?;
            println!(
                "Added thread {} to connection {} (#{})",
                record.external_id, connection, record.id
            );
        },
        ThreadAction::Remove {
            connection,
            service,
            instance,
            thread,
        } => {
            let conn = store
                .find_connection_by_name(&connection)
                .await?
                .with_context(|| format!("no connection named '{connection}'"))?;
            let owner = resolve_instance(&store, &service, &instance).await?;
            let record = store
                .find_thread(owner.id, &thread)
                .await?
                .filter(|t| t.connection_id == conn.id)
                .context("cannot find thread with specified parameters")?;
            store.remove_thread(record.id).await?;
            println!("Removed thread {thread} from connection {connection}");
        },
    }
    Ok(())
}

pub async fn show_history(
    store: Arc<SqliteBridgeStore>,
    connection: &str,
    limit: u32,
) -> anyhow::Result<()> {
    let conn = store
        .find_connection_by_name(connection)
        .await?
        .with_context(|| format!("no connection named '{connection}'"))?;
    let messages = store.recent_messages(conn.id, limit).await?;
    if messages.is_empty() {
        println!("No messages routed within '{connection}' yet.");
    }
    for msg in messages.iter().rev() {
        println!("  [{}] {}: {}", msg.created_at, msg.author_username, msg.content);
        for att in &msg.attachments {
            println!("      ({}) {} <{}>", att.kind.as_str(), att.name, att.url);
        }
    }
    Ok(())
}
