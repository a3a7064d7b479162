mod commands;

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use {
    anyhow::Context,
    clap::{Parser, Subcommand},
    sqlx::sqlite::{SqliteConnectOptions, SqlitePool},
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

use chatplug_store::SqliteBridgeStore;

#[derive(Parser)]
#[command(name = "chatplug", about = "ChatPlug, a cross-platform chat bridge")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Custom data directory (overrides the platform default).
    #[arg(long, global = true, env = "CHATPLUG_DATA_DIR")]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the bridge: load enabled instances, initialize adapters, route
    /// messages until interrupted.
    Start,
    /// List installable adapter modules.
    Adapters,
    /// Service instance management.
    Instances {
        #[command(subcommand)]
        action: commands::InstanceAction,
    },
    /// Connection management.
    Connections {
        #[command(subcommand)]
        action: commands::ConnectionAction,
    },
    /// Thread membership management.
    Threads {
        #[command(subcommand)]
        action: commands::ThreadAction,
    },
    /// Show recent messages routed within a connection.
    History {
        /// Connection name.
        #[arg(short, long)]
        connection: String,
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);
    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

fn data_dir(cli: &Cli) -> anyhow::Result<PathBuf> {
    if let Some(ref dir) = cli.data_dir {
        return Ok(dir.clone());
    }
    let dirs = directories::ProjectDirs::from("org", "chatplug", "chatplug")
        .context("cannot determine a data directory; pass --data-dir")?;
    Ok(dirs.data_dir().to_path_buf())
}

async fn open_store(dir: &Path) -> anyhow::Result<Arc<SqliteBridgeStore>> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("creating data directory {}", dir.display()))?;
    let db_path = dir.join("chatplug.db");
    let options = SqliteConnectOptions::new()
        .filename(&db_path)
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(options)
        .await
        .with_context(|| format!("opening database {}", db_path.display()))?;
    SqliteBridgeStore::init(&pool).await?;
    Ok(Arc::new(SqliteBridgeStore::new(pool)))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    let dir = data_dir(&cli)?;
    let store = open_store(&dir).await?;

    match cli.command {
        Commands::Start => {
            info!(version = env!("CARGO_PKG_VERSION"), "chatplug starting");
            commands::start_bridge(store).await
        },
        Commands::Adapters => {
            commands::list_adapters();
            Ok(())
        },
        Commands::Instances { action } => commands::handle_instances(store, action).await,
        Commands::Connections { action } => commands::handle_connections(store, action).await,
        Commands::Threads { action } => commands::handle_threads(store, action).await,
        Commands::History { connection, limit } => {
            commands::show_history(store, &connection, limit).await
        },
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, clap::CommandFactory};

    #[test]
    fn command_table_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_thread_add() {
        let cli = Cli::parse_from([
            "chatplug", "threads", "add", "-c", "general", "-s", "console", "-i", "main", "-t",
            "tty1",
        ]);
        let Commands::Threads {
            action:
                commands::ThreadAction::Add {
                    connection,
                    service,
                    instance,
                    thread,
                    name,
                },
        } = cli.command
        else {
            panic!("parsed into the wrong command");
        };
        assert_eq!(connection, "general");
        assert_eq!(service, "console");
        assert_eq!(instance, "main");
        assert_eq!(thread, "tty1");
        assert!(name.is_none());
    }

    #[test]
    fn history_limit_defaults_to_twenty() {
        let cli = Cli::parse_from(["chatplug", "history", "--connection", "general"]);
        let Commands::History { limit, .. } = cli.command else {
            panic!("parsed into the wrong command");
        };
        assert_eq!(limit, 20);
    }
}
