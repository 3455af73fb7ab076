use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gamestatus_rs::{
    config::Config,
    fivem::FivemProber,
    minecraft,
    server::{self, AppState},
    store::{ContentStore, JsonFileStore, MemoryStore},
    types::{FivemQuery, MinecraftQuery, ServerStatus},
};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// gamestatus-rs: live Minecraft and FiveM server status, one-shot or as a JSON API.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "gamestatus-rs",
    version,
    about = "Live Minecraft and FiveM server status, one-shot or as a JSON API.",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Serve /api/status/minecraft and /api/status/fivem.
    Serve {
        /// Path to a TOML config file. Defaults are used when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Address to listen on (overrides the config file).
        #[arg(long)]
        bind: Option<String>,

        /// JSON content store with the configured servers (overrides the config file).
        #[arg(long)]
        store: Option<PathBuf>,
    },
    /// Ping a Minecraft server once and print the result as JSON.
    Minecraft {
        host: String,

        #[arg(long, default_value_t = minecraft::DEFAULT_PORT)]
        port: u16,

        /// Total time allowed for connect, handshake and response.
        #[arg(long = "timeout-ms", default_value_t = 5000)]
        timeout_ms: u64,

        /// Protocol version sent in the handshake.
        #[arg(long = "protocol-version", default_value_t = minecraft::DEFAULT_PROTOCOL_VERSION)]
        protocol_version: u32,
    },
    /// Query a FiveM server (`host[:port]` or `cfx.re/join/<code>`) once.
    Fivem {
        address: String,

        #[arg(long = "timeout-ms", default_value_t = 5000)]
        timeout_ms: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("gamestatus_rs=info,tower_http=info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve {
            config,
            bind,
            store,
        } => serve(config, bind, store).await,
        Command::Minecraft {
            host,
            port,
            timeout_ms,
            protocol_version,
        } => {
            println!("probing minecraft server {host}:{port} (timeout {timeout_ms}ms)");
            let query = MinecraftQuery::new(host, port)
                .with_timeout(Duration::from_millis(timeout_ms))
                .with_protocol_version(protocol_version);
            print_status(&minecraft::probe(&query).await)
        }
        Command::Fivem {
            address,
            timeout_ms,
        } => {
            println!("probing fivem server {address} (timeout {timeout_ms}ms)");
            let query = FivemQuery::new(address).with_timeout(Duration::from_millis(timeout_ms));
            print_status(&FivemProber::new().probe(&query).await)
        }
    }
}

async fn serve(
    config_path: Option<PathBuf>,
    bind: Option<String>,
    store_path: Option<PathBuf>,
) -> Result<()> {
    let mut config = match &config_path {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(bind) = bind {
        config.bind = bind;
    }
    if store_path.is_some() {
        config.store_path = store_path;
    }

    info!(
        bind = %config.bind,
        store = %config
            .store_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<none, using fallback targets>".to_string()),
        timeout_ms = config.probe.timeout_ms,
        "starting status server"
    );

    let store: Arc<dyn ContentStore> = match &config.store_path {
        Some(path) => Arc::new(JsonFileStore::new(path)),
        None => Arc::new(MemoryStore::default()),
    };
    let state = AppState::new(&config, store);

    let shutdown = CancellationToken::new();
    let shutdown_ctrlc = shutdown.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutting down");
        shutdown_ctrlc.cancel();
    });

    server::spawn_server(&config.bind, state, shutdown)
        .await
        .with_context(|| format!("status server on {} failed", config.bind))
}

fn print_status(status: &ServerStatus) -> Result<()> {
    match status {
        ServerStatus::Online(s) => println!(
            "online: {}/{} players, version {}, latency {}",
            s.players.online,
            s.players.max,
            s.version.as_deref().unwrap_or("-"),
            s.latency_ms
                .map(|ms| format!("{ms}ms"))
                .unwrap_or_else(|| "-".to_string()),
        ),
        ServerStatus::Offline { reason } => println!("offline: {reason}"),
    }
    println!("{}", serde_json::to_string_pretty(status)?);
    Ok(())
}
