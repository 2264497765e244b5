//! # breadboard
//!
//! Composition root: loads settings and a device document, builds the
//! registry on a board, and serves the request router over HTTP.

mod server;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{info, warn, Instrument};

use breadboard_core::config::{Settings, SettingsBuilder};
use breadboard_core::logging::component_span;
use breadboard_core::utils::{spawn_and_log, with_timeout};
use breadboard_devices::{Board, FactoryTable, Heartbeat};
use breadboard_engine::{Document, HttpWebhookClient, Registry, Runtime};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "breadboard", version, about = "Configuration-driven GPIO orchestration")]
struct Cli {
    /// Settings file (toml, yaml or json); BREADBOARD__SECTION__KEY variables override it
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the registry and serve it over HTTP
    Serve {
        /// Device document; defaults to `general.device_file`
        #[arg(long)]
        devices: Option<PathBuf>,
        /// Listen address; defaults to the settings, then the document's `network` section
        #[arg(long)]
        bind: Option<SocketAddr>,
    },
    /// Validate a device document and print the resulting API description
    Check {
        /// Device document; defaults to `general.device_file`
        #[arg(long)]
        devices: Option<PathBuf>,
    },
}

fn load_settings(path: Option<&Path>) -> anyhow::Result<Settings> {
    let mut builder = SettingsBuilder::from_env();
    if let Some(path) = path {
        builder = builder.with_settings_file(path);
    }
    Ok(builder.build()?)
}

fn load_document(path: &Path) -> anyhow::Result<Document> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading device document {}", path.display()))?;
    text.parse::<Document>()
        .with_context(|| format!("parsing device document {}", path.display()))
}

#[cfg(feature = "gpio")]
fn board() -> anyhow::Result<Box<dyn Board>> {
    Ok(Box::new(breadboard_devices::RaspberryPiBoard::new()?))
}

#[cfg(not(feature = "gpio"))]
fn board() -> anyhow::Result<Box<dyn Board>> {
    Ok(Box::new(breadboard_devices::SimulatedBoard::new()))
}

fn build_registry(path: &Path, board: &dyn Board) -> anyhow::Result<Registry> {
    let document = load_document(path)?;
    Registry::build(&document, &FactoryTable::standard(), board)
        .with_context(|| format!("building devices from {}", path.display()))
}

fn bind_address(settings: &Settings, registry: &Registry, flag: Option<SocketAddr>) -> anyhow::Result<SocketAddr> {
    if let Some(addr) = flag {
        return Ok(addr);
    }
    let network = registry.network();
    let host = settings.server.host.as_deref().unwrap_or(&network.hosts);
    let port = settings.server.port.unwrap_or(network.port);
    format!("{}:{}", host, port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", host, port))
}

async fn serve(settings: Settings, devices: PathBuf, bind: Option<SocketAddr>) -> anyhow::Result<()> {
    info!(backends = ?breadboard_devices::available_backends(), "Starting breadboard");
    let board = board()?;
    let registry = build_registry(&devices, board.as_ref())?;
    let addr = bind_address(&settings, &registry, bind)?;

    let webhooks = Arc::new(HttpWebhookClient::new(settings.runtime.webhook_timeout()));
    let (mut runtime, handle) = Runtime::new(registry, webhooks, settings.runtime.clone());
    match Heartbeat::claim(board.as_ref()) {
        Ok(heartbeat) => runtime = runtime.with_heartbeat(heartbeat),
        Err(e) => warn!(error = %e, "No status LED"),
    }

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!(%addr, "Listening");

    let (stop, mut stopped) = watch::channel(false);
    let app = server::router(handle);
    let http = spawn_and_log(
        "http",
        async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = stopped.wait_for(|stop| *stop).await;
                })
                .await
        }
        .instrument(component_span("http")),
    );

    runtime
        .run(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await;

    let _ = stop.send(true);
    with_timeout(SHUTDOWN_GRACE, "http shutdown", async {
        http.await
            .map_err(|e| breadboard_core::error::Error::runtime(e.to_string()))
    })
    .await?;
    Ok(())
}

fn check(devices: &Path) -> anyhow::Result<()> {
    let board = breadboard_devices::SimulatedBoard::new();
    let registry = build_registry(devices, &board)?;
    let description = serde_json::Value::from(registry.describe());
    println!("{}", serde_json::to_string_pretty(&description)?);
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(cli.settings.as_deref())?;
    breadboard_core::init(&settings)?;

    match cli.command {
        Commands::Serve { devices, bind } => {
            let devices = devices.unwrap_or_else(|| PathBuf::from(&settings.general.device_file));
            serve(settings, devices, bind).await
        }
        Commands::Check { devices } => {
            let devices = devices.unwrap_or_else(|| PathBuf::from(&settings.general.device_file));
            check(&devices)
        }
    }
}
