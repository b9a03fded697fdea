//! HTTP management endpoint (v1)
//!
//! Serves the management API of a server process over HTTP and HTTPS.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────────────────────────────────────┐
//!                 │               HTTP MANAGEMENT ENDPOINT               │
//!                 │                                                      │
//!   config.toml ──┼─▶ config ──▶ lifecycle::startup ──▶ EndpointDeps     │
//!                 │                                         │            │
//!                 │                                         ▼            │
//!                 │  net::binding ◀── lifecycle::endpoint ──▶ net::tls   │
//!                 │  (resolve)         (start / stop)        (policy)    │
//!                 │                         │                            │
//!                 │        ┌────────────────┼─────────────────┐          │
//!                 │        ▼                ▼                 ▼          │
//!                 │  net::listener    http::server     net::registry     │
//!                 │  (directory)      (axum + TLS)     (managed binds)   │
//!                 │                         │                            │
//!   Client ───────┼──▶ /, /console, /management, contexts, upgrades      │
//!                 │                         │                            │
//!                 │                         ▼                            │
//!                 │                  ModelController (executor)          │
//!                 └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use serde_json::json;
use tokio::runtime::Handle;

use mgmt_endpoint::config::{load_config, ManagementConfig};
use mgmt_endpoint::controller::{InMemoryModelController, ProcessStateService};
use mgmt_endpoint::lifecycle::signals::shutdown_signal;
use mgmt_endpoint::lifecycle::startup::dependencies_from_config;
use mgmt_endpoint::lifecycle::HttpManagementEndpoint;
use mgmt_endpoint::net::{ListenerDirectory, SocketBindingManager};
use mgmt_endpoint::lifecycle::ServiceRegistry;
use mgmt_endpoint::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "mgmt-endpoint")]
#[command(about = "HTTP management endpoint", long_about = None)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => ManagementConfig::default(),
    };

    logging::init_logging(&config.observability.log_level);
    tracing::info!("mgmt-endpoint v0.1.0 starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let controller = InMemoryModelController::new(json!({
        "product-name": "mgmt-endpoint",
        "product-version": env!("CARGO_PKG_VERSION"),
        "subsystem": {},
    }));

    let deps = dependencies_from_config(&config)?
        .with_model_controller(Arc::new(controller))
        .with_process_state(Arc::new(ProcessStateService::new()))
        .with_socket_binding_manager(Arc::new(SocketBindingManager::new()))
        .with_listener_directory(Arc::new(ListenerDirectory::new()))
        .with_service_registry(Arc::new(ServiceRegistry::new()))
        .with_worker(Handle::current())
        .with_executor(Handle::current());

    let endpoint = HttpManagementEndpoint::new(config.console.mode, config.console.slot.clone(), deps);
    endpoint.start().await?;

    tracing::info!(
        http_port = endpoint.http_port().await,
        https_port = endpoint.https_port().await,
        console = endpoint.has_console(),
        "Management endpoint ready"
    );

    shutdown_signal().await;

    endpoint.stop().await?;
    tracing::info!("Shutdown complete");
    Ok(())
}
