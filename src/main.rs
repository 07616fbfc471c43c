//! hop-trace service.
//!
//! # Architecture Overview
//!
//! ```text
//!                  ┌──────────────────────────────────────────────────────┐
//!   traceparent    │  ┌───────────┐   ┌──────────┐   ┌─────────────────┐  │
//!   tracestate ────┼─▶│  extract  │──▶│ classify │──▶│ reuse/generate  │  │
//!                  │  └───────────┘   └──────────┘   └────────┬────────┘  │
//!                  │                                          ▼           │
//!                  │  ┌───────────┐   ┌──────────┐   ┌─────────────────┐  │
//!   traceparent ◀──┼──│  response │◀──│ handler  │◀──│ node-path encode│  │
//!   tracestate     │  │  headers  │   │          │   └─────────────────┘  │
//!                  │  └───────────┘   └────┬─────┘                        │
//!                  │                       ▼                              │
//!                  │                  outbound call ──────────────────────┼──▶ downstream
//!                  └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use hop_trace::config::{load_config, validation::validate_config, ConfigError, ServiceConfig};
use hop_trace::lifecycle::signals::forward_termination;
use hop_trace::observability::{logging, metrics};
use hop_trace::{HttpServer, Shutdown};

#[derive(Parser)]
#[command(name = "hop-trace")]
#[command(about = "HTTP service propagating trace context across call chains", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ServiceConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
        validate_config(&config).map_err(ConfigError::Validation)?;
    }

    logging::init_logging(&config.observability)?;

    tracing::info!("hop-trace v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        downstream = ?config.downstream.url,
        trusted_networks = config.propagation.trusted_networks.len(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    tokio::spawn(forward_termination(shutdown.clone()));

    let server = HttpServer::new(config);
    server.run(listener, shutdown.signalled()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
