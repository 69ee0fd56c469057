//! Stratus lambda server binary.
//!
//! Hosts the lambda manager, the invocation entrypoint, or both.
//!
//! # Usage
//!
//! ```bash
//! # Everything in one process, two tenants
//! stratus-server --listen 0.0.0.0:50061 --namespace acme --namespace globex
//!
//! # Standalone entrypoint resolving lambdas through a remote manager
//! stratus-server --role entrypoint --manager-endpoint http://manager:50061
//!
//! # Environment variables, overridden by CLI arguments
//! STRATUS__ENTRYPOINT__MAX_EXECUTE_TIMEOUT=60s stratus-server --config /etc/stratus.toml
//!
//! # Print the configuration schema
//! stratus-server config schema
//! ```

use std::{io::IsTerminal, net::SocketAddr, sync::Arc};

use clap::Parser;
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use snafu::{ResultExt, Snafu};
use stratus_broker::InMemoryBroker;
use stratus_lambda::metrics::{EXECUTE_LATENCY, EXECUTE_LATENCY_BUCKETS};
use stratus_server::{
    bootstrap::{self, BootstrapError},
    config::{self, Cli, CliCommand, Config, ConfigAction, ConfigError, LogFormat},
    shutdown,
};
use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Top-level error type for the server binary.
#[derive(Debug, Snafu)]
enum ServerError {
    #[snafu(display("{source}"))]
    Config { source: ConfigError },
    #[snafu(display("bootstrap error: {source}"))]
    Bootstrap { source: BootstrapError },
    #[snafu(display("metrics exporter error: {message}"))]
    Metrics { message: String },
    #[snafu(display("server error: {message}"))]
    Serve { message: String },
}

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    let cli = Cli::parse();

    if let Some(CliCommand::Config { action }) = &cli.command {
        match action {
            ConfigAction::Schema => println!("{}", config::config_schema()),
            ConfigAction::Defaults => println!("{}", config::config_defaults()),
        }
        return Ok(());
    }

    let config = cli.apply(Config::load(cli.config.as_deref()).context(ConfigSnafu)?);
    config.validate().context(ConfigSnafu)?;

    init_logging(&config);

    tracing::info!(
        listen_addr = %config.listen_addr,
        role = ?config.role,
        "Starting Stratus lambda server"
    );

    if let Some(metrics_addr) = config.metrics_addr {
        init_metrics_exporter(metrics_addr)?;
    }

    let broker = InMemoryBroker::new();
    if config.hosts_entrypoint() {
        tracing::warn!(
            "In-process broker: tasks reach only workers attached inside this process; \
             without one, Execute times out"
        );
    }
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let node = bootstrap::bootstrap_node(&config, Arc::new(broker.clone()), shutdown_rx)
        .await
        .context(BootstrapSnafu)?;

    let signal_handle = shutdown::spawn_signal_handler(shutdown_tx);

    tracing::info!("Server ready, accepting connections");
    let server_result = node.server.serve().await;
    signal_handle.abort();

    if let Some(entrypoint) = &node.entrypoint {
        entrypoint.shutdown().await;
    }
    broker.close();

    server_result.map_err(|e| ServeSnafu { message: e.to_string() }.build())?;
    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Initializes the logging system based on configuration.
///
/// Supports three formats:
/// - `Text`: Human-readable format (development)
/// - `Json`: JSON structured logging (production)
/// - `Auto`: JSON for non-TTY stdout, text otherwise
fn init_logging(config: &Config) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let use_json = match config.log_format {
        LogFormat::Json => true,
        LogFormat::Text => false,
        LogFormat::Auto => !std::io::stdout().is_terminal(),
    };

    if use_json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().flatten_event(true).with_current_span(false))
            .init();
    } else {
        tracing_subscriber::registry().with(env_filter).with(fmt::layer()).init();
    }
}

/// Initializes the Prometheus metrics exporter at `/metrics` on `addr`.
fn init_metrics_exporter(addr: SocketAddr) -> Result<(), ServerError> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(
            Matcher::Full(EXECUTE_LATENCY.to_string()),
            &EXECUTE_LATENCY_BUCKETS,
        )
        .map_err(|e| MetricsSnafu { message: e.to_string() }.build())?
        .install()
        .map_err(|e| MetricsSnafu { message: e.to_string() }.build())?;

    tracing::info!(metrics_addr = %addr, "Prometheus metrics exporter started");
    Ok(())
}
