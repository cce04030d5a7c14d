use homemanager::api::{self, AppState};
use homemanager::config::Config;
use homemanager::plugin::{PluginRegistry, RunReport};
use homemanager::plugins::builtin_plugins;
use homemanager::store::StorageGateway;

use clap::Parser;
use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;
use tokio::signal;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "homemanager", version, about = "Pluggable home-media dashboard")]
struct Cli {
    /// Run a single plugin's producer once and exit (matched on the lower-cased name)
    #[arg(long, value_name = "NAME", conflicts_with = "run_all")]
    run_plugin: Option<String>,

    /// Run every plugin's producer once and exit
    #[arg(long)]
    run_all: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // Load environment from .env file if present
    let dotenv = dotenvy::dotenv();

    let config = Config::from_env()?;

    std::fs::create_dir_all(&config.log_dir).unwrap_or_else(|e| {
        eprintln!(
            "Warning: Could not create log directory {}: {}",
            config.log_dir.display(),
            e
        );
    });

    // Create file appender with daily rotation
    let file_appender = RollingFileAppender::new(Rotation::DAILY, &config.log_dir, "homemanager.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    // Initialize logging - both stdout and file
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,homemanager=debug")),
        )
        // Console output
        .with(fmt::layer().with_target(true))
        // File output with JSON format for easy parsing
        .with(
            fmt::layer()
                .with_target(true)
                .with_ansi(false)
                .json()
                .with_writer(non_blocking),
        )
        .init();

    debug!("Logging initialized - log directory: {}", config.log_dir.display());
    if let Err(e) = dotenv {
        debug!("No .env file found or error loading it: {}", e);
    }

    info!("Write mode: {}", config.write_mode);
    info!("Statement timeout: {:?}", config.statement_timeout);
    info!("Producer timeout: {:?}", config.producer_timeout);
    info!("Data directory: {}", config.data_dir.display());

    let gateway = Arc::new(StorageGateway::connect(&config).await?);

    let mut registry = PluginRegistry::from_config(gateway.clone(), &config)
        .with_plugins(builtin_plugins(gateway.clone(), &config)?);
    registry.setup_all();

    gateway.create_tables(&registry.schema_statements()?).await;

    if let Some(name) = cli.run_plugin {
        return Ok(match registry.run_plugin(&name).await {
            Ok(report) => {
                log_report(&report);
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!("{}", e);
                ExitCode::FAILURE
            }
        });
    }

    if cli.run_all {
        for report in registry.run_all().await {
            log_report(&report);
        }
        return Ok(ExitCode::SUCCESS);
    }

    let registry = Arc::new(registry);
    let socket_addr = config.socket_addr()?;

    let app = api::router(AppState {
        registry: registry.clone(),
        start_time: Instant::now(),
        log_dir: config.log_dir.clone(),
    })?;

    // Spawn periodic producer runs
    if let Some(period) = config.run_interval {
        let runner_registry = registry.clone();
        info!("Running plugins every {:?}", period);

        tokio::spawn(async move {
            let mut interval = interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                interval.tick().await;
                for report in runner_registry.run_all().await {
                    log_report(&report);
                }
            }
        });
    }

    // Create listener
    let listener = tokio::net::TcpListener::bind(&socket_addr).await?;
    info!("Server listening on {}", socket_addr);

    // Run server with graceful shutdown
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server shutdown complete");

    Ok(ExitCode::SUCCESS)
}

fn log_report(report: &RunReport) {
    if report.produced {
        info!(
            plugin = %report.plugin,
            "Run finished: {} batches, {} rows written, {} rows failed",
            report.batches,
            report.rows_applied,
            report.rows_failed
        );
    } else {
        warn!(plugin = %report.plugin, "Run produced no data");
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Received shutdown signal");
}
