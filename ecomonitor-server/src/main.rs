//! EcoMonitor binary: runs aggregation refreshes and serves the read API.

mod api;
mod cli;
mod sources;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use reqwest::Client;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use ecomonitor_core::{
    config::OrchestratorConfig,
    index::IndexTable,
    orchestrator::{AggregationOrchestrator, RunOutcome},
    service::EcoMonitorService,
    snapshot::SnapshotStore,
};

use crate::api::AppState;
use crate::cli::{Cli, Command, ServeArgs};

/// Exit status of a refresh that kept serving the previous snapshot.
const EXIT_STALE_FALLBACK: u8 = 2;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_err| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let orchestrator = Arc::new(build_orchestrator(&cli)?);

    match cli.command {
        Command::Refresh => refresh(&orchestrator).await,
        Command::Serve(args) => serve(orchestrator, args).await.map(|()| ExitCode::SUCCESS),
    }
}

fn build_orchestrator(cli: &Cli) -> Result<AggregationOrchestrator> {
    let table = match &cli.index_table {
        Some(path) => IndexTable::from_json_file(path)
            .with_context(|| format!("failed to load index table {}", path.display()))?,
        None => IndexTable::default(),
    };

    let client = Client::builder()
        .user_agent(cli.user_agent.as_str())
        .timeout(cli.fetch_timeout())
        .build()
        .context("failed to build HTTP client")?;

    let registry = sources::registry(cli.source_mode, &client);
    info!(
        mode = ?cli.source_mode,
        sources = registry.len(),
        snapshot = %cli.snapshot_path.display(),
        "configured aggregation"
    );

    Ok(AggregationOrchestrator::new(
        Arc::new(registry),
        Arc::new(table),
        Arc::new(SnapshotStore::open(&cli.snapshot_path)),
        OrchestratorConfig {
            fetch_timeout: cli.fetch_timeout(),
        },
    ))
}

async fn refresh(orchestrator: &AggregationOrchestrator) -> Result<ExitCode> {
    let report = orchestrator.run().await?;

    for failure in &report.failed_sources {
        warn!(source = %failure.source, kind = %failure.kind, "{}", failure.message);
    }

    match report.outcome {
        RunOutcome::Fresh => {
            info!(
                version = report.snapshot_version,
                records = report.committed,
                "refresh committed a fresh snapshot"
            );
            Ok(ExitCode::SUCCESS)
        }
        RunOutcome::StaleFallback => {
            warn!(
                version = report.snapshot_version,
                "refresh produced no valid records, using existing data"
            );
            Ok(ExitCode::from(EXIT_STALE_FALLBACK))
        }
    }
}

async fn serve(orchestrator: Arc<AggregationOrchestrator>, args: ServeArgs) -> Result<()> {
    let service = Arc::new(EcoMonitorService::new(Arc::clone(orchestrator.store())));
    let app = api::router(AppState { service });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let refresher = args.refresh_every_secs.map(|secs| {
        tokio::spawn(refresh_periodically(
            Arc::clone(&orchestrator),
            Duration::from_secs(secs.max(1)),
            shutdown_rx,
        ))
    });

    let listener = TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("failed to bind {}", args.bind))?;
    info!(addr = %args.bind, "serving EcoMonitor API");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(err) = signal::ctrl_c().await {
                error!(%err, "failed to listen for shutdown signal");
            }
        })
        .await
        .context("server shutdown")?;

    shutdown_tx.send_replace(true);
    if let Some(handle) = refresher {
        handle.await.context("refresh task panicked")?;
    }
    Ok(())
}

async fn refresh_periodically(
    orchestrator: Arc<AggregationOrchestrator>,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => break,
        }

        match orchestrator.run().await {
            Ok(report) if report.outcome == RunOutcome::Fresh => {
                info!(version = report.snapshot_version, "scheduled refresh committed");
            }
            Ok(report) => {
                warn!(version = report.snapshot_version, "scheduled refresh kept existing data");
            }
            Err(err) => warn!(%err, "scheduled refresh skipped"),
        }
    }
}
