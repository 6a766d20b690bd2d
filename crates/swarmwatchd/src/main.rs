//! swarmwatchd — Docker Swarm replica exporter.
//!
//! Single binary that assembles the exporter:
//! - Docker Engine client
//! - Gauge store (both swarm gauge families)
//! - Event dispatcher + reconciler (desired replicas)
//! - Snapshot poller (replica state histogram)
//! - Metrics HTTP server
//!
//! # Usage
//!
//! ```text
//! swarmwatchd --listen-addr 0.0.0.0:8888 --poll-delay 10s --label com.example.team
//! ```

mod config;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, anyhow};
use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use swarmwatch_cluster::{ClusterApi, DockerClient};
use swarmwatch_metrics::GaugeStore;
use swarmwatch_reconcile::{EventDispatcher, Reconciler, SnapshotPoller};

use config::{Config, LogFormat};

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();
    init_tracing(&config);

    if log_failure(config.validate(), "invalid configuration") {
        return ExitCode::FAILURE;
    }
    if log_failure(run(config).await, "swarmwatchd stopped on a fatal error") {
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

/// Log a fatal error with its full context chain. Returns whether there
/// was one.
fn log_failure(result: anyhow::Result<()>, message: &str) -> bool {
    match result {
        Ok(()) => false,
        Err(e) => {
            error!(error = %format!("{e:#}"), "{message}");
            true
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.directive()));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match config.log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    info!(
        listen_addr = %config.listen_addr,
        docker_host = %config.docker_host,
        poll_delay_ms = config.poll_delay.as_millis() as u64,
        labels = ?config.labels,
        "swarmwatchd starting"
    );

    // ── Initialize subsystems ──────────────────────────────────

    let gauges = GaugeStore::new(&config.labels).context("failed to register gauge families")?;
    let cluster: Arc<dyn ClusterApi> = Arc::new(DockerClient::from_host(&config.docker_host)?);
    let reconciler = Reconciler::new(Arc::clone(&cluster), gauges.clone());

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;

    // Subscribe before the initial snapshot so no change falls between the two.
    let events = cluster
        .subscribe_events()
        .await
        .context("failed to subscribe to cluster events")?;
    reconciler
        .initialize()
        .await
        .context("failed to take the initial cluster snapshot")?;

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Start background tasks ─────────────────────────────────

    let poller = SnapshotPoller::new(reconciler.clone(), config.poll_delay);
    let poller_shutdown = shutdown_rx.clone();
    let poller_handle = tokio::spawn(async move {
        poller.run(poller_shutdown).await;
    });

    let dispatcher = EventDispatcher::new(reconciler, config.max_concurrent_events);
    let events_shutdown = shutdown_rx.clone();
    let mut events_handle = tokio::spawn(async move { dispatcher.run(events, events_shutdown).await });

    // ── Start metrics server ───────────────────────────────────

    let router = swarmwatch_api::build_router(gauges);
    let mut server_shutdown = shutdown_rx.clone();
    let mut server_handle = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = server_shutdown.changed().await;
            })
            .await
    });
    info!(addr = %config.listen_addr, "metrics server listening");

    let outcome = tokio::select! {
        _ = shutdown_signal() => {
            info!("shutdown signal received");
            Ok(())
        }
        joined = &mut events_handle => match joined {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(anyhow::Error::new(e).context("lost the cluster event subscription")),
            Err(e) => Err(anyhow::Error::new(e).context("event dispatcher task failed")),
        },
        joined = &mut server_handle => match joined {
            Ok(Ok(())) => Err(anyhow!("metrics server stopped unexpectedly")),
            Ok(Err(e)) => Err(anyhow::Error::new(e).context("metrics server failed")),
            Err(e) => Err(anyhow::Error::new(e).context("metrics server task failed")),
        },
    };

    let _ = shutdown_tx.send(true);
    events_handle.abort();
    let _ = poller_handle.await;
    if !server_handle.is_finished() {
        let _ = server_handle.await;
    }

    info!("swarmwatchd stopped");
    outcome
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
