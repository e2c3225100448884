//! Collector agent: samples the runtime/host catalogs into a local store
//! and dispatches batches to the telemetry server over HTTP, gzip+HMAC+RSA
//! framed, with a bounded-concurrency retrying worker pool.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use telemetrix_core::{InMemoryStore, MetricStore};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

mod allocator;
mod config;
mod dispatcher;
mod sampler;
mod worker;

use crate::config::AppConfig;
use crate::dispatcher::Dispatcher;
use crate::sampler::Sampler;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = AppConfig::load().context("invalid configuration")?;
    let shutdown = CancellationToken::new();

    let public_key = match &config.crypto_key_path {
        Some(path) => {
            let pem = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read crypto key '{}'", path.display()))?;
            Some(
                telemetrix_wire::rsa_envelope::load_public_key(&pem)
                    .context("failed to parse RSA public key")?,
            )
        }
        None => None,
    };

    let store: Arc<dyn MetricStore> = Arc::new(InMemoryStore::new());

    let sampler = Sampler::new(store.clone(), Duration::from_secs(config.poll_interval));
    let sampler_shutdown = shutdown.clone();
    let sampler_task = tokio::spawn(sampler.run(sampler_shutdown));

    let (request_tx, request_rx) = mpsc::channel(1);
    let (done_tx, done_rx) = mpsc::channel(1);
    done_tx.send(()).await.expect("priming the handshake cannot fail on a fresh channel");

    let dispatcher = Dispatcher::new(
        store,
        config.address.clone(),
        Duration::from_secs(config.report_interval),
        config.hmac_key.clone(),
        public_key,
    );
    let dispatcher_shutdown = shutdown.clone();
    let dispatcher_task = tokio::spawn(dispatcher.run(request_tx, done_rx, dispatcher_shutdown));

    let client = reqwest::Client::new();
    let worker_tasks = worker::spawn_pool(config.rate_limit, client, request_rx, done_tx, shutdown.clone());

    tracing::info!(
        address = %config.address,
        report_interval = config.report_interval,
        poll_interval = config.poll_interval,
        workers = config.rate_limit,
        "telemetrix agent started"
    );

    wait_for_shutdown_signal().await;
    shutdown.cancel();

    let _ = sampler_task.await;
    let _ = dispatcher_task.await;
    for task in worker_tasks {
        let _ = task.await;
    }

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if let Err(error) = tracing_subscriber::fmt().with_env_filter(filter).try_init() {
        eprintln!("failed to initialize tracing subscriber: {error}");
    }
}

async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    let mut sigquit = signal(SignalKind::quit()).expect("failed to install SIGQUIT handler");

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(error) = result {
                tracing::error!(%error, "failed to listen for SIGINT");
            } else {
                tracing::info!("received SIGINT, shutting down");
            }
        }
        _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
        _ = sigquit.recv() => tracing::info!("received SIGQUIT, shutting down"),
    }
}
