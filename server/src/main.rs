//! Telemetry server: HTTP ingest/read API, gRPC batch ingest, and the
//! store's background dump task, wired to one root cancellation token.
//!
//! Exposes:
//! - `POST /update/{kind}/{id}/{value}`, `POST /update/`: single write
//! - `POST /updates/`: batch write
//! - `GET /value/{kind}/{id}`, `POST /value/`: read
//! - `GET /`: HTML listing of all metrics
//! - `GET /ping`: SQL connectivity check

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::error_handling::HandleErrorLayer;
use axum::middleware as axum_middleware;
use axum::routing::{get, post};
use axum::Router;
use telemetrix_core::{AggregationService, FileStore, InMemoryStore, MetricStore, SqlStore};
use tokio_util::sync::CancellationToken;
use tonic::transport::Server as TonicServer;
use tower::timeout::TimeoutLayer;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod grpc;
mod handlers;
mod middleware;
mod state;

use crate::config::AppConfig;
use crate::errors::handle_middleware_error;
use crate::grpc::{proto::metric_saver_service_server::MetricSaverServiceServer, MetricSaver};
use crate::handlers::{
    list_html, ping, update_json, update_path, updates_batch, value_json, value_path,
};
use crate::middleware::decrypt::decrypt_body;
use crate::middleware::gzip::gzip_codec;
use crate::middleware::hmac::hmac_guard;
use crate::middleware::log::log_requests;
use crate::middleware::subnet::subnet_gate;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = AppConfig::load().context("invalid configuration")?;
    let shutdown = CancellationToken::new();

    let (store, db_pool) = build_store(&config, &shutdown).await?;
    let aggregation = Arc::new(AggregationService::new(store));

    let private_key = match &config.crypto_key_path {
        Some(path) => {
            let pem = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read crypto key '{}'", path.display()))?;
            Some(
                telemetrix_wire::rsa_envelope::load_private_key(&pem)
                    .context("failed to parse RSA private key")?,
            )
        }
        None => None,
    };

    let http_addr = config.address;
    let grpc_addr = config.grpc_address;
    let state = AppState::new(config, aggregation.clone(), private_key, db_pool, shutdown.clone())
        .context("failed to initialize application state")?;

    let app = build_app(state);
    let listener = tokio::net::TcpListener::bind(http_addr)
        .await
        .with_context(|| format!("failed to bind http socket on {http_addr}"))?;

    tracing::info!(%http_addr, %grpc_addr, "telemetrix server started");

    let grpc_shutdown = shutdown.clone();
    let grpc_task = tokio::spawn(async move {
        TonicServer::builder()
            .add_service(MetricSaverServiceServer::new(MetricSaver::new(aggregation)))
            .serve_with_shutdown(grpc_addr, grpc_shutdown.cancelled())
            .await
    });

    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        signal_shutdown.cancel();
    });

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .context("http server exited unexpectedly")?;

    if let Err(error) = grpc_task.await {
        tracing::warn!(%error, "grpc server task failed");
    }

    Ok(())
}

async fn build_store(
    config: &AppConfig,
    shutdown: &CancellationToken,
) -> Result<(Arc<dyn MetricStore>, Option<sqlx::PgPool>)> {
    if let Some(dsn) = &config.database_dsn {
        let store = SqlStore::connect(dsn)
            .await
            .with_context(|| "failed to connect to database".to_string())?;
        let pool = store.pool().clone();
        return Ok((Arc::new(store) as Arc<dyn MetricStore>, Some(pool)));
    }

    if let Some(path) = &config.file_storage_path {
        let interval = Duration::from_secs(config.store_interval);
        let store = Arc::new(
            FileStore::open(path, config.restore, interval)
                .await
                .context("failed to open file-backed store")?,
        );
        store.spawn_background_tasks(shutdown.clone());
        return Ok((store as Arc<dyn MetricStore>, None));
    }

    Ok((Arc::new(InMemoryStore::new()) as Arc<dyn MetricStore>, None))
}

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub(crate) fn build_app(state: AppState) -> Router {
    let request_id_header = axum::http::HeaderName::from_static("x-request-id");

    let body_middleware = ServiceBuilder::new()
        .layer(HandleErrorLayer::new(handle_middleware_error))
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(SetRequestIdLayer::new(request_id_header.clone(), MakeRequestUuid))
        .layer(PropagateRequestIdLayer::new(request_id_header));

    Router::new()
        .route("/update/:kind/:id/:value", post(update_path))
        .route("/update/", post(update_json))
        .route("/updates/", post(updates_batch))
        .route("/value/:kind/:id", get(value_path))
        .route("/value/", post(value_json))
        .route("/", get(list_html))
        .route("/ping", get(ping))
        .layer(axum_middleware::from_fn_with_state(state.clone(), subnet_gate))
        .layer(axum_middleware::from_fn_with_state(state.clone(), decrypt_body))
        .layer(axum_middleware::from_fn(gzip_codec))
        .layer(axum_middleware::from_fn_with_state(state.clone(), hmac_guard))
        .layer(axum_middleware::from_fn(log_requests))
        .layer(body_middleware)
        .with_state(state)
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
