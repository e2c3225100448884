//! A pool of `rate_limit` workers draining the dispatcher's request
//! channel. Each worker retries a failed send only when the underlying
//! error looks transient (`connection refused`, etc.), backing off
//! linearly, then always emits one token on `done` so the dispatcher's
//! handshake advances regardless of outcome.

use std::sync::Arc;
use std::time::Duration;

use telemetrix_wire::retry::RetryBudget;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::dispatcher::PendingRequest;

// `RetryBudget` multiplies its backoff by the attempt count, so a backoff
// of one second already gives the source's wait_sec/wait_sec_increment
// progression (1s, 2s, 3s, ...).
const RETRY_ATTEMPTS: u32 = 3;
const WAIT_SEC: u64 = 1;

pub fn spawn_pool(
    size: usize,
    client: reqwest::Client,
    request_rx: mpsc::Receiver<PendingRequest>,
    done_tx: mpsc::Sender<()>,
    shutdown: CancellationToken,
) -> Vec<tokio::task::JoinHandle<()>> {
    let request_rx = Arc::new(tokio::sync::Mutex::new(request_rx));
    (0..size.max(1))
        .map(|id| {
            let client = client.clone();
            let request_rx = request_rx.clone();
            let done_tx = done_tx.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { worker_loop(id, client, request_rx, done_tx, shutdown).await })
        })
        .collect()
}

async fn worker_loop(
    id: usize,
    client: reqwest::Client,
    request_rx: Arc<tokio::sync::Mutex<mpsc::Receiver<PendingRequest>>>,
    done_tx: mpsc::Sender<()>,
    shutdown: CancellationToken,
) {
    loop {
        let request = tokio::select! {
            request = async {
                let mut rx = request_rx.lock().await;
                rx.recv().await
            } => request,
            _ = shutdown.cancelled() => {
                tracing::info!(worker = id, "worker stopped");
                return;
            }
        };

        let Some(request) = request else {
            tracing::info!(worker = id, "request channel closed, worker exiting");
            return;
        };

        send_with_retry(&client, request, &shutdown).await;

        if done_tx.send(()).await.is_err() {
            tracing::warn!(worker = id, "done channel closed");
            return;
        }
    }
}

async fn send_with_retry(client: &reqwest::Client, request: PendingRequest, shutdown: &CancellationToken) {
    let mut budget = RetryBudget::new(RETRY_ATTEMPTS, Duration::from_secs(WAIT_SEC));

    loop {
        let attempt = send_once(client, &request).await;

        match attempt {
            Ok(status) if status.is_success() => return,
            Ok(status) => {
                tracing::warn!(path = %request.url, code = %status, "server rejected metrics");
                return;
            }
            Err(error) => {
                let message = error.to_string();
                tokio::select! {
                    should_retry = budget.should_retry(&message) => {
                        if !should_retry {
                            tracing::warn!(%error, "call error, giving up");
                            return;
                        }
                        tracing::warn!(%error, attempts = budget.attempts(), "get error, need try again");
                    }
                    _ = shutdown.cancelled() => return,
                }
            }
        }
    }
}

async fn send_once(client: &reqwest::Client, request: &PendingRequest) -> Result<reqwest::StatusCode, reqwest::Error> {
    let mut builder = client.post(&request.url).body(request.body.clone());
    for (name, value) in &request.headers {
        builder = builder.header(*name, value.clone());
    }
    let response = builder.send().await?;
    Ok(response.status())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_once_reports_status_from_a_real_request() {
        let client = reqwest::Client::new();
        let request = PendingRequest {
            url: "http://127.0.0.1:1/updates/".to_string(),
            body: Vec::new(),
            headers: Vec::new(),
        };
        let result = send_once(&client, &request).await;
        assert!(result.is_err(), "nothing is listening on port 1");
    }
}
