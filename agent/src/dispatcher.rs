//! Builds batch update requests from the local store on a fixed tick and
//! hands them to the worker pool through a single-token handshake: the
//! dispatcher waits for a token on `done`, then waits for the next tick,
//! then pushes exactly one request. This keeps at most one dispatch
//! in-flight per `report_interval`, independent of worker pool size.

use std::net::IpAddr;
use std::sync::Arc;

use rsa::RsaPublicKey;
use telemetrix_core::{Metric, MetricStore};
use telemetrix_wire::hmac_sign::HEADER_NAME;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// A fully-framed request ready for a worker to send verbatim.
pub struct PendingRequest {
    pub url: String,
    pub body: Vec<u8>,
    pub headers: Vec<(&'static str, String)>,
}

pub struct Dispatcher {
    store: Arc<dyn MetricStore>,
    endpoint: String,
    report_interval: std::time::Duration,
    hmac_key: Option<Vec<u8>>,
    public_key: Option<RsaPublicKey>,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn MetricStore>,
        endpoint: String,
        report_interval: std::time::Duration,
        hmac_key: Option<Vec<u8>>,
        public_key: Option<RsaPublicKey>,
    ) -> Self {
        Self {
            store,
            endpoint,
            report_interval,
            hmac_key,
            public_key,
        }
    }

    /// `request_tx` feeds the worker pool; `done_rx` receives one token per
    /// concluded attempt. A token is primed before the loop starts so the
    /// first tick is not blocked waiting on a worker that hasn't run yet.
    pub async fn run(
        self,
        request_tx: mpsc::Sender<PendingRequest>,
        mut done_rx: mpsc::Receiver<()>,
        shutdown: CancellationToken,
    ) {
        let mut ticker = tokio::time::interval(self.report_interval);

        loop {
            tokio::select! {
                _ = done_rx.recv() => {}
                _ = shutdown.cancelled() => {
                    tracing::info!("dispatcher stopped waiting for done token");
                    return;
                }
            }

            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.cancelled() => {
                    tracing::info!("dispatcher stopped waiting for tick");
                    return;
                }
            }

            match self.build_request().await {
                Ok(Some(request)) => {
                    if request_tx.send(request).await.is_err() {
                        tracing::warn!("worker pool channel closed, dispatcher stopping");
                        return;
                    }
                }
                Ok(None) => {
                    tracing::debug!("nothing to dispatch this tick");
                }
                Err(error) => {
                    tracing::warn!(%error, "failed to build dispatch request");
                }
            }
        }
    }

    async fn build_request(&self) -> anyhow::Result<Option<PendingRequest>> {
        let snapshot = self.store.get_all().await?;
        if snapshot.is_empty() {
            return Ok(None);
        }

        let json = serde_json::to_vec(&snapshot)?;
        let gzipped = telemetrix_wire::gzip::compress(&json)?;

        let mut body = gzipped;
        if let Some(public_key) = &self.public_key {
            if body.len() <= telemetrix_wire::rsa_envelope::max_plaintext_len(public_key) {
                body = telemetrix_wire::rsa_envelope::encrypt(public_key, &body)?;
            } else {
                tracing::warn!(
                    len = body.len(),
                    "payload exceeds RSA key capacity, sending unencrypted"
                );
            }
        }

        let mut headers = vec![
            ("Content-Type", "application/json".to_string()),
            ("Content-Encoding", "gzip".to_string()),
        ];

        if let Some(key) = &self.hmac_key {
            let signature = telemetrix_wire::hmac_sign::sign(&body, key);
            headers.push((HEADER_NAME, signature));
        }

        headers.push(("X-Real-IP", local_ipv4().to_string()));

        Ok(Some(PendingRequest {
            url: format!("http://{}/updates/", self.endpoint),
            body,
            headers,
        }))
    }
}

/// First active non-loopback IPv4 address of the host, falling back to the
/// loopback address if nothing else is found (best-effort, matches the
/// source's tolerance for a misconfigured or isolated host).
fn local_ipv4() -> IpAddr {
    use std::net::UdpSocket;

    UdpSocket::bind("0.0.0.0:0")
        .and_then(|socket| {
            socket.connect("8.8.8.8:80")?;
            socket.local_addr()
        })
        .map(|addr| addr.ip())
        .unwrap_or_else(|_| IpAddr::from([127, 0, 0, 1]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use telemetrix_core::InMemoryStore;

    fn gauge(id: &str, value: f64) -> Metric {
        Metric {
            id: id.to_string(),
            kind: telemetrix_core::Kind::Gauge,
            value: Some(value),
            delta: None,
        }
    }

    #[tokio::test]
    async fn build_request_is_none_for_empty_store() {
        let store: Arc<dyn MetricStore> = Arc::new(InMemoryStore::new());
        let dispatcher = Dispatcher::new(store, "localhost:8080".to_string(), std::time::Duration::from_secs(1), None, None);
        assert!(dispatcher.build_request().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn build_request_signs_body_when_hmac_key_configured() {
        let store = InMemoryStore::new();
        store.create(vec![gauge("temp", 1.0)]).await.unwrap();
        let store: Arc<dyn MetricStore> = Arc::new(store);

        let dispatcher = Dispatcher::new(
            store,
            "localhost:8080".to_string(),
            std::time::Duration::from_secs(1),
            Some(b"secret".to_vec()),
            None,
        );

        let request = dispatcher.build_request().await.unwrap().unwrap();
        let signature = request
            .headers
            .iter()
            .find(|(name, _)| *name == HEADER_NAME)
            .map(|(_, value)| value.clone())
            .unwrap();
        assert!(telemetrix_wire::hmac_sign::verify(&request.body, b"secret", &signature));
    }
}
