use std::sync::Arc;
use std::time::Instant;

use rsa::RsaPrivateKey;
use telemetrix_core::AggregationService;
use telemetrix_wire::TrustedSubnet;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) started_at: Instant,
    pub(crate) config: Arc<AppConfig>,
    pub(crate) aggregation: Arc<AggregationService>,
    pub(crate) hmac_key: Option<Arc<Vec<u8>>>,
    pub(crate) private_key: Option<Arc<RsaPrivateKey>>,
    pub(crate) trusted_subnet: Option<Arc<TrustedSubnet>>,
    pub(crate) db_pool: Option<sqlx::PgPool>,
    pub(crate) shutdown: CancellationToken,
}

impl AppState {
    pub(crate) fn new(
        config: AppConfig,
        aggregation: Arc<AggregationService>,
        private_key: Option<RsaPrivateKey>,
        db_pool: Option<sqlx::PgPool>,
        shutdown: CancellationToken,
    ) -> anyhow::Result<Self> {
        let trusted_subnet = config
            .trusted_subnet
            .as_deref()
            .map(TrustedSubnet::parse)
            .transpose()?
            .map(Arc::new);

        Ok(Self {
            started_at: Instant::now(),
            hmac_key: config.hmac_key.clone().map(Arc::new),
            trusted_subnet,
            config: Arc::new(config),
            aggregation,
            private_key: private_key.map(Arc::new),
            db_pool,
            shutdown,
        })
    }
}
