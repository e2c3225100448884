use std::sync::Arc;

use telemetrix_core::{AggregationService, Kind, Metric};
use tonic::{Request, Response, Status};

pub(crate) mod proto {
    tonic::include_proto!("telemetrix");
}

use proto::metric_saver_service_server::MetricSaverService;
use proto::{SaveMetricsRequest, SaveMetricsResponse};

pub(crate) struct MetricSaver {
    aggregation: Arc<AggregationService>,
}

impl MetricSaver {
    pub(crate) fn new(aggregation: Arc<AggregationService>) -> Self {
        Self { aggregation }
    }
}

#[tonic::async_trait]
impl MetricSaverService for MetricSaver {
    async fn update_metrics(
        &self,
        request: Request<SaveMetricsRequest>,
    ) -> Result<Response<SaveMetricsResponse>, Status> {
        let batch = request
            .into_inner()
            .metrics
            .into_iter()
            .map(to_internal)
            .collect::<Result<Vec<Metric>, Status>>()?;

        match self.aggregation.save_batch(batch).await {
            Ok(()) => Ok(Response::new(SaveMetricsResponse { error: String::new() })),
            Err(error) => {
                tracing::error!(%error, "grpc update_metrics failed");
                Err(Status::internal(error.to_string()))
            }
        }
    }
}

fn to_internal(metric: proto::Metric) -> Result<Metric, Status> {
    let kind = Kind::parse(&metric.r#type)
        .map_err(|error| Status::invalid_argument(error.to_string()))?;
    Ok(Metric {
        id: metric.id,
        kind,
        value: metric.value,
        delta: metric.delta,
    })
}
