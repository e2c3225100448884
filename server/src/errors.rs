use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{BoxError, Json};
use serde::Serialize;
use telemetrix_core::{AggregationError, MetricError, StoreError};

#[derive(Debug, Serialize)]
struct ErrorResponse {
    code: &'static str,
    message: String,
}

#[derive(Debug)]
pub(crate) struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "invalid_argument",
            message: message.into(),
        }
    }

    pub(crate) fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            code: "not_found",
            message: message.into(),
        }
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "internal",
            message: message.into(),
        }
    }

    pub(crate) fn service_unavailable(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            code: "not_ready",
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                code: self.code,
                message: self.message,
            }),
        )
            .into_response()
    }
}

/// Malformed JSON is reported as a server error rather than a client error,
/// preserving the behavior this system was distilled from.
pub(crate) fn map_json_rejection(rejection: JsonRejection) -> ApiError {
    tracing::warn!(error = %rejection, "malformed json body");
    ApiError::internal("malformed json body")
}

pub(crate) fn map_metric_error(error: MetricError) -> ApiError {
    ApiError::invalid_argument(error.to_string())
}

pub(crate) fn map_aggregation_error(error: AggregationError) -> ApiError {
    match error {
        AggregationError::NotFound { .. } => ApiError::not_found(error.to_string()),
        AggregationError::Metric(error) => map_metric_error(error),
        AggregationError::Store(error) => map_store_error(error),
    }
}

pub(crate) fn map_store_error(error: StoreError) -> ApiError {
    match error {
        StoreError::Metric(error) => map_metric_error(error),
        other => {
            tracing::error!(error = %other, "store error");
            ApiError::internal("internal storage error")
        }
    }
}

pub(crate) async fn handle_middleware_error(error: BoxError) -> Response {
    if error.is::<tower::timeout::error::Elapsed>() {
        return ApiError::service_unavailable("request timed out").into_response();
    }
    tracing::error!(%error, "middleware error");
    ApiError::internal("internal middleware error").into_response()
}
