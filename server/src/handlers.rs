use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::response::Html;
use axum::Json;
use serde::{Deserialize, Serialize};
use telemetrix_core::Metric;

use crate::errors::{map_aggregation_error, map_metric_error, map_json_rejection, ApiError};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub(crate) struct ValueQuery {
    id: String,
    #[serde(rename = "type")]
    kind: String,
}

/// `POST /update/{kind}/{id}/{value}` — single write, path-param form.
pub(crate) async fn update_path(
    State(state): State<AppState>,
    Path((kind, id, value)): Path<(String, String, String)>,
) -> Result<(), ApiError> {
    let metric = Metric::parse(&kind, &id, &value).map_err(map_metric_error)?;
    state
        .aggregation
        .save(metric)
        .await
        .map_err(map_aggregation_error)
}

/// `POST /update/` — single write, JSON body form.
pub(crate) async fn update_json(
    State(state): State<AppState>,
    payload: Result<Json<Metric>, JsonRejection>,
) -> Result<Json<Metric>, ApiError> {
    let Json(metric) = payload.map_err(map_json_rejection)?;
    metric.validate().map_err(map_metric_error)?;
    state
        .aggregation
        .save(metric.clone())
        .await
        .map_err(map_aggregation_error)?;
    let saved = state
        .aggregation
        .get(metric.kind.as_str(), &metric.id)
        .await
        .map_err(map_aggregation_error)?;
    Ok(Json(saved))
}

/// `POST /updates/` — batch write.
pub(crate) async fn updates_batch(
    State(state): State<AppState>,
    payload: Result<Json<Vec<Metric>>, JsonRejection>,
) -> Result<(), ApiError> {
    let Json(batch) = payload.map_err(map_json_rejection)?;
    state
        .aggregation
        .save_batch(batch)
        .await
        .map_err(map_aggregation_error)
}

/// `GET /value/{kind}/{id}` — read single value as text.
pub(crate) async fn value_path(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
) -> Result<String, ApiError> {
    let metric = state.aggregation.get(&kind, &id).await.map_err(map_aggregation_error)?;
    Ok(metric.as_text())
}

#[derive(Debug, Serialize)]
pub(crate) struct ValueResponse {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    delta: Option<i64>,
}

/// `POST /value/` — read single, JSON response.
pub(crate) async fn value_json(
    State(state): State<AppState>,
    payload: Result<Json<ValueQuery>, JsonRejection>,
) -> Result<Json<ValueResponse>, ApiError> {
    let Json(query) = payload.map_err(map_json_rejection)?;
    let metric = state
        .aggregation
        .get(&query.kind, &query.id)
        .await
        .map_err(map_aggregation_error)?;
    Ok(Json(ValueResponse {
        id: metric.id,
        kind: metric.kind.as_str().to_string(),
        value: metric.value,
        delta: metric.delta,
    }))
}

/// `GET /` — HTML listing of all metrics.
pub(crate) async fn list_html(State(state): State<AppState>) -> Result<Html<String>, ApiError> {
    let metrics = state.aggregation.get_all().await.map_err(map_aggregation_error)?;
    let rows: String = metrics
        .iter()
        .map(|metric| format!("<div>{} = {}</div>", metric.id, metric.as_text()))
        .collect();
    Ok(Html(format!(
        "<!DOCTYPE html><html><head><title>Report</title></head><body>{rows}</body></html>"
    )))
}

/// `GET /ping` — SQL connectivity check.
pub(crate) async fn ping(State(state): State<AppState>) -> Result<&'static str, ApiError> {
    match &state.db_pool {
        None => Err(ApiError::internal("no database configured")),
        Some(pool) => sqlx::query("SELECT 1")
            .execute(pool)
            .await
            .map(|_| "pong")
            .map_err(|error| {
                tracing::error!(%error, "ping failed");
                ApiError::internal("database ping failed")
            }),
    }
}
