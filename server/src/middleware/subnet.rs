use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use telemetrix_wire::subnet::parse_real_ip;

use crate::state::AppState;

/// Requires `X-Real-IP` to fall inside the configured trusted CIDR.
pub(crate) async fn subnet_gate(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(subnet) = &state.trusted_subnet else {
        return next.run(request).await;
    };

    let Some(header) = request
        .headers()
        .get("X-Real-IP")
        .and_then(|value| value.to_str().ok())
    else {
        return StatusCode::BAD_REQUEST.into_response();
    };

    let Ok(addr) = parse_real_ip(header) else {
        return StatusCode::BAD_REQUEST.into_response();
    };

    if !subnet.contains(addr) {
        return StatusCode::FORBIDDEN.into_response();
    }

    next.run(request).await
}
