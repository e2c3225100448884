use axum::body::{to_bytes, Body};
use axum::extract::State;
use axum::http::{HeaderValue, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use telemetrix_wire::hmac_sign::{self, HEADER_NAME};

use crate::state::AppState;

const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

/// Verifies `HashSHA256` against the *raw* bytes as received on the wire —
/// before gzip decoding or RSA decryption touch the body, mirroring how the
/// agent signs the fully-encoded request it actually sends. Also wraps the
/// response so the same header carries a signature over the final response
/// body (post gzip-encoding).
pub(crate) async fn hmac_guard(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(key) = &state.hmac_key else {
        return next.run(request).await;
    };

    let header = request
        .headers()
        .get(HEADER_NAME)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    let (parts, body) = request.into_parts();
    let bytes = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(error) => {
            tracing::warn!(%error, "failed to buffer request body for hmac verification");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    if let Some(header) = header {
        if !header.trim().is_empty() && !hmac_sign::verify(&bytes, key, &header) {
            return StatusCode::BAD_REQUEST.into_response();
        }
    }

    let request = Request::from_parts(parts, Body::from(bytes));
    let response = next.run(request).await;

    let (mut parts, body) = response.into_parts();
    let response_bytes = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(error) => {
            tracing::warn!(%error, "failed to buffer response body for hmac signing");
            return Response::from_parts(parts, Body::empty());
        }
    };
    let signature = hmac_sign::sign(&response_bytes, key);
    if let Ok(value) = HeaderValue::from_str(&signature) {
        parts.headers.insert(HEADER_NAME, value);
    }
    Response::from_parts(parts, Body::from(response_bytes))
}
