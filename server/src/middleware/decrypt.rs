use axum::body::{to_bytes, Body};
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::state::AppState;

const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

/// Attempts RSA-PKCS#1 v1.5 decryption of the request body with the
/// configured private key. Failure is not fatal: the original bytes are
/// forwarded unmodified, matching the documented fragility of whole-message
/// RSA encryption.
pub(crate) async fn decrypt_body(
    axum::extract::State(state): axum::extract::State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(private_key) = &state.private_key else {
        return next.run(request).await;
    };

    let (parts, body) = request.into_parts();
    let bytes = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(error) => {
            tracing::warn!(%error, "failed to buffer request body for decryption");
            return axum::http::StatusCode::BAD_REQUEST.into_response();
        }
    };

    let request = match telemetrix_wire::rsa_envelope::decrypt(private_key, &bytes) {
        Ok(plaintext) => Request::from_parts(parts, Body::from(plaintext)),
        Err(error) => {
            tracing::debug!(%error, "decryption failed, forwarding original body");
            Request::from_parts(parts, Body::from(bytes))
        }
    };

    next.run(request).await
}
