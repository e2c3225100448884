use axum::body::{to_bytes, Body};
use axum::http::{header, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

fn is_json_or_html(content_type: &str) -> bool {
    content_type.starts_with("application/json") || content_type.starts_with("text/html")
}

/// Decodes a gzip-encoded request body when the client declares it, and
/// gzip-encodes the response body when the client advertised acceptance.
pub(crate) async fn gzip_codec(request: Request<Body>, next: Next) -> Response {
    let wants_response_gzip = request
        .headers()
        .get(header::ACCEPT_ENCODING)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.contains("gzip"));

    let request_is_gzip = request
        .headers()
        .get(header::CONTENT_ENCODING)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.contains("gzip"));
    let content_type = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
        .to_string();

    let request = if request_is_gzip && is_json_or_html(&content_type) {
        let (parts, body) = request.into_parts();
        match to_bytes(body, MAX_BODY_BYTES).await {
            Ok(bytes) => match telemetrix_wire::gzip::decompress(&bytes) {
                Ok(plain) => Request::from_parts(parts, Body::from(plain)),
                Err(error) => {
                    tracing::debug!(%error, "gzip decode failed, forwarding original body");
                    Request::from_parts(parts, Body::from(bytes))
                }
            },
            Err(error) => {
                tracing::warn!(%error, "failed to buffer request body for gzip decode");
                return axum::http::StatusCode::BAD_REQUEST.into_response();
            }
        }
    } else {
        request
    };

    let response = next.run(request).await;
    if !wants_response_gzip {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(error) => {
            tracing::warn!(%error, "failed to buffer response body for gzip encode");
            return Response::from_parts(parts, Body::empty());
        }
    };
    match telemetrix_wire::gzip::compress(&bytes) {
        Ok(compressed) => {
            parts
                .headers
                .insert(header::CONTENT_ENCODING, header::HeaderValue::from_static("gzip"));
            Response::from_parts(parts, Body::from(compressed))
        }
        Err(error) => {
            tracing::warn!(%error, "gzip encode failed, sending uncompressed body");
            Response::from_parts(parts, Body::from(bytes))
        }
    }
}
