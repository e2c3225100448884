use axum::body::Body;
use axum::http::StatusCode;
use tower::ServiceExt;

use crate::build_app;
use crate::tests::{post, test_state};

#[tokio::test]
async fn unknown_kind_is_rejected() {
    let app = build_app(test_state());
    let response = app.oneshot(post("/update/bogus/x/1", Body::empty())).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
