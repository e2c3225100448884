use axum::body::Body;
use axum::http::StatusCode;
use tower::ServiceExt;

use crate::build_app;
use crate::tests::{body_string, get, post, test_state};

#[tokio::test]
async fn batch_accumulates_duplicate_keys_within_one_request() {
    let app = build_app(test_state());

    let body = r#"[{"id":"k","type":"counter","delta":1},{"id":"k","type":"counter","delta":2}]"#;
    let response = app.clone().oneshot(post("/updates/", Body::from(body))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let read = app.oneshot(get("/value/counter/k")).await.unwrap();
    assert_eq!(body_string(read).await, "3");
}
