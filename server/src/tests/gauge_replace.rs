use axum::body::Body;
use axum::http::StatusCode;
use tower::ServiceExt;

use crate::build_app;
use crate::tests::{body_string, get, post, test_state};

#[tokio::test]
async fn gauge_replaces_on_second_write() {
    let app = build_app(test_state());

    app.clone().oneshot(post("/update/gauge/temp/1.5", Body::empty())).await.unwrap();
    app.clone().oneshot(post("/update/gauge/temp/2.5", Body::empty())).await.unwrap();

    let read = app.oneshot(get("/value/gauge/temp")).await.unwrap();
    assert_eq!(read.status(), StatusCode::OK);
    assert_eq!(body_string(read).await, "2.5");
}
