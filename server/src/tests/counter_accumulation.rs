use axum::body::Body;
use axum::http::StatusCode;
use tower::ServiceExt;

use crate::build_app;
use crate::tests::{body_string, get, post, test_state};

#[tokio::test]
async fn counter_accumulates_across_writes() {
    let app = build_app(test_state());

    let first = app.clone().oneshot(post("/update/counter/hits/3", Body::empty())).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = app.clone().oneshot(post("/update/counter/hits/4", Body::empty())).await.unwrap();
    assert_eq!(second.status(), StatusCode::OK);

    let read = app.oneshot(get("/value/counter/hits")).await.unwrap();
    assert_eq!(read.status(), StatusCode::OK);
    assert_eq!(body_string(read).await, "7");
}
