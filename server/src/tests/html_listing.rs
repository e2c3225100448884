use axum::body::Body;
use axum::http::StatusCode;
use tower::ServiceExt;

use crate::build_app;
use crate::tests::{body_string, get, post, test_state};

#[tokio::test]
async fn root_lists_every_stored_metric_as_html() {
    let app = build_app(test_state());

    app.clone().oneshot(post("/update/counter/hits/3", Body::empty())).await.unwrap();
    app.clone().oneshot(post("/update/counter/hits/4", Body::empty())).await.unwrap();
    app.clone().oneshot(post("/update/gauge/temp/1.5", Body::empty())).await.unwrap();
    app.clone().oneshot(post("/update/gauge/temp/2.5", Body::empty())).await.unwrap();

    let response = app.oneshot(get("/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_string(response).await;
    assert!(body.starts_with("<!DOCTYPE html><html><head><title>Report</title></head><body>"));
    assert!(body.ends_with("</body></html>"));
    assert!(body.contains("<div>hits = 7</div>"));
    assert!(body.contains("<div>temp = 2.5</div>"));
}
