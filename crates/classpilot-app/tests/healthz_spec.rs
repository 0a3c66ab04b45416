use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
    response::Response,
};
use classpilot_server::build_api_router;
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

async fn call(router: Router, method: Method) -> Response {
    let request = Request::builder()
        .method(method)
        .uri("/healthz")
        .body(Body::empty())
        .expect("probe request builds");
    router.oneshot(request).await.expect("router answers")
}

async fn read_json(response: Response) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("probe body readable")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("probe body is JSON")
}

#[tokio::test]
async fn probe_reports_ok_without_state() {
    let response = call(build_api_router(), Method::GET).await;

    assert_eq!(response.status(), StatusCode::OK);
    let is_json = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/json"));
    assert!(is_json, "probe must answer with JSON");
    assert!(response.headers().get("x-request-id").is_none());
    assert_eq!(read_json(response).await, json!({ "status": "ok" }));
}

#[tokio::test]
async fn probe_rejects_writes() {
    let response = call(build_api_router(), Method::DELETE).await;

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    let body = read_json(response).await;
    assert_eq!(body["error"], "method_not_allowed");
    assert_eq!(body["message"], "method `DELETE` not allowed for `/healthz`");
}
