use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use classpilot_app::services::{AssistService, CompletionClient, CompletionError, JobTracker};
use classpilot_server::{CorsConfig, ServerConfig, build_app_router};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tokio::sync::Semaphore;
use tower::ServiceExt;

const PLAN_TEXT: &str = "Overview:\n- A\nLearning Objectives:\n- B\n";

/// Completion stub that blocks until the test hands out a permit.
struct GatedClient {
    gate: Arc<Semaphore>,
    reply: Result<&'static str, u16>,
}

#[async_trait]
impl CompletionClient for GatedClient {
    async fn complete(
        &self,
        _system_instruction: &str,
        _prompt: &str,
        _model: &str,
    ) -> Result<String, CompletionError> {
        let permit = self.gate.acquire().await.expect("gate stays open");
        permit.forget();
        match self.reply {
            Ok(text) => Ok(text.to_string()),
            Err(status) => Err(CompletionError::HttpStatus {
                status,
                body: "denied".to_string(),
            }),
        }
    }
}

struct Harness {
    router: Router,
    tracker: Arc<JobTracker>,
    gate: Arc<Semaphore>,
}

fn harness(reply: Result<&'static str, u16>) -> Harness {
    let gate = Arc::new(Semaphore::new(0));
    let tracker = Arc::new(JobTracker::new());
    let client = GatedClient {
        gate: Arc::clone(&gate),
        reply,
    };
    let service = AssistService::new(Arc::clone(&tracker), Arc::new(client), "gpt-3.5-turbo");
    let config = ServerConfig {
        listen_addr: "127.0.0.1:0".to_string(),
        cors: CorsConfig::default(),
    };
    let router = build_app_router(&config, Arc::new(service)).expect("router builds");
    Harness {
        router,
        tracker,
        gate,
    }
}

fn form(transcript: Option<&str>) -> Value {
    json!({
        "grade": "8th",
        "topic": "Algebra - Linear Equations",
        "country": "United States",
        "location": "Santa Fe Indian School",
        "number_of_students": "25",
        "teaching_tenure_years": "5 years",
        "percentage_of_girls": "48%",
        "percentage_of_boys": "52%",
        "attendance_percentage": "92%",
        "grade_level_competence": "mixed",
        "classroom_challenges": "engagement",
        "lecture_transcript": transcript,
    })
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router
        .clone()
        .oneshot(request)
        .await
        .expect("router responds");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("response body must be readable")
        .to_bytes();
    let value = serde_json::from_slice(bytes.as_ref()).expect("response must be valid JSON");
    (status, value)
}

async fn submit(router: &Router, path: &str, body: &Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(Method::POST)
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request builder should not fail");
    send(router, request).await
}

async fn status(router: &Router, request_id: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(Method::GET)
        .uri(format!("/status/{request_id}"))
        .body(Body::empty())
        .expect("request builder should not fail");
    send(router, request).await
}

/// Polls until the request leaves `processing`.
async fn wait_for_terminal(router: &Router, request_id: &str) -> (StatusCode, Value) {
    for _ in 0..200 {
        let (code, body) = status(router, request_id).await;
        if body["status"] != "processing" {
            return (code, body);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("request {request_id} never finished");
}

#[tokio::test]
async fn lecture_plan_lifecycle_is_observed_once() {
    let h = harness(Ok(PLAN_TEXT));

    let (code, accepted) = submit(&h.router, "/generate-lecture-plan", &form(None)).await;
    assert_eq!(code, StatusCode::ACCEPTED);
    assert_eq!(accepted["status"], "processing");
    assert_eq!(
        accepted["message"],
        "Request accepted. Use the request_id to check status."
    );
    let request_id = accepted["request_id"]
        .as_str()
        .expect("request_id is a string")
        .to_string();
    assert!(request_id.starts_with("lecture_plan_"));

    let (code, pending) = status(&h.router, &request_id).await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(
        pending,
        json!({ "status": "processing", "message": "Request is still being processed" })
    );

    h.gate.add_permits(1);
    let (code, done) = wait_for_terminal(&h.router, &request_id).await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(done["status"], "success");
    assert_eq!(done["data"], PLAN_TEXT);
    assert_eq!(done["document"]["Overview"], json!(["A"]));
    assert_eq!(done["document"]["Learning Objectives"], json!(["B"]));
    assert_eq!(done["document"]["Assessment"], json!([]));
    assert_eq!(done["warnings"].as_array().map(Vec::len), Some(3));

    let (code, gone) = status(&h.router, &request_id).await;
    assert_eq!(code, StatusCode::NOT_FOUND);
    assert_eq!(gone["error"], "not_found");
    assert_eq!(gone["message"], "Request not found");
    assert_eq!(gone["field"], "request_id");
    assert!(h.tracker.is_empty());
}

#[tokio::test]
async fn feedback_without_transcript_registers_no_job() {
    let h = harness(Ok(PLAN_TEXT));

    for transcript in [None, Some(""), Some("   \n")] {
        let (code, body) = submit(&h.router, "/generate-feedback", &form(transcript)).await;
        assert_eq!(code, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_parameter");
        assert_eq!(body["message"], "Lecture transcript is required");
        assert_eq!(body["field"], "lecture_transcript");
    }
    assert!(h.tracker.is_empty(), "rejected submissions must not register");
}

#[tokio::test]
async fn failed_generation_is_reported_once() {
    let h = harness(Err(401));

    let (code, accepted) = submit(
        &h.router,
        "/generate-feedback",
        &form(Some("We solved 2x + 3 = 7 together.")),
    )
    .await;
    assert_eq!(code, StatusCode::ACCEPTED);
    let request_id = accepted["request_id"]
        .as_str()
        .expect("request_id is a string")
        .to_string();
    assert!(request_id.starts_with("feedback_"));

    h.gate.add_permits(1);
    let (code, failed) = wait_for_terminal(&h.router, &request_id).await;
    assert_eq!(code, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(failed["error"], "generation_failed");
    let message = failed["message"].as_str().expect("message is a string");
    assert!(
        message.starts_with("Failed to generate response:"),
        "unexpected message: {message}"
    );
    assert!(message.contains("401"));

    let (code, _) = status(&h.router, &request_id).await;
    assert_eq!(code, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn concurrent_submissions_get_distinct_ids() {
    let h = harness(Ok(PLAN_TEXT));

    let mut ids = Vec::new();
    for _ in 0..5 {
        let (code, accepted) = submit(&h.router, "/generate-lecture-plan", &form(None)).await;
        assert_eq!(code, StatusCode::ACCEPTED);
        ids.push(accepted["request_id"].as_str().expect("id").to_string());
    }
    let mut unique = ids.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), ids.len());
    assert_eq!(h.tracker.processing_count(), 5);

    for id in &ids {
        let (code, body) = status(&h.router, id).await;
        assert_eq!(code, StatusCode::OK, "fresh request {id} must not be missing");
        assert_eq!(body["status"], "processing");
    }
}

#[tokio::test]
async fn malformed_body_is_unprocessable() {
    let h = harness(Ok(PLAN_TEXT));
    let request = Request::builder()
        .method(Method::POST)
        .uri("/generate-lecture-plan")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .expect("request builder should not fail");

    let (code, body) = send(&h.router, request).await;
    assert_eq!(code, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "invalid_body");
    assert!(h.tracker.is_empty());
}
