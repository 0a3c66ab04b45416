//! Router, handlers and the serve loop.

use std::{future::IntoFuture, net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    Extension, Json, Router,
    body::Body,
    extract::{
        MatchedPath, Path,
        rejection::{JsonRejection, PathRejection},
    },
    http::{HeaderMap, HeaderName, HeaderValue, Method, Request, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use serde_json::Value;
use tokio::{net::TcpListener, sync::watch};
use tower_http::{
    add_extension::AddExtensionLayer,
    classify::ServerErrorsFailureClass,
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::Span;

use crate::assist::{AssistProvider, DocumentKind, FormContext, JobPoll};
use crate::config::{CorsConfig, ServerConfig};
use crate::error::{ApiError, ApiFailure, REQUEST_ID_HEADER, ServerError, request_id};
use crate::shutdown::{self, DRAIN_TIMEOUT};

const HEALTHZ_PATH: &str = "/healthz";
const LECTURE_PLAN_PATH: &str = "/generate-lecture-plan";
const FEEDBACK_PATH: &str = "/generate-feedback";
const STATUS_PATH: &str = "/status/{request_id}";
const ACCEPTED_MESSAGE: &str = "Request accepted. Use the request_id to check status.";
const PROCESSING_MESSAGE: &str = "Request is still being processed";

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum StatusBody {
    Ok,
    Processing {
        #[serde(skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        message: &'static str,
    },
    Success {
        kind: DocumentKind,
        data: String,
        document: Value,
        warnings: Vec<Value>,
    },
}

type ApiStateHandle = Arc<ApiState>;

struct ApiState {
    provider: Arc<dyn AssistProvider>,
}

/// API routes without middleware or shared state; enough for health probes.
pub fn build_api_router() -> Router {
    Router::new()
        .route(HEALTHZ_PATH, get(healthz).fallback(method_not_allowed))
        .route(
            LECTURE_PLAN_PATH,
            post(generate_lecture_plan).fallback(method_not_allowed),
        )
        .route(
            FEEDBACK_PATH,
            post(generate_feedback).fallback(method_not_allowed),
        )
        .route(
            STATUS_PATH,
            get(request_status).fallback(method_not_allowed),
        )
}

/// Full application router: API routes, JSON fallbacks, CORS, tracing and
/// request-id propagation, with `provider` injected as shared state.
pub fn build_app_router(
    config: &ServerConfig,
    provider: Arc<dyn AssistProvider>,
) -> Result<Router, ServerError> {
    let state: ApiStateHandle = Arc::new(ApiState { provider });

    let mut router = build_api_router().fallback(route_not_found);
    if config.cors.enabled {
        router = router.layer(cors_layer(&config.cors)?);
    }

    let request_id_header = HeaderName::from_static(REQUEST_ID_HEADER);
    let trace = TraceLayer::new_for_http()
        .make_span_with(request_span)
        .on_response(log_response)
        .on_failure(log_failure);

    Ok(router
        .layer(trace)
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        .layer(AddExtensionLayer::new(state)))
}

/// Binds `config.listen_addr` and serves until Ctrl+C or SIGTERM, allowing
/// in-flight requests up to ten seconds to finish.
pub async fn serve(
    config: ServerConfig,
    provider: Arc<dyn AssistProvider>,
) -> Result<(), ServerError> {
    let addr = parse_listen_addr(&config.listen_addr)?;
    let app = build_app_router(&config, provider)?;

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind {
            address: addr.to_string(),
            source,
        })?;
    let local_addr = listener
        .local_addr()
        .map_err(|source| ServerError::LocalAddr { source })?;
    tracing::info!(%local_addr, "classpilot server listening");

    let (signal_tx, signal_rx) = watch::channel(None);
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown::announce(signal_tx))
        .into_future();

    tokio::select! {
        result = server => result.map_err(|source| ServerError::Serve { source })?,
        () = shutdown::drain_deadline(signal_rx.clone()) => {
            tracing::warn!(
                seconds = DRAIN_TIMEOUT.as_secs(),
                "drain timeout elapsed; dropping open connections"
            );
        }
    }

    match *signal_rx.borrow() {
        Some(event) => tracing::info!(?event, "server stopped"),
        None => tracing::info!("server stopped without a shutdown signal"),
    }
    Ok(())
}

fn parse_listen_addr(raw: &str) -> Result<SocketAddr, ServerError> {
    let addr = raw.trim();
    if addr.is_empty() {
        return Err(ServerError::EmptyListenAddr);
    }
    addr.parse()
        .map_err(|source| ServerError::InvalidListenAddr {
            address: addr.to_string(),
            source,
        })
}

fn cors_layer(config: &CorsConfig) -> Result<CorsLayer, ServerError> {
    config
        .validate()
        .map_err(|reason| ServerError::CorsConfig { reason })?;

    let origins = if config.allows_any_origin() {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(parse_cors_values(&config.allow_origins, "origin", |raw| {
            HeaderValue::from_str(raw).map_err(|err| err.to_string())
        })?)
    };
    let methods = parse_cors_values(&config.allow_methods, "method", |raw| {
        Method::from_bytes(raw.as_bytes()).map_err(|err| err.to_string())
    })?;
    let allow_headers = parse_cors_values(&config.allow_headers, "header", header_name)?;
    let expose_headers = parse_cors_values(&config.expose_headers, "expose-header", header_name)?;

    Ok(CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(methods)
        .allow_headers(allow_headers)
        .expose_headers(expose_headers)
        .allow_credentials(config.allow_credentials)
        .max_age(Duration::from_secs(config.max_age_secs)))
}

fn parse_cors_values<T>(
    values: &[String],
    what: &str,
    parse: impl Fn(&str) -> Result<T, String>,
) -> Result<Vec<T>, ServerError> {
    values
        .iter()
        .map(|raw| {
            parse(raw.trim()).map_err(|err| ServerError::CorsConfig {
                reason: format!("{what} `{raw}` is invalid: {err}"),
            })
        })
        .collect()
}

fn header_name(raw: &str) -> Result<HeaderName, String> {
    HeaderName::from_bytes(raw.as_bytes()).map_err(|err| err.to_string())
}

fn request_span(request: &Request<Body>) -> Span {
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let id = request_id(request.headers()).unwrap_or_else(|| "-".to_string());
    tracing::info_span!(
        "http.request",
        method = %request.method(),
        path = %path,
        request_id = %id
    )
}

fn log_response(response: &Response, latency: Duration, span: &Span) {
    let latency_ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
    tracing::info!(
        parent: span,
        status = response.status().as_u16(),
        latency_ms,
        "request completed"
    );
}

fn log_failure(error: ServerErrorsFailureClass, latency: Duration, span: &Span) {
    let latency_ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
    tracing::error!(parent: span, latency_ms, %error, "request failed");
}

async fn healthz() -> Json<StatusBody> {
    Json(StatusBody::Ok)
}

async fn generate_lecture_plan(
    Extension(state): Extension<ApiStateHandle>,
    headers: HeaderMap,
    payload: Result<Json<FormContext>, JsonRejection>,
) -> Result<Response, ApiFailure> {
    accept(&state, DocumentKind::LecturePlan, payload).map_err(|err| err.for_request(&headers))
}

async fn generate_feedback(
    Extension(state): Extension<ApiStateHandle>,
    headers: HeaderMap,
    payload: Result<Json<FormContext>, JsonRejection>,
) -> Result<Response, ApiFailure> {
    accept(&state, DocumentKind::Feedback, payload).map_err(|err| err.for_request(&headers))
}

fn accept(
    state: &ApiState,
    kind: DocumentKind,
    payload: Result<Json<FormContext>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(form) = payload.map_err(|rejection| ApiError::InvalidBody {
        message: rejection.body_text(),
    })?;
    let request_id = state.provider.submit(kind, form)?;
    tracing::info!(%request_id, %kind, "generation request accepted");

    let body = StatusBody::Processing {
        request_id: Some(request_id),
        message: ACCEPTED_MESSAGE,
    };
    Ok((StatusCode::ACCEPTED, Json(body)).into_response())
}

async fn request_status(
    Extension(state): Extension<ApiStateHandle>,
    path: Result<Path<String>, PathRejection>,
    headers: HeaderMap,
) -> Result<Json<StatusBody>, ApiFailure> {
    let Path(request_id) = path.map_err(|rejection| {
        ApiError::InvalidParameter {
            field: "request_id".to_string(),
            message: rejection.body_text(),
        }
        .for_request(&headers)
    })?;
    let body = match state.provider.poll(&request_id) {
        JobPoll::NotFound => return Err(ApiError::RequestNotFound.for_request(&headers)),
        JobPoll::Failed { message } => {
            tracing::warn!(%request_id, reason = %message, "delivering failed generation");
            return Err(ApiError::GenerationFailed { message }.for_request(&headers));
        }
        JobPoll::Processing => StatusBody::Processing {
            request_id: None,
            message: PROCESSING_MESSAGE,
        },
        JobPoll::Completed(job) => StatusBody::Success {
            kind: job.kind,
            data: job.text,
            document: job.document,
            warnings: job.warnings,
        },
    };
    Ok(Json(body))
}

async fn route_not_found(uri: Uri, headers: HeaderMap) -> ApiFailure {
    ApiError::RouteNotFound {
        path: uri.path().to_string(),
    }
    .for_request(&headers)
}

async fn method_not_allowed(method: Method, uri: Uri, headers: HeaderMap) -> ApiFailure {
    ApiError::MethodNotAllowed {
        method: method.to_string(),
        path: uri.path().to_string(),
    }
    .for_request(&headers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header;
    use http_body_util::BodyExt;
    use serde_json::json;
    use tower::ServiceExt;

    use crate::assist::{AssistError, CompletedJob};

    struct MockAssistProvider {
        outcome: JobPoll,
    }

    impl AssistProvider for MockAssistProvider {
        fn submit(&self, kind: DocumentKind, form: FormContext) -> Result<String, AssistError> {
            if kind == DocumentKind::Feedback && form.transcript().is_none() {
                return Err(AssistError::invalid_field(
                    "lecture_transcript",
                    "Lecture transcript is required",
                ));
            }
            Ok(format!("{}_0", kind.id_prefix()))
        }

        fn poll(&self, _request_id: &str) -> JobPoll {
            self.outcome.clone()
        }
    }

    struct BrokenAssistProvider;

    impl AssistProvider for BrokenAssistProvider {
        fn submit(&self, _kind: DocumentKind, _form: FormContext) -> Result<String, AssistError> {
            Err(AssistError::internal("backend unavailable"))
        }

        fn poll(&self, _request_id: &str) -> JobPoll {
            JobPoll::NotFound
        }
    }

    fn config_with(cors: CorsConfig) -> ServerConfig {
        ServerConfig {
            listen_addr: "127.0.0.1:8000".to_string(),
            cors,
        }
    }

    fn provider(outcome: JobPoll) -> Arc<dyn AssistProvider> {
        Arc::new(MockAssistProvider { outcome })
    }

    fn router_with(outcome: JobPoll) -> Router {
        build_app_router(&config_with(CorsConfig::default()), provider(outcome))
            .expect("router builds")
    }

    fn form_body(transcript: Option<&str>) -> Value {
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

    fn post_json(uri: &str, body: &Value) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request builds")
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder()
            .method(Method::GET)
            .uri(uri)
            .body(Body::empty())
            .expect("request builds")
    }

    async fn json_body(response: Response) -> Value {
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body readable")
            .to_bytes();
        serde_json::from_slice(bytes.as_ref()).expect("body is JSON")
    }

    #[tokio::test]
    async fn lecture_plan_submission_is_accepted() {
        let response = router_with(JobPoll::Processing)
            .oneshot(post_json(LECTURE_PLAN_PATH, &form_body(None)))
            .await
            .expect("request succeeds");

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(
            json_body(response).await,
            json!({
                "status": "processing",
                "request_id": "lecture_plan_0",
                "message": ACCEPTED_MESSAGE
            })
        );
    }

    #[tokio::test]
    async fn feedback_without_transcript_is_bad_request() {
        let response = router_with(JobPoll::Processing)
            .oneshot(post_json(FEEDBACK_PATH, &form_body(None)))
            .await
            .expect("request succeeds");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let generated_id = response
            .headers()
            .get(REQUEST_ID_HEADER)
            .expect("request id propagated")
            .to_str()
            .expect("request id ascii")
            .to_string();
        let body = json_body(response).await;
        assert_eq!(body["error"], "invalid_parameter");
        assert_eq!(body["message"], "Lecture transcript is required");
        assert_eq!(body["field"], "lecture_transcript");
        assert_eq!(body["request_id"], generated_id.as_str());
    }

    #[tokio::test]
    async fn caller_request_id_is_echoed() {
        let mut request = get_request("/status/feedback_7");
        request
            .headers_mut()
            .insert(REQUEST_ID_HEADER, HeaderValue::from_static("trace-123"));
        let response = router_with(JobPoll::NotFound)
            .oneshot(request)
            .await
            .expect("request succeeds");

        assert_eq!(
            response
                .headers()
                .get(REQUEST_ID_HEADER)
                .expect("request id propagated"),
            "trace-123"
        );
        assert_eq!(json_body(response).await["request_id"], "trace-123");
    }

    #[tokio::test]
    async fn malformed_form_is_unprocessable() {
        let mut body = form_body(Some("transcript"));
        body.as_object_mut()
            .expect("form is an object")
            .remove("grade");
        let response = router_with(JobPoll::Processing)
            .oneshot(post_json(FEEDBACK_PATH, &body))
            .await
            .expect("request succeeds");

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json_body(response).await["error"], "invalid_body");
    }

    #[tokio::test]
    async fn missing_content_type_is_unprocessable() {
        let request = Request::builder()
            .method(Method::POST)
            .uri(LECTURE_PLAN_PATH)
            .body(Body::from(form_body(None).to_string()))
            .expect("request builds");
        let response = router_with(JobPoll::Processing)
            .oneshot(request)
            .await
            .expect("request succeeds");

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn status_maps_every_poll_outcome() {
        let response = router_with(JobPoll::NotFound)
            .oneshot(get_request("/status/lecture_plan_9"))
            .await
            .expect("request succeeds");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = json_body(response).await;
        assert_eq!(body["message"], "Request not found");
        assert_eq!(body["field"], "request_id");

        let response = router_with(JobPoll::Processing)
            .oneshot(get_request("/status/lecture_plan_0"))
            .await
            .expect("request succeeds");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await,
            json!({ "status": "processing", "message": PROCESSING_MESSAGE })
        );

        let completed = JobPoll::Completed(CompletedJob {
            kind: DocumentKind::LecturePlan,
            text: "Overview:\n- A".to_string(),
            document: json!({ "Overview": ["A"] }),
            warnings: Vec::new(),
        });
        let response = router_with(completed)
            .oneshot(get_request("/status/lecture_plan_0"))
            .await
            .expect("request succeeds");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await,
            json!({
                "status": "success",
                "kind": "lecture_plan",
                "data": "Overview:\n- A",
                "document": { "Overview": ["A"] },
                "warnings": []
            })
        );

        let failed = JobPoll::Failed {
            message: "Failed to generate response: upstream".to_string(),
        };
        let response = router_with(failed)
            .oneshot(get_request("/status/feedback_3"))
            .await
            .expect("request succeeds");
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(response).await;
        assert_eq!(body["error"], "generation_failed");
        assert_eq!(body["message"], "Failed to generate response: upstream");
    }

    #[tokio::test]
    async fn undecodable_request_id_renders_json() {
        let response = router_with(JobPoll::Processing)
            .oneshot(get_request("/status/%FF"))
            .await
            .expect("request succeeds");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error"], "invalid_parameter");
        assert_eq!(body["field"], "request_id");
        assert!(body["request_id"].is_string());
    }

    #[tokio::test]
    async fn backend_failure_hides_details() {
        let router = build_app_router(
            &config_with(CorsConfig::default()),
            Arc::new(BrokenAssistProvider),
        )
        .expect("router builds");
        let response = router
            .oneshot(post_json(LECTURE_PLAN_PATH, &form_body(None)))
            .await
            .expect("request succeeds");

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(response).await;
        assert_eq!(body["error"], "internal_server_error");
        assert_eq!(body["message"], "internal server error");
    }

    #[tokio::test]
    async fn unknown_route_and_wrong_method_render_json() {
        let response = router_with(JobPoll::Processing)
            .oneshot(get_request("/nope"))
            .await
            .expect("request succeeds");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["error"], "not_found");

        let response = router_with(JobPoll::Processing)
            .oneshot(get_request(LECTURE_PLAN_PATH))
            .await
            .expect("request succeeds");
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(json_body(response).await["error"], "method_not_allowed");
    }

    #[tokio::test]
    async fn cors_disabled_yields_no_headers() {
        let mut request = get_request(HEALTHZ_PATH);
        request.headers_mut().insert(
            header::ORIGIN,
            HeaderValue::from_static("http://example.com"),
        );
        let response = router_with(JobPoll::Processing)
            .oneshot(request)
            .await
            .expect("request succeeds");

        assert_eq!(response.status(), StatusCode::OK);
        assert!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .is_none()
        );
    }

    #[tokio::test]
    async fn wildcard_origin_answers_preflight() {
        let cors = CorsConfig {
            enabled: true,
            allow_origins: vec!["*".to_string()],
            ..CorsConfig::default()
        };
        let router = build_app_router(&config_with(cors), provider(JobPoll::Processing))
            .expect("router builds");

        let response = router
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri(LECTURE_PLAN_PATH)
                    .header(header::ORIGIN, "http://localhost:8501")
                    .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                    .body(Body::empty())
                    .expect("request builds"),
            )
            .await
            .expect("preflight succeeds");

        assert!(response.status().is_success());
        assert_eq!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .expect("origin header present"),
            "*"
        );
        let methods = response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_METHODS)
            .expect("allow-methods present")
            .to_str()
            .expect("allow-methods ascii");
        assert!(methods.contains("POST"), "POST must be allowed: {methods}");
    }

    #[tokio::test]
    async fn explicit_origin_gets_credentials() {
        let origin = "http://localhost:8501";
        let cors = CorsConfig {
            enabled: true,
            allow_origins: vec![origin.to_string()],
            allow_credentials: true,
            ..CorsConfig::default()
        };
        let router = build_app_router(&config_with(cors), provider(JobPoll::Processing))
            .expect("router builds");

        let mut request = get_request(HEALTHZ_PATH);
        request
            .headers_mut()
            .insert(header::ORIGIN, HeaderValue::from_static(origin));
        let response = router.oneshot(request).await.expect("request succeeds");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .expect("allow-origin present"),
            origin
        );
        assert_eq!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS)
                .expect("allow-credentials present"),
            "true"
        );
    }

    #[test]
    fn invalid_cors_settings_fail_router_construction() {
        let wildcard_with_credentials = CorsConfig {
            enabled: true,
            allow_origins: vec!["*".to_string()],
            allow_credentials: true,
            ..CorsConfig::default()
        };
        assert!(matches!(
            build_app_router(
                &config_with(wildcard_with_credentials),
                provider(JobPoll::Processing)
            ),
            Err(ServerError::CorsConfig { .. })
        ));

        let bad_method = CorsConfig {
            enabled: true,
            allow_origins: vec!["http://a.test".to_string()],
            allow_methods: vec!["GE T".to_string()],
            ..CorsConfig::default()
        };
        assert!(matches!(
            build_app_router(&config_with(bad_method), provider(JobPoll::Processing)),
            Err(ServerError::CorsConfig { .. })
        ));
    }

    #[test]
    fn listen_addr_is_validated() {
        assert!(matches!(
            parse_listen_addr("   "),
            Err(ServerError::EmptyListenAddr)
        ));
        assert!(matches!(
            parse_listen_addr("localhost"),
            Err(ServerError::InvalidListenAddr { .. })
        ));
        let addr = parse_listen_addr(" 127.0.0.1:8000 ").expect("valid addr");
        assert_eq!(addr.port(), 8000);
    }
}
