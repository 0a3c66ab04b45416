use axum::{
    Json,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::assist::{AssistError, AssistErrorKind};

pub(crate) const REQUEST_ID_HEADER: &str = "x-request-id";

/// Fatal conditions while starting or running the HTTP server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("listen address may not be empty")]
    EmptyListenAddr,
    #[error("listen address `{address}` is not a socket address: {source}")]
    InvalidListenAddr {
        address: String,
        #[source]
        source: std::net::AddrParseError,
    },
    #[error("could not bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },
    #[error("bound listener has no local address: {source}")]
    LocalAddr {
        #[source]
        source: std::io::Error,
    },
    #[error("HTTP server failed: {source}")]
    Serve {
        #[source]
        source: std::io::Error,
    },
    #[error("invalid CORS configuration: {reason}")]
    CorsConfig { reason: String },
}

/// Client-visible failure of a single request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ApiError {
    InvalidParameter { field: String, message: String },
    InvalidBody { message: String },
    RequestNotFound,
    RouteNotFound { path: String },
    MethodNotAllowed { method: String, path: String },
    GenerationFailed { message: String },
    Internal,
}

#[derive(Debug, Serialize)]
struct ApiErrorBody {
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_id: Option<String>,
}

impl ApiError {
    pub(crate) fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidParameter { .. } => StatusCode::BAD_REQUEST,
            ApiError::InvalidBody { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::RequestNotFound | ApiError::RouteNotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::GenerationFailed { .. } | ApiError::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub(crate) fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidParameter { .. } => "invalid_parameter",
            ApiError::InvalidBody { .. } => "invalid_body",
            ApiError::RequestNotFound | ApiError::RouteNotFound { .. } => "not_found",
            ApiError::MethodNotAllowed { .. } => "method_not_allowed",
            ApiError::GenerationFailed { .. } => "generation_failed",
            ApiError::Internal => "internal_server_error",
        }
    }

    /// Attaches the caller's `x-request-id`, if any, to the rendered body.
    pub(crate) fn for_request(self, headers: &HeaderMap) -> ApiFailure {
        ApiFailure {
            error: self,
            request_id: request_id(headers),
        }
    }

    fn into_body(self, request_id: Option<String>) -> ApiErrorBody {
        let error = self.code();
        let (message, field) = match self {
            ApiError::InvalidParameter { field, message } => (message, Some(field)),
            ApiError::InvalidBody { message } | ApiError::GenerationFailed { message } => {
                (message, None)
            }
            ApiError::RequestNotFound => {
                ("Request not found".to_string(), Some("request_id".to_string()))
            }
            ApiError::RouteNotFound { path } => (format!("resource `{path}` not found"), None),
            ApiError::MethodNotAllowed { method, path } => {
                (format!("method `{method}` not allowed for `{path}`"), None)
            }
            ApiError::Internal => ("internal server error".to_string(), None),
        };
        ApiErrorBody {
            error,
            message,
            field,
            request_id,
        }
    }
}

impl From<AssistError> for ApiError {
    fn from(error: AssistError) -> Self {
        match error.kind {
            AssistErrorKind::InvalidParameter => ApiError::InvalidParameter {
                field: error.field.unwrap_or_else(|| "body".to_string()),
                message: error.message,
            },
            AssistErrorKind::Internal => {
                tracing::error!(reason = %error.message, "assist backend failed");
                ApiError::Internal
            }
        }
    }
}

#[derive(Debug)]
pub(crate) struct ApiFailure {
    error: ApiError,
    request_id: Option<String>,
}

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        let status = self.error.status();
        (status, Json(self.error.into_body(self.request_id))).into_response()
    }
}

pub(crate) fn request_id(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(REQUEST_ID_HEADER)?.to_str().ok()?.trim();
    (!value.is_empty()).then(|| value.to_string())
}
