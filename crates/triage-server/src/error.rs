//! Central translation of handler errors into the public error shape.
//!
//! Handlers and pipeline stages return [`ApiError`]. Its response carries an
//! [`ErrorReport`] extension; the terminal [`error_responder`] stage logs the
//! report and, in development mode only, adds the `stack` field to the body.

use std::any::Any;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use triage_core::RuntimeMode;

pub const DEFAULT_ERROR_MESSAGE: &str = "Internal server error";
pub const NOT_FOUND_MESSAGE: &str = "Route not found";

/// Error body: `{ success: false, message, stack? }`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl ErrorBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            stack: None,
        }
    }
}

/// An error surfaced by a route handler or pipeline stage.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ApiError {
    status: StatusCode,
    message: String,
    detail: Option<String>,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            status,
            message: if message.is_empty() {
                DEFAULT_ERROR_MESSAGE.to_string()
            } else {
                message
            },
            detail: None,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn payload_too_large() -> Self {
        Self::new(StatusCode::PAYLOAD_TOO_LARGE, "request entity too large")
    }

    /// Wrap any error as a 500, keeping its full source chain as detail.
    pub fn from_error(err: &(dyn std::error::Error + 'static)) -> Self {
        Self::internal(err.to_string()).with_detail(error_chain(err))
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Full error detail attached to error responses for the responder stage.
#[derive(Clone, Debug)]
pub struct ErrorReport {
    pub status: StatusCode,
    pub message: String,
    pub stack: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let stack = match &self.detail {
            Some(detail) => format!("Error: {}\n{detail}", self.message),
            None => format!("Error: {}", self.message),
        };
        let report = ErrorReport {
            status: self.status,
            message: self.message.clone(),
            stack,
        };
        let mut response = (self.status, Json(ErrorBody::new(self.message))).into_response();
        response.extensions_mut().insert(report);
        response
    }
}

/// Render `err` and its sources, one per line.
pub fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str("\n    caused by: ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}

/// Terminal error stage: log every [`ErrorReport`], expose the stack only in
/// development mode.
pub async fn error_responder(State(mode): State<RuntimeMode>, req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let response = next.run(req).await;

    let Some(report) = response.extensions().get::<ErrorReport>().cloned() else {
        return response;
    };

    tracing::error!(
        status = report.status.as_u16(),
        %method,
        path = %path,
        stack = %report.stack,
        "{}",
        report.message
    );

    if !mode.exposes_error_detail() {
        return response;
    }

    let body = ErrorBody {
        success: false,
        message: report.message,
        stack: Some(report.stack),
    };
    let bytes = match serde_json::to_vec(&body) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(error = %e, "failed to serialize error body");
            return response;
        }
    };
    let (mut parts, _) = response.into_parts();
    parts.headers.remove(header::CONTENT_LENGTH);
    Response::from_parts(parts, Body::from(bytes))
}

/// Uniform 404 for anything no route, static root, or socket endpoint matched.
pub async fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(ErrorBody::new(NOT_FOUND_MESSAGE))).into_response()
}

/// Converts a handler panic into a 500 routed through [`error_responder`].
pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    };
    ApiError::internal(DEFAULT_ERROR_MESSAGE)
        .with_detail(format!("panicked: {detail}"))
        .into_response()
}
