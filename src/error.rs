//! # Error Handling
//!
//! This module defines the error kinds the API can return and how each one is
//! converted into an HTTP response.
//!
//! ## Error kinds and status codes:
//! - **Validation** → 400: bad MIME type, too many files, missing or oversize upload
//! - **ModelUnavailable** → 503: a model failed to load at startup; stays that way
//!   until the process restarts
//! - **NoDetection** → 422: the image contained no face the model could classify
//! - **Internal** → 500: anything else. The underlying error is logged but never
//!   sent to the client, which only sees "<context> failed".
//! - **Config** → 500: configuration could not be loaded
//!
//! ## JSON Response Format:
//! ```json
//! {
//!   "success": false,
//!   "detail": "No face detected in the image. Please upload an image with a clear face.",
//!   "error": {
//!     "type": "no_detection",
//!     "message": "No face detected in the image. Please upload an image with a clear face.",
//!     "timestamp": "2025-01-01T12:00:00Z"
//!   }
//! }
//! ```

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    /// Client sent something the service will not process
    Validation(String),

    /// Model failed to load at startup
    ModelUnavailable(String),

    /// Image was processed but no face could be classified
    NoDetection(String),

    /// Unexpected failure while serving the request.
    /// `context` names the operation ("Audio analysis"); `detail` is for logs only.
    Internal { context: String, detail: String },

    /// Configuration file or environment variable problems
    Config(String),
}

impl AppError {
    pub fn internal(context: impl Into<String>, detail: impl fmt::Display) -> Self {
        AppError::Internal {
            context: context.into(),
            detail: detail.to_string(),
        }
    }

    /// Machine-readable error type used in the response body.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation_error",
            AppError::ModelUnavailable(_) => "model_unavailable",
            AppError::NoDetection(_) => "no_detection",
            AppError::Internal { .. } => "internal_error",
            AppError::Config(_) => "config_error",
        }
    }

    /// The message that is safe to show to API clients.
    pub fn client_message(&self) -> String {
        match self {
            AppError::Validation(msg)
            | AppError::ModelUnavailable(msg)
            | AppError::NoDetection(msg) => msg.clone(),
            AppError::Internal { context, .. } => format!("{} failed", context),
            AppError::Config(_) => "Service configuration error".to_string(),
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Validation(msg) => write!(f, "Validation error: {}", msg),
            AppError::ModelUnavailable(msg) => write!(f, "Model unavailable: {}", msg),
            AppError::NoDetection(msg) => write!(f, "No detection: {}", msg),
            AppError::Internal { context, detail } => write!(f, "{} failed: {}", context, detail),
            AppError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::ModelUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::NoDetection(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Internal { .. } | AppError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        // Full detail stays server-side
        if let AppError::Internal { context, detail } = self {
            tracing::error!(context = %context, error = %detail, "Request failed with internal error");
        }

        let message = self.client_message();
        HttpResponse::build(self.status_code()).json(json!({
            "success": false,
            "detail": message,
            "error": {
                "type": self.kind(),
                "message": message,
                "timestamp": chrono::Utc::now().to_rfc3339()
            }
        }))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::internal("Request", format!("{:#}", err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::internal("File staging", err)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Validation(format!("JSON parsing error: {}", err))
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<actix_multipart::MultipartError> for AppError {
    fn from(err: actix_multipart::MultipartError) -> Self {
        AppError::Validation(format!("Malformed multipart upload: {}", err))
    }
}

pub type AppResult<T> = Result<T, AppError>;
