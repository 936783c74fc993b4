//! HTTP error mapping.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use parley_core::ConfigurationError;
use rootcause::Report;
use serde_json::json;
use std::fmt;

/// Errors returned by the HTTP handlers.
#[derive(Debug)]
pub enum ApiError {
    /// The request named something that does not exist (model, tool,
    /// memory kind).
    BadRequest { details: String },
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadRequest { details } => write!(f, "bad request: {details}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<Report<ConfigurationError>> for ApiError {
    fn from(report: Report<ConfigurationError>) -> Self {
        Self::BadRequest {
            details: report.current_context().to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            Self::BadRequest { details } => {
                tracing::debug!(%details, "rejected request");
                (StatusCode::BAD_REQUEST, details)
            }
        };

        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_error_maps_to_bad_request() {
        let report: Report<ConfigurationError> = ConfigurationError::UnknownTool {
            name: "teleport".to_string(),
        }
        .into();

        let error = ApiError::from(report);
        assert_eq!(error.to_string(), "bad request: unknown tool 'teleport'");
        assert_eq!(error.into_response().status(), StatusCode::BAD_REQUEST);
    }
}
