//! HTTP error responses.
//!
//! Every failure a handler returns becomes a JSON body `{code, message}` with
//! a matching status. The message is safe to show to the client; the cause
//! behind a server error is logged and never serialized.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::fmt;

/// Code for requests rejected before any work was done
pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
/// Code for tickets the model could not classify
pub const CLASSIFICATION_FAILED: &str = "CLASSIFICATION_FAILED";
/// Code for unknown tickets
pub const NOT_FOUND: &str = "NOT_FOUND";
/// Code for store or infrastructure failures
pub const INTERNAL_ERROR: &str = "INTERNAL_SERVER_ERROR";

/// A handler failure with its HTTP mapping
///
/// ```ignore
/// async fn handler(State(state): State<AppState>) -> Result<Json<Body>, AppError> {
///     let row = state.records.mark_processed(id, classification).await
///         .map_err(|_| AppError::not_found("Ticket not found"))?;
///     Ok(Json(row.into()))
/// }
/// ```
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
    cause: Option<anyhow::Error>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    code: &'a str,
    message: &'a str,
}

impl AppError {
    fn with_status(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            cause: None,
        }
    }

    /// Records the underlying cause for the server log
    #[must_use]
    pub fn caused_by(mut self, cause: impl Into<anyhow::Error>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    /// 422: the request body is malformed or out of bounds
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::UNPROCESSABLE_ENTITY, VALIDATION_ERROR, message)
    }

    /// 422: the request was valid but the model output was not
    #[must_use]
    pub fn unprocessable(message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::UNPROCESSABLE_ENTITY, CLASSIFICATION_FAILED, message)
    }

    /// 404: no such ticket
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::NOT_FOUND, NOT_FOUND, message)
    }

    /// 500: the store or another dependency failed
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR, message)
    }

    /// Response status
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Stable machine-readable code
    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.code
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_ref()
            .map(|cause| cause.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            let cause = self.cause.as_ref().map(ToString::to_string);
            tracing::error!(
                status = %self.status,
                code = self.code,
                cause = cause.as_deref().unwrap_or("none"),
                "{}",
                self.message
            );
        }

        let body = Json(ErrorBody {
            code: self.code,
            message: &self.message,
        });
        (self.status, body).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(cause: anyhow::Error) -> Self {
        Self::internal("Internal service error").caused_by(cause)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_code() {
        let err = AppError::not_found("Ticket not found");
        assert_eq!(err.to_string(), "[NOT_FOUND] Ticket not found");
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn both_unprocessable_kinds_share_a_status() {
        let invalid = AppError::validation("too short");
        let unclassified = AppError::unprocessable("Ticket could not be processed");

        assert_eq!(invalid.status(), unclassified.status());
        assert_ne!(invalid.code(), unclassified.code());
    }

    #[test]
    fn anyhow_becomes_internal_with_cause() {
        let err = AppError::from(anyhow::anyhow!("pool closed"));

        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            std::error::Error::source(&err).map(ToString::to_string),
            Some("pool closed".to_string())
        );
    }
}
