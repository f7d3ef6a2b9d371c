//! Error handling for the attendance platform.
//!
//! Every fallible operation in the workspace returns [`Result`]. The error
//! carries a discriminated [`ErrorKind`] that maps one-to-one onto an HTTP
//! status, so the API layer can translate without inspecting messages.
//!
//! Database unique violations (`23505`) are mapped to [`ErrorKind::Conflict`]
//! so idempotent create paths can convert them into "already exists"
//! responses instead of surfacing a 500.

use serde::Serialize;
use thiserror::Error as ThisError;

pub type Result<T> = std::result::Result<T, Error>;

/// Error classification, one variant per externally observable failure mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Missing or ill-formed input.
    Validation,
    /// Missing/invalid credentials, or no face matched above threshold.
    Unauthenticated,
    /// Credentials valid but scope or permission insufficient.
    Forbidden,
    /// Entity or image not present.
    NotFound,
    /// Unique violation on a creation request.
    Conflict,
    /// Face enrolment missing for a verification attempt.
    PreconditionFailed,
    /// No face detected in the submitted frame.
    Unprocessable,
    /// An external collaborator (object store, face service, messaging) failed.
    Upstream,
    /// Unclassified internal failure.
    Internal,
}

impl ErrorKind {
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorKind::Validation => 400,
            ErrorKind::Unauthenticated => 401,
            ErrorKind::Forbidden => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => 409,
            ErrorKind::PreconditionFailed => 412,
            ErrorKind::Unprocessable => 422,
            ErrorKind::Upstream => 502,
            ErrorKind::Internal => 500,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Unauthenticated => "unauthenticated",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::PreconditionFailed => "precondition_failed",
            ErrorKind::Unprocessable => "unprocessable",
            ErrorKind::Upstream => "upstream",
            ErrorKind::Internal => "internal",
        };
        write!(f, "{}", name)
    }
}

/// Main error type for the attendance platform.
#[derive(Debug, ThisError, Clone)]
#[error("{message}")]
pub struct Error {
    pub kind: ErrorKind,
    /// Short human-readable message, safe to surface verbatim.
    pub message: String,
    /// Optional actionable detail (kept out of 5xx responses).
    pub details: Option<String>,
}

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthenticated, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Forbidden, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    pub fn precondition_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PreconditionFailed, message)
    }

    pub fn unprocessable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unprocessable, message)
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Upstream, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    pub fn http_status(&self) -> u16 {
        self.kind.http_status()
    }

    /// Whether the caller may safely retry the same request.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind, ErrorKind::Upstream | ErrorKind::Internal)
    }

    /// JSON body for API responses.
    pub fn to_api_response(&self) -> serde_json::Value {
        serde_json::json!({
            "error": self.message,
            "kind": self.kind,
            "details": self.details,
        })
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => Error::not_found("Record not found"),
            sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
                Error::conflict("Record already exists").with_details(db.message().to_string())
            }
            _ => Error::internal("Database error").with_details(err.to_string()),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::upstream("External service request failed").with_details(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::internal("I/O error").with_details(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_maps_to_http_status() {
        assert_eq!(ErrorKind::Validation.http_status(), 400);
        assert_eq!(ErrorKind::Unauthenticated.http_status(), 401);
        assert_eq!(ErrorKind::Forbidden.http_status(), 403);
        assert_eq!(ErrorKind::NotFound.http_status(), 404);
        assert_eq!(ErrorKind::Conflict.http_status(), 409);
        assert_eq!(ErrorKind::PreconditionFailed.http_status(), 412);
        assert_eq!(ErrorKind::Unprocessable.http_status(), 422);
        assert_eq!(ErrorKind::Upstream.http_status(), 502);
        assert_eq!(ErrorKind::Internal.http_status(), 500);
    }

    #[test]
    fn builder_preserves_details() {
        let err = Error::precondition_failed("Face enrollment missing")
            .with_details("employee 42 has no enrolled reference image");
        assert_eq!(err.kind, ErrorKind::PreconditionFailed);
        assert_eq!(err.http_status(), 412);
        assert!(err.details.unwrap().contains("42"));
    }

    #[test]
    fn retryable_only_for_upstream_and_internal() {
        assert!(Error::upstream("x").is_retryable());
        assert!(Error::internal("x").is_retryable());
        assert!(!Error::conflict("x").is_retryable());
        assert!(!Error::forbidden("x").is_retryable());
    }
}
