use attend_core::{Error, ErrorKind};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::{debug, error, warn};

/// Translates platform errors into HTTP responses with level-appropriate
/// logging.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        match self.0.kind {
            ErrorKind::Internal | ErrorKind::Upstream => {
                error!(kind = %self.0.kind, details = ?self.0.details, "{}", self.0.message);
            }
            ErrorKind::Unauthenticated | ErrorKind::Forbidden => {
                warn!(kind = %self.0.kind, "{}", self.0.message);
            }
            _ => {
                debug!(kind = %self.0.kind, "{}", self.0.message);
            }
        }

        // Internal details never leave the process on 5xx responses.
        let mut body = self.0.to_api_response();
        if status.is_server_error() {
            body["details"] = serde_json::Value::Null;
        }

        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
