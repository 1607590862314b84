//! API error mapping
//!
//! Handlers return `ApiResult<T>`; every `mixcrate_common::Error` kind maps
//! to a status code. Unknown failures become a 500 carrying a correlation id
//! and no internals.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::error;
use uuid::Uuid;

use mixcrate_common::Error;

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug)]
pub struct ApiError(pub Error);

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    correlation_id: Option<String>,
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self.0 {
            Error::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                ErrorBody { error: msg.clone(), correlation_id: None },
            ),
            Error::InvalidInput(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorBody { error: msg.clone(), correlation_id: None },
            ),
            Error::Conflict(msg) => (
                StatusCode::CONFLICT,
                ErrorBody { error: msg.clone(), correlation_id: None },
            ),
            Error::External(msg) => (
                StatusCode::BAD_GATEWAY,
                ErrorBody { error: msg.clone(), correlation_id: None },
            ),
            Error::Timeout(msg) => (
                StatusCode::GATEWAY_TIMEOUT,
                ErrorBody { error: msg.clone(), correlation_id: None },
            ),
            Error::Extractor(msg) => (
                StatusCode::BAD_GATEWAY,
                ErrorBody { error: msg.clone(), correlation_id: None },
            ),
            Error::Database(_) | Error::Io(_) | Error::Config(_) | Error::Internal(_) => {
                let correlation_id = Uuid::new_v4().to_string();
                error!(correlation_id, "Internal error: {}", self.0);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody {
                        error: "Internal error".to_string(),
                        correlation_id: Some(correlation_id),
                    },
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        let cases = [
            (Error::NotFound("x".into()), StatusCode::NOT_FOUND),
            (Error::InvalidInput("x".into()), StatusCode::BAD_REQUEST),
            (Error::Conflict("x".into()), StatusCode::CONFLICT),
            (Error::External("x".into()), StatusCode::BAD_GATEWAY),
            (Error::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            let response = ApiError(err).into_response();
            assert_eq!(response.status(), status);
        }
    }
}
