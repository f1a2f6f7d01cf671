//! Errors returned to API callers.
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

/// A request that could not be served.
#[derive(Debug, Error)]
pub enum HttpError {
    /// No endpoint with this method matches the path.
    #[error("API endpoint not found")]
    NotFound,
    /// Body announced or looked like JSON but did not parse as an object.
    #[error("Invalid JSON in request body")]
    InvalidJson,
    /// Body in no format we understand.
    #[error("Invalid request format. Expected JSON")]
    InvalidFormat,
    /// Anything else.
    #[error("Internal server Error")]
    Internal(String),
}

impl HttpError {
    /// Wrap an unexpected failure, keeping its cause chain as detail.
    #[must_use]
    pub fn internal(err: &anyhow::Error) -> Self {
        Self::Internal(format!("{err:#}"))
    }
}

impl ResponseError for HttpError {
    fn status_code(&self) -> StatusCode {
        match *self {
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::InvalidJson | Self::InvalidFormat => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match *self {
            Self::Internal(ref detail) => json!({
                "status": "error",
                "message": self.to_string(),
                "error_detail": detail,
            }),
            Self::NotFound | Self::InvalidJson | Self::InvalidFormat => {
                json!({ "status": "error", "error": self.to_string() })
            }
        };
        HttpResponse::build(self.status_code()).json(body)
    }
}
