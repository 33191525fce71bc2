use std::time::Duration;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use openai_ox::ErrorResponse;
use poe_ox::PoeRequestError;
use thiserror::Error;

/// Failures surfaced to HTTP clients as OpenAI-style error bodies
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Missing Authorization header")]
    MissingAuthorization,

    #[error("Invalid Authorization header format")]
    InvalidAuthorization,

    #[error("Empty Bearer token")]
    EmptyToken,

    #[error("Invalid request body JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Error from Poe: {0}")]
    Upstream(#[from] PoeRequestError),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Failed to render logs page: {0}")]
    Template(#[from] tera::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingAuthorization | Self::InvalidAuthorization | Self::EmptyToken => {
                StatusCode::UNAUTHORIZED
            }
            Self::InvalidJson(_) => StatusCode::BAD_REQUEST,
            Self::Upstream(e) if e.is_timeout() => StatusCode::GATEWAY_TIMEOUT,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::Template(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// OpenAI `error.type` for this failure
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::MissingAuthorization | Self::InvalidAuthorization | Self::EmptyToken => {
                "authentication_error"
            }
            Self::InvalidJson(_) => "invalid_request_error",
            Self::Upstream(_) | Self::Timeout(_) => "upstream_error",
            Self::Template(_) => "server_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut body = ErrorResponse::new(self.error_type(), self.to_string());
        if let Self::Upstream(e) = &self {
            if let Some(upstream_status) = e.status() {
                body = body.with_code(upstream_status.to_string());
            }
        }
        (status, Json(body)).into_response()
    }
}
