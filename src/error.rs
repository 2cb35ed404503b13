//! HTTP-facing error type.  Every failure a handler returns is rendered as
//! `{ "success": false, "error": <code>, "message": <text> }`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::guards::{Rejection, RejectionKind};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Method not allowed")]
    MethodNotAllowed,
    #[error("Request body is not valid JSON")]
    InvalidJson,
    #[error("Request body too large")]
    PayloadTooLarge,
    #[error("缺少職位參數")]
    PositionRequired,
    #[error("Unknown position '{0}'")]
    InvalidPosition(String),
    #[error("Unknown difficulty '{0}'")]
    InvalidDifficulty(String),
    #[error("缺少姓名")]
    NameRequired,
    #[error("{0}")]
    AccessDenied(String),
    #[error("{0}")]
    QuotaExceeded(String),
    #[error("Question generation is not configured")]
    ProviderNotConfigured,
    #[error("Failed to generate question")]
    GenerationFailed,
    #[error("Failed to store submission")]
    StorageFailed,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::InvalidJson
            | ApiError::PositionRequired
            | ApiError::InvalidPosition(_)
            | ApiError::InvalidDifficulty(_)
            | ApiError::NameRequired => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::AccessDenied(_) => StatusCode::FORBIDDEN,
            ApiError::QuotaExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::ProviderNotConfigured
            | ApiError::GenerationFailed
            | ApiError::StorageFailed => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::MethodNotAllowed => "method_not_allowed",
            ApiError::InvalidJson => "invalid_json",
            ApiError::PayloadTooLarge => "payload_too_large",
            ApiError::PositionRequired => "position_required",
            ApiError::InvalidPosition(_) => "invalid_position",
            ApiError::InvalidDifficulty(_) => "invalid_difficulty",
            ApiError::NameRequired => "name_required",
            ApiError::AccessDenied(_) => "access_denied",
            ApiError::QuotaExceeded(_) => "quota_exceeded",
            ApiError::ProviderNotConfigured => "provider_not_configured",
            ApiError::GenerationFailed => "generation_failed",
            ApiError::StorageFailed => "storage_failed",
        }
    }
}

impl From<Rejection> for ApiError {
    fn from(r: Rejection) -> Self {
        match r.kind {
            RejectionKind::AccessDenied => ApiError::AccessDenied(r.reason),
            RejectionKind::QuotaExceeded => ApiError::QuotaExceeded(r.reason),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            success: false,
            error: self.code(),
            message: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}
