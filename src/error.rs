use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::db::StoreError;

/// Message returned for every rejected credential check, whatever the cause.
pub const AUTH_FAILED_MESSAGE: &str =
    "User doesn't exist. Please check your email and password.";

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    InvalidArgument(String),

    #[error("Invalid action: {0}")]
    InvalidAction(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0} already exists")]
    AlreadyExists(&'static str),

    #[error("{}", AUTH_FAILED_MESSAGE)]
    AuthenticationFailed,

    #[error("{0}")]
    Unauthorized(String),

    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::InvalidArgument(_) | Self::InvalidAction(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::AlreadyExists(_) | Self::ConstraintViolation(_) => StatusCode::CONFLICT,
            Self::AuthenticationFailed | Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable code carried in the RPC error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) | Self::InvalidArgument(_) | Self::InvalidAction(_) => {
                "BAD_REQUEST"
            }
            Self::NotFound(_) => "NOT_FOUND",
            Self::AlreadyExists(_) | Self::ConstraintViolation(_) => "CONFLICT",
            Self::AuthenticationFailed | Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Internal(_) => "INTERNAL_SERVER_ERROR",
        }
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Constraint(msg) => Self::ConstraintViolation(msg),
            other => Self::Internal(other.into()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::Internal(e) => {
                error!(error = %e, "internal error");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };
        let body = json!({
            "error": {
                "code": self.code(),
                "message": message,
            }
        });
        (status, Json(body)).into_response()
    }
}
