use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;
use thiserror::Error;

use crate::services::{file_store::StoreError, mailer::MailError};

/// Typed failures of the transfer lifecycle.
///
/// Every operation reports its outcome synchronously through this taxonomy;
/// nothing is queued or retried internally, and none of these terminate the
/// service.
#[derive(Debug, Error)]
pub enum TransferError {
    /// The transfer id is unknown.
    #[error("transfer not found")]
    NotFound,

    /// The transfer reached its terminal state; no operation can revive it.
    #[error("transfer already downloaded")]
    AlreadyConsumed,

    /// The submitted code does not match the current one. Recoverable: the
    /// recipient may retry until the code expires.
    #[error("verification code does not match")]
    InvalidCode,

    /// The code lapsed and was cleared; a new one must be requested.
    #[error("verification code expired, request a new one")]
    Expired,

    /// Download attempted without a live authorization.
    #[error("download not permitted")]
    Forbidden,

    /// The mail collaborator could not deliver a message.
    #[error("mail delivery failed: {0}")]
    DeliveryFailed(#[from] MailError),

    /// The file store could not persist or produce the payload.
    #[error("file storage unavailable: {0}")]
    StorageUnavailable(#[from] StoreError),
}

/// A lightweight wrapper for HTTP-facing errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<TransferError> for AppError {
    fn from(err: TransferError) -> Self {
        let status = match &err {
            TransferError::NotFound => StatusCode::NOT_FOUND,
            TransferError::AlreadyConsumed => StatusCode::GONE,
            TransferError::InvalidCode | TransferError::Expired => StatusCode::UNAUTHORIZED,
            TransferError::Forbidden => StatusCode::FORBIDDEN,
            TransferError::DeliveryFailed(_) => StatusCode::BAD_GATEWAY,
            TransferError::StorageUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        AppError::new(status, err.to_string())
    }
}
