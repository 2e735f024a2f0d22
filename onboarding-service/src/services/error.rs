use axum::http::StatusCode;
use service_core::error::AppError;
use thiserror::Error;

use crate::services::store::StoreError;

/// Message shared by every login failure so callers cannot probe which
/// emails are registered.
pub const INVALID_CREDENTIALS_MESSAGE: &str = "Invalid email or password";

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Account already exists")]
    AccountAlreadyExists,

    #[error("Account blacklisted")]
    AccountBlacklisted,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("{}", INVALID_CREDENTIALS_MESSAGE)]
    InvalidCredentials,

    #[error("Account not found")]
    AccountNotFound,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Screening service unavailable: {0}")]
    ScreeningUnavailable(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ServiceError {
    /// HTTP-equivalent status for transports that do not go through `AppError`.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::AccountAlreadyExists => StatusCode::CONFLICT,
            ServiceError::AccountBlacklisted => StatusCode::FORBIDDEN,
            ServiceError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ServiceError::InvalidCredentials | ServiceError::InvalidToken => {
                StatusCode::UNAUTHORIZED
            }
            ServiceError::AccountNotFound => StatusCode::NOT_FOUND,
            ServiceError::ScreeningUnavailable(_)
            | ServiceError::Store(_)
            | ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::AccountAlreadyExists => {
                AppError::Conflict(anyhow::anyhow!("Account already exists"))
            }
            ServiceError::AccountBlacklisted => {
                AppError::Forbidden(anyhow::anyhow!("Account blacklisted"))
            }
            ServiceError::InvalidInput(e) => AppError::BadRequest(anyhow::anyhow!(e)),
            ServiceError::InvalidCredentials => {
                AppError::AuthError(anyhow::anyhow!(INVALID_CREDENTIALS_MESSAGE))
            }
            ServiceError::AccountNotFound => AppError::NotFound(anyhow::anyhow!("Account not found")),
            ServiceError::InvalidToken => AppError::Unauthorized(anyhow::anyhow!("Invalid token")),
            ServiceError::ScreeningUnavailable(e) => {
                AppError::InternalError(anyhow::anyhow!("Screening service unavailable: {}", e))
            }
            ServiceError::Store(e) => AppError::DatabaseError(anyhow::Error::new(e)),
            ServiceError::Internal(e) => AppError::InternalError(e),
        }
    }
}
