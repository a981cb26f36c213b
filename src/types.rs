// Shared error type for HTTP handlers

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::payment::{FacilitatorError, IdentityError};
use crate::wallet::WalletError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Wallet service error: {0}")]
    Wallet(#[from] WalletError),

    #[error("Facilitator error: {0}")]
    Facilitator(#[from] FacilitatorError),

    #[error("Payer identity unavailable: {0}")]
    Identity(#[from] IdentityError),

    #[error("Invalid input")]
    InvalidInput(serde_json::Value),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type AppResult<T> = std::result::Result<T, AppError>;

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Wallet(WalletError::RateLimited(_)) => StatusCode::TOO_MANY_REQUESTS,
            AppError::Wallet(_) | AppError::Facilitator(_) => StatusCode::BAD_GATEWAY,
            AppError::Identity(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::InvalidInput(serde_json::to_value(&errors).unwrap_or_default())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            AppError::InvalidInput(details) => serde_json::json!({
                "error": "Invalid input",
                "details": details,
            }),
            AppError::Forbidden(message) | AppError::NotFound(message) => {
                serde_json::json!({ "error": message })
            }
            other => serde_json::json!({
                "error": other.to_string(),
            }),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            AppError::Wallet(WalletError::RateLimited("slow down".into())).status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            AppError::InvalidInput(serde_json::Value::Null).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::Forbidden("testnet only".into()).status(),
            StatusCode::FORBIDDEN
        );
    }
}
