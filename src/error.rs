//! Application error taxonomy and its HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::fmt;
use thiserror::Error;

use crate::database::error::DatabaseError;
use crate::queue::error::BrokerError;

/// Result type used across handlers, adapters and the worker.
pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AppErrorKind {
    /// Client-supplied data failed a validation rule.
    #[error("{0}")]
    InvalidArgument(String),
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),
    /// Webhook body could not be interpreted by the adapter.
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),
    #[error("Invalid signature")]
    InvalidSignature,
    #[error("Provider {provider} unavailable: {message}")]
    ProviderUnavailable { provider: String, message: String },
    #[error("{entity} '{id}' not found")]
    NotFound { entity: String, id: String },
    #[error("Broker unavailable: {0}")]
    BrokerUnavailable(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Clone)]
pub struct AppError {
    pub kind: AppErrorKind,
    pub context: Option<String>,
}

impl AppError {
    pub fn new(kind: AppErrorKind) -> Self {
        Self {
            kind,
            context: None,
        }
    }

    pub fn invalid_argument<S: Into<String>>(message: S) -> Self {
        Self::new(AppErrorKind::InvalidArgument(message.into()))
    }

    pub fn malformed<S: Into<String>>(message: S) -> Self {
        Self::new(AppErrorKind::MalformedPayload(message.into()))
    }

    pub fn not_found<E: Into<String>, I: Into<String>>(entity: E, id: I) -> Self {
        Self::new(AppErrorKind::NotFound {
            entity: entity.into(),
            id: id.into(),
        })
    }

    pub fn provider_unavailable<P: Into<String>, M: Into<String>>(provider: P, message: M) -> Self {
        Self::new(AppErrorKind::ProviderUnavailable {
            provider: provider.into(),
            message: message.into(),
        })
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::new(AppErrorKind::Internal(message.into()))
    }

    pub fn with_context<S: Into<String>>(mut self, context: S) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn status_code(&self) -> StatusCode {
        match self.kind {
            AppErrorKind::InvalidArgument(_) | AppErrorKind::MalformedPayload(_) => {
                StatusCode::BAD_REQUEST
            }
            // Checkout rewrites this to 400 before rendering.
            AppErrorKind::UnknownProvider(_) => StatusCode::NOT_FOUND,
            AppErrorKind::InvalidSignature | AppErrorKind::Unauthorized => {
                StatusCode::UNAUTHORIZED
            }
            AppErrorKind::NotFound { .. } => StatusCode::NOT_FOUND,
            AppErrorKind::ProviderUnavailable { .. }
            | AppErrorKind::BrokerUnavailable(_)
            | AppErrorKind::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to API clients. Server-side failures never leak details.
    pub fn public_message(&self) -> String {
        match &self.kind {
            AppErrorKind::InvalidArgument(message) => message.clone(),
            AppErrorKind::UnknownProvider(_) => "Unknown provider".to_string(),
            AppErrorKind::MalformedPayload(_) => "Verification failed".to_string(),
            AppErrorKind::InvalidSignature => "Invalid signature".to_string(),
            AppErrorKind::Unauthorized => "Unauthorized".to_string(),
            AppErrorKind::NotFound { entity, .. } => format!("{} not found", entity),
            AppErrorKind::ProviderUnavailable { .. } => "Payment creation failed".to_string(),
            AppErrorKind::BrokerUnavailable(_) | AppErrorKind::Internal(_) => {
                "Internal Server Error".to_string()
            }
        }
    }

    /// Whether the worker should try the job again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            AppErrorKind::ProviderUnavailable { .. }
                | AppErrorKind::BrokerUnavailable(_)
                | AppErrorKind::NotFound { .. }
                | AppErrorKind::Internal(_)
        )
    }

    pub fn is_unknown_provider(&self) -> bool {
        matches!(self.kind, AppErrorKind::UnknownProvider(_))
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.context {
            Some(context) => write!(f, "{} ({})", self.kind, context),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl std::error::Error for AppError {}

impl From<AppErrorKind> for AppError {
    fn from(kind: AppErrorKind) -> Self {
        Self::new(kind)
    }
}

impl From<DatabaseError> for AppError {
    fn from(err: DatabaseError) -> Self {
        if let crate::database::error::DatabaseErrorKind::NotFound { entity, id } = &err.kind {
            return Self::not_found(entity.clone(), id.clone());
        }
        Self::internal(err.to_string())
    }
}

impl From<BrokerError> for AppError {
    fn from(err: BrokerError) -> Self {
        Self::new(AppErrorKind::BrokerUnavailable(err.to_string()))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        } else {
            tracing::debug!("Request rejected: {}", self);
        }
        (status, Json(json!({ "error": self.public_message() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors_map_to_4xx() {
        assert_eq!(
            AppError::invalid_argument("amount must be positive").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::malformed("bad json").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::new(AppErrorKind::InvalidSignature).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::new(AppErrorKind::UnknownProvider("paypal".into())).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::not_found("Transaction", "tx-1").status_code(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_server_errors_hide_details() {
        let err = AppError::provider_unavailable("midtrans", "connection refused to 10.0.0.3");
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.public_message(), "Payment creation failed");

        let err = AppError::internal("pool closed");
        assert!(!err.public_message().contains("pool"));
    }

    #[test]
    fn test_validation_message_is_precise() {
        let err = AppError::invalid_argument("currency must be 3-character ISO code");
        assert_eq!(err.public_message(), "currency must be 3-character ISO code");
    }

    #[test]
    fn test_retryable_kinds() {
        assert!(AppError::provider_unavailable("xendit", "timeout").is_retryable());
        assert!(AppError::not_found("Transaction", "order-1").is_retryable());
        assert!(!AppError::malformed("missing order_id").is_retryable());
        assert!(!AppError::new(AppErrorKind::InvalidSignature).is_retryable());
    }

    #[test]
    fn test_display_includes_context() {
        let err = AppError::internal("boom").with_context("checkout");
        assert_eq!(err.to_string(), "Internal error: boom (checkout)");
    }
}
