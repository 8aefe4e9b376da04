//! Unified error handling for the payment gateway
//!
//! Core operations return `PaymentError`; this module is the boundary type the
//! HTTP layer maps to status codes, machine-readable error codes and
//! user-facing messages.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes for programmatic handling by API clients
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorCode {
    // Domain errors (4xx)
    #[serde(rename = "NOT_FOUND")]
    NotFound,
    #[serde(rename = "INVALID_NOTIFICATION")]
    InvalidNotification,

    // Infrastructure errors (5xx)
    #[serde(rename = "DATABASE_ERROR")]
    DatabaseError,
    #[serde(rename = "CONFIGURATION_ERROR")]
    ConfigurationError,

    // Processor errors (502, 503)
    #[serde(rename = "PROCESSOR_ERROR")]
    ProcessorError,
    #[serde(rename = "PROCESSOR_AUTH_ERROR")]
    ProcessorAuthError,
    #[serde(rename = "PROCESSOR_UNAVAILABLE")]
    ProcessorUnavailable,

    // Validation
    #[serde(rename = "INVALID_PRIVATE_KEY")]
    InvalidPrivateKey,
    #[serde(rename = "VALIDATION_ERROR")]
    ValidationError,

    #[serde(rename = "INTERNAL_ERROR")]
    InternalError,
}

/// Business-rule errors
#[derive(Debug, Clone)]
pub enum DomainError {
    /// Merchant or order identifier is unknown
    NotFound { entity: String, id: String },
    /// Inbound notification failed signature verification
    InvalidNotification { reason: String },
}

/// Infrastructure-level errors (database, configuration)
#[derive(Debug, Clone)]
pub enum InfrastructureError {
    Database { message: String, is_retryable: bool },
    Configuration { message: String },
}

/// Errors raised by the external payment processor
#[derive(Debug, Clone)]
pub enum ExternalError {
    /// Non-2xx or business failure from preorder/query
    Processor {
        operation: String,
        message: String,
        provider_code: Option<String>,
    },
    /// Token issuance failed
    ProcessorAuth { message: String },
    /// Transport failure before any response arrived
    Unreachable { message: String },
}

/// Input validation errors
#[derive(Debug, Clone)]
pub enum ValidationError {
    Invalid { field: String, reason: String },
    InvalidPrivateKey { reason: String },
}

/// Unified application error type
#[derive(Debug, Clone)]
pub struct AppError {
    pub kind: AppErrorKind,
    pub request_id: Option<String>,
    pub context: Option<String>,
}

#[derive(Debug, Clone)]
pub enum AppErrorKind {
    Domain(DomainError),
    Infrastructure(InfrastructureError),
    External(ExternalError),
    Validation(ValidationError),
}

impl AppError {
    pub fn new(kind: AppErrorKind) -> Self {
        Self {
            kind,
            request_id: None,
            context: None,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Map error to HTTP status code
    pub fn status_code(&self) -> u16 {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::NotFound { .. } => 404,
                DomainError::InvalidNotification { .. } => 401,
            },
            AppErrorKind::Infrastructure(_) => 500,
            AppErrorKind::External(err) => match err {
                ExternalError::Processor { .. } => 502,
                ExternalError::ProcessorAuth { .. } => 502,
                ExternalError::Unreachable { .. } => 503,
            },
            AppErrorKind::Validation(_) => 400,
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> ErrorCode {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::NotFound { .. } => ErrorCode::NotFound,
                DomainError::InvalidNotification { .. } => ErrorCode::InvalidNotification,
            },
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Database { .. } => ErrorCode::DatabaseError,
                InfrastructureError::Configuration { .. } => ErrorCode::ConfigurationError,
            },
            AppErrorKind::External(err) => match err {
                ExternalError::Processor { .. } => ErrorCode::ProcessorError,
                ExternalError::ProcessorAuth { .. } => ErrorCode::ProcessorAuthError,
                ExternalError::Unreachable { .. } => ErrorCode::ProcessorUnavailable,
            },
            AppErrorKind::Validation(err) => match err {
                ValidationError::InvalidPrivateKey { .. } => ErrorCode::InvalidPrivateKey,
                ValidationError::Invalid { .. } => ErrorCode::ValidationError,
            },
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::NotFound { entity, .. } => format!("{} not found", entity),
                DomainError::InvalidNotification { .. } => "Invalid signature".to_string(),
            },
            AppErrorKind::Infrastructure(_) => {
                "Service temporarily unavailable. Please try again later".to_string()
            }
            AppErrorKind::External(err) => match err {
                // The processor's own message is what merchants need to act on
                ExternalError::Processor { message, .. } => message.clone(),
                ExternalError::ProcessorAuth { .. } => {
                    "Could not authenticate with the payment processor".to_string()
                }
                ExternalError::Unreachable { .. } => {
                    "Payment processor is temporarily unavailable. Please try again".to_string()
                }
            },
            AppErrorKind::Validation(err) => match err {
                ValidationError::Invalid { reason, .. } => reason.clone(),
                ValidationError::InvalidPrivateKey { reason } => {
                    format!("Invalid private key format: {}", reason)
                }
            },
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match &self.kind {
            AppErrorKind::Domain(_) => false,
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Database { is_retryable, .. } => *is_retryable,
                InfrastructureError::Configuration { .. } => false,
            },
            AppErrorKind::External(err) => match err {
                ExternalError::Processor { .. } => false,
                ExternalError::ProcessorAuth { .. } => true,
                ExternalError::Unreachable { .. } => true,
            },
            AppErrorKind::Validation(_) => false,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.user_message())
    }
}

impl std::error::Error for AppError {}

impl From<crate::config::ConfigError> for AppError {
    fn from(err: crate::config::ConfigError) -> Self {
        AppError::new(AppErrorKind::Infrastructure(
            InfrastructureError::Configuration {
                message: err.to_string(),
            },
        ))
    }
}

impl From<crate::database::error::DatabaseError> for AppError {
    fn from(err: crate::database::error::DatabaseError) -> Self {
        crate::payments::error::PaymentError::from(err).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::error::PaymentError;

    #[test]
    fn test_not_found_maps_to_404() {
        let err: AppError = PaymentError::not_found("Merchant", 42).into();
        assert_eq!(err.status_code(), 404);
        assert_eq!(err.error_code(), ErrorCode::NotFound);
        assert_eq!(err.user_message(), "Merchant not found");
    }

    #[test]
    fn test_processor_error_keeps_processor_message() {
        let err: AppError =
            PaymentError::processor("payment.preorder", "Merchant frozen", Some("1".into()))
                .into();
        assert_eq!(err.status_code(), 502);
        assert_eq!(err.user_message(), "Merchant frozen");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_storage_errors_hide_details() {
        let err: AppError = PaymentError::StorageError {
            message: "relation \"orders\" does not exist".to_string(),
            retryable: false,
        }
        .into();
        assert_eq!(err.status_code(), 500);
        assert!(!err.user_message().contains("relation"));
    }

    #[test]
    fn test_database_not_found_maps_to_404() {
        let err: AppError = crate::database::error::DatabaseError::not_found("Order", "ORD1").into();
        assert_eq!(err.status_code(), 404);
    }

    #[test]
    fn test_key_error_is_validation() {
        let err: AppError = PaymentError::KeyError {
            message: "unsupported PEM label".to_string(),
        }
        .into();
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.error_code(), ErrorCode::InvalidPrivateKey);
    }
}
