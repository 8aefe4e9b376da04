use thiserror::Error;

pub type PaymentResult<T> = Result<T, PaymentError>;

#[derive(Debug, Clone, Error)]
pub enum PaymentError {
    #[error("Validation error: {message}")]
    ValidationError {
        message: String,
        field: Option<String>,
    },

    #[error("Signing key error: {message}")]
    KeyError { message: String },

    #[error("Token issuance failed: {message}")]
    AuthError { message: String },

    #[error("Processor error: operation={operation}, message={message}")]
    ProcessorError {
        operation: String,
        message: String,
        provider_code: Option<String>,
    },

    #[error("Network error: {message}")]
    NetworkError { message: String },

    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    #[error("Webhook verification failed: {message}")]
    WebhookVerificationError { message: String },

    #[error("Storage error: {message}")]
    StorageError { message: String, retryable: bool },
}

impl PaymentError {
    pub fn validation(message: impl Into<String>, field: &str) -> Self {
        PaymentError::ValidationError {
            message: message.into(),
            field: Some(field.to_string()),
        }
    }

    pub fn not_found(entity: &str, id: impl ToString) -> Self {
        PaymentError::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }

    pub fn processor(operation: &str, message: impl Into<String>, code: Option<String>) -> Self {
        PaymentError::ProcessorError {
            operation: operation.to_string(),
            message: message.into(),
            provider_code: code,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            PaymentError::ValidationError { .. } => false,
            PaymentError::KeyError { .. } => false,
            PaymentError::AuthError { .. } => true,
            PaymentError::ProcessorError { .. } => false,
            PaymentError::NetworkError { .. } => true,
            PaymentError::NotFound { .. } => false,
            PaymentError::WebhookVerificationError { .. } => false,
            PaymentError::StorageError { retryable, .. } => *retryable,
        }
    }

    pub fn http_status_code(&self) -> u16 {
        match self {
            PaymentError::ValidationError { .. } => 400,
            PaymentError::KeyError { .. } => 400,
            PaymentError::AuthError { .. } => 502,
            PaymentError::ProcessorError { .. } => 502,
            PaymentError::NetworkError { .. } => 503,
            PaymentError::NotFound { .. } => 404,
            PaymentError::WebhookVerificationError { .. } => 401,
            PaymentError::StorageError { .. } => 500,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            PaymentError::ValidationError { message, .. } => message.clone(),
            PaymentError::KeyError { .. } => "Invalid private key format".to_string(),
            PaymentError::AuthError { .. } => {
                "Could not authenticate with the payment processor".to_string()
            }
            PaymentError::ProcessorError { message, .. } => message.clone(),
            PaymentError::NetworkError { .. } => {
                "Payment processor is temporarily unavailable".to_string()
            }
            PaymentError::NotFound { entity, .. } => format!("{} not found", entity),
            PaymentError::WebhookVerificationError { .. } => {
                "Invalid webhook signature".to_string()
            }
            PaymentError::StorageError { .. } => {
                "Service temporarily unavailable. Please try again later".to_string()
            }
        }
    }
}

impl From<crate::database::error::DatabaseError> for PaymentError {
    fn from(err: crate::database::error::DatabaseError) -> Self {
        use crate::database::error::DatabaseErrorKind;

        match &err.kind {
            DatabaseErrorKind::NotFound { entity, id } => PaymentError::NotFound {
                entity: entity.clone(),
                id: id.clone(),
            },
            DatabaseErrorKind::UniqueViolation { constraint } => PaymentError::ValidationError {
                message: format!("duplicate value violates {}", constraint),
                field: None,
            },
            _ => PaymentError::StorageError {
                message: err.to_string(),
                retryable: err.is_retryable(),
            },
        }
    }
}

impl From<PaymentError> for crate::error::AppError {
    fn from(err: PaymentError) -> Self {
        use crate::error::{
            AppError, AppErrorKind, DomainError, ExternalError, InfrastructureError,
            ValidationError,
        };

        let kind = match err {
            PaymentError::ValidationError { message, field } => {
                AppErrorKind::Validation(ValidationError::Invalid {
                    field: field.unwrap_or_else(|| "request".to_string()),
                    reason: message,
                })
            }
            PaymentError::KeyError { message } => {
                AppErrorKind::Validation(ValidationError::InvalidPrivateKey { reason: message })
            }
            PaymentError::AuthError { message } => {
                AppErrorKind::External(ExternalError::ProcessorAuth { message })
            }
            PaymentError::ProcessorError {
                operation,
                message,
                provider_code,
            } => AppErrorKind::External(ExternalError::Processor {
                operation,
                message,
                provider_code,
            }),
            PaymentError::NetworkError { message } => {
                AppErrorKind::External(ExternalError::Unreachable { message })
            }
            PaymentError::NotFound { entity, id } => {
                AppErrorKind::Domain(DomainError::NotFound { entity, id })
            }
            PaymentError::WebhookVerificationError { message } => {
                AppErrorKind::Domain(DomainError::InvalidNotification { reason: message })
            }
            PaymentError::StorageError { message, retryable } => {
                AppErrorKind::Infrastructure(InfrastructureError::Database {
                    message,
                    is_retryable: retryable,
                })
            }
        };
        AppError::new(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_http_status_mapping_is_correct() {
        assert_eq!(
            PaymentError::ValidationError {
                message: "bad".to_string(),
                field: None
            }
            .http_status_code(),
            400
        );
        assert_eq!(PaymentError::not_found("Order", "ORD1").http_status_code(), 404);
        assert_eq!(
            PaymentError::processor("payment.queryorder", "failed", Some("1".to_string()))
                .http_status_code(),
            502
        );
    }

    #[test]
    fn retryable_flags_are_set() {
        assert!(PaymentError::NetworkError {
            message: "timeout".to_string()
        }
        .is_retryable());
        assert!(!PaymentError::KeyError {
            message: "bad pem".to_string()
        }
        .is_retryable());
    }

    #[test]
    fn processor_user_message_carries_processor_msg() {
        let err = PaymentError::processor("payment.preorder", "Invalid merchant", None);
        assert_eq!(err.user_message(), "Invalid merchant");
    }
}
