//! Inbound notification authenticity checks.
//!
//! Verification is off unless `WEBHOOK_VERIFY_SIGNATURES=true`. The RSA
//! verifier checks `sign` over the same canonical string used for outbound
//! requests.

use crate::database::models::Merchant;
use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::signature::{self, SignParams};
use crate::payments::types::NotifyPayload;
use std::sync::Arc;
use tracing::warn;

pub trait NotificationVerifier: Send + Sync {
    /// `Ok(())` when the notification may be applied to `merchant`'s order.
    fn verify(&self, merchant: &Merchant, payload: &NotifyPayload) -> PaymentResult<()>;
}

/// Accepts every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAllVerifier;

impl NotificationVerifier for AcceptAllVerifier {
    fn verify(&self, _merchant: &Merchant, _payload: &NotifyPayload) -> PaymentResult<()> {
        Ok(())
    }
}

/// Checks the `sign` field against the merchant's registered public key.
#[derive(Debug, Clone, Copy, Default)]
pub struct RsaNotificationVerifier;

impl NotificationVerifier for RsaNotificationVerifier {
    fn verify(&self, merchant: &Merchant, payload: &NotifyPayload) -> PaymentResult<()> {
        let public_key = merchant
            .public_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| PaymentError::WebhookVerificationError {
                message: format!("merchant {} has no public key registered", merchant.id),
            })?;
        let sign = payload
            .sign
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| PaymentError::WebhookVerificationError {
                message: "notification is not signed".to_string(),
            })?;

        let params = SignParams::from_json_object(&payload.raw);
        let valid = signature::verify(public_key, &params, sign).map_err(|e| {
            PaymentError::WebhookVerificationError {
                message: format!("unusable public key: {}", e),
            }
        })?;

        if valid {
            Ok(())
        } else {
            warn!(
                merchant_id = merchant.id,
                merch_order_id = %payload.merch_order_id,
                "notification signature mismatch"
            );
            Err(PaymentError::WebhookVerificationError {
                message: "signature mismatch".to_string(),
            })
        }
    }
}

pub fn verifier_for(enabled: bool) -> Arc<dyn NotificationVerifier> {
    if enabled {
        Arc::new(RsaNotificationVerifier)
    } else {
        Arc::new(AcceptAllVerifier)
    }
}
