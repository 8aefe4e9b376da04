use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::AppState;
use crate::error::ErrorCode;
use crate::middleware::error::{get_request_id_from_headers, json_error_response};
use crate::payments::error::PaymentError;
use crate::payments::types::NotifyPayload;

#[derive(Debug, Serialize, Deserialize)]
pub struct NotifyResponse {
    pub success: bool,
    pub message: String,
}

/// POST /api/notify
///
/// The caller is the processor, an untrusted peer: failures are reported as
/// a fixed set of generic answers.
pub async fn payment_notify(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let request_id = get_request_id_from_headers(&headers);

    let payload = match NotifyPayload::from_body(&body) {
        Ok(p) => p,
        Err(e) => {
            warn!(error = %e, "Invalid notification payload");
            return json_error_response(
                StatusCode::BAD_REQUEST,
                ErrorCode::ValidationError,
                "Invalid notification payload",
                request_id,
            )
            .into_response();
        }
    };
    let reported_status = payload.trade_status.clone();

    match state.payments.handle_notification(payload).await {
        Ok(order) => {
            info!(
                merch_order_id = %order.merch_order_id,
                status = %order.status,
                "Notification applied"
            );
            (
                StatusCode::OK,
                Json(NotifyResponse {
                    success: true,
                    message: format!(
                        "Payment notification processed. Status: {}",
                        reported_status
                    ),
                }),
            )
                .into_response()
        }
        Err(PaymentError::NotFound { entity, id }) => {
            warn!(entity = %entity, id = %id, "Notification for unknown order");
            json_error_response(
                StatusCode::NOT_FOUND,
                ErrorCode::NotFound,
                "Order not found",
                request_id,
            )
            .into_response()
        }
        Err(PaymentError::WebhookVerificationError { message }) => {
            warn!(reason = %message, "Rejected notification");
            json_error_response(
                StatusCode::UNAUTHORIZED,
                ErrorCode::InvalidNotification,
                "Invalid signature",
                request_id,
            )
            .into_response()
        }
        Err(PaymentError::ValidationError { message, .. }) => {
            warn!(reason = %message, "Malformed notification");
            json_error_response(
                StatusCode::BAD_REQUEST,
                ErrorCode::ValidationError,
                "Invalid notification payload",
                request_id,
            )
            .into_response()
        }
        Err(e) => {
            error!(error = %e, "Notification processing failed");
            json_error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorCode::InternalError,
                "",
                request_id,
            )
            .into_response()
        }
    }
}
