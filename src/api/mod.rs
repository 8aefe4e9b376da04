//! HTTP surface: merchant management, payment operations and the processor
//! notification endpoint.

pub mod health;
pub mod merchants;
pub mod payments;
pub mod webhooks;

use crate::health::HealthChecker;
use crate::middleware::error::error_handling_middleware;
use crate::services::PaymentService;
use axum::{
    routing::{get, patch, post},
    Router,
};

#[derive(Clone)]
pub struct AppState {
    pub payments: PaymentService,
    pub health: HealthChecker,
    /// Base URL quoted in merchant integration guides.
    pub public_base_url: String,
}

/// All routes with error rendering applied. Tracing and request-id layers
/// are added by the binary.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/merchants/register", post(merchants::register_merchant))
        .route("/merchants", get(merchants::list_merchants))
        .route("/merchants/{id}", get(merchants::get_merchant))
        .route("/merchants/{id}/status", patch(merchants::update_status))
        .route("/api/merchant/{merchant_id}/api-docs", get(merchants::integration_guide))
        .route("/api/preorder", post(payments::create_preorder))
        .route("/api/create-payment", post(payments::create_payment))
        .route("/api/query-order", post(payments::query_order))
        .route("/api/orders/{merch_order_id}", get(payments::get_order))
        .route("/api/notify", post(webhooks::payment_notify))
        .route("/test/get-token", post(payments::test_get_token))
        .route("/test/full-payment-flow", post(payments::test_full_payment_flow))
        .layer(axum::middleware::from_fn(error_handling_middleware))
        .with_state(state)
}
