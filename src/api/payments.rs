//! Payment operation endpoints: preorder, unified create-payment, query,
//! order lookup and the diagnostic token endpoint.

use super::AppState;
use crate::database::models::Order;
use crate::error::AppError;
use crate::payments::types::{
    deserialize_amount, format_amount, QueryDetails, DEFAULT_CURRENCY, PROCESSOR_TIME_FORMAT,
};
use crate::services::{CreatePayment, NewOrder, PaymentCreated, TrialOutcome, TrialPreorder};
use axum::{
    extract::{Path, Query, State},
    Form, Json,
};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

const DISPLAY_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Deserialize)]
pub struct PreorderRequest {
    pub merchant_id: i64,
    pub product_name: String,
    pub quantity: i32,
    #[serde(deserialize_with = "deserialize_amount")]
    pub total_amount: BigDecimal,
    pub currency: Option<String>,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,
    pub timeout_express: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PreorderResponse {
    pub success: bool,
    pub merch_order_id: String,
    pub prepay_id: Option<String>,
    pub checkout_url: Option<String>,
    pub message: String,
    pub order_id: i64,
    pub merchant_name: String,
}

/// Form body of the unified create-payment call.
#[derive(Debug, Deserialize)]
pub struct CreatePaymentForm {
    pub merchant_id: i64,
    pub product_name: String,
    #[serde(deserialize_with = "deserialize_amount")]
    pub total_amount: BigDecimal,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,
    pub quantity: Option<i32>,
    pub currency: Option<String>,
    pub timeout_express: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreatePaymentResponse {
    pub success: bool,
    pub message: String,
    pub merchant: MerchantSummary,
    pub order: OrderSummary,
    pub payment: PaymentSummary,
    pub created_at: String,
}

#[derive(Debug, Serialize)]
pub struct MerchantSummary {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct OrderSummary {
    pub id: i64,
    pub merch_order_id: String,
    pub product_name: String,
    pub total_amount: BigDecimal,
    pub currency: String,
    pub customer_name: String,
    pub customer_email: String,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct PaymentSummary {
    pub prepay_id: String,
    pub checkout_url: String,
    pub expires_in: String,
}

impl From<PaymentCreated> for CreatePaymentResponse {
    fn from(created: PaymentCreated) -> Self {
        let order = created.order;
        Self {
            success: true,
            message: "Payment created successfully".to_string(),
            merchant: MerchantSummary {
                id: created.merchant.id,
                name: created.merchant.name,
            },
            created_at: order.created_at.format(DISPLAY_TIME_FORMAT).to_string(),
            order: OrderSummary {
                id: order.id,
                merch_order_id: order.merch_order_id,
                product_name: order.product_name,
                total_amount: order.total_amount,
                currency: order.currency,
                customer_name: order.customer_name,
                customer_email: order.customer_email,
                status: order.status.to_string(),
            },
            payment: PaymentSummary {
                prepay_id: created.prepay_id,
                checkout_url: created.checkout_url,
                expires_in: created.timeout_express,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct QueryOrderRequest {
    pub merchant_id: i64,
    pub merch_order_id: String,
}

#[derive(Debug, Serialize)]
pub struct QueryOrderResponse {
    pub success: bool,
    pub merch_order_id: String,
    pub order_status: Option<String>,
    pub payment_order_id: Option<String>,
    pub trans_time: Option<String>,
    pub trans_currency: Option<String>,
    pub total_amount: Option<String>,
    pub prepay_id: Option<String>,
    pub message: String,
    pub full_response: JsonValue,
}

#[derive(Debug, Serialize)]
pub struct OrderDetailsResponse {
    pub order_id: i64,
    pub merchant_id: i64,
    pub merchant_name: String,
    pub merch_order_id: String,
    pub product_name: String,
    pub total_amount: BigDecimal,
    pub currency: String,
    pub status: String,
    pub prepay_id: Option<String>,
    pub payment_order_id: Option<String>,
    pub checkout_url: Option<String>,
    pub customer_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub trans_end_time: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TokenParams {
    pub merchant_id: i64,
}

#[derive(Debug, Serialize)]
pub struct TokenTestResponse {
    pub success: bool,
    pub token: String,
    pub expires_at: String,
    pub merchant_id: i64,
    pub merchant_name: String,
}

/// Query parameters of the full-flow diagnostic. Customer fields sent by
/// older clients are ignored; the processor never sees them.
#[derive(Debug, Deserialize)]
pub struct FullFlowParams {
    pub merchant_id: i64,
    #[serde(default = "default_trial_product")]
    pub product_name: String,
    #[serde(default = "default_trial_amount", deserialize_with = "deserialize_amount")]
    pub amount: BigDecimal,
}

fn default_trial_product() -> String {
    "Test Product".to_string()
}

fn default_trial_amount() -> BigDecimal {
    BigDecimal::from(100)
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum FullFlowResponse {
    Accepted {
        success: bool,
        merchant_id: i64,
        merchant_name: String,
        order_details: TrialOrderDetails,
        payment_details: TrialPaymentDetails,
        next_steps: String,
        message: String,
    },
    Rejected {
        success: bool,
        error: String,
        full_response: JsonValue,
    },
}

#[derive(Debug, Serialize)]
pub struct TrialOrderDetails {
    pub merch_order_id: String,
    pub product_name: String,
    pub amount: String,
    pub currency: String,
}

#[derive(Debug, Serialize)]
pub struct TrialPaymentDetails {
    pub prepay_id: String,
    pub checkout_url: String,
    pub timeout: String,
}

/// POST /api/preorder
pub async fn create_preorder(
    State(state): State<AppState>,
    Json(request): Json<PreorderRequest>,
) -> Result<Json<PreorderResponse>, AppError> {
    let created = state
        .payments
        .create_payment(CreatePayment {
            merchant_id: request.merchant_id,
            order: NewOrder {
                product_name: request.product_name,
                quantity: request.quantity,
                total_amount: request.total_amount,
                currency: request.currency,
                customer_name: request.customer_name,
                customer_email: request.customer_email,
                customer_phone: request.customer_phone,
            },
            timeout_express: request.timeout_express,
        })
        .await?;

    Ok(Json(PreorderResponse {
        success: true,
        merch_order_id: created.order.merch_order_id,
        prepay_id: Some(created.prepay_id),
        checkout_url: Some(created.checkout_url),
        message: "Preorder created successfully".to_string(),
        order_id: created.order.id,
        merchant_name: created.merchant.name,
    }))
}

/// POST /api/create-payment
pub async fn create_payment(
    State(state): State<AppState>,
    Form(form): Form<CreatePaymentForm>,
) -> Result<Json<CreatePaymentResponse>, AppError> {
    let created = state
        .payments
        .create_payment(CreatePayment {
            merchant_id: form.merchant_id,
            order: NewOrder {
                product_name: form.product_name,
                quantity: form.quantity.unwrap_or(1),
                total_amount: form.total_amount,
                currency: form.currency,
                customer_name: form.customer_name,
                customer_email: form.customer_email,
                customer_phone: form.customer_phone.filter(|p| !p.trim().is_empty()),
            },
            timeout_express: form.timeout_express,
        })
        .await?;

    Ok(Json(created.into()))
}

/// POST /api/query-order
pub async fn query_order(
    State(state): State<AppState>,
    Json(request): Json<QueryOrderRequest>,
) -> Result<Json<QueryOrderResponse>, AppError> {
    let outcome = state
        .payments
        .query_order(request.merchant_id, &request.merch_order_id)
        .await?;

    let QueryDetails {
        merch_order_id,
        order_status,
        payment_order_id,
        trans_time,
        trans_currency,
        total_amount,
        prepay_id,
    } = outcome.details;

    Ok(Json(QueryOrderResponse {
        success: true,
        merch_order_id: merch_order_id.unwrap_or(request.merch_order_id),
        order_status,
        payment_order_id,
        trans_time,
        trans_currency,
        total_amount,
        prepay_id,
        message: "Order query successful".to_string(),
        full_response: outcome.full_response,
    }))
}

/// GET /api/orders/{merch_order_id}
pub async fn get_order(
    State(state): State<AppState>,
    Path(merch_order_id): Path<String>,
) -> Result<Json<OrderDetailsResponse>, AppError> {
    let order: Order = state.payments.order(&merch_order_id).await?;
    let merchant = state
        .payments
        .merchants()
        .get(order.merchant_id)
        .await
        .map_err(|e| {
            AppError::from(e).with_context(format!("owner of order {}", merch_order_id))
        })?;

    Ok(Json(OrderDetailsResponse {
        order_id: order.id,
        merchant_id: order.merchant_id,
        merchant_name: merchant.name,
        merch_order_id: order.merch_order_id,
        product_name: order.product_name,
        total_amount: order.total_amount,
        currency: order.currency,
        status: order.status.to_string(),
        prepay_id: order.prepay_id,
        payment_order_id: order.payment_order_id,
        checkout_url: order.checkout_url,
        customer_name: order.customer_name,
        created_at: order.created_at,
        updated_at: order.updated_at,
        trans_end_time: order
            .trans_end_time
            .map(|t| t.format(PROCESSOR_TIME_FORMAT).to_string()),
    }))
}

/// POST /test/get-token?merchant_id=
///
/// Issues a token for diagnostics without storing it on the merchant.
pub async fn test_get_token(
    State(state): State<AppState>,
    Query(params): Query<TokenParams>,
) -> Result<Json<TokenTestResponse>, AppError> {
    let (merchant, issued) = state.payments.issue_token(params.merchant_id).await?;

    Ok(Json(TokenTestResponse {
        success: true,
        token: issued.token,
        expires_at: issued.expires_at.format(DISPLAY_TIME_FORMAT).to_string(),
        merchant_id: merchant.id,
        merchant_name: merchant.name,
    }))
}

/// POST /test/full-payment-flow?merchant_id=&product_name=&amount=
///
/// Signs and sends a preorder and builds its checkout URL without storing
/// an order. A processor rejection is reported in the body with status 200.
pub async fn test_full_payment_flow(
    State(state): State<AppState>,
    Query(params): Query<FullFlowParams>,
) -> Result<Json<FullFlowResponse>, AppError> {
    let amount = format_amount(&params.amount);
    let outcome = state
        .payments
        .trial_preorder(TrialPreorder {
            merchant_id: params.merchant_id,
            title: params.product_name.clone(),
            total_amount: params.amount,
        })
        .await?;

    let response = match outcome {
        TrialOutcome::Accepted {
            merchant,
            merch_order_id,
            prepay_id,
            checkout_url,
            timeout_express,
        } => FullFlowResponse::Accepted {
            success: true,
            merchant_id: merchant.id,
            merchant_name: merchant.name,
            order_details: TrialOrderDetails {
                merch_order_id,
                product_name: params.product_name,
                amount,
                currency: DEFAULT_CURRENCY.to_string(),
            },
            payment_details: TrialPaymentDetails {
                prepay_id,
                checkout_url,
                timeout: timeout_express,
            },
            next_steps: "Open checkout_url in browser to complete payment".to_string(),
            message: "Full payment flow completed successfully".to_string(),
        },
        TrialOutcome::Rejected {
            message,
            full_response,
        } => FullFlowResponse::Rejected {
            success: false,
            error: message,
            full_response,
        },
    };
    Ok(Json(response))
}
