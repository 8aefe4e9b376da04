//! Merchant onboarding and lookup endpoints.
//!
//! Responses never carry credentials, keys or cached tokens.

use super::AppState;
use crate::database::models::{Merchant, NewMerchant};
use crate::error::AppError;
use axum::{
    extract::{Path, Query, State},
    Form, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};

const DEFAULT_PAGE_SIZE: i64 = 100;

/// Registration form. The `dmoney_*` names are accepted for compatibility
/// with existing merchant integrations.
#[derive(Deserialize)]
pub struct RegisterMerchantForm {
    pub name: String,
    pub email: String,
    #[serde(alias = "dmoney_app_key")]
    pub app_key: String,
    #[serde(alias = "dmoney_app_secret")]
    pub app_secret: String,
    #[serde(alias = "dmoney_app_id")]
    pub app_id: String,
    #[serde(alias = "dmoney_merch_code")]
    pub merch_code: String,
    #[serde(alias = "dmoney_private_key")]
    pub private_key: String,
    #[serde(default, alias = "dmoney_public_key")]
    pub public_key: Option<String>,
    pub notify_url: String,
    pub redirect_url: String,
}

impl From<RegisterMerchantForm> for NewMerchant {
    fn from(form: RegisterMerchantForm) -> Self {
        NewMerchant {
            name: form.name,
            email: form.email,
            app_key: form.app_key,
            app_secret: form.app_secret,
            app_id: form.app_id,
            merch_code: form.merch_code,
            private_key: form.private_key,
            public_key: form.public_key,
            notify_url: form.notify_url,
            redirect_url: form.redirect_url,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MerchantResponse {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub app_id: String,
    pub merch_code: String,
    pub notify_url: String,
    pub redirect_url: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<Merchant> for MerchantResponse {
    fn from(merchant: Merchant) -> Self {
        Self {
            id: merchant.id,
            name: merchant.name,
            email: merchant.email,
            app_id: merchant.app_id,
            merch_code: merchant.merch_code,
            notify_url: merchant.notify_url,
            redirect_url: merchant.redirect_url,
            is_active: merchant.is_active,
            created_at: merchant.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub is_active: bool,
}

/// How a merchant calls the unified create-payment endpoint.
#[derive(Debug, Serialize)]
pub struct IntegrationGuide {
    pub merchant_id: i64,
    pub merchant_name: String,
    pub api_endpoint: String,
    pub method: &'static str,
    pub content_type: &'static str,
    pub required_fields: RequiredFields,
    pub optional_fields: OptionalFields,
    pub example_curl: String,
    pub example_response: JsonValue,
}

#[derive(Debug, Serialize)]
pub struct RequiredFields {
    pub merchant_id: i64,
    pub product_name: &'static str,
    pub total_amount: &'static str,
    pub customer_name: &'static str,
    pub customer_email: &'static str,
}

#[derive(Debug, Serialize)]
pub struct OptionalFields {
    pub customer_phone: &'static str,
    pub quantity: &'static str,
    pub currency: &'static str,
    pub timeout_express: &'static str,
}

impl IntegrationGuide {
    fn new(merchant: &Merchant, base_url: &str) -> Self {
        let api_endpoint = format!("{}/api/create-payment", base_url);
        let example_curl = [
            format!("curl -X POST {}", api_endpoint),
            format!("-d \"merchant_id={}\"", merchant.id),
            "-d \"product_name=Test Product\"".to_string(),
            "-d \"total_amount=1000\"".to_string(),
            "-d \"customer_name=John Doe\"".to_string(),
            "-d \"customer_email=john@example.com\"".to_string(),
            "-d \"customer_phone=77123456\"".to_string(),
            "-d \"quantity=1\"".to_string(),
            "-d \"currency=DJF\"".to_string(),
            "-d \"timeout_express=120m\"".to_string(),
        ]
        .join(" \\\n  ");

        Self {
            merchant_id: merchant.id,
            merchant_name: merchant.name.clone(),
            api_endpoint,
            method: "POST",
            content_type: "application/x-www-form-urlencoded",
            required_fields: RequiredFields {
                merchant_id: merchant.id,
                product_name: "Product name",
                total_amount: "Amount in DJF, at most two decimal places",
                customer_name: "Customer full name",
                customer_email: "Customer email",
            },
            optional_fields: OptionalFields {
                customer_phone: "Customer phone number",
                quantity: "Quantity (default: 1)",
                currency: "Currency code (default: DJF)",
                timeout_express: "Payment timeout (default: 120m)",
            },
            example_curl,
            example_response: json!({
                "success": true,
                "message": "Payment created successfully",
                "order": {
                    "merch_order_id": "ORD20231006120000ABC123DEF456",
                    "product_name": "Test Product",
                    "total_amount": "1000",
                    "currency": "DJF"
                },
                "payment": {
                    "checkout_url": "https://checkout-url-here",
                    "prepay_id": "prepay_id_here",
                    "expires_in": "120m"
                }
            }),
        }
    }
}

/// POST /merchants/register
pub async fn register_merchant(
    State(state): State<AppState>,
    Form(form): Form<RegisterMerchantForm>,
) -> Result<Json<MerchantResponse>, AppError> {
    let merchant = state
        .payments
        .merchants()
        .register(NewMerchant::from(form))
        .await?;
    Ok(Json(merchant.into()))
}

/// GET /merchants?skip&limit
pub async fn list_merchants(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<MerchantResponse>>, AppError> {
    let merchants = state
        .payments
        .merchants()
        .list_active(
            params.skip.unwrap_or(0),
            params.limit.unwrap_or(DEFAULT_PAGE_SIZE),
        )
        .await?;
    Ok(Json(merchants.into_iter().map(Into::into).collect()))
}

/// GET /merchants/{id}
pub async fn get_merchant(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<MerchantResponse>, AppError> {
    let merchant = state.payments.merchants().get(id).await?;
    Ok(Json(merchant.into()))
}

/// PATCH /merchants/{id}/status
pub async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(update): Json<StatusUpdate>,
) -> Result<Json<MerchantResponse>, AppError> {
    let merchant = state
        .payments
        .merchants()
        .set_active(id, update.is_active)
        .await?;
    Ok(Json(merchant.into()))
}

/// GET /api/merchant/{merchant_id}/api-docs
pub async fn integration_guide(
    State(state): State<AppState>,
    Path(merchant_id): Path<i64>,
) -> Result<Json<IntegrationGuide>, AppError> {
    let merchant = state.payments.merchants().get(merchant_id).await?;
    Ok(Json(IntegrationGuide::new(&merchant, &state.public_base_url)))
}
