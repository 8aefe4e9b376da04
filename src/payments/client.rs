//! Signed calls against the mobile-money processor.
//!
//! Every signed call draws a fresh nonce and Unix-seconds timestamp. The
//! client holds no per-merchant state: credentials come from the `Merchant`
//! passed to each call and endpoint settings from the injected
//! `ProcessorConfig`.

use crate::config::ProcessorConfig;
use crate::database::models::Merchant;
use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::signature::{self, SignParams, SIGN_TYPE};
use crate::payments::transport::{HttpTransport, TransportResponse};
use crate::payments::types::{
    parse_processor_time, IssuedToken, PreorderFields, ProcessorResponse, TokenResponse,
    API_VERSION, TRADE_TYPE,
};
use rand::RngCore;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

pub const METHOD_PREORDER: &str = "payment.preorder";
pub const METHOD_QUERY_ORDER: &str = "payment.queryorder";

const TOKEN_PATH: &str = "/payment/v1/token";
const PREORDER_PATH: &str = "/payment/v1/merchant/preOrder";
const QUERY_ORDER_PATH: &str = "/payment/v1/merchant/queryOrder";
const CHECKOUT_PATH: &str = "/payment/web/paygate";

/// 16 random bytes as 32 lowercase hex characters.
pub fn generate_nonce() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn unix_timestamp() -> String {
    chrono::Utc::now().timestamp().to_string()
}

/// Fields of a checkout URL, in the order they appear in the query string.
#[derive(Debug, Clone)]
pub struct CheckoutParams<'a> {
    pub appid: &'a str,
    pub merch_code: &'a str,
    pub nonce_str: &'a str,
    pub prepay_id: &'a str,
    pub timestamp: &'a str,
    pub sign: &'a str,
    pub language: &'a str,
}

/// Builds the checkout URL. Only the signature is percent-encoded; the
/// other values are inserted as-is.
pub fn assemble_checkout_url(checkout_base_url: &str, params: &CheckoutParams<'_>) -> String {
    format!(
        "{}{}?appid={}&merch_code={}&nonce_str={}&prepay_id={}&timestamp={}&sign={}&sign_type={}&version={}&trade_type={}&language={}",
        checkout_base_url.trim_end_matches('/'),
        CHECKOUT_PATH,
        params.appid,
        params.merch_code,
        params.nonce_str,
        params.prepay_id,
        params.timestamp,
        urlencoding::encode(params.sign),
        SIGN_TYPE,
        API_VERSION,
        TRADE_TYPE,
        params.language,
    )
}

#[derive(Clone)]
pub struct ProcessorClient {
    config: ProcessorConfig,
    transport: Arc<dyn HttpTransport>,
}

impl ProcessorClient {
    pub fn new(config: ProcessorConfig, transport: Arc<dyn HttpTransport>) -> Self {
        Self { config, transport }
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Requests a bearer token with the merchant's app key and secret.
    pub async fn fetch_token(&self, merchant: &Merchant) -> PaymentResult<IssuedToken> {
        let body = json!({ "appSecret": merchant.app_secret });
        let headers = [
            ("X-APP-Key", merchant.app_key.as_str()),
            ("Content-Type", "application/json"),
        ];

        let response = self
            .transport
            .post_json(&self.url(TOKEN_PATH), &headers, &body)
            .await?;

        if !response.is_success() {
            warn!(
                merchant_id = merchant.id,
                status = response.status,
                "token request rejected"
            );
            return Err(PaymentError::AuthError {
                message: format!("token endpoint returned HTTP {}", response.status),
            });
        }

        let parsed: TokenResponse =
            serde_json::from_str(&response.body).map_err(|e| PaymentError::AuthError {
                message: format!("invalid token response: {}", e),
            })?;

        let raw_token = parsed.token.unwrap_or_default();
        let token = raw_token
            .strip_prefix("Bearer ")
            .unwrap_or(&raw_token)
            .to_string();
        if token.trim().is_empty() {
            return Err(PaymentError::AuthError {
                message: "token response carried no token".to_string(),
            });
        }

        let expiration = parsed.expiration_date.ok_or_else(|| PaymentError::AuthError {
            message: "token response carried no expirationDate".to_string(),
        })?;
        let expires_at = parse_processor_time(&expiration).map_err(|e| PaymentError::AuthError {
            message: format!("unparseable expirationDate {:?}: {}", expiration, e),
        })?;

        info!(merchant_id = merchant.id, expires_at = %expires_at, "processor token issued");
        Ok(IssuedToken { token, expires_at })
    }

    /// Signs and submits a preorder. The business outcome is left to the
    /// caller; only a non-2xx status is an error here.
    pub async fn create_preorder(
        &self,
        token: &str,
        merchant: &Merchant,
        fields: &PreorderFields,
    ) -> PaymentResult<ProcessorResponse> {
        let nonce_str = generate_nonce();
        let timestamp = unix_timestamp();
        let timeout_express = fields
            .timeout_express
            .clone()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| self.config.default_timeout_express.clone());
        let business_type = self.config.business_type.as_str();

        let params = SignParams::new()
            .with("appid", &merchant.app_id)
            .with("business_type", business_type)
            .with("merch_code", &merchant.merch_code)
            .with("merch_order_id", &fields.merch_order_id)
            .with("method", METHOD_PREORDER)
            .with("nonce_str", &nonce_str)
            .with("notify_url", &merchant.notify_url)
            .with("redirect_url", &merchant.redirect_url)
            .with("timeout_express", &timeout_express)
            .with("timestamp", &timestamp)
            .with("title", &fields.title)
            .with("total_amount", &fields.total_amount)
            .with("trade_type", TRADE_TYPE)
            .with("trans_currency", &fields.currency)
            .with("version", API_VERSION);
        let sign = signature::sign(&merchant.private_key, &params)?;

        let body = json!({
            "nonce_str": nonce_str,
            "biz_content": {
                "trans_currency": fields.currency,
                "total_amount": fields.total_amount,
                "merch_order_id": fields.merch_order_id,
                "appid": merchant.app_id,
                "merch_code": merchant.merch_code,
                "timeout_express": timeout_express,
                "trade_type": TRADE_TYPE,
                "notify_url": merchant.notify_url,
                "redirect_url": merchant.redirect_url,
                "title": fields.title,
                "business_type": business_type,
            },
            "method": METHOD_PREORDER,
            "version": API_VERSION,
            "sign_type": SIGN_TYPE,
            "timestamp": timestamp,
            "sign": sign,
        });

        let response = self
            .signed_post(PREORDER_PATH, token, merchant, &body)
            .await?;
        info!(
            merchant_id = merchant.id,
            merch_order_id = %fields.merch_order_id,
            status = response.status,
            "preorder submitted"
        );
        Self::parse_response(METHOD_PREORDER, response)
    }

    /// Signs and submits a status query for one merchant order.
    pub async fn query_order(
        &self,
        token: &str,
        merchant: &Merchant,
        merch_order_id: &str,
    ) -> PaymentResult<ProcessorResponse> {
        let nonce_str = generate_nonce();
        let timestamp = unix_timestamp();

        let params = SignParams::new()
            .with("appid", &merchant.app_id)
            .with("merch_code", &merchant.merch_code)
            .with("merch_order_id", merch_order_id)
            .with("method", METHOD_QUERY_ORDER)
            .with("nonce_str", &nonce_str)
            .with("timestamp", &timestamp)
            .with("version", API_VERSION);
        let sign = signature::sign(&merchant.private_key, &params)?;

        let body = json!({
            "timestamp": timestamp,
            "method": METHOD_QUERY_ORDER,
            "nonce_str": nonce_str,
            "version": API_VERSION,
            "sign_type": SIGN_TYPE,
            "sign": sign,
            "biz_content": {
                "appid": merchant.app_id,
                "merch_code": merchant.merch_code,
                "merch_order_id": merch_order_id,
            },
        });

        let response = self
            .signed_post(QUERY_ORDER_PATH, token, merchant, &body)
            .await?;
        Self::parse_response(METHOD_QUERY_ORDER, response)
    }

    /// Signed checkout URL for a prepay id. No network call.
    pub fn checkout_url(&self, merchant: &Merchant, prepay_id: &str) -> PaymentResult<String> {
        let nonce_str = generate_nonce();
        let timestamp = unix_timestamp();

        let params = SignParams::new()
            .with("appid", &merchant.app_id)
            .with("merch_code", &merchant.merch_code)
            .with("nonce_str", &nonce_str)
            .with("prepay_id", prepay_id)
            .with("timestamp", &timestamp);
        let sign = signature::sign(&merchant.private_key, &params)?;

        Ok(assemble_checkout_url(
            &self.config.checkout_base_url,
            &CheckoutParams {
                appid: &merchant.app_id,
                merch_code: &merchant.merch_code,
                nonce_str: &nonce_str,
                prepay_id,
                timestamp: &timestamp,
                sign: &sign,
                language: &self.config.language,
            },
        ))
    }

    async fn signed_post(
        &self,
        path: &str,
        token: &str,
        merchant: &Merchant,
        body: &serde_json::Value,
    ) -> PaymentResult<TransportResponse> {
        let authorization = format!("Bearer {}", token);
        let headers = [
            ("Content-Type", "application/json"),
            ("X-APP-Key", merchant.app_key.as_str()),
            ("Authorization", authorization.as_str()),
        ];
        self.transport
            .post_json(&self.url(path), &headers, body)
            .await
    }

    fn parse_response(
        operation: &str,
        response: TransportResponse,
    ) -> PaymentResult<ProcessorResponse> {
        if !response.is_success() {
            return Err(PaymentError::processor(
                operation,
                format!("HTTP {}: {}", response.status, response.body),
                Some(response.status.to_string()),
            ));
        }
        let raw = response.json().map_err(|e| {
            PaymentError::processor(
                operation,
                format!("invalid processor JSON response: {}", e),
                None,
            )
        })?;
        Ok(ProcessorResponse::from_json(raw))
    }
}
