//! Payment orchestration: merchant resolution, token acquisition, order
//! creation, preorder and checkout, plus the query and notification
//! reconciliation entry points.

use crate::database::models::{Merchant, Order};
use crate::payments::client::{ProcessorClient, METHOD_PREORDER};
use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::token_cache::TokenCache;
use crate::payments::types::{
    format_amount, IssuedToken, NotifyPayload, PreorderFields, DEFAULT_CURRENCY,
};
use crate::payments::webhook::NotificationVerifier;
use crate::services::merchant_registry::MerchantRegistry;
use crate::services::order_lifecycle::{
    generate_merch_order_id, NewOrder, OrderLifecycle, QueryOutcome,
};
use bigdecimal::BigDecimal;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Input of a new payment.
#[derive(Debug, Clone)]
pub struct CreatePayment {
    pub merchant_id: i64,
    pub order: NewOrder,
    pub timeout_express: Option<String>,
}

/// A payment ready for checkout.
#[derive(Debug, Clone)]
pub struct PaymentCreated {
    pub merchant: Merchant,
    pub order: Order,
    pub prepay_id: String,
    pub checkout_url: String,
    pub timeout_express: String,
}

/// Diagnostic preorder that is signed and sent but never stored.
#[derive(Debug, Clone)]
pub struct TrialPreorder {
    pub merchant_id: i64,
    pub title: String,
    pub total_amount: BigDecimal,
}

#[derive(Debug, Clone)]
pub enum TrialOutcome {
    Accepted {
        merchant: Merchant,
        merch_order_id: String,
        prepay_id: String,
        checkout_url: String,
        timeout_express: String,
    },
    /// The processor answered with a business failure.
    Rejected {
        message: String,
        full_response: JsonValue,
    },
}

#[derive(Clone)]
pub struct PaymentService {
    merchants: MerchantRegistry,
    lifecycle: OrderLifecycle,
    client: ProcessorClient,
    tokens: TokenCache,
    verifier: Arc<dyn NotificationVerifier>,
}

impl PaymentService {
    pub fn new(
        merchants: MerchantRegistry,
        lifecycle: OrderLifecycle,
        client: ProcessorClient,
        tokens: TokenCache,
        verifier: Arc<dyn NotificationVerifier>,
    ) -> Self {
        Self {
            merchants,
            lifecycle,
            client,
            tokens,
            verifier,
        }
    }

    pub fn merchants(&self) -> &MerchantRegistry {
        &self.merchants
    }

    /// Creates an order and its processor preorder.
    ///
    /// A failure after the order row exists leaves it `PENDING`; a retry
    /// creates a new order with a new identifier.
    #[instrument(skip(self, request), fields(merchant_id = request.merchant_id))]
    pub async fn create_payment(&self, request: CreatePayment) -> PaymentResult<PaymentCreated> {
        let merchant = self.merchants.get_active(request.merchant_id).await?;
        let token = self.tokens.acquire(&merchant).await?;
        let order = self.lifecycle.create(&merchant, request.order).await?;

        let timeout_express = request
            .timeout_express
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| self.client.config().default_timeout_express.clone());
        let fields = PreorderFields {
            merch_order_id: order.merch_order_id.clone(),
            title: order.product_name.clone(),
            total_amount: format_amount(&order.total_amount),
            currency: order.currency.clone(),
            timeout_express: Some(timeout_express.clone()),
        };

        let response = self.client.create_preorder(&token, &merchant, &fields).await?;
        if !response.is_business_success() {
            warn!(
                merch_order_id = %order.merch_order_id,
                code = ?response.code,
                msg = ?response.msg,
                "preorder rejected by processor, order stays pending"
            );
            return Err(PaymentError::processor(
                METHOD_PREORDER,
                response.message_or("Payment creation failed"),
                response.code.clone(),
            ));
        }

        let prepay_id = response
            .prepay_id()
            .ok_or_else(|| {
                PaymentError::processor(
                    METHOD_PREORDER,
                    "preorder response carried no prepay_id",
                    response.code.clone(),
                )
            })?
            .to_string();
        let checkout_url = self.client.checkout_url(&merchant, &prepay_id)?;

        let order = self
            .lifecycle
            .attach_payment(
                &order.merch_order_id,
                &prepay_id,
                &checkout_url,
                response.raw.clone(),
            )
            .await?;

        info!(
            merch_order_id = %order.merch_order_id,
            prepay_id = %prepay_id,
            "payment created"
        );
        Ok(PaymentCreated {
            merchant,
            order,
            prepay_id,
            checkout_url,
            timeout_express,
        })
    }

    /// Polls the processor and reconciles the local order.
    #[instrument(skip(self))]
    pub async fn query_order(
        &self,
        merchant_id: i64,
        merch_order_id: &str,
    ) -> PaymentResult<QueryOutcome> {
        let merchant = self.merchants.get(merchant_id).await?;
        let token = self.tokens.acquire(&merchant).await?;
        let response = self
            .client
            .query_order(&token, &merchant, merch_order_id)
            .await?;
        self.lifecycle
            .apply_query_result(&merchant, merch_order_id, &response)
            .await
    }

    /// Verifies and applies a processor notification.
    pub async fn handle_notification(&self, payload: NotifyPayload) -> PaymentResult<Order> {
        info!(
            merch_order_id = %payload.merch_order_id,
            trade_status = %payload.trade_status,
            "payment notification received"
        );

        let order = self.lifecycle.find(&payload.merch_order_id).await?;
        let merchant = self.merchants.get(order.merchant_id).await?;
        self.verifier.verify(&merchant, &payload)?;

        self.lifecycle.apply_notification(&payload).await
    }

    /// Runs token, preorder and checkout-URL generation for a throwaway
    /// identifier. Only the token is persisted.
    #[instrument(skip(self, trial), fields(merchant_id = trial.merchant_id))]
    pub async fn trial_preorder(&self, trial: TrialPreorder) -> PaymentResult<TrialOutcome> {
        let merchant = self.merchants.get(trial.merchant_id).await?;
        let token = self.tokens.acquire(&merchant).await?;

        let merch_order_id = generate_merch_order_id();
        let timeout_express = self.client.config().default_timeout_express.clone();
        let fields = PreorderFields {
            merch_order_id: merch_order_id.clone(),
            title: trial.title,
            total_amount: format_amount(&trial.total_amount),
            currency: DEFAULT_CURRENCY.to_string(),
            timeout_express: Some(timeout_express.clone()),
        };

        let response = self.client.create_preorder(&token, &merchant, &fields).await?;
        let prepay_id = match response.prepay_id() {
            Some(prepay_id) if response.is_business_success() => prepay_id.to_string(),
            _ => {
                warn!(
                    merch_order_id = %merch_order_id,
                    code = ?response.code,
                    "trial preorder rejected by processor"
                );
                return Ok(TrialOutcome::Rejected {
                    message: response.message_or("Preorder failed"),
                    full_response: response.raw,
                });
            }
        };
        let checkout_url = self.client.checkout_url(&merchant, &prepay_id)?;

        info!(merch_order_id = %merch_order_id, "trial preorder accepted");
        Ok(TrialOutcome::Accepted {
            merchant,
            merch_order_id,
            prepay_id,
            checkout_url,
            timeout_express,
        })
    }

    /// Issues a token without persisting it.
    pub async fn issue_token(&self, merchant_id: i64) -> PaymentResult<(Merchant, IssuedToken)> {
        let merchant = self.merchants.get(merchant_id).await?;
        let issued = self.client.fetch_token(&merchant).await?;
        Ok((merchant, issued))
    }

    pub async fn order(&self, merch_order_id: &str) -> PaymentResult<Order> {
        self.lifecycle.find(merch_order_id).await
    }
}
