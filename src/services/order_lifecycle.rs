//! Order state machine and reconciliation across the preorder, query and
//! notification channels.
//!
//! ```text
//! PENDING -> PROCESSING -> { Paying, Completed, Failure, Expired }
//! ```
//!
//! Every apply computes the next state of the row first and only writes when
//! something observable changed, so replays leave `updated_at` untouched.
//! Each channel writes only the columns it owns, so a query result landing
//! after a notification never reverts the stored payload.
//! Settled states overwrite each other in arrival order (last write wins);
//! there is no sequence number to order a late query result against an
//! earlier notification, so a move out of a final state is logged at `warn`.

use crate::database::models::{
    Merchant, NotificationUpdate, Order, OrderDraft, OrderStatus, PaymentAttachment, QueryUpdate,
};
use crate::database::repository::OrderStore;
use crate::payments::client::METHOD_QUERY_ORDER;
use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::types::{
    amount_scale, NotifyPayload, ProcessorResponse, QueryDetails, TradeStatus, DEFAULT_CURRENCY,
    MAX_AMOUNT_SCALE,
};
use bigdecimal::BigDecimal;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::{info, warn};

/// Commercial fields of an order to create.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub product_name: String,
    pub quantity: i32,
    pub total_amount: BigDecimal,
    pub currency: Option<String>,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,
}

/// Result of reconciling a successful query response.
#[derive(Debug, Clone, Serialize)]
pub struct QueryOutcome {
    pub details: QueryDetails,
    pub full_response: JsonValue,
    /// Local order after reconciliation, when it exists and belongs to the
    /// querying merchant.
    pub order: Option<Order>,
}

/// `ORD` + UTC `YYYYMMDDHHMMSS` + 12 uppercase hex digits (48 random bits).
pub fn generate_merch_order_id() -> String {
    let random = rand::random::<u64>() & 0xFFFF_FFFF_FFFF;
    format!("ORD{}{:012X}", Utc::now().format("%Y%m%d%H%M%S"), random)
}

fn is_final(status: OrderStatus) -> bool {
    matches!(
        status,
        OrderStatus::Completed | OrderStatus::Failed | OrderStatus::Expired
    )
}

/// Columns a notification writes. A malformed `trans_end_time` is logged
/// and left out.
fn notification_update(payload: &NotifyPayload) -> NotificationUpdate {
    let trans_end_time = match payload.trans_end_time() {
        Some(Ok(ended_at)) => Some(ended_at),
        Some(Err(e)) => {
            warn!(
                merch_order_id = %payload.merch_order_id,
                trans_end_time = ?payload.trans_end_time,
                error = %e,
                "ignoring malformed trans_end_time"
            );
            None
        }
        None => None,
    };

    NotificationUpdate {
        reported: payload.trade_status().map(OrderStatus::from),
        payment_order_id: payload.payment_order_id.clone().filter(|p| !p.is_empty()),
        callback_info: payload.body.clone(),
        trans_end_time,
    }
}

/// Whether moving `current` to `next` needs a write. Logs replays and
/// overwrites of a final status.
fn needs_write(current: &Order, next: &Order, source: &str) -> bool {
    if next == current {
        info!(
            merch_order_id = %current.merch_order_id,
            status = %current.status,
            source,
            "order unchanged"
        );
        return false;
    }

    if is_final(current.status) && next.status != current.status {
        warn!(
            merch_order_id = %current.merch_order_id,
            from = %current.status,
            to = %next.status,
            source,
            "final order status overwritten"
        );
    }
    true
}

fn log_reconciled(previous: OrderStatus, updated: &Order, source: &str) {
    info!(
        merch_order_id = %updated.merch_order_id,
        from = %previous,
        to = %updated.status,
        source,
        "order reconciled"
    );
}

#[derive(Clone)]
pub struct OrderLifecycle {
    orders: Arc<dyn OrderStore>,
}

impl OrderLifecycle {
    pub fn new(orders: Arc<dyn OrderStore>) -> Self {
        Self { orders }
    }

    /// Persists a new `PENDING` order with a freshly generated identifier.
    pub async fn create(&self, merchant: &Merchant, new: NewOrder) -> PaymentResult<Order> {
        validate_new_order(&new)?;

        let draft = OrderDraft {
            merchant_id: merchant.id,
            merch_order_id: generate_merch_order_id(),
            product_name: new.product_name.trim().to_string(),
            quantity: new.quantity,
            total_amount: new.total_amount,
            currency: new
                .currency
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
            customer_name: new.customer_name.trim().to_string(),
            customer_email: new.customer_email.trim().to_string(),
            customer_phone: new.customer_phone.filter(|p| !p.trim().is_empty()),
        };

        let order = self.orders.insert(draft).await?;
        info!(
            merchant_id = merchant.id,
            merch_order_id = %order.merch_order_id,
            amount = %order.total_amount,
            currency = %order.currency,
            "order created"
        );
        Ok(order)
    }

    pub async fn find(&self, merch_order_id: &str) -> PaymentResult<Order> {
        self.orders
            .find_by_merch_order_id(merch_order_id)
            .await?
            .ok_or_else(|| PaymentError::not_found("Order", merch_order_id))
    }

    /// Records a successful preorder: `PENDING -> PROCESSING`, once.
    ///
    /// A notification may settle the order before the preorder answer is
    /// stored; the prepay handle is then recorded and the status kept.
    pub async fn attach_payment(
        &self,
        merch_order_id: &str,
        prepay_id: &str,
        checkout_url: &str,
        gateway_response: JsonValue,
    ) -> PaymentResult<Order> {
        let order = self.find(merch_order_id).await?;

        if let Some(attached) = order.prepay_id.as_deref() {
            if attached == prepay_id && order.checkout_url.as_deref() == Some(checkout_url) {
                return Ok(order);
            }
            return Err(PaymentError::validation(
                format!(
                    "order {} already has a payment attached (status {})",
                    merch_order_id, order.status
                ),
                "merch_order_id",
            ));
        }
        if order.status.is_settled() {
            warn!(
                merch_order_id = %merch_order_id,
                status = %order.status,
                "order settled before its payment was attached, status kept"
            );
        }

        let attachment = PaymentAttachment {
            prepay_id: prepay_id.to_string(),
            checkout_url: checkout_url.to_string(),
            gateway_response,
        };
        let updated = self
            .orders
            .attach_payment(merch_order_id, &attachment)
            .await?;
        info!(
            merch_order_id = %merch_order_id,
            prepay_id = %prepay_id,
            status = %updated.status,
            "payment attached"
        );
        Ok(updated)
    }

    /// Applies a processor notification. Unknown orders are `NotFound` and
    /// nothing is written.
    pub async fn apply_notification(&self, payload: &NotifyPayload) -> PaymentResult<Order> {
        let order = self.find(&payload.merch_order_id).await?;
        let reported = payload.trade_status();
        if reported.is_none() {
            warn!(
                merch_order_id = %order.merch_order_id,
                trade_status = %payload.trade_status,
                "unrecognized trade status in notification"
            );
        }

        let update = notification_update(payload);
        let mut next = order.clone();
        update.apply_to(&mut next);
        if !needs_write(&order, &next, "notification") {
            return Ok(order);
        }

        let updated = self
            .orders
            .record_notification(&order.merch_order_id, &update)
            .await?;
        log_reconciled(order.status, &updated, "notification");
        Ok(updated)
    }

    /// Reconciles a query response for `merch_order_id`.
    ///
    /// A business failure is a `ProcessorError` carrying the processor's
    /// message and leaves the order untouched.
    pub async fn apply_query_result(
        &self,
        merchant: &Merchant,
        merch_order_id: &str,
        response: &ProcessorResponse,
    ) -> PaymentResult<QueryOutcome> {
        if !response.is_business_success() {
            warn!(
                merchant_id = merchant.id,
                merch_order_id = %merch_order_id,
                code = ?response.code,
                "order query rejected by processor"
            );
            return Err(PaymentError::processor(
                METHOD_QUERY_ORDER,
                response.message_or("Query order failed"),
                response.code.clone(),
            ));
        }

        let details = response.query_details();
        let reported = details.order_status.as_deref().and_then(TradeStatus::from_wire);

        let order = match self.orders.find_by_merch_order_id(merch_order_id).await? {
            Some(order) if order.merchant_id == merchant.id => Some(order),
            Some(order) => {
                warn!(
                    merchant_id = merchant.id,
                    owner_id = order.merchant_id,
                    merch_order_id = %merch_order_id,
                    "query result for an order owned by another merchant, not applied"
                );
                None
            }
            None => None,
        };

        let order = match (order, reported) {
            (Some(order), Some(status)) => {
                let update = QueryUpdate {
                    status: OrderStatus::from(status),
                    payment_order_id: details.payment_order_id.clone().filter(|p| !p.is_empty()),
                };
                let mut next = order.clone();
                update.apply_to(&mut next);
                if needs_write(&order, &next, "query") {
                    let updated = self
                        .orders
                        .record_query_result(merch_order_id, &update)
                        .await?;
                    log_reconciled(order.status, &updated, "query");
                    Some(updated)
                } else {
                    Some(order)
                }
            }
            (order, _) => order,
        };

        Ok(QueryOutcome {
            details,
            full_response: response.raw.clone(),
            order,
        })
    }
}

fn validate_new_order(new: &NewOrder) -> PaymentResult<()> {
    if new.product_name.trim().is_empty() {
        return Err(PaymentError::validation(
            "product_name is required",
            "product_name",
        ));
    }
    if new.quantity <= 0 {
        return Err(PaymentError::validation(
            "quantity must be greater than zero",
            "quantity",
        ));
    }
    if new.total_amount <= BigDecimal::from(0) {
        return Err(PaymentError::validation(
            "amount must be greater than zero",
            "total_amount",
        ));
    }
    if amount_scale(&new.total_amount) > MAX_AMOUNT_SCALE {
        return Err(PaymentError::validation(
            format!(
                "amount must have at most {} decimal places",
                MAX_AMOUNT_SCALE
            ),
            "total_amount",
        ));
    }
    if new.customer_name.trim().is_empty() {
        return Err(PaymentError::validation(
            "customer_name is required",
            "customer_name",
        ));
    }
    if new.customer_email.trim().is_empty() {
        return Err(PaymentError::validation(
            "customer_email is required",
            "customer_email",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::error::DatabaseError;
    use crate::database::in_memory::InMemoryOrderStore;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    fn merchant(id: i64) -> Merchant {
        let now = Utc::now();
        Merchant {
            id,
            name: "Shop".to_string(),
            email: format!("shop{}@example.com", id),
            app_key: "key".to_string(),
            app_secret: "secret".to_string(),
            app_id: "app".to_string(),
            merch_code: "100".to_string(),
            private_key: String::new(),
            public_key: None,
            notify_url: "https://shop.example.com/notify".to_string(),
            redirect_url: "https://shop.example.com/done".to_string(),
            cached_token: None,
            token_expires_at: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn new_order() -> NewOrder {
        NewOrder {
            product_name: "Shoes".to_string(),
            quantity: 1,
            total_amount: BigDecimal::from(1000),
            currency: None,
            customer_name: "Amina".to_string(),
            customer_email: "amina@example.com".to_string(),
            customer_phone: None,
        }
    }

    fn notification(merch_order_id: &str, trade_status: &str) -> NotifyPayload {
        NotifyPayload::from_json(json!({
            "merch_order_id": merch_order_id,
            "trade_status": trade_status,
            "payment_order_id": "PO1",
            "trans_end_time": "20240101101010"
        }))
        .unwrap()
    }

    async fn processing_order(lifecycle: &OrderLifecycle) -> Order {
        let order = lifecycle.create(&merchant(1), new_order()).await.unwrap();
        lifecycle
            .attach_payment(&order.merch_order_id, "PP1", "https://checkout", json!({}))
            .await
            .unwrap()
    }

    #[test]
    fn merch_order_id_has_expected_shape() {
        let id = generate_merch_order_id();
        assert_eq!(id.len(), 3 + 14 + 12);
        assert!(id.starts_with("ORD"));
        assert!(id[3..].chars().all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c)));
    }

    #[tokio::test]
    async fn create_defaults_currency_and_starts_pending() {
        let lifecycle = OrderLifecycle::new(Arc::new(InMemoryOrderStore::new()));
        let order = lifecycle.create(&merchant(1), new_order()).await.unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.currency, "DJF");
        assert_eq!(order.merchant_id, 1);
    }

    #[tokio::test]
    async fn create_rejects_invalid_fields() {
        let lifecycle = OrderLifecycle::new(Arc::new(InMemoryOrderStore::new()));
        let mut zero_amount = new_order();
        zero_amount.total_amount = BigDecimal::from(0);
        let mut no_product = new_order();
        no_product.product_name = "  ".to_string();
        let mut negative_quantity = new_order();
        negative_quantity.quantity = -1;

        let mut fractional_cents = new_order();
        fractional_cents.total_amount = "10.555".parse().unwrap();

        for invalid in [zero_amount, no_product, negative_quantity, fractional_cents] {
            let err = lifecycle.create(&merchant(1), invalid).await.unwrap_err();
            assert!(matches!(err, PaymentError::ValidationError { .. }));
        }
    }

    #[tokio::test]
    async fn attach_payment_moves_to_processing_once() {
        let lifecycle = OrderLifecycle::new(Arc::new(InMemoryOrderStore::new()));
        let order = processing_order(&lifecycle).await;
        assert_eq!(order.status, OrderStatus::Processing);
        assert_eq!(order.prepay_id.as_deref(), Some("PP1"));

        let again = lifecycle
            .attach_payment(&order.merch_order_id, "PP1", "https://checkout", json!({}))
            .await
            .unwrap();
        assert_eq!(again, order);

        let err = lifecycle
            .attach_payment(&order.merch_order_id, "PP2", "https://other", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::ValidationError { .. }));
    }

    #[tokio::test]
    async fn create_accepts_two_decimal_places() {
        let lifecycle = OrderLifecycle::new(Arc::new(InMemoryOrderStore::new()));
        let mut order = new_order();
        order.total_amount = "10.10".parse().unwrap();
        let created = lifecycle.create(&merchant(1), order).await.unwrap();
        assert_eq!(created.total_amount.to_string(), "10.10");
    }

    #[tokio::test]
    async fn payment_attached_after_settlement_keeps_status() {
        let lifecycle = OrderLifecycle::new(Arc::new(InMemoryOrderStore::new()));
        let order = lifecycle.create(&merchant(1), new_order()).await.unwrap();
        lifecycle
            .apply_notification(&notification(&order.merch_order_id, "Completed"))
            .await
            .unwrap();

        let attached = lifecycle
            .attach_payment(&order.merch_order_id, "PP1", "https://checkout", json!({}))
            .await
            .unwrap();
        assert_eq!(attached.status, OrderStatus::Completed);
        assert_eq!(attached.prepay_id.as_deref(), Some("PP1"));
        assert_eq!(attached.checkout_url.as_deref(), Some("https://checkout"));
        assert_eq!(attached.payment_order_id.as_deref(), Some("PO1"));
    }

    #[tokio::test]
    async fn notification_is_idempotent() {
        let lifecycle = OrderLifecycle::new(Arc::new(InMemoryOrderStore::new()));
        let order = processing_order(&lifecycle).await;
        let payload = notification(&order.merch_order_id, "Completed");

        let first = lifecycle.apply_notification(&payload).await.unwrap();
        let second = lifecycle.apply_notification(&payload).await.unwrap();

        assert_eq!(first.status, OrderStatus::Completed);
        assert_eq!(first.payment_order_id.as_deref(), Some("PO1"));
        assert_eq!(first.callback_info.as_deref(), Some(payload.body.as_str()));
        assert!(first.trans_end_time.is_some());
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn malformed_trans_end_time_is_ignored() {
        let lifecycle = OrderLifecycle::new(Arc::new(InMemoryOrderStore::new()));
        let order = processing_order(&lifecycle).await;
        let payload = NotifyPayload::from_json(json!({
            "merch_order_id": order.merch_order_id,
            "trade_status": "Failure",
            "trans_end_time": "31/12/2024"
        }))
        .unwrap();

        let updated = lifecycle.apply_notification(&payload).await.unwrap();
        assert_eq!(updated.status, OrderStatus::Failed);
        assert_eq!(updated.trans_end_time, None);
    }

    #[tokio::test]
    async fn unknown_order_notification_is_not_found() {
        let lifecycle = OrderLifecycle::new(Arc::new(InMemoryOrderStore::new()));
        let err = lifecycle
            .apply_notification(&notification("ORD-MISSING", "Completed"))
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::NotFound { .. }));
    }

    #[tokio::test]
    async fn query_failure_does_not_mutate() {
        let store = Arc::new(InMemoryOrderStore::new());
        let lifecycle = OrderLifecycle::new(store.clone());
        let order = processing_order(&lifecycle).await;

        let response = ProcessorResponse::from_json(json!({"code": "1", "msg": "Order not exist"}));
        let err = lifecycle
            .apply_query_result(&merchant(1), &order.merch_order_id, &response)
            .await
            .unwrap_err();

        match err {
            PaymentError::ProcessorError {
                message,
                provider_code,
                ..
            } => {
                assert_eq!(message, "Order not exist");
                assert_eq!(provider_code.as_deref(), Some("1"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(store.all().await, vec![order]);
    }

    #[tokio::test]
    async fn query_success_overwrites_status_for_owner_only() {
        let store = Arc::new(InMemoryOrderStore::new());
        let lifecycle = OrderLifecycle::new(store.clone());
        let order = processing_order(&lifecycle).await;
        let response = ProcessorResponse::from_json(json!({
            "code": "0",
            "result": "SUCCESS",
            "biz_content": {
                "merch_order_id": order.merch_order_id,
                "order_status": "Completed",
                "payment_order_id": "PO7"
            }
        }));

        let foreign = lifecycle
            .apply_query_result(&merchant(2), &order.merch_order_id, &response)
            .await
            .unwrap();
        assert!(foreign.order.is_none());
        assert_eq!(store.all().await, vec![order.clone()]);

        let outcome = lifecycle
            .apply_query_result(&merchant(1), &order.merch_order_id, &response)
            .await
            .unwrap();
        let updated = outcome.order.expect("owner sees order");
        assert_eq!(updated.status, OrderStatus::Completed);
        assert_eq!(updated.payment_order_id.as_deref(), Some("PO7"));
        assert_eq!(outcome.details.order_status.as_deref(), Some("Completed"));
    }

    /// Order store that commits a notification right after the next read,
    /// as a webhook racing a query would.
    struct RacingStore {
        inner: InMemoryOrderStore,
        after_read: Mutex<Option<NotificationUpdate>>,
    }

    #[async_trait]
    impl OrderStore for RacingStore {
        async fn insert(&self, draft: OrderDraft) -> Result<Order, DatabaseError> {
            self.inner.insert(draft).await
        }

        async fn find_by_merch_order_id(
            &self,
            merch_order_id: &str,
        ) -> Result<Option<Order>, DatabaseError> {
            let found = self.inner.find_by_merch_order_id(merch_order_id).await?;
            let racing = self.after_read.lock().unwrap().take();
            if let Some(update) = racing {
                self.inner
                    .record_notification(merch_order_id, &update)
                    .await?;
            }
            Ok(found)
        }

        async fn attach_payment(
            &self,
            merch_order_id: &str,
            attachment: &PaymentAttachment,
        ) -> Result<Order, DatabaseError> {
            self.inner.attach_payment(merch_order_id, attachment).await
        }

        async fn record_notification(
            &self,
            merch_order_id: &str,
            update: &NotificationUpdate,
        ) -> Result<Order, DatabaseError> {
            self.inner.record_notification(merch_order_id, update).await
        }

        async fn record_query_result(
            &self,
            merch_order_id: &str,
            update: &QueryUpdate,
        ) -> Result<Order, DatabaseError> {
            self.inner.record_query_result(merch_order_id, update).await
        }
    }

    #[tokio::test]
    async fn query_result_keeps_a_notification_committed_after_its_read() {
        let inner = InMemoryOrderStore::new();
        let store = Arc::new(RacingStore {
            inner: inner.clone(),
            after_read: Mutex::new(None),
        });
        let lifecycle = OrderLifecycle::new(store.clone());
        let order = processing_order(&lifecycle).await;

        let payload = notification(&order.merch_order_id, "Completed");
        *store.after_read.lock().unwrap() = Some(notification_update(&payload));

        let response = ProcessorResponse::from_json(json!({
            "code": "0",
            "result": "SUCCESS",
            "biz_content": {"order_status": "Paying", "payment_order_id": "PO7"}
        }));
        lifecycle
            .apply_query_result(&merchant(1), &order.merch_order_id, &response)
            .await
            .unwrap();

        let stored = inner.all().await.remove(0);
        assert_eq!(stored.status, OrderStatus::Paying);
        assert_eq!(stored.payment_order_id.as_deref(), Some("PO7"));
        assert_eq!(stored.callback_info.as_deref(), Some(payload.body.as_str()));
        assert_eq!(
            stored.trans_end_time.map(|t| t.format("%Y%m%d%H%M%S").to_string()),
            Some("20240101101010".to_string())
        );
        assert_eq!(stored.prepay_id.as_deref(), Some("PP1"));
    }

    #[tokio::test]
    async fn unrecognized_query_status_is_reported_but_not_applied() {
        let store = Arc::new(InMemoryOrderStore::new());
        let lifecycle = OrderLifecycle::new(store.clone());
        let order = processing_order(&lifecycle).await;
        let response = ProcessorResponse::from_json(json!({
            "code": "0",
            "result": "SUCCESS",
            "biz_content": {"order_status": "WAIT_PAY"}
        }));

        let outcome = lifecycle
            .apply_query_result(&merchant(1), &order.merch_order_id, &response)
            .await
            .unwrap();
        assert_eq!(outcome.order, Some(order.clone()));
        assert_eq!(store.all().await, vec![order]);
    }
}
