use crate::database::error::DatabaseError;
use crate::database::models::{
    NotificationUpdate, Order, OrderDraft, OrderStatus, PaymentAttachment, QueryUpdate,
};
use crate::database::repository::OrderStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgArguments;
use sqlx::query::QueryAs;
use sqlx::{types::BigDecimal, FromRow, PgPool, Postgres};

const ORDER_COLUMNS: &str = "id, merchant_id, merch_order_id, product_name, quantity, \
     total_amount, currency, customer_name, customer_email, customer_phone, status, prepay_id, \
     payment_order_id, checkout_url, gateway_response, callback_info, created_at, updated_at, \
     trans_end_time";

/// Row shape of the `orders` table; `status` is decoded separately.
#[derive(Debug, Clone, FromRow)]
struct OrderRow {
    id: i64,
    merchant_id: i64,
    merch_order_id: String,
    product_name: String,
    quantity: i32,
    total_amount: BigDecimal,
    currency: String,
    customer_name: String,
    customer_email: String,
    customer_phone: Option<String>,
    status: String,
    prepay_id: Option<String>,
    payment_order_id: Option<String>,
    checkout_url: Option<String>,
    gateway_response: Option<serde_json::Value>,
    callback_info: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    trans_end_time: Option<DateTime<Utc>>,
}

impl TryFrom<OrderRow> for Order {
    type Error = DatabaseError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        Ok(Order {
            status: row.status.parse::<OrderStatus>()?,
            id: row.id,
            merchant_id: row.merchant_id,
            merch_order_id: row.merch_order_id,
            product_name: row.product_name,
            quantity: row.quantity,
            total_amount: row.total_amount,
            currency: row.currency,
            customer_name: row.customer_name,
            customer_email: row.customer_email,
            customer_phone: row.customer_phone,
            prepay_id: row.prepay_id,
            payment_order_id: row.payment_order_id,
            checkout_url: row.checkout_url,
            gateway_response: row.gateway_response,
            callback_info: row.callback_info,
            created_at: row.created_at,
            updated_at: row.updated_at,
            trans_end_time: row.trans_end_time,
        })
    }
}

/// Repository for payment orders
pub struct OrderRepository {
    pool: PgPool,
}

impl OrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderStore for OrderRepository {
    async fn insert(&self, draft: OrderDraft) -> Result<Order, DatabaseError> {
        let sql = format!(
            "INSERT INTO orders
             (merchant_id, merch_order_id, product_name, quantity, total_amount, currency,
              customer_name, customer_email, customer_phone, status)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             RETURNING {}",
            ORDER_COLUMNS
        );
        let row = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(draft.merchant_id)
            .bind(&draft.merch_order_id)
            .bind(&draft.product_name)
            .bind(draft.quantity)
            .bind(&draft.total_amount)
            .bind(&draft.currency)
            .bind(&draft.customer_name)
            .bind(&draft.customer_email)
            .bind(&draft.customer_phone)
            .bind(OrderStatus::Pending.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;
        Order::try_from(row)
    }

    async fn find_by_merch_order_id(
        &self,
        merch_order_id: &str,
    ) -> Result<Option<Order>, DatabaseError> {
        let sql = format!(
            "SELECT {} FROM orders WHERE merch_order_id = $1",
            ORDER_COLUMNS
        );
        sqlx::query_as::<_, OrderRow>(&sql)
            .bind(merch_order_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?
            .map(Order::try_from)
            .transpose()
    }

    async fn attach_payment(
        &self,
        merch_order_id: &str,
        attachment: &PaymentAttachment,
    ) -> Result<Order, DatabaseError> {
        let sql = format!(
            "UPDATE orders
             SET status = CASE WHEN status = 'pending' THEN 'processing' ELSE status END,
                 prepay_id = $2, checkout_url = $3, gateway_response = $4,
                 updated_at = NOW()
             WHERE merch_order_id = $1
             RETURNING {}",
            ORDER_COLUMNS
        );
        let query = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(merch_order_id)
            .bind(&attachment.prepay_id)
            .bind(&attachment.checkout_url)
            .bind(&attachment.gateway_response);
        self.update_one(query, merch_order_id).await
    }

    async fn record_notification(
        &self,
        merch_order_id: &str,
        update: &NotificationUpdate,
    ) -> Result<Order, DatabaseError> {
        // A NULL report keeps settled statuses and advances the rest to
        // processing, matching `OrderStatus::after_report`.
        let sql = format!(
            "UPDATE orders
             SET status = COALESCE($2, CASE WHEN status IN ('pending', 'processing')
                                       THEN 'processing' ELSE status END),
                 payment_order_id = COALESCE($3, payment_order_id),
                 callback_info = $4,
                 trans_end_time = COALESCE($5, trans_end_time),
                 updated_at = NOW()
             WHERE merch_order_id = $1
             RETURNING {}",
            ORDER_COLUMNS
        );
        let query = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(merch_order_id)
            .bind(update.reported.map(|s| s.as_str()))
            .bind(&update.payment_order_id)
            .bind(&update.callback_info)
            .bind(update.trans_end_time);
        self.update_one(query, merch_order_id).await
    }

    async fn record_query_result(
        &self,
        merch_order_id: &str,
        update: &QueryUpdate,
    ) -> Result<Order, DatabaseError> {
        let sql = format!(
            "UPDATE orders
             SET status = $2, payment_order_id = COALESCE($3, payment_order_id),
                 updated_at = NOW()
             WHERE merch_order_id = $1
             RETURNING {}",
            ORDER_COLUMNS
        );
        let query = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(merch_order_id)
            .bind(update.status.as_str())
            .bind(&update.payment_order_id);
        self.update_one(query, merch_order_id).await
    }
}

impl OrderRepository {
    async fn update_one<'q>(
        &self,
        query: QueryAs<'q, Postgres, OrderRow, PgArguments>,
        merch_order_id: &str,
    ) -> Result<Order, DatabaseError> {
        query
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?
            .ok_or_else(|| DatabaseError::not_found("Order", merch_order_id))
            .and_then(Order::try_from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(status: &str) -> OrderRow {
        let now = Utc::now();
        OrderRow {
            id: 1,
            merchant_id: 1,
            merch_order_id: "ORD1".to_string(),
            product_name: "Shoes".to_string(),
            quantity: 1,
            total_amount: BigDecimal::from(1000),
            currency: "DJF".to_string(),
            customer_name: "Amina".to_string(),
            customer_email: "amina@example.com".to_string(),
            customer_phone: None,
            status: status.to_string(),
            prepay_id: None,
            payment_order_id: None,
            checkout_url: None,
            gateway_response: None,
            callback_info: None,
            created_at: now,
            updated_at: now,
            trans_end_time: None,
        }
    }

    #[test]
    fn test_row_status_is_decoded() {
        let order = Order::try_from(row("Failure")).expect("known status");
        assert_eq!(order.status, OrderStatus::Failed);
        assert!(Order::try_from(row("refunded")).is_err());
    }
}
