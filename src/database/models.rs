use crate::database::error::{DatabaseError, DatabaseErrorKind};
use crate::payments::types::TradeStatus;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::str::FromStr;

/// Merchant entity. Credentials never change after onboarding.
#[derive(Clone, PartialEq)]
#[cfg_attr(feature = "database", derive(sqlx::FromRow))]
pub struct Merchant {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub app_key: String,
    pub app_secret: String,
    pub app_id: String,
    pub merch_code: String,
    pub private_key: String,
    pub public_key: Option<String>,
    pub notify_url: String,
    pub redirect_url: String,
    pub cached_token: Option<String>,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl std::fmt::Debug for Merchant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Merchant")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("email", &self.email)
            .field("app_id", &self.app_id)
            .field("merch_code", &self.merch_code)
            .field("app_secret", &"<redacted>")
            .field("private_key", &"<redacted>")
            .field("has_cached_token", &self.cached_token.is_some())
            .field("is_active", &self.is_active)
            .finish()
    }
}

/// Validated input for a merchant insert.
#[derive(Clone)]
pub struct NewMerchant {
    pub name: String,
    pub email: String,
    pub app_key: String,
    pub app_secret: String,
    pub app_id: String,
    pub merch_code: String,
    pub private_key: String,
    pub public_key: Option<String>,
    pub notify_url: String,
    pub redirect_url: String,
}

impl std::fmt::Debug for NewMerchant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewMerchant")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("app_id", &self.app_id)
            .field("merch_code", &self.merch_code)
            .finish_non_exhaustive()
    }
}

/// Local order status. Persisted as the string returned by `as_str`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    #[serde(rename = "pending")]
    Pending,
    #[serde(rename = "processing")]
    Processing,
    Paying,
    Completed,
    #[serde(rename = "Failure")]
    Failed,
    Expired,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Paying => "Paying",
            OrderStatus::Completed => "Completed",
            OrderStatus::Failed => "Failure",
            OrderStatus::Expired => "Expired",
        }
    }

    /// States reached through processor reports rather than local actions.
    pub fn is_settled(&self) -> bool {
        !matches!(self, OrderStatus::Pending | OrderStatus::Processing)
    }

    /// Status after a processor report. An unrecognized report (`None`)
    /// only advances `pending` to `processing` and never pulls a settled
    /// order back.
    pub fn after_report(self, reported: Option<OrderStatus>) -> OrderStatus {
        match reported {
            Some(status) => status,
            None if self.is_settled() => self,
            None => OrderStatus::Processing,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = DatabaseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(OrderStatus::Pending),
            "processing" => Ok(OrderStatus::Processing),
            "Paying" => Ok(OrderStatus::Paying),
            "Completed" => Ok(OrderStatus::Completed),
            "Failure" => Ok(OrderStatus::Failed),
            "Expired" => Ok(OrderStatus::Expired),
            other => Err(DatabaseError::new(DatabaseErrorKind::Decode {
                message: format!("unknown order status: {}", other),
            })),
        }
    }
}

impl From<TradeStatus> for OrderStatus {
    fn from(status: TradeStatus) -> Self {
        match status {
            TradeStatus::Paying => OrderStatus::Paying,
            TradeStatus::Completed => OrderStatus::Completed,
            TradeStatus::Failure => OrderStatus::Failed,
            TradeStatus::Expired => OrderStatus::Expired,
        }
    }
}

/// Order entity. Never deleted; `merchant_id` and `merch_order_id` are
/// fixed at creation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Order {
    pub id: i64,
    pub merchant_id: i64,
    pub merch_order_id: String,
    pub product_name: String,
    pub quantity: i32,
    pub total_amount: BigDecimal,
    pub currency: String,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,
    pub status: OrderStatus,
    pub prepay_id: Option<String>,
    pub payment_order_id: Option<String>,
    pub checkout_url: Option<String>,
    pub gateway_response: Option<JsonValue>,
    /// Notification body exactly as received.
    pub callback_info: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub trans_end_time: Option<DateTime<Utc>>,
}

/// Order insert with its identifier already assigned.
#[derive(Debug, Clone)]
pub struct OrderDraft {
    pub merchant_id: i64,
    pub merch_order_id: String,
    pub product_name: String,
    pub quantity: i32,
    pub total_amount: BigDecimal,
    pub currency: String,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,
}

/// Columns written when a preorder succeeds. `pending` moves to
/// `processing`; an order a notification already settled keeps its status.
#[derive(Debug, Clone)]
pub struct PaymentAttachment {
    pub prepay_id: String,
    pub checkout_url: String,
    pub gateway_response: JsonValue,
}

impl PaymentAttachment {
    pub fn apply_to(&self, order: &mut Order) {
        if order.status == OrderStatus::Pending {
            order.status = OrderStatus::Processing;
        }
        order.prepay_id = Some(self.prepay_id.clone());
        order.checkout_url = Some(self.checkout_url.clone());
        order.gateway_response = Some(self.gateway_response.clone());
    }
}

/// Columns written by a processor notification. Absent identifiers and
/// timestamps keep the stored value.
#[derive(Debug, Clone)]
pub struct NotificationUpdate {
    pub reported: Option<OrderStatus>,
    pub payment_order_id: Option<String>,
    pub callback_info: String,
    pub trans_end_time: Option<DateTime<Utc>>,
}

impl NotificationUpdate {
    pub fn apply_to(&self, order: &mut Order) {
        order.status = order.status.after_report(self.reported);
        if let Some(payment_order_id) = &self.payment_order_id {
            order.payment_order_id = Some(payment_order_id.clone());
        }
        order.callback_info = Some(self.callback_info.clone());
        if let Some(ended_at) = self.trans_end_time {
            order.trans_end_time = Some(ended_at);
        }
    }
}

/// Columns written by a successful order query with a recognized status.
#[derive(Debug, Clone)]
pub struct QueryUpdate {
    pub status: OrderStatus,
    pub payment_order_id: Option<String>,
}

impl QueryUpdate {
    pub fn apply_to(&self, order: &mut Order) {
        order.status = self.status;
        if let Some(payment_order_id) = &self.payment_order_id {
            order.payment_order_id = Some(payment_order_id.clone());
        }
    }
}
