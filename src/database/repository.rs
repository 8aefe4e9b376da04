//! Storage ports implemented by the Postgres repositories and the in-memory
//! stores.

use crate::database::error::DatabaseError;
use crate::database::models::{
    Merchant, NewMerchant, NotificationUpdate, Order, OrderDraft, PaymentAttachment, QueryUpdate,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[async_trait]
pub trait MerchantStore: Send + Sync {
    /// Fails with `UniqueViolation` when the email is already registered.
    async fn insert(&self, merchant: NewMerchant) -> Result<Merchant, DatabaseError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<Merchant>, DatabaseError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<Merchant>, DatabaseError>;

    /// Active merchants ordered by id.
    async fn list_active(&self, skip: i64, limit: i64) -> Result<Vec<Merchant>, DatabaseError>;

    async fn update_token(
        &self,
        id: i64,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Merchant, DatabaseError>;

    async fn set_active(&self, id: i64, is_active: bool) -> Result<Merchant, DatabaseError>;

    async fn health_check(&self) -> Result<(), DatabaseError>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Fails with `UniqueViolation` on a duplicate `merch_order_id` and
    /// `ForeignKeyViolation` for an unknown merchant.
    async fn insert(&self, draft: OrderDraft) -> Result<Order, DatabaseError>;

    async fn find_by_merch_order_id(
        &self,
        merch_order_id: &str,
    ) -> Result<Option<Order>, DatabaseError>;

    // Each write below is a single row update limited to the columns its
    // channel owns, evaluated against the row as stored, and stamps
    // `updated_at`. A concurrent write to other columns is never reverted.

    async fn attach_payment(
        &self,
        merch_order_id: &str,
        attachment: &PaymentAttachment,
    ) -> Result<Order, DatabaseError>;

    async fn record_notification(
        &self,
        merch_order_id: &str,
        update: &NotificationUpdate,
    ) -> Result<Order, DatabaseError>;

    async fn record_query_result(
        &self,
        merch_order_id: &str,
        update: &QueryUpdate,
    ) -> Result<Order, DatabaseError>;
}
