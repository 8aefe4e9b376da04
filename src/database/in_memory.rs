use crate::database::error::{DatabaseError, DatabaseErrorKind};
use crate::database::models::{
    Merchant, NewMerchant, NotificationUpdate, Order, OrderDraft, OrderStatus, PaymentAttachment,
    QueryUpdate,
};
use crate::database::repository::{MerchantStore, OrderStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Thread-safe in-memory merchant store.
///
/// Backs tests and `SKIP_EXTERNALS` runs; enforces the same unique email
/// constraint as the `merchants` table.
#[derive(Default, Clone)]
pub struct InMemoryMerchantStore {
    merchants: Arc<RwLock<HashMap<i64, Merchant>>>,
    next_id: Arc<AtomicI64>,
}

impl InMemoryMerchantStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn modify(
        &self,
        id: i64,
        apply: impl FnOnce(&mut Merchant) + Send,
    ) -> Result<Merchant, DatabaseError> {
        let mut merchants = self.merchants.write().await;
        let merchant = merchants
            .get_mut(&id)
            .ok_or_else(|| DatabaseError::not_found("Merchant", id))?;
        apply(merchant);
        merchant.updated_at = Utc::now();
        Ok(merchant.clone())
    }
}

#[async_trait]
impl MerchantStore for InMemoryMerchantStore {
    async fn insert(&self, new: NewMerchant) -> Result<Merchant, DatabaseError> {
        let mut merchants = self.merchants.write().await;
        if merchants.values().any(|m| m.email == new.email) {
            return Err(DatabaseError::unique_violation("merchants_email_key"));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let now = Utc::now();
        let merchant = Merchant {
            id,
            name: new.name,
            email: new.email,
            app_key: new.app_key,
            app_secret: new.app_secret,
            app_id: new.app_id,
            merch_code: new.merch_code,
            private_key: new.private_key,
            public_key: new.public_key,
            notify_url: new.notify_url,
            redirect_url: new.redirect_url,
            cached_token: None,
            token_expires_at: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        merchants.insert(id, merchant.clone());
        Ok(merchant)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Merchant>, DatabaseError> {
        let merchants = self.merchants.read().await;
        Ok(merchants.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Merchant>, DatabaseError> {
        let merchants = self.merchants.read().await;
        Ok(merchants.values().find(|m| m.email == email).cloned())
    }

    async fn list_active(&self, skip: i64, limit: i64) -> Result<Vec<Merchant>, DatabaseError> {
        let merchants = self.merchants.read().await;
        let mut active: Vec<Merchant> = merchants
            .values()
            .filter(|m| m.is_active)
            .cloned()
            .collect();
        active.sort_by_key(|m| m.id);
        Ok(active
            .into_iter()
            .skip(skip.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn update_token(
        &self,
        id: i64,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Merchant, DatabaseError> {
        let token = token.to_string();
        self.modify(id, move |m| {
            m.cached_token = Some(token);
            m.token_expires_at = Some(expires_at);
        })
        .await
    }

    async fn set_active(&self, id: i64, is_active: bool) -> Result<Merchant, DatabaseError> {
        self.modify(id, move |m| m.is_active = is_active).await
    }

    async fn health_check(&self) -> Result<(), DatabaseError> {
        Ok(())
    }
}

/// Thread-safe in-memory order store keyed by `merch_order_id`.
#[derive(Clone)]
pub struct InMemoryOrderStore {
    orders: Arc<RwLock<HashMap<String, Order>>>,
    next_id: Arc<AtomicI64>,
    merchants: Option<InMemoryMerchantStore>,
}

impl Default for InMemoryOrderStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryOrderStore {
    /// Store without foreign-key enforcement.
    pub fn new() -> Self {
        Self {
            orders: Arc::default(),
            next_id: Arc::default(),
            merchants: None,
        }
    }

    /// Store that rejects orders for merchants missing from `merchants`,
    /// mirroring the `orders.merchant_id` foreign key.
    pub fn with_merchants(merchants: InMemoryMerchantStore) -> Self {
        Self {
            merchants: Some(merchants),
            ..Self::new()
        }
    }

    pub async fn len(&self) -> usize {
        self.orders.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.orders.read().await.is_empty()
    }

    /// Applies `apply` to the stored row under the write lock.
    async fn modify(
        &self,
        merch_order_id: &str,
        apply: impl FnOnce(&mut Order) + Send,
    ) -> Result<Order, DatabaseError> {
        let mut orders = self.orders.write().await;
        let stored = orders
            .get_mut(merch_order_id)
            .ok_or_else(|| DatabaseError::not_found("Order", merch_order_id))?;
        apply(stored);
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }

    /// Snapshot of every stored order, ordered by id.
    pub async fn all(&self) -> Vec<Order> {
        let mut orders: Vec<Order> = self.orders.read().await.values().cloned().collect();
        orders.sort_by_key(|o| o.id);
        orders
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert(&self, draft: OrderDraft) -> Result<Order, DatabaseError> {
        if let Some(merchants) = &self.merchants {
            if merchants.find_by_id(draft.merchant_id).await?.is_none() {
                return Err(DatabaseError::new(DatabaseErrorKind::ForeignKeyViolation {
                    constraint: "orders_merchant_id_fkey".to_string(),
                }));
            }
        }

        let mut orders = self.orders.write().await;
        if orders.contains_key(&draft.merch_order_id) {
            return Err(DatabaseError::unique_violation("orders_merch_order_id_key"));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let now = Utc::now();
        let order = Order {
            id,
            merchant_id: draft.merchant_id,
            merch_order_id: draft.merch_order_id,
            product_name: draft.product_name,
            quantity: draft.quantity,
            total_amount: draft.total_amount,
            currency: draft.currency,
            customer_name: draft.customer_name,
            customer_email: draft.customer_email,
            customer_phone: draft.customer_phone,
            status: OrderStatus::Pending,
            prepay_id: None,
            payment_order_id: None,
            checkout_url: None,
            gateway_response: None,
            callback_info: None,
            created_at: now,
            updated_at: now,
            trans_end_time: None,
        };
        orders.insert(order.merch_order_id.clone(), order.clone());
        Ok(order)
    }

    async fn find_by_merch_order_id(
        &self,
        merch_order_id: &str,
    ) -> Result<Option<Order>, DatabaseError> {
        let orders = self.orders.read().await;
        Ok(orders.get(merch_order_id).cloned())
    }

    async fn attach_payment(
        &self,
        merch_order_id: &str,
        attachment: &PaymentAttachment,
    ) -> Result<Order, DatabaseError> {
        self.modify(merch_order_id, |order| attachment.apply_to(order)).await
    }

    async fn record_notification(
        &self,
        merch_order_id: &str,
        update: &NotificationUpdate,
    ) -> Result<Order, DatabaseError> {
        self.modify(merch_order_id, |order| update.apply_to(order)).await
    }

    async fn record_query_result(
        &self,
        merch_order_id: &str,
        update: &QueryUpdate,
    ) -> Result<Order, DatabaseError> {
        self.modify(merch_order_id, |order| update.apply_to(order)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;

    fn new_merchant(email: &str) -> NewMerchant {
        NewMerchant {
            name: "Shop".to_string(),
            email: email.to_string(),
            app_key: "key".to_string(),
            app_secret: "secret".to_string(),
            app_id: "app".to_string(),
            merch_code: "100".to_string(),
            private_key: "pem".to_string(),
            public_key: None,
            notify_url: "https://shop.example.com/notify".to_string(),
            redirect_url: "https://shop.example.com/done".to_string(),
        }
    }

    fn draft(merchant_id: i64, merch_order_id: &str) -> OrderDraft {
        OrderDraft {
            merchant_id,
            merch_order_id: merch_order_id.to_string(),
            product_name: "Shoes".to_string(),
            quantity: 1,
            total_amount: BigDecimal::from(1000),
            currency: "DJF".to_string(),
            customer_name: "Amina".to_string(),
            customer_email: "amina@example.com".to_string(),
            customer_phone: None,
        }
    }

    #[tokio::test]
    async fn duplicate_email_is_a_unique_violation() {
        let store = InMemoryMerchantStore::new();
        store.insert(new_merchant("a@example.com")).await.unwrap();
        let err = store.insert(new_merchant("a@example.com")).await.unwrap_err();
        assert!(matches!(err.kind, DatabaseErrorKind::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn list_active_skips_inactive_and_pages() {
        let store = InMemoryMerchantStore::new();
        for i in 0..4 {
            store
                .insert(new_merchant(&format!("m{}@example.com", i)))
                .await
                .unwrap();
        }
        store.set_active(2, false).await.unwrap();

        let page = store.list_active(1, 10).await.unwrap();
        let ids: Vec<i64> = page.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![3, 4]);
    }

    #[tokio::test]
    async fn update_token_persists_expiry() {
        let store = InMemoryMerchantStore::new();
        let merchant = store.insert(new_merchant("t@example.com")).await.unwrap();
        let expires = Utc::now();
        let updated = store.update_token(merchant.id, "tok", expires).await.unwrap();
        assert_eq!(updated.cached_token.as_deref(), Some("tok"));
        assert_eq!(updated.token_expires_at, Some(expires));
        assert!(store.update_token(99, "tok", expires).await.is_err());
    }

    #[tokio::test]
    async fn orders_enforce_unique_id_and_merchant_fk() {
        let merchants = InMemoryMerchantStore::new();
        let merchant = merchants.insert(new_merchant("o@example.com")).await.unwrap();
        let orders = InMemoryOrderStore::with_merchants(merchants);

        orders.insert(draft(merchant.id, "ORD1")).await.unwrap();
        let dup = orders.insert(draft(merchant.id, "ORD1")).await.unwrap_err();
        assert!(matches!(dup.kind, DatabaseErrorKind::UniqueViolation { .. }));

        let fk = orders.insert(draft(42, "ORD2")).await.unwrap_err();
        assert!(matches!(fk.kind, DatabaseErrorKind::ForeignKeyViolation { .. }));
        assert_eq!(orders.len().await, 1);
    }

    #[tokio::test]
    async fn query_write_keeps_notification_columns() {
        let orders = InMemoryOrderStore::new();
        let created = orders.insert(draft(1, "ORD1")).await.unwrap();

        orders
            .record_notification(
                "ORD1",
                &NotificationUpdate {
                    reported: Some(OrderStatus::Completed),
                    payment_order_id: None,
                    callback_info: r#"{"trade_status":"Completed"}"#.to_string(),
                    trans_end_time: Some(created.created_at),
                },
            )
            .await
            .unwrap();
        let updated = orders
            .record_query_result(
                "ORD1",
                &QueryUpdate {
                    status: OrderStatus::Paying,
                    payment_order_id: Some("PO1".to_string()),
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.status, OrderStatus::Paying);
        assert_eq!(updated.payment_order_id.as_deref(), Some("PO1"));
        assert_eq!(
            updated.callback_info.as_deref(),
            Some(r#"{"trade_status":"Completed"}"#)
        );
        assert_eq!(updated.trans_end_time, Some(created.created_at));
        assert!(updated.updated_at >= created.updated_at);

        let missing = orders
            .record_query_result(
                "ORD2",
                &QueryUpdate {
                    status: OrderStatus::Paying,
                    payment_order_id: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(missing.kind, DatabaseErrorKind::NotFound { .. }));
    }
}
