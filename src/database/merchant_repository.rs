use crate::database::error::DatabaseError;
use crate::database::models::{Merchant, NewMerchant};
use crate::database::repository::MerchantStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

const MERCHANT_COLUMNS: &str = "id, name, email, app_key, app_secret, app_id, merch_code, \
     private_key, public_key, notify_url, redirect_url, cached_token, token_expires_at, \
     is_active, created_at, updated_at";

/// Repository for merchant records
pub struct MerchantRepository {
    pool: PgPool,
}

impl MerchantRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MerchantStore for MerchantRepository {
    async fn insert(&self, merchant: NewMerchant) -> Result<Merchant, DatabaseError> {
        let sql = format!(
            "INSERT INTO merchants
             (name, email, app_key, app_secret, app_id, merch_code, private_key, public_key,
              notify_url, redirect_url)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             RETURNING {}",
            MERCHANT_COLUMNS
        );
        sqlx::query_as::<_, Merchant>(&sql)
            .bind(&merchant.name)
            .bind(&merchant.email)
            .bind(&merchant.app_key)
            .bind(&merchant.app_secret)
            .bind(&merchant.app_id)
            .bind(&merchant.merch_code)
            .bind(&merchant.private_key)
            .bind(&merchant.public_key)
            .bind(&merchant.notify_url)
            .bind(&merchant.redirect_url)
            .fetch_one(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Merchant>, DatabaseError> {
        let sql = format!("SELECT {} FROM merchants WHERE id = $1", MERCHANT_COLUMNS);
        sqlx::query_as::<_, Merchant>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Merchant>, DatabaseError> {
        let sql = format!("SELECT {} FROM merchants WHERE email = $1", MERCHANT_COLUMNS);
        sqlx::query_as::<_, Merchant>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)
    }

    async fn list_active(&self, skip: i64, limit: i64) -> Result<Vec<Merchant>, DatabaseError> {
        let sql = format!(
            "SELECT {} FROM merchants WHERE is_active = TRUE ORDER BY id ASC OFFSET $1 LIMIT $2",
            MERCHANT_COLUMNS
        );
        sqlx::query_as::<_, Merchant>(&sql)
            .bind(skip.max(0))
            .bind(limit.max(0))
            .fetch_all(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)
    }

    async fn update_token(
        &self,
        id: i64,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Merchant, DatabaseError> {
        let sql = format!(
            "UPDATE merchants
             SET cached_token = $2, token_expires_at = $3, updated_at = NOW()
             WHERE id = $1
             RETURNING {}",
            MERCHANT_COLUMNS
        );
        sqlx::query_as::<_, Merchant>(&sql)
            .bind(id)
            .bind(token)
            .bind(expires_at)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?
            .ok_or_else(|| DatabaseError::not_found("Merchant", id))
    }

    async fn set_active(&self, id: i64, is_active: bool) -> Result<Merchant, DatabaseError> {
        let sql = format!(
            "UPDATE merchants SET is_active = $2, updated_at = NOW() WHERE id = $1 RETURNING {}",
            MERCHANT_COLUMNS
        );
        sqlx::query_as::<_, Merchant>(&sql)
            .bind(id)
            .bind(is_active)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?
            .ok_or_else(|| DatabaseError::not_found("Merchant", id))
    }

    async fn health_check(&self) -> Result<(), DatabaseError> {
        crate::database::health_check(&self.pool).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::init_pool;

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

    #[tokio::test]
    #[ignore] // Requires DATABASE_URL with migrations applied
    async fn test_insert_and_token_update() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let pool = init_pool(&url, None).await.expect("pool");
        let repo = MerchantRepository::new(pool);

        let email = format!("{}@example.com", uuid::Uuid::new_v4());
        let merchant = repo.insert(new_merchant(&email)).await.expect("insert");
        assert!(merchant.is_active);
        assert!(repo.insert(new_merchant(&email)).await.is_err());

        let expires = Utc::now();
        let updated = repo
            .update_token(merchant.id, "tok", expires)
            .await
            .expect("update token");
        assert_eq!(updated.cached_token.as_deref(), Some("tok"));
    }
}
