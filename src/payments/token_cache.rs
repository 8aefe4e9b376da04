use crate::database::models::Merchant;
use crate::database::repository::MerchantStore;
use crate::payments::client::ProcessorClient;
use crate::payments::error::PaymentResult;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::debug;

/// How bearer tokens are obtained for signed calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TokenPolicy {
    /// Fetch a fresh token for every call.
    #[default]
    AlwaysRefresh,
    /// Reuse the merchant's cached token while `now + skew` is before its
    /// expiry.
    ReuseUntilExpiry { skew: Duration },
}

impl TokenPolicy {
    /// Cached token usable at `now`, if the policy allows reuse.
    pub fn reusable<'a>(&self, merchant: &'a Merchant, now: DateTime<Utc>) -> Option<&'a str> {
        match self {
            TokenPolicy::AlwaysRefresh => None,
            TokenPolicy::ReuseUntilExpiry { skew } => {
                let token = merchant.cached_token.as_deref().filter(|t| !t.is_empty())?;
                let expires_at = merchant.token_expires_at?;
                (now + *skew < expires_at).then_some(token)
            }
        }
    }
}

/// Per-merchant token acquisition. Fresh tokens are persisted on the
/// merchant record.
#[derive(Clone)]
pub struct TokenCache {
    client: ProcessorClient,
    merchants: Arc<dyn MerchantStore>,
    policy: TokenPolicy,
}

impl TokenCache {
    pub fn new(
        client: ProcessorClient,
        merchants: Arc<dyn MerchantStore>,
        policy: TokenPolicy,
    ) -> Self {
        Self {
            client,
            merchants,
            policy,
        }
    }

    pub async fn acquire(&self, merchant: &Merchant) -> PaymentResult<String> {
        if let Some(token) = self.policy.reusable(merchant, Utc::now()) {
            debug!(merchant_id = merchant.id, "reusing cached processor token");
            return Ok(token.to_string());
        }

        let issued = self.client.fetch_token(merchant).await?;
        self.merchants
            .update_token(merchant.id, &issued.token, issued.expires_at)
            .await?;
        Ok(issued.token)
    }
}
