//! Shared fixtures: RSA keys, a scripted processor transport and a gateway
//! wired to in-memory stores.

#![allow(dead_code)]

use async_trait::async_trait;
use merchant_paygate::api::AppState;
use merchant_paygate::config::ProcessorConfig;
use merchant_paygate::database::in_memory::{InMemoryMerchantStore, InMemoryOrderStore};
use merchant_paygate::database::models::{Merchant, NewMerchant};
use merchant_paygate::health::HealthChecker;
use merchant_paygate::payments::error::{PaymentError, PaymentResult};
use merchant_paygate::payments::webhook::verifier_for;
use merchant_paygate::payments::{
    HttpTransport, ProcessorClient, TokenCache, TokenPolicy, TransportResponse,
};
use merchant_paygate::services::{MerchantRegistry, OrderLifecycle, PaymentService};
use rand::rngs::OsRng;
use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::RsaPrivateKey;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, OnceLock};

pub const TOKEN_PATH: &str = "/token";
pub const PREORDER_PATH: &str = "/preOrder";
pub const QUERY_ORDER_PATH: &str = "/queryOrder";

/// `(private PKCS#8 PEM, public SPKI PEM)`, generated once per test binary.
pub fn key_pair() -> (&'static str, &'static str) {
    static KEYS: OnceLock<(String, String)> = OnceLock::new();
    let (private, public) = KEYS.get_or_init(|| {
        let key = RsaPrivateKey::new(&mut OsRng, 1024).expect("generate key");
        (
            key.to_pkcs8_pem(LineEnding::LF).expect("pkcs8").to_string(),
            key.to_public_key()
                .to_public_key_pem(LineEnding::LF)
                .expect("spki"),
        )
    });
    (private, public)
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Value,
}

/// Answers processor calls from per-path queues. The last queued response
/// for a path is repeated once the queue drains; unscripted paths fail as
/// network errors.
#[derive(Default)]
pub struct ScriptedTransport {
    responses: Mutex<HashMap<String, VecDeque<TransportResponse>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, path_suffix: &str, status: u16, body: Value) -> &Self {
        self.responses
            .lock()
            .unwrap()
            .entry(path_suffix.to_string())
            .or_default()
            .push_back(TransportResponse {
                status,
                body: body.to_string(),
            });
        self
    }

    /// Token endpoint answers with a valid far-future token.
    pub fn with_token(&self) -> &Self {
        self.respond(
            TOKEN_PATH,
            200,
            json!({"token": "Bearer tok-123", "expirationDate": "20991231235959"}),
        )
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, path_suffix: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.url.ends_with(path_suffix))
            .collect()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn post_json(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: &Value,
    ) -> PaymentResult<TransportResponse> {
        self.calls.lock().unwrap().push(RecordedCall {
            url: url.to_string(),
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            body: body.clone(),
        });

        let mut responses = self.responses.lock().unwrap();
        let queue = responses
            .iter_mut()
            .find(|(suffix, _)| url.ends_with(suffix.as_str()))
            .map(|(_, queue)| queue);

        match queue {
            Some(queue) if queue.len() > 1 => Ok(queue.pop_front().unwrap()),
            Some(queue) if !queue.is_empty() => Ok(queue.front().unwrap().clone()),
            _ => Err(PaymentError::NetworkError {
                message: format!("no scripted response for {}", url),
            }),
        }
    }
}

pub fn processor_config() -> ProcessorConfig {
    ProcessorConfig {
        base_url: "https://processor.test".to_string(),
        checkout_base_url: "https://checkout.test".to_string(),
        ..ProcessorConfig::default()
    }
}

pub struct Gateway {
    pub service: PaymentService,
    pub transport: Arc<ScriptedTransport>,
    pub merchants: InMemoryMerchantStore,
    pub orders: InMemoryOrderStore,
}

impl Gateway {
    pub fn new(verify_signatures: bool) -> Self {
        Self::with_policy(TokenPolicy::AlwaysRefresh, verify_signatures)
    }

    pub fn with_policy(policy: TokenPolicy, verify_signatures: bool) -> Self {
        let transport = Arc::new(ScriptedTransport::new());
        let merchants = InMemoryMerchantStore::new();
        let orders = InMemoryOrderStore::with_merchants(merchants.clone());

        let client = ProcessorClient::new(processor_config(), transport.clone());
        let tokens = TokenCache::new(client.clone(), Arc::new(merchants.clone()), policy);
        let service = PaymentService::new(
            MerchantRegistry::new(Arc::new(merchants.clone())),
            OrderLifecycle::new(Arc::new(orders.clone())),
            client,
            tokens,
            verifier_for(verify_signatures),
        );

        Self {
            service,
            transport,
            merchants,
            orders,
        }
    }

    pub fn app_state(&self) -> AppState {
        AppState {
            payments: self.service.clone(),
            health: HealthChecker::new(Arc::new(self.merchants.clone())),
            public_base_url: "http://gateway.test".to_string(),
        }
    }

    pub async fn register_merchant(&self, email: &str) -> Merchant {
        self.service
            .merchants()
            .register(new_merchant(email))
            .await
            .expect("register merchant")
    }
}

pub fn new_merchant(email: &str) -> NewMerchant {
    let (private_pem, public_pem) = key_pair();
    NewMerchant {
        name: "Djibouti Books".to_string(),
        email: email.to_string(),
        app_key: "app-key".to_string(),
        app_secret: "app-secret".to_string(),
        app_id: "app-id".to_string(),
        merch_code: "100200".to_string(),
        private_key: private_pem.to_string(),
        public_key: Some(public_pem.to_string()),
        notify_url: "https://books.example.com/notify".to_string(),
        redirect_url: "https://books.example.com/thanks".to_string(),
    }
}

pub fn preorder_success(prepay_id: &str) -> Value {
    json!({
        "code": "0",
        "result": "SUCCESS",
        "msg": "success",
        "biz_content": {"prepay_id": prepay_id}
    })
}
