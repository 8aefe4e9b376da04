use crate::payments::error::{PaymentError, PaymentResult};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::debug;

/// Status and body of a completed HTTP exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json(&self) -> Result<JsonValue, serde_json::Error> {
        serde_json::from_str(&self.body)
    }
}

/// Outbound seam used by `ProcessorClient`.
///
/// Implementations return `NetworkError` only when no response arrived; any
/// status code, including 5xx, is returned as a `TransportResponse`.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn post_json(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: &JsonValue,
    ) -> PaymentResult<TransportResponse>;
}

/// reqwest-backed transport. No retries: a failed call fails the request.
#[derive(Clone)]
pub struct PaymentHttpClient {
    client: Client,
    timeout: Duration,
}

impl PaymentHttpClient {
    pub fn new(timeout: Duration, accept_invalid_certs: bool) -> PaymentResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(accept_invalid_certs)
            .build()
            .map_err(|e| PaymentError::NetworkError {
                message: format!("failed to initialize HTTP client: {}", e),
            })?;

        Ok(Self { client, timeout })
    }
}

#[async_trait]
impl HttpTransport for PaymentHttpClient {
    async fn post_json(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: &JsonValue,
    ) -> PaymentResult<TransportResponse> {
        let mut request = self.client.post(url).timeout(self.timeout).json(body);
        for (k, v) in headers {
            request = request.header(*k, *v);
        }

        let response = request
            .send()
            .await
            .map_err(|e| PaymentError::NetworkError {
                message: format!("processor request failed: {}", e),
            })?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| PaymentError::NetworkError {
                message: format!("failed to read processor response: {}", e),
            })?;

        debug!(url = %url, status = status, "processor responded");
        Ok(TransportResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_covers_2xx_only() {
        let ok = TransportResponse {
            status: 204,
            body: String::new(),
        };
        assert!(ok.is_success());
        let redirect = TransportResponse {
            status: 302,
            body: String::new(),
        };
        assert!(!redirect.is_success());
    }

    #[test]
    fn client_builds_with_timeout() {
        assert!(PaymentHttpClient::new(Duration::from_secs(5), false).is_ok());
    }
}
