use crate::payments::error::PaymentError;
use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::str::FromStr;

/// Timestamp layout used by the processor for `expirationDate` and
/// `trans_end_time`.
pub const PROCESSOR_TIME_FORMAT: &str = "%Y%m%d%H%M%S";

pub const API_VERSION: &str = "1.0";
pub const TRADE_TYPE: &str = "Checkout";
pub const DEFAULT_CURRENCY: &str = "DJF";

/// Trade status vocabulary reported by the processor in notifications and
/// query responses.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TradeStatus {
    Paying,
    Completed,
    Failure,
    Expired,
}

impl TradeStatus {
    /// Closed mapping from the wire value; anything outside the vocabulary
    /// is `None` and left to the caller to interpret.
    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            "Paying" => Some(TradeStatus::Paying),
            "Completed" => Some(TradeStatus::Completed),
            "Failure" => Some(TradeStatus::Failure),
            "Expired" => Some(TradeStatus::Expired),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TradeStatus::Paying => "Paying",
            TradeStatus::Completed => "Completed",
            TradeStatus::Failure => "Failure",
            TradeStatus::Expired => "Expired",
        }
    }
}

impl std::fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TradeStatus {
    type Err = PaymentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        TradeStatus::from_wire(value).ok_or_else(|| PaymentError::ValidationError {
            message: format!("unsupported trade status: {}", value),
            field: Some("trade_status".to_string()),
        })
    }
}

/// Raw body of the token endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(rename = "expirationDate", default)]
    pub expiration_date: Option<String>,
}

/// Bearer token issued for one merchant.
#[derive(Clone, Serialize)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl std::fmt::Debug for IssuedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedToken")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Order-specific inputs to a preorder call. Merchant credentials and
/// callback URLs come from the merchant record.
#[derive(Debug, Clone)]
pub struct PreorderFields {
    pub merch_order_id: String,
    pub title: String,
    pub total_amount: String,
    pub currency: String,
    pub timeout_express: Option<String>,
}

/// Envelope returned by preorder and query calls.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ProcessorResponse {
    pub code: Option<String>,
    pub result: Option<String>,
    pub msg: Option<String>,
    pub biz_content: Option<JsonValue>,
    /// Full body as received, kept for persistence and diagnostics.
    #[serde(skip)]
    pub raw: JsonValue,
}

impl ProcessorResponse {
    /// Parses a response body, tolerating a numeric `code`.
    pub fn from_json(raw: JsonValue) -> Self {
        let field = |name: &str| match raw.get(name) {
            Some(JsonValue::String(s)) => Some(s.clone()),
            Some(JsonValue::Null) | None => None,
            Some(other) => Some(other.to_string()),
        };
        Self {
            code: field("code"),
            result: field("result"),
            msg: field("msg"),
            biz_content: raw.get("biz_content").filter(|v| !v.is_null()).cloned(),
            raw,
        }
    }

    pub fn is_business_success(&self) -> bool {
        self.code.as_deref() == Some("0") && self.result.as_deref() == Some("SUCCESS")
    }

    pub fn prepay_id(&self) -> Option<&str> {
        self.biz_str("prepay_id")
    }

    /// Processor message, or `fallback` when the processor sent none.
    pub fn message_or(&self, fallback: &str) -> String {
        self.msg
            .clone()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| fallback.to_string())
    }

    pub fn query_details(&self) -> QueryDetails {
        QueryDetails {
            merch_order_id: self.biz_string("merch_order_id"),
            order_status: self.biz_string("order_status"),
            payment_order_id: self.biz_string("payment_order_id"),
            trans_time: self.biz_string("trans_time"),
            trans_currency: self.biz_string("trans_currency"),
            total_amount: self.biz_string("total_amount"),
            prepay_id: self.biz_string("prepay_id"),
        }
    }

    fn biz_str(&self, key: &str) -> Option<&str> {
        self.biz_content
            .as_ref()
            .and_then(|biz| biz.get(key))
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
    }

    fn biz_string(&self, key: &str) -> Option<String> {
        match self.biz_content.as_ref().and_then(|biz| biz.get(key)) {
            Some(JsonValue::String(s)) => Some(s.clone()),
            Some(JsonValue::Null) | None => None,
            Some(other) => Some(other.to_string()),
        }
    }
}

/// Order details reported by a successful query.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueryDetails {
    pub merch_order_id: Option<String>,
    pub order_status: Option<String>,
    pub payment_order_id: Option<String>,
    pub trans_time: Option<String>,
    pub trans_currency: Option<String>,
    pub total_amount: Option<String>,
    pub prepay_id: Option<String>,
}

/// Asynchronous payment notification posted by the processor.
///
/// Only `merch_order_id` and `trade_status` are required. `body` keeps the
/// request text as received for the audit column; `raw` is its parsed form
/// used for signature checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyPayload {
    pub merch_order_id: String,
    pub trade_status: String,
    #[serde(default)]
    pub appid: Option<String>,
    #[serde(default)]
    pub merch_code: Option<String>,
    #[serde(default)]
    pub notify_time: Option<String>,
    #[serde(default)]
    pub notify_url: Option<String>,
    #[serde(default)]
    pub payment_order_id: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub total_amount: Option<String>,
    #[serde(default)]
    pub trans_currency: Option<String>,
    #[serde(default)]
    pub trans_end_time: Option<String>,
    #[serde(default)]
    pub callback_info: Option<String>,
    #[serde(default)]
    pub sign: Option<String>,
    #[serde(default)]
    pub sign_type: Option<String>,
    #[serde(skip)]
    pub raw: JsonValue,
    #[serde(skip)]
    pub body: String,
}

impl NotifyPayload {
    /// Parses a notification request body, keeping the text untouched.
    pub fn from_body(body: &str) -> Result<Self, PaymentError> {
        let raw: JsonValue =
            serde_json::from_str(body).map_err(|e| PaymentError::ValidationError {
                message: format!("notification body is not JSON: {}", e),
                field: None,
            })?;
        let mut payload = Self::from_json(raw)?;
        payload.body = body.to_string();
        Ok(payload)
    }

    pub fn from_json(raw: JsonValue) -> Result<Self, PaymentError> {
        let mut payload: NotifyPayload =
            serde_json::from_value(raw.clone()).map_err(|e| PaymentError::ValidationError {
                message: format!("invalid notification payload: {}", e),
                field: None,
            })?;
        if payload.merch_order_id.trim().is_empty() {
            return Err(PaymentError::validation(
                "merch_order_id is required",
                "merch_order_id",
            ));
        }
        payload.body = raw.to_string();
        payload.raw = raw;
        Ok(payload)
    }

    pub fn trade_status(&self) -> Option<TradeStatus> {
        TradeStatus::from_wire(&self.trade_status)
    }

    /// Parses `trans_end_time` as a processor timestamp (UTC).
    pub fn trans_end_time(&self) -> Option<Result<DateTime<Utc>, chrono::ParseError>> {
        self.trans_end_time
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(parse_processor_time)
    }
}

/// Most decimal places an order amount may carry.
pub const MAX_AMOUNT_SCALE: i64 = 2;

/// Decimal places of `amount` once trailing zeros are dropped.
pub fn amount_scale(amount: &BigDecimal) -> i64 {
    amount.normalized().as_bigint_and_exponent().1.max(0)
}

/// Reads an amount from a decimal string or a JSON number. Numbers go
/// through their shortest decimal rendering, so `10.1` stays `10.1` rather
/// than the nearest binary value.
pub fn deserialize_amount<'de, D>(deserializer: D) -> Result<BigDecimal, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let text = match JsonValue::deserialize(deserializer)? {
        JsonValue::String(s) => s,
        JsonValue::Number(n) => n.to_string(),
        other => {
            return Err(serde::de::Error::custom(format!(
                "expected a decimal amount, got {}",
                other
            )))
        }
    };
    BigDecimal::from_str(text.trim()).map_err(serde::de::Error::custom)
}

/// Decimal string sent as `total_amount`: integers without a fractional
/// part, other values without trailing zeros.
pub fn format_amount(amount: &BigDecimal) -> String {
    if amount.is_integer() {
        amount.with_scale(0).to_string()
    } else {
        amount.normalized().to_string()
    }
}

pub fn parse_processor_time(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    NaiveDateTime::parse_from_str(value.trim(), PROCESSOR_TIME_FORMAT).map(|naive| naive.and_utc())
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<JsonValue>::deserialize(deserializer)?;
    Ok(match value {
        Some(JsonValue::String(s)) => Some(s),
        Some(JsonValue::Null) | None => None,
        Some(other) => Some(other.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn amounts_are_formatted_without_noise() {
        use std::str::FromStr;
        assert_eq!(format_amount(&BigDecimal::from(1000)), "1000");
        assert_eq!(format_amount(&BigDecimal::from_str("1000.00").unwrap()), "1000");
        assert_eq!(format_amount(&BigDecimal::from_str("10.50").unwrap()), "10.5");
    }

    #[derive(Deserialize)]
    struct Priced {
        #[serde(deserialize_with = "deserialize_amount")]
        total_amount: BigDecimal,
    }

    #[test]
    fn float_amounts_keep_their_decimal_form() {
        let priced: Priced = serde_json::from_value(json!({"total_amount": 10.1})).unwrap();
        assert_eq!(format_amount(&priced.total_amount), "10.1");

        let priced: Priced = serde_json::from_value(json!({"total_amount": 1000})).unwrap();
        assert_eq!(format_amount(&priced.total_amount), "1000");

        let priced: Priced = serde_json::from_value(json!({"total_amount": "10.555"})).unwrap();
        assert_eq!(amount_scale(&priced.total_amount), 3);

        assert!(serde_json::from_value::<Priced>(json!({"total_amount": "ten"})).is_err());
    }

    #[test]
    fn amount_scale_ignores_trailing_zeros() {
        assert_eq!(amount_scale(&BigDecimal::from(1000)), 0);
        assert_eq!(amount_scale(&BigDecimal::from_str("10.50").unwrap()), 1);
        assert_eq!(amount_scale(&BigDecimal::from_str("10.555").unwrap()), 3);
    }

    #[test]
    fn trade_status_mapping_is_closed() {
        assert_eq!(TradeStatus::from_wire("Completed"), Some(TradeStatus::Completed));
        assert_eq!(TradeStatus::from_wire("Failure"), Some(TradeStatus::Failure));
        assert_eq!(TradeStatus::from_wire("completed"), None);
        assert_eq!(TradeStatus::from_wire("WAIT_PAY"), None);
        assert!("Refunded".parse::<TradeStatus>().is_err());
    }

    #[test]
    fn business_success_requires_code_and_result() {
        let ok = ProcessorResponse::from_json(json!({
            "code": "0", "result": "SUCCESS", "biz_content": {"prepay_id": "PP123"}
        }));
        assert!(ok.is_business_success());
        assert_eq!(ok.prepay_id(), Some("PP123"));

        let numeric = ProcessorResponse::from_json(json!({"code": 0, "result": "SUCCESS"}));
        assert!(numeric.is_business_success());

        let failed = ProcessorResponse::from_json(json!({"code": "0", "result": "FAIL"}));
        assert!(!failed.is_business_success());

        let failed = ProcessorResponse::from_json(json!({"code": "1", "msg": "Order not exist"}));
        assert!(!failed.is_business_success());
        assert_eq!(failed.message_or("Query order failed"), "Order not exist");
    }

    #[test]
    fn query_details_are_extracted_from_biz_content() {
        let response = ProcessorResponse::from_json(json!({
            "code": "0",
            "result": "SUCCESS",
            "biz_content": {
                "merch_order_id": "ORD1",
                "order_status": "Completed",
                "payment_order_id": "PO9",
                "total_amount": 1000
            }
        }));
        let details = response.query_details();
        assert_eq!(details.order_status.as_deref(), Some("Completed"));
        assert_eq!(details.payment_order_id.as_deref(), Some("PO9"));
        assert_eq!(details.total_amount.as_deref(), Some("1000"));
        assert_eq!(details.prepay_id, None);
    }

    #[test]
    fn notify_payload_requires_order_id_and_status() {
        assert!(NotifyPayload::from_json(json!({"trade_status": "Completed"})).is_err());
        assert!(NotifyPayload::from_json(json!({"merch_order_id": "ORD1"})).is_err());

        let raw = json!({
            "merch_order_id": "ORD1",
            "trade_status": "Completed",
            "total_amount": 250,
            "extra": "kept"
        });
        let payload = NotifyPayload::from_json(raw.clone()).expect("payload should parse");
        assert_eq!(payload.total_amount.as_deref(), Some("250"));
        assert_eq!(payload.raw, raw);
    }

    #[test]
    fn notify_body_is_kept_as_received() {
        let body = r#"{"trade_status": "Completed",  "merch_order_id": "ORD1", "zeta": 1, "alpha": 2}"#;
        let payload = NotifyPayload::from_body(body).expect("payload should parse");
        assert_eq!(payload.body, body);
        assert_eq!(payload.merch_order_id, "ORD1");

        assert!(NotifyPayload::from_body("{not json").is_err());
    }

    #[test]
    fn trans_end_time_parsing_is_best_effort() {
        let mut payload = NotifyPayload::from_json(json!({
            "merch_order_id": "ORD1",
            "trade_status": "Completed",
            "trans_end_time": "20240131235959"
        }))
        .expect("payload should parse");
        let parsed = payload.trans_end_time().expect("present").expect("valid");
        assert_eq!(parsed.to_rfc3339(), "2024-01-31T23:59:59+00:00");

        payload.trans_end_time = Some("yesterday".to_string());
        assert!(matches!(payload.trans_end_time(), Some(Err(_))));

        payload.trans_end_time = None;
        assert!(payload.trans_end_time().is_none());
    }
}
