//! L2 HMAC-SHA256 authentication and the CLOB API surface the parlay
//! pipeline talks to.
//!
//! Polymarket uses a two-level auth system:
//! - L1: EIP-712 wallet signatures (used to derive API credentials)
//! - L2: HMAC-SHA256 signed requests (used for all trading operations)
//!
//! This module implements L2 and the three endpoints the pipeline needs:
//! the exchange-ledger balance check, batch parlay intake, and per-order
//! status. Responses arrive as loosely-typed JSON; everything is coerced
//! into strict types here at the boundary.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderValue};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

use crate::orders::WireOrder;
use crate::parlay::ParlayLeg;

type HmacSha256 = Hmac<Sha256>;

const HEADER_API_KEY: &str = "POLY_API_KEY";
const HEADER_SIGNATURE: &str = "POLY_SIGNATURE";
const HEADER_TIMESTAMP: &str = "POLY_TIMESTAMP";
const HEADER_PASSPHRASE: &str = "POLY_PASSPHRASE";

/// Collateral uses 6 decimals on the settlement chain.
const COLLATERAL_SCALE: u32 = 6;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("missing API credentials")]
    MissingCredentials,
    #[error("HMAC key error: {0}")]
    HmacKey(String),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("API error {status}: {body}")]
    ApiError { status: u16, body: String },
    #[error("unexpected response shape: {0}")]
    BadResponse(String),
}

#[derive(Debug, Clone)]
pub struct L2Credentials {
    pub api_key: String,
    pub secret: String,
    pub passphrase: String,
}

impl L2Credentials {
    pub fn from_config(api_key: &str, secret: &str, passphrase: &str) -> Option<Self> {
        if api_key.is_empty() || secret.is_empty() || passphrase.is_empty() {
            return None;
        }
        Some(Self {
            api_key: api_key.to_string(),
            secret: secret.to_string(),
            passphrase: passphrase.to_string(),
        })
    }
}

/// Build L2 auth headers for a CLOB API request.
///
/// The signature is HMAC-SHA256(secret, timestamp + method + path + body)
/// encoded as base64.
pub fn build_l2_headers(
    creds: &L2Credentials,
    method: &str,
    path: &str,
    body: &str,
) -> Result<HeaderMap, AuthError> {
    let timestamp = chrono::Utc::now().timestamp().to_string();

    let message = format!("{}{}{}{}", timestamp, method.to_uppercase(), path, body);

    let secret_bytes = BASE64
        .decode(&creds.secret)
        .map_err(|e| AuthError::HmacKey(e.to_string()))?;

    let mut mac = HmacSha256::new_from_slice(&secret_bytes)
        .map_err(|e| AuthError::HmacKey(e.to_string()))?;
    mac.update(message.as_bytes());
    let signature = BASE64.encode(mac.finalize().into_bytes());

    debug!(
        method = method,
        path = path,
        timestamp = %timestamp,
        "built L2 auth headers"
    );

    let mut headers = HeaderMap::new();
    headers.insert(
        HEADER_API_KEY,
        HeaderValue::from_str(&creds.api_key).map_err(|e| AuthError::HmacKey(e.to_string()))?,
    );
    headers.insert(
        HEADER_SIGNATURE,
        HeaderValue::from_str(&signature).map_err(|e| AuthError::HmacKey(e.to_string()))?,
    );
    headers.insert(
        HEADER_TIMESTAMP,
        HeaderValue::from_str(&timestamp).map_err(|e| AuthError::HmacKey(e.to_string()))?,
    );
    headers.insert(
        HEADER_PASSPHRASE,
        HeaderValue::from_str(&creds.passphrase).map_err(|e| AuthError::HmacKey(e.to_string()))?,
    );

    Ok(headers)
}

/// The full batch the pipeline posts to the exchange intake endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParlaySubmission {
    pub signed_orders: Vec<WireOrder>,
    pub user_address: String,
    pub total_stake: Decimal,
    pub legs: Vec<ParlayLeg>,
    pub total_odds: Decimal,
    pub potential_payout: Decimal,
}

/// Per-leg outcome inside a batch response. The exchange evaluates each
/// leg independently; a rejected leg does not fail the batch.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegOutcome {
    pub leg_id: String,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl LegOutcome {
    /// "submitted" means the exchange accepted the order without issuing
    /// a trackable identifier; such legs stay `signed` and are not polled.
    pub fn trackable_order_id(&self) -> Option<&str> {
        match self.order_id.as_deref() {
            Some("submitted") | Some("") | None => None,
            Some(id) => Some(id),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ParlayResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub orders: Vec<LegOutcome>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Typed order-status response, coerced from the exchange's decimal strings.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderStatusResponse {
    pub status: String,
    pub size_matched: Decimal,
    pub original_size: Decimal,
}

#[derive(Debug, Deserialize)]
struct RawOrderStatus {
    #[serde(default)]
    status: String,
    #[serde(default)]
    size_matched: Option<String>,
    #[serde(default)]
    original_size: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawBalance {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    balance: Option<String>,
}

/// Coerce the `{success, balance}` response into a USDC amount. The
/// exchange reports raw 6-decimal units.
fn parse_balance_response(resp: serde_json::Value) -> Result<Decimal, AuthError> {
    let raw: RawBalance = serde_json::from_value(resp)
        .map_err(|e| AuthError::BadResponse(format!("balance response: {e}")))?;
    if !raw.success {
        return Err(AuthError::BadResponse(
            "balance request reported failure".to_string(),
        ));
    }
    let units = match raw.balance.as_deref() {
        Some(s) => Decimal::from_str(s)
            .map_err(|_| AuthError::BadResponse(format!("balance is not a decimal: {s:?}")))?,
        None => return Err(AuthError::BadResponse("balance field missing".to_string())),
    };
    Ok((units / Decimal::from(10u64.pow(COLLATERAL_SCALE))).normalize())
}

fn parse_decimal_field(raw: Option<&str>, field: &str) -> Result<Decimal, AuthError> {
    match raw {
        None => Ok(Decimal::ZERO),
        Some(s) if s.is_empty() => Ok(Decimal::ZERO),
        Some(s) => Decimal::from_str(s)
            .map_err(|_| AuthError::BadResponse(format!("{field} is not a decimal: {s:?}"))),
    }
}

/// What the orchestrator needs from the exchange. Split out as a trait so
/// the pipeline runs against stubs in tests.
#[async_trait]
pub trait ExchangeApi: Send + Sync {
    fn has_credentials(&self) -> bool;

    /// Authoritative exchange-ledger collateral balance for the maker.
    /// May differ from the on-chain wallet balance (funds can sit in the
    /// exchange's custody).
    async fn collateral_balance(&self) -> Result<Decimal, AuthError>;

    /// Submit the whole batch in one call. Per-leg outcomes come back in
    /// the response; batch success does not imply every leg succeeded.
    async fn submit_parlay(&self, batch: &ParlaySubmission) -> Result<ParlayResponse, AuthError>;

    async fn order_status(&self, order_id: &str) -> Result<OrderStatusResponse, AuthError>;
}

/// Authenticated HTTP client for the Polymarket CLOB REST API.
pub struct ClobApiClient {
    client: reqwest::Client,
    base_url: String,
    creds: Option<L2Credentials>,
}

impl ClobApiClient {
    pub fn new(base_url: String, creds: Option<L2Credentials>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            creds,
        }
    }

    fn creds(&self) -> Result<&L2Credentials, AuthError> {
        self.creds.as_ref().ok_or(AuthError::MissingCredentials)
    }

    /// POST with L2 auth and JSON body.
    pub async fn post(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, AuthError> {
        let body_str = serde_json::to_string(body)
            .map_err(|e| AuthError::BadResponse(format!("request serialization: {e}")))?;
        let headers = build_l2_headers(self.creds()?, "POST", path, &body_str)?;
        let url = format!("{}{}", self.base_url, path);

        let resp = self
            .client
            .post(&url)
            .headers(headers)
            .header("Content-Type", "application/json")
            .body(body_str)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if status >= 400 {
            let body = resp.text().await.unwrap_or_default();
            return Err(AuthError::ApiError { status, body });
        }
        Ok(resp.json().await?)
    }
}

#[async_trait]
impl ExchangeApi for ClobApiClient {
    fn has_credentials(&self) -> bool {
        self.creds.is_some()
    }

    async fn collateral_balance(&self) -> Result<Decimal, AuthError> {
        let body = serde_json::json!({ "assetType": "COLLATERAL" });
        let resp = self.post("/balance-allowance", &body).await?;
        parse_balance_response(resp)
    }

    async fn submit_parlay(&self, batch: &ParlaySubmission) -> Result<ParlayResponse, AuthError> {
        let body = serde_json::to_value(batch)
            .map_err(|e| AuthError::BadResponse(format!("batch serialization: {e}")))?;
        let resp = self.post("/parlay/orders", &body).await?;
        serde_json::from_value(resp)
            .map_err(|e| AuthError::BadResponse(format!("parlay response: {e}")))
    }

    async fn order_status(&self, order_id: &str) -> Result<OrderStatusResponse, AuthError> {
        let body = serde_json::json!({ "order_id": order_id });
        let resp = self.post("/order-status", &body).await?;
        let raw: RawOrderStatus = serde_json::from_value(resp)
            .map_err(|e| AuthError::BadResponse(format!("order status: {e}")))?;

        Ok(OrderStatusResponse {
            status: raw.status,
            size_matched: parse_decimal_field(raw.size_matched.as_deref(), "size_matched")?,
            original_size: parse_decimal_field(raw.original_size.as_deref(), "original_size")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn trackable_order_id_filters_sentinel() {
        let outcome = LegOutcome {
            leg_id: "a".to_string(),
            success: true,
            order_id: Some("submitted".to_string()),
            error: None,
        };
        assert_eq!(outcome.trackable_order_id(), None);

        let outcome = LegOutcome {
            leg_id: "a".to_string(),
            success: true,
            order_id: Some("0xabc".to_string()),
            error: None,
        };
        assert_eq!(outcome.trackable_order_id(), Some("0xabc"));
    }

    #[test]
    fn decimal_field_coercion() {
        assert_eq!(parse_decimal_field(Some("12.5"), "x").unwrap(), dec!(12.5));
        assert_eq!(parse_decimal_field(None, "x").unwrap(), Decimal::ZERO);
        assert!(parse_decimal_field(Some("nope"), "x").is_err());
    }

    #[test]
    fn balance_response_requires_success_and_scales_units() {
        let ok = parse_balance_response(serde_json::json!({
            "success": true, "balance": "30000000"
        }))
        .unwrap();
        assert_eq!(ok, dec!(30));

        assert!(parse_balance_response(serde_json::json!({
            "success": false, "balance": "30000000"
        }))
        .is_err());
        assert!(parse_balance_response(serde_json::json!({ "success": true })).is_err());
    }

    #[test]
    fn parlay_response_tolerates_missing_fields() {
        let resp: ParlayResponse = serde_json::from_value(serde_json::json!({
            "success": true,
            "orders": [
                { "legId": "a", "success": true, "orderId": "0x1" },
                { "legId": "b", "success": false, "error": "price moved" },
            ]
        }))
        .unwrap();
        assert!(resp.success);
        assert_eq!(resp.orders.len(), 2);
        assert_eq!(resp.orders[1].order_id, None);
        assert_eq!(resp.orders[1].error.as_deref(), Some("price moved"));
    }

    #[test]
    fn l2_headers_require_decodable_secret() {
        let creds = L2Credentials {
            api_key: "key".to_string(),
            secret: BASE64.encode(b"super-secret"),
            passphrase: "pass".to_string(),
        };
        let headers = build_l2_headers(&creds, "post", "/parlay/orders", "{}").unwrap();
        assert!(headers.contains_key(HEADER_API_KEY));
        assert!(headers.contains_key(HEADER_SIGNATURE));

        let bad = L2Credentials {
            api_key: "key".to_string(),
            secret: "!!not-base64!!".to_string(),
            passphrase: "pass".to_string(),
        };
        assert!(build_l2_headers(&bad, "POST", "/x", "").is_err());
    }
}
