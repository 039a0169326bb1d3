//! Per-market metadata resolution: neg-risk flag and tick size.
//!
//! Both facts gate order construction. `neg_risk` decides which exchange
//! contract verifies the signature; `tick_size` decides the rounding the
//! exchange will accept. Neither may ever be guessed: a wrong neg_risk
//! produces a signature that is valid for the wrong contract, which the
//! exchange rejects with nothing useful in the error.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Error, Debug)]
pub enum MarketError {
    #[error("metadata lookup failed for token {token_id}: {reason}")]
    Unresolved { token_id: String, reason: String },
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// The two market-level facts order building depends on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarketMeta {
    pub neg_risk: bool,
    pub tick_size: Decimal,
}

#[async_trait]
pub trait MarketCatalog: Send + Sync {
    async fn resolve(&self, token_id: &str) -> Result<MarketMeta, MarketError>;
}

/// Catalog backed by the CLOB's public metadata endpoints, with a
/// per-session cache (metadata is stable for the life of a market).
pub struct ClobCatalog {
    client: reqwest::Client,
    base_url: String,
    cache: Mutex<HashMap<String, MarketMeta>>,
}

impl ClobCatalog {
    pub fn new(base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            cache: Mutex::new(HashMap::new()),
        }
    }

    async fn fetch_json(
        &self,
        path: &str,
        token_id: &str,
    ) -> Result<serde_json::Value, MarketError> {
        let url = format!("{}{}?token_id={}", self.base_url, path, token_id);
        let resp = self.client.get(&url).send().await?;
        let status = resp.status().as_u16();
        if status >= 400 {
            return Err(MarketError::Unresolved {
                token_id: token_id.to_string(),
                reason: format!("{path} returned HTTP {status}"),
            });
        }
        Ok(resp.json().await?)
    }
}

#[async_trait]
impl MarketCatalog for ClobCatalog {
    async fn resolve(&self, token_id: &str) -> Result<MarketMeta, MarketError> {
        if let Some(meta) = self.cache.lock().await.get(token_id) {
            return Ok(*meta);
        }

        let neg_risk_resp = self.fetch_json("/neg-risk", token_id).await?;
        let neg_risk = neg_risk_resp
            .get("neg_risk")
            .and_then(|v| v.as_bool())
            .ok_or_else(|| MarketError::Unresolved {
                token_id: token_id.to_string(),
                reason: "neg_risk field missing".to_string(),
            })?;

        let tick_resp = self.fetch_json("/tick-size", token_id).await?;
        let tick_size = tick_resp
            .get("minimum_tick_size")
            .and_then(|v| match v {
                serde_json::Value::String(s) => Decimal::from_str(s).ok(),
                serde_json::Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
                _ => None,
            })
            .filter(|t| *t > Decimal::ZERO && *t < Decimal::ONE)
            .ok_or_else(|| MarketError::Unresolved {
                token_id: token_id.to_string(),
                reason: "minimum_tick_size missing or invalid".to_string(),
            })?;

        let meta = MarketMeta {
            neg_risk,
            tick_size,
        };
        debug!(token_id, neg_risk, tick_size = %tick_size, "resolved market metadata");
        self.cache
            .lock()
            .await
            .insert(token_id.to_string(), meta);
        Ok(meta)
    }
}
