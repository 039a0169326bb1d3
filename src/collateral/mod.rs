//! On-chain collateral balance reads.
//!
//! The settlement chain carries two non-interchangeable variants of the
//! nominal collateral asset: bridged USDC.e (what the exchange settles
//! in) and native USDC. Both are read so the console can tell a user
//! holding the wrong variant to swap instead of showing a bare
//! "insufficient funds".

use alloy::primitives::{Address, U256};
use alloy::providers::ProviderBuilder;
use alloy::sol;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::ChainConfig;
use crate::parlay::BalanceInfo;

sol! {
    #[sol(rpc)]
    interface IERC20 {
        function balanceOf(address account) external view returns (uint256);
        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 value) external returns (bool);
    }
}

#[derive(Error, Debug)]
pub enum ChainError {
    #[error("bad address in chain config: {0}")]
    BadAddress(String),
    #[error("RPC call failed: {0}")]
    Rpc(String),
}

/// Convert raw 6-decimal token units to a USDC amount. Values beyond
/// `Decimal`'s range (e.g. an unlimited `U256::MAX` allowance) saturate
/// rather than collapsing to zero.
pub fn units_to_usdc(raw: U256) -> Decimal {
    Decimal::from_str(&raw.to_string()).unwrap_or(Decimal::MAX) / Decimal::from(1_000_000)
}

/// Read-only source of the wallet's collateral balances. Implemented by
/// the RPC reader in production and by stubs in tests.
#[async_trait]
pub trait BalanceSource: Send + Sync {
    /// Returns `(bridged, native)` USDC balances. The `-1` sentinel pair
    /// means both primary and fallback reads failed; callers treat that
    /// as "unknown", never as zero.
    async fn collateral_balances(&self, owner: Address) -> (Decimal, Decimal);
}

/// RPC-backed collateral reader with a fallback endpoint.
pub struct CollateralReader {
    rpc_url: String,
    fallback_rpc_url: String,
    usdc_bridged: Address,
    usdc_native: Address,
}

impl CollateralReader {
    pub fn from_config(chain: &ChainConfig) -> Result<Self, ChainError> {
        Ok(Self {
            rpc_url: chain.rpc_url.clone(),
            fallback_rpc_url: chain.fallback_rpc_url.clone(),
            usdc_bridged: parse_address(&chain.usdc_bridged)?,
            usdc_native: parse_address(&chain.usdc_native)?,
        })
    }

    /// Read both token balances through one endpoint.
    async fn read_via(&self, url: &str, owner: Address) -> Result<(Decimal, Decimal), ChainError> {
        let provider = ProviderBuilder::new()
            .connect(url)
            .await
            .map_err(|e| ChainError::Rpc(format!("connect {url}: {e}")))?;

        let bridged = IERC20::new(self.usdc_bridged, provider.clone())
            .balanceOf(owner)
            .call()
            .await
            .map_err(|e| ChainError::Rpc(format!("balanceOf bridged: {e}")))?;
        let native = IERC20::new(self.usdc_native, provider)
            .balanceOf(owner)
            .call()
            .await
            .map_err(|e| ChainError::Rpc(format!("balanceOf native: {e}")))?;

        Ok((units_to_usdc(bridged), units_to_usdc(native)))
    }
}

pub fn parse_address(raw: &str) -> Result<Address, ChainError> {
    Address::from_str(raw).map_err(|_| ChainError::BadAddress(raw.to_string()))
}

#[async_trait]
impl BalanceSource for CollateralReader {
    async fn collateral_balances(&self, owner: Address) -> (Decimal, Decimal) {
        match self.read_via(&self.rpc_url, owner).await {
            Ok(balances) => {
                debug!(bridged = %balances.0, native = %balances.1, "collateral read (primary)");
                return balances;
            }
            Err(e) => {
                warn!(error = %e, "primary RPC unavailable, trying fallback");
            }
        }

        match self.read_via(&self.fallback_rpc_url, owner).await {
            Ok(balances) => {
                debug!(bridged = %balances.0, native = %balances.1, "collateral read (fallback)");
                balances
            }
            Err(e) => {
                warn!(error = %e, "fallback RPC also failed, balances unknown");
                (BalanceInfo::UNKNOWN, BalanceInfo::UNKNOWN)
            }
        }
    }
}
