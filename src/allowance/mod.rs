//! Collateral spending approvals for the exchange's settlement contracts.
//!
//! Three contracts can pull collateral when orders match: the CTF
//! Exchange, the Neg Risk CTF Exchange, and the Neg Risk Adapter. Each
//! needs an ERC-20 allowance from the maker. Approvals are set to
//! `U256::MAX` once (one-time unlimited policy) rather than per trade,
//! and are issued strictly sequentially: wallet UIs serialize signature
//! prompts, and the next approval's nonce needs the previous one mined.

use alloy::primitives::{Address, U256};
use alloy::providers::ProviderBuilder;
use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::collateral::{parse_address, ChainError, IERC20};
use crate::config::ChainConfig;
use crate::wallet::{SignerError, WalletSigner};

/// Allowance floor applied when no specific amount is requested.
const DEFAULT_FLOOR_USDC: u64 = 1_000;

#[derive(Error, Debug)]
pub enum AllowanceError {
    /// The user declined an approval prompt. Not retryable as-is; the
    /// whole flow restarts if the user chooses to.
    #[error("approval rejected in wallet for {contract}")]
    Rejected { contract: String },
    #[error("approval transaction failed for {contract}: {reason}")]
    TxFailed { contract: String, reason: String },
    #[error(transparent)]
    Chain(#[from] ChainError),
}

/// Progress reported while approvals run, one contract at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalProgress {
    AlreadySufficient { contract: String },
    Approving { contract: String },
    Approved { contract: String },
}

#[derive(Debug, Clone)]
pub struct ContractAllowance {
    pub contract: String,
    pub approved: bool,
}

#[derive(Debug, Clone)]
pub struct AllowanceCheck {
    pub per_contract: Vec<ContractAllowance>,
    pub all_approved: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApprovalSummary {
    /// Approval transactions actually sent (zero when everything was
    /// already sufficient).
    pub transactions: usize,
}

pub type ProgressSink<'a> = &'a mut (dyn FnMut(ApprovalProgress) + Send);

/// Gate the pipeline calls before any signing. Stubbed in tests.
#[async_trait]
pub trait AllowanceGate: Send + Sync {
    /// Check every settlement contract and approve the ones short of the
    /// floor. Returns how many transactions were issued.
    async fn ensure(
        &self,
        owner: Address,
        required: Decimal,
        progress: ProgressSink<'_>,
    ) -> Result<ApprovalSummary, AllowanceError>;
}

/// RPC-backed checker/approver over the fixed settlement contract set.
pub struct AllowanceManager {
    rpc_url: String,
    fallback_rpc_url: String,
    usdc_bridged: Address,
    spenders: Vec<(String, Address)>,
    buffer: Decimal,
    signer: Arc<dyn WalletSigner>,
}

impl AllowanceManager {
    pub fn from_config(
        chain: &ChainConfig,
        buffer: Decimal,
        signer: Arc<dyn WalletSigner>,
    ) -> Result<Self, ChainError> {
        Ok(Self {
            rpc_url: chain.rpc_url.clone(),
            fallback_rpc_url: chain.fallback_rpc_url.clone(),
            usdc_bridged: parse_address(&chain.usdc_bridged)?,
            spenders: vec![
                ("CTF Exchange".to_string(), parse_address(&chain.ctf_exchange)?),
                (
                    "Neg Risk CTF Exchange".to_string(),
                    parse_address(&chain.neg_risk_exchange)?,
                ),
                (
                    "Neg Risk Adapter".to_string(),
                    parse_address(&chain.neg_risk_adapter)?,
                ),
            ],
            buffer,
            signer,
        })
    }

    /// Allowance floor: requested amount plus a small buffer, or the
    /// default floor when no amount is given.
    fn floor(&self, required: Option<Decimal>) -> Decimal {
        match required {
            Some(amount) if amount > Decimal::ZERO => amount * self.buffer,
            _ => Decimal::from(DEFAULT_FLOOR_USDC),
        }
    }

    /// The floor in raw 6-decimal units, for comparison against on-chain
    /// allowance reads.
    fn floor_units(&self, required: Option<Decimal>) -> U256 {
        self.floor(required)
            .checked_mul(Decimal::from(1_000_000u64))
            .and_then(|d| d.round().to_u128())
            .map(U256::from)
            .unwrap_or(U256::MAX)
    }

    async fn read_allowance(&self, owner: Address, spender: Address) -> Result<U256, ChainError> {
        match self.read_allowance_via(&self.rpc_url, owner, spender).await {
            Ok(value) => Ok(value),
            Err(e) => {
                warn!(error = %e, "primary RPC unavailable for allowance read, trying fallback");
                self.read_allowance_via(&self.fallback_rpc_url, owner, spender)
                    .await
            }
        }
    }

    async fn read_allowance_via(
        &self,
        url: &str,
        owner: Address,
        spender: Address,
    ) -> Result<U256, ChainError> {
        let provider = ProviderBuilder::new()
            .connect(url)
            .await
            .map_err(|e| ChainError::Rpc(format!("connect {url}: {e}")))?;
        IERC20::new(self.usdc_bridged, provider)
            .allowance(owner, spender)
            .call()
            .await
            .map_err(|e| ChainError::Rpc(format!("allowance read: {e}")))
    }

    /// Read-only allowance check against every settlement contract.
    /// Idempotent: repeated calls with no intervening approval return the
    /// same result.
    pub async fn check(
        &self,
        owner: Address,
        required: Option<Decimal>,
    ) -> Result<AllowanceCheck, AllowanceError> {
        let floor_units = self.floor_units(required);
        let mut readings = Vec::with_capacity(self.spenders.len());
        for (name, spender) in &self.spenders {
            readings.push((name.clone(), self.read_allowance(owner, *spender).await?));
        }
        Ok(summarize(readings, floor_units))
    }

    /// Approve every contract short of the floor, one at a time, waiting
    /// for each confirmation before the next prompt.
    pub async fn approve_all(
        &self,
        owner: Address,
        required: Option<Decimal>,
        progress: ProgressSink<'_>,
    ) -> Result<ApprovalSummary, AllowanceError> {
        let floor_units = self.floor_units(required);

        let mut transactions = 0usize;
        for (name, spender) in &self.spenders {
            let current = self.read_allowance(owner, *spender).await?;
            if current >= floor_units {
                progress(ApprovalProgress::AlreadySufficient {
                    contract: name.clone(),
                });
                continue;
            }

            progress(ApprovalProgress::Approving {
                contract: name.clone(),
            });
            info!(contract = %name, spender = %spender, "requesting unlimited approval");

            match self
                .signer
                .approve(self.usdc_bridged, *spender, U256::MAX)
                .await
            {
                Ok(_) => {
                    transactions += 1;
                    progress(ApprovalProgress::Approved {
                        contract: name.clone(),
                    });
                }
                Err(SignerError::Rejected) => {
                    return Err(AllowanceError::Rejected {
                        contract: name.clone(),
                    });
                }
                Err(e) => {
                    return Err(AllowanceError::TxFailed {
                        contract: name.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        Ok(ApprovalSummary { transactions })
    }
}

/// Comparison happens in raw units: an unlimited (`U256::MAX`) approval
/// always clears the floor, however large.
fn summarize(readings: Vec<(String, U256)>, floor_units: U256) -> AllowanceCheck {
    let per_contract: Vec<ContractAllowance> = readings
        .into_iter()
        .map(|(contract, current)| ContractAllowance {
            approved: current >= floor_units,
            contract,
        })
        .collect();
    let all_approved = per_contract.iter().all(|c| c.approved);
    AllowanceCheck {
        per_contract,
        all_approved,
    }
}

#[async_trait]
impl AllowanceGate for AllowanceManager {
    async fn ensure(
        &self,
        owner: Address,
        required: Decimal,
        progress: ProgressSink<'_>,
    ) -> Result<ApprovalSummary, AllowanceError> {
        self.approve_all(owner, Some(required), progress).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    struct NoopSigner;

    #[async_trait]
    impl WalletSigner for NoopSigner {
        fn address(&self) -> Address {
            Address::ZERO
        }
        async fn sign_order(
            &self,
            _order: &crate::orders::UnsignedOrder,
        ) -> Result<String, SignerError> {
            Err(SignerError::Rejected)
        }
        async fn approve(
            &self,
            _token: Address,
            _spender: Address,
            _value: U256,
        ) -> Result<alloy::primitives::B256, SignerError> {
            Err(SignerError::Rejected)
        }
    }

    fn manager() -> AllowanceManager {
        AllowanceManager::from_config(
            &ChainConfig::default(),
            dec!(1.1),
            Arc::new(NoopSigner),
        )
        .unwrap()
    }

    #[test]
    fn floor_applies_buffer_or_default() {
        let m = manager();
        assert_eq!(m.floor(Some(dec!(30))), dec!(33));
        assert_eq!(m.floor(None), dec!(1000));
        assert_eq!(m.floor(Some(Decimal::ZERO)), dec!(1000));
    }

    #[test]
    fn unlimited_approval_clears_the_check_floor() {
        let m = manager();
        let floor = m.floor_units(Some(dec!(30)));
        assert_eq!(floor, U256::from(33_000_000u64));

        let check = summarize(
            vec![
                ("CTF Exchange".to_string(), U256::MAX),
                ("Neg Risk CTF Exchange".to_string(), U256::MAX),
                ("Neg Risk Adapter".to_string(), U256::from(32_000_000u64)),
            ],
            floor,
        );
        assert!(check.per_contract[0].approved);
        assert!(check.per_contract[1].approved);
        assert!(!check.per_contract[2].approved);
        assert!(!check.all_approved);
    }

    #[test]
    fn check_after_unlimited_approvals_reports_all_approved() {
        let m = manager();
        let floor = m.floor_units(None);
        let readings: Vec<(String, U256)> = m
            .spenders
            .iter()
            .map(|(name, _)| (name.clone(), U256::MAX))
            .collect();
        assert!(summarize(readings, floor).all_approved);
    }

    #[test]
    fn spender_set_is_the_fixed_three() {
        let m = manager();
        let names: Vec<&str> = m.spenders.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(
            names,
            vec!["CTF Exchange", "Neg Risk CTF Exchange", "Neg Risk Adapter"]
        );
    }
}
