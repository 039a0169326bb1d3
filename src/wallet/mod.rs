//! Wallet seam: typed-data signing and approval transactions.
//!
//! The orchestrator talks to a `WalletSigner` rather than a concrete
//! wallet so the pipeline runs against stubs in tests and a browser
//! wallet in the console. `LocalSigner` is the headless implementation:
//! a private key signing EIP-712 digests directly and sending approval
//! transactions over RPC.
//!
//! Signature requests are human-interaction suspension points for real
//! wallets: they may take arbitrarily long or never resolve. No timeout
//! is imposed at this layer; the wallet UI owns that.

use alloy::primitives::{Address, B256, U256};
use alloy::providers::ProviderBuilder;
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::Signer;
use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info};

use crate::collateral::IERC20;
use crate::orders::typed_data::signing_digest;
use crate::orders::UnsignedOrder;

#[derive(Error, Debug)]
pub enum SignerError {
    /// The user declined the signature or transaction prompt. Recoverable
    /// by retrying the whole flow, not by resubmitting the same prompt.
    #[error("signature request rejected in wallet")]
    Rejected,
    #[error("signing failed: {0}")]
    Signing(String),
    #[error("chain interaction failed: {0}")]
    Chain(String),
}

/// What the pipeline needs from the user's wallet.
#[async_trait]
pub trait WalletSigner: Send + Sync {
    fn address(&self) -> Address;

    /// Sign one order's typed data. Sequential callers only: wallet UIs
    /// do not support concurrent signature prompts.
    async fn sign_order(&self, order: &UnsignedOrder) -> Result<String, SignerError>;

    /// Send an ERC-20 approval transaction and wait for its inclusion.
    async fn approve(
        &self,
        token: Address,
        spender: Address,
        value: U256,
    ) -> Result<B256, SignerError>;
}

/// Headless signer backed by a raw private key.
pub struct LocalSigner {
    signer: PrivateKeySigner,
    rpc_url: String,
    chain_id: u64,
}

impl LocalSigner {
    pub fn new(private_key: &str, rpc_url: String, chain_id: u64) -> Result<Self, SignerError> {
        let signer: PrivateKeySigner = private_key
            .parse()
            .map_err(|e| SignerError::Signing(format!("invalid private key: {e}")))?;
        Ok(Self {
            signer: signer.with_chain_id(Some(chain_id)),
            rpc_url,
            chain_id,
        })
    }
}

#[async_trait]
impl WalletSigner for LocalSigner {
    fn address(&self) -> Address {
        self.signer.address()
    }

    async fn sign_order(&self, order: &UnsignedOrder) -> Result<String, SignerError> {
        // The digest takes its domain from the order's own neg-risk flag,
        // so builder and signer cannot disagree on the verifying contract.
        let digest = signing_digest(order, self.chain_id);
        let signature = self
            .signer
            .sign_hash(&digest)
            .await
            .map_err(|e| SignerError::Signing(e.to_string()))?;
        debug!(salt = order.salt, token = %order.token_id, "signed order digest");
        Ok(format!(
            "0x{}",
            alloy::hex::encode(signature.as_bytes())
        ))
    }

    async fn approve(
        &self,
        token: Address,
        spender: Address,
        value: U256,
    ) -> Result<B256, SignerError> {
        let provider = ProviderBuilder::new()
            .wallet(self.signer.clone())
            .connect(&self.rpc_url)
            .await
            .map_err(|e| SignerError::Chain(format!("RPC connect failed: {e}")))?;

        let erc20 = IERC20::new(token, provider);
        let tx_hash = erc20
            .approve(spender, value)
            .send()
            .await
            .map_err(|e| SignerError::Chain(format!("approve send failed: {e}")))?
            .watch()
            .await
            .map_err(|e| SignerError::Chain(format!("approve confirmation failed: {e}")))?;

        info!(token = %token, spender = %spender, tx = %tx_hash, "approval confirmed");
        Ok(tx_hash)
    }
}
