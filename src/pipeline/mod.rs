//! Submission orchestrator: the state machine that turns a parlay into
//! accepted exchange orders.
//!
//! Stages run `idle → checking → approving → signing → submitting →
//! done`, with any failure dropping to `error`. Everything before the
//! batch POST is fail-fast — a partially-signed batch is never
//! submitted. Everything after is leg-scoped: the exchange accepts and
//! rejects legs independently, and accepted legs keep progressing no
//! matter what happened to their siblings.
//!
//! All collaborators come in as trait objects so the whole machine runs
//! against stubs in tests.

pub mod poller;

use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tracing::{info, warn};

use crate::allowance::{AllowanceError, AllowanceGate, ApprovalProgress};
use crate::auth::{AuthError, ExchangeApi, ParlaySubmission};
use crate::collateral::BalanceSource;
use crate::history::{ParlayHistory, ParlayRecord};
use crate::markets::{MarketCatalog, MarketError};
use crate::orders::{build_order, BuildOrderParams, OrderError, OrderSide, SignedOrder};
use crate::parlay::{BalanceInfo, LegState, Parlay, ParlayError, StatusBoard};
use crate::wallet::{SignerError, WalletSigner};

use poller::{spawn_fill_poller, PollerSet};

/// Where a submission attempt currently sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Checking,
    Approving,
    Signing,
    Submitting,
    Done,
    Error,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Idle => "idle",
            Stage::Checking => "checking",
            Stage::Approving => "approving",
            Stage::Signing => "signing",
            Stage::Submitting => "submitting",
            Stage::Done => "done",
            Stage::Error => "error",
        };
        write!(f, "{s}")
    }
}

#[derive(Error, Debug)]
pub enum SubmitError {
    #[error("{0}")]
    Precondition(String),
    /// Distinguished so callers can route the user to a deposit/swap
    /// flow instead of a generic retry.
    #[error("insufficient funds: ${required} required, ${available} available on the exchange")]
    InsufficientFunds { required: Decimal, available: Decimal },
    /// The user declined signature prompt N (1-based leg index).
    #[error("you rejected signature {leg} in your wallet")]
    Rejected { leg: usize },
    #[error("approval failed: {0}")]
    Approval(#[from] AllowanceError),
    #[error("market metadata unavailable: {0}")]
    Metadata(#[from] MarketError),
    #[error("order construction failed: {0}")]
    Order(#[from] OrderError),
    #[error("signing failed for leg {leg}: {reason}")]
    Signer { leg: usize, reason: String },
    #[error("exchange request failed: {0}")]
    Exchange(#[from] AuthError),
    #[error("exchange rejected the batch: {0}")]
    BatchRejected(String),
}

impl From<ParlayError> for SubmitError {
    fn from(e: ParlayError) -> Self {
        SubmitError::Precondition(e.to_string())
    }
}

/// Tunables lifted from TradingConfig.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub min_legs: usize,
    pub min_total_stake: Decimal,
    /// Pause between consecutive wallet signature prompts.
    pub sign_delay: Duration,
    pub poll_interval: Duration,
    /// Sign with the proxy-wallet signature type.
    pub is_proxy: bool,
}

impl From<&crate::config::TradingConfig> for PipelineSettings {
    fn from(trading: &crate::config::TradingConfig) -> Self {
        Self {
            min_legs: trading.min_legs,
            min_total_stake: trading.min_total_stake,
            sign_delay: Duration::from_millis(trading.sign_delay_ms),
            poll_interval: Duration::from_millis(trading.poll_interval_ms),
            is_proxy: false,
        }
    }
}

/// Result of a successful (batch-accepted) submission. Individual legs
/// may still have been rejected.
#[derive(Debug)]
pub struct SubmissionOutcome {
    pub accepted: usize,
    pub rejected: usize,
    /// Poll loops for accepted legs with trackable order ids.
    pub pollers: PollerSet,
}

pub struct SubmissionPipeline {
    api: Arc<dyn ExchangeApi>,
    signer: Arc<dyn WalletSigner>,
    catalog: Arc<dyn MarketCatalog>,
    allowances: Arc<dyn AllowanceGate>,
    balances: Arc<dyn BalanceSource>,
    history: Option<ParlayHistory>,
    board: StatusBoard,
    settings: PipelineSettings,
    stage_tx: watch::Sender<Stage>,
    last_balances: Mutex<Option<BalanceInfo>>,
}

impl SubmissionPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        api: Arc<dyn ExchangeApi>,
        signer: Arc<dyn WalletSigner>,
        catalog: Arc<dyn MarketCatalog>,
        allowances: Arc<dyn AllowanceGate>,
        balances: Arc<dyn BalanceSource>,
        history: Option<ParlayHistory>,
        settings: PipelineSettings,
    ) -> Self {
        let (stage_tx, _) = watch::channel(Stage::Idle);
        Self {
            api,
            signer,
            catalog,
            allowances,
            balances,
            history,
            board: StatusBoard::new(),
            settings,
            stage_tx,
            last_balances: Mutex::new(None),
        }
    }

    /// Observe stage transitions (for a UI status line).
    pub fn stage(&self) -> watch::Receiver<Stage> {
        self.stage_tx.subscribe()
    }

    /// Shared per-leg status list.
    pub fn board(&self) -> StatusBoard {
        self.board.clone()
    }

    /// Collateral snapshot from the last attempt, for remediation display
    /// (e.g. "you hold native USDC, swap to bridged").
    pub async fn balance_info(&self) -> Option<BalanceInfo> {
        *self.last_balances.lock().await
    }

    fn set_stage(&self, stage: Stage) {
        info!(stage = %stage, "submission stage");
        // send_replace stores the value even when no receiver is
        // subscribed yet, so a late `stage()` caller sees the latest
        // transition instead of the initial idle.
        self.stage_tx.send_replace(stage);
    }

    /// Run one submission attempt end to end. Retrying after an error is
    /// just calling this again: statuses reset and the flow re-enters at
    /// checking.
    pub async fn submit(&self, parlay: &Parlay) -> Result<SubmissionOutcome, SubmitError> {
        match self.run(parlay).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                self.set_stage(Stage::Error);
                Err(e)
            }
        }
    }

    async fn run(&self, parlay: &Parlay) -> Result<SubmissionOutcome, SubmitError> {
        // Preconditions, before any network call.
        if !self.api.has_credentials() {
            return Err(SubmitError::Precondition(
                "trading credentials missing — enable trading before submitting".to_string(),
            ));
        }
        parlay.validate(self.settings.min_legs, self.settings.min_total_stake)?;
        self.board.reset(&parlay.legs).await;

        let maker = self.signer.address();
        let required = parlay.total_stake;

        // ── checking ─────────────────────────────────────────────────
        self.set_stage(Stage::Checking);

        let (bridged, native) = self.balances.collateral_balances(maker).await;
        *self.last_balances.lock().await = Some(BalanceInfo {
            bridged,
            native,
            required,
        });

        // The exchange ledger is authoritative: funds may sit in its
        // custody rather than the wallet.
        let available = self.api.collateral_balance().await?;
        if available < required {
            // The wallet snapshot often explains the shortfall: funds
            // held as native USDC cannot settle until swapped.
            if bridged != BalanceInfo::UNKNOWN && bridged < required && native >= required {
                warn!(
                    native = %native,
                    bridged = %bridged,
                    "collateral held as native USDC; swap to bridged USDC.e to trade"
                );
            }
            return Err(SubmitError::InsufficientFunds {
                required,
                available,
            });
        }

        // ── approving ────────────────────────────────────────────────
        self.set_stage(Stage::Approving);
        let mut on_progress = |p: ApprovalProgress| match p {
            ApprovalProgress::AlreadySufficient { contract } => {
                info!(contract = %contract, "allowance already sufficient");
            }
            ApprovalProgress::Approving { contract } => {
                info!(contract = %contract, "awaiting approval in wallet");
            }
            ApprovalProgress::Approved { contract } => {
                info!(contract = %contract, "approval confirmed");
            }
        };
        let summary = self
            .allowances
            .ensure(maker, required, &mut on_progress)
            .await?;
        if summary.transactions > 0 {
            info!(transactions = summary.transactions, "allowances raised");
        }

        // ── signing ──────────────────────────────────────────────────
        self.set_stage(Stage::Signing);
        let stake_per_leg = parlay.stake_per_leg();
        let mut signed: Vec<SignedOrder> = Vec::with_capacity(parlay.legs.len());

        for (index, leg) in parlay.legs.iter().enumerate() {
            let leg_number = index + 1;
            self.board.set_state(&leg.leg_id, LegState::Signing).await;

            // Metadata must resolve; guessing neg_risk signs for the
            // wrong contract.
            let meta = match self.catalog.resolve(&leg.token_id).await {
                Ok(meta) => meta,
                Err(e) => {
                    self.board.fail(&leg.leg_id, &e.to_string()).await;
                    return Err(e.into());
                }
            };

            let order = build_order(&BuildOrderParams {
                maker,
                signer: maker,
                token_id: leg.token_id.clone(),
                side: OrderSide::Buy,
                price_per_share: leg.price,
                size_usd: stake_per_leg,
                neg_risk: meta.neg_risk,
                tick_size: meta.tick_size,
                is_proxy: self.settings.is_proxy,
            })
            .map_err(SubmitError::from)?;

            match self.signer.sign_order(&order).await {
                Ok(signature) => {
                    signed.push(SignedOrder { order, signature });
                    self.board.set_state(&leg.leg_id, LegState::Signed).await;
                }
                Err(SignerError::Rejected) => {
                    // Earlier signatures are discarded; nothing partial
                    // is ever submitted.
                    let reason = format!("you rejected signature {leg_number} in your wallet");
                    self.board.fail(&leg.leg_id, &reason).await;
                    return Err(SubmitError::Rejected { leg: leg_number });
                }
                Err(e) => {
                    self.board.fail(&leg.leg_id, &e.to_string()).await;
                    return Err(SubmitError::Signer {
                        leg: leg_number,
                        reason: e.to_string(),
                    });
                }
            }

            // Wallet UIs race when prompts arrive back-to-back.
            if leg_number < parlay.legs.len() {
                tokio::time::sleep(self.settings.sign_delay).await;
            }
        }

        // ── submitting ───────────────────────────────────────────────
        self.set_stage(Stage::Submitting);
        let batch = ParlaySubmission {
            signed_orders: signed.iter().map(SignedOrder::wire).collect(),
            user_address: format!("{maker:?}"),
            total_stake: parlay.total_stake,
            legs: parlay.legs.clone(),
            total_odds: parlay.combined_odds(),
            potential_payout: parlay.potential_payout(),
        };
        let response = self.api.submit_parlay(&batch).await?;

        if !response.success {
            let reason = response
                .error
                .unwrap_or_else(|| "no reason given".to_string());
            for leg in &parlay.legs {
                self.board.fail(&leg.leg_id, &reason).await;
            }
            return Err(SubmitError::BatchRejected(reason));
        }

        // ── done ─────────────────────────────────────────────────────
        // The batch call succeeded; per-leg rejections are reported on
        // the board, not as a pipeline error.
        self.set_stage(Stage::Done);

        let mut pollers = PollerSet::new();
        let mut accepted = 0usize;
        let mut rejected = 0usize;

        for outcome in &response.orders {
            if !outcome.success {
                rejected += 1;
                let reason = outcome
                    .error
                    .clone()
                    .unwrap_or_else(|| "rejected by exchange".to_string());
                self.board.fail(&outcome.leg_id, &reason).await;
                continue;
            }

            accepted += 1;
            match outcome.trackable_order_id() {
                Some(order_id) => {
                    self.board.set_order_id(&outcome.leg_id, order_id).await;
                    let handle = spawn_fill_poller(
                        Arc::clone(&self.api),
                        order_id.to_string(),
                        outcome.leg_id.clone(),
                        self.board.clone(),
                        self.settings.poll_interval,
                        pollers.shutdown_flag(),
                    );
                    pollers.push(handle);
                }
                None => {
                    // Accepted without a trackable id: stays `signed`.
                    info!(leg_id = %outcome.leg_id, "leg accepted without order id");
                }
            }
        }

        info!(accepted, rejected, pollers = pollers.len(), "parlay submitted");

        if let Some(history) = &self.history {
            let history = history.clone();
            let record = ParlayRecord {
                submitted_at: chrono::Utc::now(),
                total_stake: parlay.total_stake,
                combined_odds: parlay.combined_odds(),
                potential_payout: parlay.potential_payout(),
                legs: parlay.legs.clone(),
                accepted_legs: accepted,
                rejected_legs: rejected,
            };
            // Best effort: the exchange already accepted the trade.
            tokio::spawn(async move { history.append(record).await });
        } else if accepted > 0 {
            warn!("no history store configured, skipping parlay record");
        }

        Ok(SubmissionOutcome {
            accepted,
            rejected,
            pollers,
        })
    }
}
