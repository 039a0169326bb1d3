//! Parlay data model: legs, stake math, and per-leg status tracking.
//!
//! A parlay is a bundle of independent binary-outcome positions. The
//! exchange has no multi-leg order type, so each leg becomes its own
//! signed order; this module owns the bundle-level invariants (equal
//! stake per leg, minimum leg count / stake) and the shared status
//! board the signer and fill pollers write into.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Error, Debug)]
pub enum ParlayError {
    #[error("a parlay needs at least {min} legs, got {got}")]
    TooFewLegs { min: usize, got: usize },
    #[error("total stake ${got} is below the ${min} minimum")]
    StakeTooSmall { min: Decimal, got: Decimal },
    #[error("leg {leg_id} has price {price}, must be strictly between 0 and 1")]
    PriceOutOfRange { leg_id: String, price: Decimal },
}

/// Which outcome of a binary market the user picked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Yes,
    No,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Yes => write!(f, "YES"),
            Side::No => write!(f, "NO"),
        }
    }
}

/// One user-selected position. Immutable once added to a parlay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParlayLeg {
    pub leg_id: String,
    /// Condition id of the market.
    pub market_id: String,
    /// Outcome token the order trades (already resolved for the chosen side).
    pub token_id: String,
    pub question: String,
    pub side: Side,
    /// Price at selection time, strictly inside (0, 1).
    pub price: Decimal,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub liquidity: Option<Decimal>,
    #[serde(default)]
    pub end_date: Option<String>,
}

/// The bundle the user submits: legs plus the total stake split evenly
/// across them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parlay {
    pub legs: Vec<ParlayLeg>,
    pub total_stake: Decimal,
}

impl Parlay {
    pub fn new(legs: Vec<ParlayLeg>, total_stake: Decimal) -> Self {
        Self { legs, total_stake }
    }

    /// Enforce bundle-level preconditions before any network call.
    pub fn validate(&self, min_legs: usize, min_total_stake: Decimal) -> Result<(), ParlayError> {
        if self.legs.len() < min_legs {
            return Err(ParlayError::TooFewLegs {
                min: min_legs,
                got: self.legs.len(),
            });
        }
        if self.total_stake < min_total_stake {
            return Err(ParlayError::StakeTooSmall {
                min: min_total_stake,
                got: self.total_stake,
            });
        }
        for leg in &self.legs {
            if leg.price <= Decimal::ZERO || leg.price >= Decimal::ONE {
                return Err(ParlayError::PriceOutOfRange {
                    leg_id: leg.leg_id.clone(),
                    price: leg.price,
                });
            }
        }
        Ok(())
    }

    /// Equal-stake-per-leg policy: total divided evenly across legs.
    pub fn stake_per_leg(&self) -> Decimal {
        if self.legs.is_empty() {
            return Decimal::ZERO;
        }
        self.total_stake / Decimal::from(self.legs.len() as u64)
    }

    /// Combined decimal odds: product of 1/price over all legs.
    pub fn combined_odds(&self) -> Decimal {
        self.legs
            .iter()
            .fold(Decimal::ONE, |acc, leg| acc * (Decimal::ONE / leg.price))
    }

    /// Payout if every leg wins: total stake times combined odds.
    pub fn potential_payout(&self) -> Decimal {
        self.total_stake * self.combined_odds()
    }
}

/// Where a leg currently sits in the sign → submit → fill lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegState {
    Pending,
    Signing,
    Signed,
    Matched,
    Filled,
    Cancelled,
    Expired,
    Error,
}

impl LegState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            LegState::Filled | LegState::Cancelled | LegState::Expired | LegState::Error
        )
    }
}

impl std::fmt::Display for LegState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LegState::Pending => "pending",
            LegState::Signing => "signing",
            LegState::Signed => "signed",
            LegState::Matched => "matched",
            LegState::Filled => "filled",
            LegState::Cancelled => "cancelled",
            LegState::Expired => "expired",
            LegState::Error => "error",
        };
        write!(f, "{s}")
    }
}

/// Mutable per-leg state. One entry per leg; the sequential signer owns
/// it until submission, then the leg's fill poller takes over.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegStatus {
    pub leg_id: String,
    pub question: String,
    pub state: LegState,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub order_id: Option<String>,
}

/// Shared list of leg statuses. Updates replace the matching entry;
/// each entry has exactly one writer at a time (signer, then poller).
#[derive(Clone)]
pub struct StatusBoard {
    inner: Arc<Mutex<Vec<LegStatus>>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Reset the board with one pending entry per leg.
    pub async fn reset(&self, legs: &[ParlayLeg]) {
        let mut guard = self.inner.lock().await;
        *guard = legs
            .iter()
            .map(|leg| LegStatus {
                leg_id: leg.leg_id.clone(),
                question: leg.question.clone(),
                state: LegState::Pending,
                error: None,
                order_id: None,
            })
            .collect();
    }

    pub async fn set_state(&self, leg_id: &str, state: LegState) {
        let mut guard = self.inner.lock().await;
        if let Some(entry) = guard.iter_mut().find(|s| s.leg_id == leg_id) {
            entry.state = state;
            if state != LegState::Error {
                entry.error = None;
            }
        }
    }

    pub async fn set_order_id(&self, leg_id: &str, order_id: &str) {
        let mut guard = self.inner.lock().await;
        if let Some(entry) = guard.iter_mut().find(|s| s.leg_id == leg_id) {
            entry.order_id = Some(order_id.to_string());
        }
    }

    pub async fn fail(&self, leg_id: &str, reason: &str) {
        let mut guard = self.inner.lock().await;
        if let Some(entry) = guard.iter_mut().find(|s| s.leg_id == leg_id) {
            entry.state = LegState::Error;
            entry.error = Some(reason.to_string());
        }
    }

    pub async fn snapshot(&self) -> Vec<LegStatus> {
        self.inner.lock().await.clone()
    }
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new()
    }
}

/// Collateral snapshot taken once per submission attempt.
///
/// `UNKNOWN` (-1) in the balance fields means both RPC reads failed;
/// callers must treat it as "unknown", never as zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BalanceInfo {
    /// Bridged collateral (USDC.e) — the variant the exchange accepts.
    pub bridged: Decimal,
    /// Native (canonical) collateral, not accepted directly.
    pub native: Decimal,
    /// Amount needed for the whole parlay.
    pub required: Decimal,
}

impl BalanceInfo {
    pub const UNKNOWN: Decimal = Decimal::NEGATIVE_ONE;

    pub fn unknown(required: Decimal) -> Self {
        Self {
            bridged: Self::UNKNOWN,
            native: Self::UNKNOWN,
            required,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.bridged == Self::UNKNOWN && self.native == Self::UNKNOWN
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn leg(id: &str, price: Decimal) -> ParlayLeg {
        ParlayLeg {
            leg_id: id.to_string(),
            market_id: format!("cond-{id}"),
            token_id: format!("token-{id}"),
            question: format!("Question {id}?"),
            side: Side::Yes,
            price,
            category: None,
            liquidity: None,
            end_date: None,
        }
    }

    #[test]
    fn stake_splits_evenly_and_sums_back() {
        let parlay = Parlay::new(
            vec![leg("a", dec!(0.40)), leg("b", dec!(0.25)), leg("c", dec!(0.50))],
            dec!(30),
        );
        let per_leg = parlay.stake_per_leg();
        assert_eq!(per_leg, dec!(10));
        let sum: Decimal = (0..parlay.legs.len()).map(|_| per_leg).sum();
        assert!((sum - parlay.total_stake).abs() < dec!(0.000001));
    }

    #[test]
    fn uneven_split_sums_within_tolerance() {
        let parlay = Parlay::new(
            vec![leg("a", dec!(0.5)), leg("b", dec!(0.5)), leg("c", dec!(0.5))],
            dec!(10),
        );
        let per_leg = parlay.stake_per_leg();
        let sum = per_leg * Decimal::from(3);
        assert!((sum - dec!(10)).abs() < dec!(0.000001));
    }

    #[test]
    fn combined_odds_and_payout() {
        // $30 across [0.40, 0.25, 0.50] → 20.0x odds, $600 payout, $10/leg.
        let parlay = Parlay::new(
            vec![leg("a", dec!(0.40)), leg("b", dec!(0.25)), leg("c", dec!(0.50))],
            dec!(30),
        );
        assert_eq!(parlay.combined_odds(), dec!(20));
        assert_eq!(parlay.potential_payout(), dec!(600));
        assert_eq!(parlay.stake_per_leg(), dec!(10));
    }

    #[test]
    fn validate_rejects_single_leg() {
        let parlay = Parlay::new(vec![leg("a", dec!(0.5))], dec!(30));
        assert!(matches!(
            parlay.validate(2, dec!(5)),
            Err(ParlayError::TooFewLegs { min: 2, got: 1 })
        ));
    }

    #[test]
    fn validate_rejects_small_stake_and_bad_price() {
        let parlay = Parlay::new(vec![leg("a", dec!(0.5)), leg("b", dec!(0.5))], dec!(1));
        assert!(matches!(
            parlay.validate(2, dec!(5)),
            Err(ParlayError::StakeTooSmall { .. })
        ));

        let parlay = Parlay::new(vec![leg("a", dec!(0.5)), leg("b", dec!(1.0))], dec!(30));
        assert!(matches!(
            parlay.validate(2, dec!(5)),
            Err(ParlayError::PriceOutOfRange { .. })
        ));
    }

    #[tokio::test]
    async fn status_board_replaces_matching_entry() {
        let board = StatusBoard::new();
        board
            .reset(&[leg("a", dec!(0.5)), leg("b", dec!(0.5))])
            .await;

        board.set_state("a", LegState::Signing).await;
        board.fail("b", "rejected by exchange").await;

        let snap = board.snapshot().await;
        assert_eq!(snap[0].state, LegState::Signing);
        assert_eq!(snap[1].state, LegState::Error);
        assert_eq!(snap[1].error.as_deref(), Some("rejected by exchange"));
    }

    #[test]
    fn unknown_balance_sentinel() {
        let info = BalanceInfo::unknown(dec!(30));
        assert!(info.is_unknown());
        assert_eq!(info.bridged, dec!(-1));
    }
}
