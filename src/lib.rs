//! parlaydesk: multi-leg parlay construction, signing and execution
//! for the Polymarket CLOB.
//!
//! The exchange has no native multi-leg order type, so a parlay is
//! executed as one signed order per leg: balance check → allowance
//! approvals → sequential EIP-712 signing → one batch submit → one fill
//! poller per accepted leg.

pub mod allowance;
pub mod auth;
pub mod collateral;
pub mod config;
pub mod history;
pub mod markets;
pub mod orders;
pub mod parlay;
pub mod pipeline;
pub mod wallet;
