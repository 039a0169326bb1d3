//! Per-leg fill polling.
//!
//! One independent task per accepted order, polling the exchange's
//! order-status endpoint until the order reaches a terminal state. Legs
//! never share state beyond each task writing its own StatusBoard entry,
//! so one leg's loop stalling cannot affect another's. Network errors
//! are swallowed per tick and retried on the next one; there is no retry
//! cap. A shared shutdown flag stops every loop when the console tears
//! down.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::auth::{ExchangeApi, OrderStatusResponse};
use crate::parlay::{LegState, StatusBoard};

/// Handles for all of one submission's poll loops, plus the flag that
/// stops them.
#[derive(Debug)]
pub struct PollerSet {
    shutdown: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl PollerSet {
    pub fn new() -> Self {
        Self {
            shutdown: Arc::new(AtomicBool::new(false)),
            handles: Vec::new(),
        }
    }

    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    pub fn push(&mut self, handle: JoinHandle<()>) {
        self.handles.push(handle);
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Signal every loop to stop at its next tick.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Wait for every loop to finish (each exits on a terminal status or
    /// after `shutdown`).
    pub async fn join_all(self) {
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

impl Default for PollerSet {
    fn default() -> Self {
        Self::new()
    }
}

/// Map an order-status response onto a leg state change. `None` means no
/// transition this tick.
pub fn map_status(resp: &OrderStatusResponse) -> Option<LegState> {
    match resp.status.to_ascii_uppercase().as_str() {
        "FILLED" => return Some(LegState::Filled),
        "CANCELED" | "CANCELLED" => return Some(LegState::Cancelled),
        "EXPIRED" => return Some(LegState::Expired),
        _ => {}
    }

    if resp.original_size > rust_decimal::Decimal::ZERO
        && resp.size_matched >= resp.original_size
    {
        return Some(LegState::Filled);
    }
    if resp.size_matched > rust_decimal::Decimal::ZERO {
        return Some(LegState::Matched);
    }
    None
}

/// Spawn the poll loop for one accepted order.
pub fn spawn_fill_poller(
    api: Arc<dyn ExchangeApi>,
    order_id: String,
    leg_id: String,
    board: StatusBoard,
    interval: Duration,
    shutdown: Arc<AtomicBool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if shutdown.load(Ordering::SeqCst) {
                debug!(leg_id, order_id, "fill poller stopped by shutdown");
                return;
            }

            let resp = match api.order_status(&order_id).await {
                Ok(resp) => resp,
                Err(e) => {
                    // Transient by assumption; next tick retries.
                    debug!(leg_id, order_id, error = %e, "order status poll failed");
                    continue;
                }
            };

            if let Some(state) = map_status(&resp) {
                board.set_state(&leg_id, state).await;
                if state.is_terminal() {
                    info!(leg_id, order_id, state = %state, "leg reached terminal state");
                    return;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn resp(status: &str, matched: rust_decimal::Decimal, original: rust_decimal::Decimal) -> OrderStatusResponse {
        OrderStatusResponse {
            status: status.to_string(),
            size_matched: matched,
            original_size: original,
        }
    }

    #[test]
    fn poller_set_starts_empty_and_is_printable() {
        let set = PollerSet::new();
        assert!(set.is_empty());
        assert!(format!("{set:?}").contains("PollerSet"));
    }

    #[test]
    fn terminal_statuses_map_directly() {
        assert_eq!(map_status(&resp("FILLED", dec!(0), dec!(0))), Some(LegState::Filled));
        assert_eq!(map_status(&resp("canceled", dec!(0), dec!(0))), Some(LegState::Cancelled));
        assert_eq!(map_status(&resp("CANCELLED", dec!(0), dec!(0))), Some(LegState::Cancelled));
        assert_eq!(map_status(&resp("EXPIRED", dec!(0), dec!(0))), Some(LegState::Expired));
    }

    #[test]
    fn partial_fill_is_matched_full_fill_is_filled() {
        assert_eq!(
            map_status(&resp("LIVE", dec!(4), dec!(10))),
            Some(LegState::Matched)
        );
        assert_eq!(
            map_status(&resp("LIVE", dec!(10), dec!(10))),
            Some(LegState::Filled)
        );
        assert_eq!(map_status(&resp("LIVE", dec!(0), dec!(10))), None);
    }
}
