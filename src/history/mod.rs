//! Best-effort parlay history.
//!
//! One JSON line per submitted parlay, appended after the exchange has
//! accepted the batch. The trade already exists on the exchange by the
//! time this runs, so a failed write is logged and dropped, never
//! surfaced to the submission flow.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::parlay::ParlayLeg;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParlayRecord {
    pub submitted_at: DateTime<Utc>,
    pub total_stake: Decimal,
    pub combined_odds: Decimal,
    pub potential_payout: Decimal,
    pub legs: Vec<ParlayLeg>,
    pub accepted_legs: usize,
    pub rejected_legs: usize,
}

#[derive(Clone)]
pub struct ParlayHistory {
    path: PathBuf,
}

impl ParlayHistory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Append one record. Fire-and-forget: errors are logged, not returned.
    pub async fn append(&self, record: ParlayRecord) {
        let path = self.path.clone();
        let result = tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            let line = serde_json::to_string(&record)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            let mut file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)?;
            writeln!(file, "{line}")?;
            Ok(())
        })
        .await;

        match result {
            Ok(Ok(())) => debug!(path = %self.path.display(), "parlay recorded"),
            Ok(Err(e)) => warn!(error = %e, "failed to write parlay history"),
            Err(e) => warn!(error = %e, "history writer task failed"),
        }
    }
}
