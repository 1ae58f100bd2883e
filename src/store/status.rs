/// Offer lifecycle status derivation
///
/// The status of an offer is never taken from any single event; it is
/// recomputed from the offer's linearised history every time an
/// `OfferAccepted` is committed. `resolve` is a pure function so the
/// derivation can be tested without a database.
use crate::error::{Result, YamError};
use crate::events::EventKind;
use alloy::primitives::U256;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OfferStatus {
    InProgress,
    SoldOut,
    Deleted,
}

impl OfferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OfferStatus::InProgress => "InProgress",
            OfferStatus::SoldOut => "SoldOut",
            OfferStatus::Deleted => "Deleted",
        }
    }
}

impl std::fmt::Display for OfferStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OfferStatus {
    type Err = YamError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "InProgress" => Ok(OfferStatus::InProgress),
            "SoldOut" => Ok(OfferStatus::SoldOut),
            "Deleted" => Ok(OfferStatus::Deleted),
            other => Err(YamError::Parse(format!("Unknown offer status '{other}'"))),
        }
    }
}

/// One record of an offer's merged history: the creation row from the
/// offers table plus every offer_events row, ordered ascending by
/// `(block_number, log_index)`.
#[derive(Debug, Clone)]
pub struct HistoryRecord {
    pub event_type: EventKind,
    pub block_number: i64,
    pub log_index: i64,
    /// Baseline amount: `initial_amount` on the creation record, the new
    /// amount on an `OfferUpdated` record, absent otherwise.
    pub amount: Option<String>,
    /// Filled quantity, present only on `OfferAccepted` records.
    pub amount_bought: Option<String>,
}

/// Compute the current status of an offer from its ordered history
///
/// - the last record being `OfferDeleted` wins outright;
/// - otherwise the baseline is the most recent `OfferUpdated` (an update
///   resets the open amount) or the creation record when never updated;
/// - remaining = baseline amount minus every subsequent fill.
///
/// Returns `None` when the status cannot be determined: empty history,
/// a baseline record without an amount, or fills exceeding the baseline
/// (a data anomaly the caller logs without touching the stored status).
pub fn resolve(history: &[HistoryRecord]) -> Option<OfferStatus> {
    if history.is_empty() {
        return None;
    }

    if history.last().map(|r| r.event_type) == Some(EventKind::OfferDeleted) {
        return Some(OfferStatus::Deleted);
    }

    let baseline_index = history
        .iter()
        .rposition(|r| r.event_type == EventKind::OfferUpdated)
        .unwrap_or(0);
    let window = &history[baseline_index..];

    let baseline = U256::from_str(window.first()?.amount.as_deref()?).ok()?;

    let mut remaining = baseline;
    for record in &window[1..] {
        if let Some(bought) = record.amount_bought.as_deref() {
            let bought = U256::from_str(bought).ok()?;
            // Underflow means the history claims more was bought than
            // was ever on offer.
            remaining = remaining.checked_sub(bought)?;
        }
    }

    if remaining.is_zero() {
        Some(OfferStatus::SoldOut)
    } else {
        Some(OfferStatus::InProgress)
    }
}
