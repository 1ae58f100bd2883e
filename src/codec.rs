/// YAM log codec
///
/// Turns raw logs fetched from an RPC endpoint into typed `YamEvent`s.
/// Dispatch is on `topic0` against the signature hashes of the four
/// marketplace events; logs with any other topic are skipped. A log that
/// carries a known topic but does not decode structurally is an error:
/// the whole batch is aborted and the block range retried later.
use crate::error::{Result, YamError};
use crate::events::{EventKind, EventPayload, RealTokenYam, YamEvent};
use alloy::primitives::{Address, U256};
use alloy::rpc::types::Log;
use alloy::sol_types::SolEvent;

/// Decode a batch of raw logs, preserving their order
pub fn decode_logs(logs: &[Log]) -> Result<Vec<YamEvent>> {
    let mut decoded = Vec::with_capacity(logs.len());
    for log in logs {
        if let Some(event) = decode_log(log)? {
            decoded.push(event);
        }
    }
    Ok(decoded)
}

/// Decode a single raw log
///
/// Returns `Ok(None)` for topics the YAM contract does not emit.
pub fn decode_log(log: &Log) -> Result<Option<YamEvent>> {
    let Some(topic0) = log.topic0().copied() else {
        return Ok(None);
    };

    let block_number = log
        .block_number
        .ok_or_else(|| YamError::Parse("Missing block number".to_string()))?;

    let transaction_hash = log
        .transaction_hash
        .ok_or_else(|| YamError::Parse("Missing transaction hash".to_string()))?;

    let log_index = log
        .log_index
        .ok_or_else(|| YamError::Parse("Missing log index".to_string()))?;

    let (kind, payload) = if topic0 == RealTokenYam::OfferCreated::SIGNATURE_HASH {
        let ev = RealTokenYam::OfferCreated::decode_log(&log.inner, true)
            .map_err(|e| decode_error("OfferCreated", block_number, log_index, e))?;
        (
            EventKind::OfferCreated,
            EventPayload::OfferCreated {
                offer_id: offer_id_u64(ev.offerId)?,
                offer_token: checksummed(ev.offerToken),
                buyer_token: checksummed(ev.buyerToken),
                seller: checksummed(ev.seller),
                buyer: checksummed(ev.buyer),
                price: ev.price.to_string(),
                amount: ev.amount.to_string(),
            },
        )
    } else if topic0 == RealTokenYam::OfferAccepted::SIGNATURE_HASH {
        let ev = RealTokenYam::OfferAccepted::decode_log(&log.inner, true)
            .map_err(|e| decode_error("OfferAccepted", block_number, log_index, e))?;
        (
            EventKind::OfferAccepted,
            EventPayload::OfferAccepted {
                offer_id: offer_id_u64(ev.offerId)?,
                seller: checksummed(ev.seller),
                buyer: checksummed(ev.buyer),
                offer_token: checksummed(ev.offerToken),
                buyer_token: checksummed(ev.buyerToken),
                price: ev.price.to_string(),
                amount: ev.amount.to_string(),
            },
        )
    } else if topic0 == RealTokenYam::OfferUpdated::SIGNATURE_HASH {
        let ev = RealTokenYam::OfferUpdated::decode_log(&log.inner, true)
            .map_err(|e| decode_error("OfferUpdated", block_number, log_index, e))?;
        (
            EventKind::OfferUpdated,
            EventPayload::OfferUpdated {
                offer_id: offer_id_u64(ev.offerId)?,
                old_price: ev.oldPrice.to_string(),
                old_amount: ev.oldAmount.to_string(),
                new_price: ev.newPrice.to_string(),
                new_amount: ev.newAmount.to_string(),
            },
        )
    } else if topic0 == RealTokenYam::OfferDeleted::SIGNATURE_HASH {
        let ev = RealTokenYam::OfferDeleted::decode_log(&log.inner, true)
            .map_err(|e| decode_error("OfferDeleted", block_number, log_index, e))?;
        (
            EventKind::OfferDeleted,
            EventPayload::OfferDeleted {
                offer_id: offer_id_u64(ev.offerId)?,
            },
        )
    } else {
        // Not a marketplace event
        return Ok(None);
    };

    Ok(Some(YamEvent {
        kind,
        block_number,
        transaction_hash: format!("{transaction_hash:?}"),
        log_index,
        timestamp: None,
        payload,
    }))
}

/// Render an address in EIP-55 checksum case
fn checksummed(address: Address) -> String {
    address.to_checksum(None)
}

fn offer_id_u64(offer_id: U256) -> Result<u64> {
    u64::try_from(offer_id)
        .map_err(|_| YamError::Decode(format!("Offer id {offer_id} exceeds u64 range")))
}

fn decode_error(
    kind: &str,
    block_number: u64,
    log_index: u64,
    e: alloy::sol_types::Error,
) -> YamError {
    YamError::Decode(format!(
        "{kind} log at block {block_number} index {log_index} is malformed: {e}"
    ))
}
