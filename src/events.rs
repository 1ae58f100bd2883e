use alloy::sol;
use serde::{Deserialize, Serialize};

// RealToken YAM marketplace contract on Gnosis Chain
// https://gnosisscan.io/address/0xc759Aa7f9dd9720A1502c104DAe4F9C23fA8C57C
pub const YAM_CONTRACT_ADDRESS: &str = "0xc759Aa7f9dd9720A1502c104DAe4F9C23fA8C57C";

// Block in which the YAM contract was deployed; indexing never starts earlier.
pub const YAM_GENESIS_BLOCK: u64 = 25_530_394;

// Solidity event definitions using alloy's sol! macro.
// Parameter order matters: it fixes both the topic layout and the
// keccak256 signature hashes the codec dispatches on.
sol! {
    #[allow(missing_docs)]
    contract RealTokenYam {
        event OfferCreated(
            address indexed offerToken,
            address indexed buyerToken,
            address seller,
            address buyer,
            uint256 indexed offerId,
            uint256 price,
            uint256 amount
        );

        event OfferAccepted(
            uint256 indexed offerId,
            address indexed seller,
            address indexed buyer,
            address offerToken,
            address buyerToken,
            uint256 price,
            uint256 amount
        );

        event OfferUpdated(
            uint256 indexed offerId,
            uint256 oldPrice,
            uint256 indexed newPrice,
            uint256 oldAmount,
            uint256 indexed newAmount
        );

        event OfferDeleted(uint256 indexed offerId);
    }
}

/// Unified event type for every YAM marketplace action
///
/// Produced by the codec (RPC path) and by the subgraph client (backfill
/// path) with identical payloads, so the store never knows the source.
/// The only difference: the subgraph supplies `timestamp`, the RPC path
/// does not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YamEvent {
    pub kind: EventKind,
    pub block_number: u64,
    pub transaction_hash: String,
    pub log_index: u64,
    /// Unix seconds (UTC). Present on subgraph rows, absent on RPC logs.
    pub timestamp: Option<i64>,
    pub payload: EventPayload,
}

impl YamEvent {
    /// Primary key of the offer_events table: `<tx_hash>_<log_index>`
    pub fn unique_id(&self) -> String {
        format!("{}_{}", self.transaction_hash, self.log_index)
    }

    pub fn offer_id(&self) -> u64 {
        match &self.payload {
            EventPayload::OfferCreated { offer_id, .. } => *offer_id,
            EventPayload::OfferAccepted { offer_id, .. } => *offer_id,
            EventPayload::OfferUpdated { offer_id, .. } => *offer_id,
            EventPayload::OfferDeleted { offer_id } => *offer_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    OfferCreated,
    OfferAccepted,
    OfferUpdated,
    OfferDeleted,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::OfferCreated => "OfferCreated",
            EventKind::OfferAccepted => "OfferAccepted",
            EventKind::OfferUpdated => "OfferUpdated",
            EventKind::OfferDeleted => "OfferDeleted",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventKind {
    type Err = crate::error::YamError;

    fn from_str(s: &str) -> crate::error::Result<Self> {
        match s {
            "OfferCreated" => Ok(EventKind::OfferCreated),
            "OfferAccepted" => Ok(EventKind::OfferAccepted),
            "OfferUpdated" => Ok(EventKind::OfferUpdated),
            "OfferDeleted" => Ok(EventKind::OfferDeleted),
            other => Err(crate::error::YamError::Parse(format!(
                "Unknown event kind '{other}'"
            ))),
        }
    }
}

/// Per-kind event attributes
///
/// Addresses are checksummed strings; amounts and prices are base-10
/// strings so arbitrary-precision token quantities survive persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EventPayload {
    OfferCreated {
        offer_id: u64,
        offer_token: String,
        buyer_token: String,
        seller: String,
        buyer: String,
        price: String,
        amount: String,
    },
    OfferAccepted {
        offer_id: u64,
        seller: String,
        buyer: String,
        offer_token: String,
        buyer_token: String,
        price: String,
        amount: String,
    },
    OfferUpdated {
        offer_id: u64,
        old_price: String,
        old_amount: String,
        new_price: String,
        new_amount: String,
    },
    OfferDeleted {
        offer_id: u64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::b256;
    use alloy::sol_types::SolEvent;

    // The topic hashes the YAM contract emits on chain. If a signature in
    // the sol! block drifts, these comparisons catch it at test time.
    #[test]
    fn test_signature_hashes_match_onchain_topics() {
        assert_eq!(
            RealTokenYam::OfferCreated::SIGNATURE_HASH,
            b256!("9fa2d733a579251ad3a2286bebb5db74c062332de37e4904aa156729c4b38a65")
        );
        assert_eq!(
            RealTokenYam::OfferAccepted::SIGNATURE_HASH,
            b256!("0fe687b89794caf9729d642df21576cbddc748b0c8c7a5e1ec39f3a46bd00410")
        );
        assert_eq!(
            RealTokenYam::OfferUpdated::SIGNATURE_HASH,
            b256!("c26a0a1f023ef119f120b3d9843d9e77dc8f66bbc0ea91d48d6dd39b8e351178")
        );
        assert_eq!(
            RealTokenYam::OfferDeleted::SIGNATURE_HASH,
            b256!("88686b85d6f2c3ab9a04e4f15a22fcfa025ffd97226dcf0a67cdf682def55676")
        );
    }

    #[test]
    fn test_unique_id_format() {
        let event = YamEvent {
            kind: EventKind::OfferDeleted,
            block_number: 1000,
            transaction_hash: "0xabcd".to_string(),
            log_index: 7,
            timestamp: None,
            payload: EventPayload::OfferDeleted { offer_id: 42 },
        };

        assert_eq!(event.unique_id(), "0xabcd_7");
        assert_eq!(event.offer_id(), 42);
    }

    #[test]
    fn test_event_kind_round_trip() {
        for kind in [
            EventKind::OfferCreated,
            EventKind::OfferAccepted,
            EventKind::OfferUpdated,
            EventKind::OfferDeleted,
        ] {
            assert_eq!(kind.to_string().parse::<EventKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_event_serialization() {
        let event = YamEvent {
            kind: EventKind::OfferAccepted,
            block_number: 26000000,
            transaction_hash: "0x1234".to_string(),
            log_index: 3,
            timestamp: Some(1700000000),
            payload: EventPayload::OfferAccepted {
                offer_id: 9,
                seller: "0xc759Aa7f9dd9720A1502c104DAe4F9C23fA8C57C".to_string(),
                buyer: "0x0675e8F4A52eA6c845CB6427Af03616a2af42170".to_string(),
                offer_token: "0xe91D153E0b41518A2Ce8Dd3D7944Fa863463a97d".to_string(),
                buyer_token: "0xDDAfbb505ad214D7b80b1f830fcCc89B60fb7A83".to_string(),
                price: "1000000000000000000".to_string(),
                amount: "250000000000000000".to_string(),
            },
        };

        let json = serde_json::to_string(&event).unwrap();
        let back: YamEvent = serde_json::from_str(&json).unwrap();

        assert_eq!(back.unique_id(), event.unique_id());
        assert_eq!(back.block_number, event.block_number);
        assert_eq!(back.kind, EventKind::OfferAccepted);
    }
}
