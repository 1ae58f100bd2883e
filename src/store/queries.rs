/// Accepted-offer query surface
///
/// The one read path downstream report generation needs: every fill
/// involving a set of wallets within a datetime range, seen either as
/// buyer or as seller.
use super::EventStore;
use crate::error::{Result, YamError};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Row};
use tabled::Tabled;

/// Which side of the trade the queried addresses are on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Buyer,
    Seller,
}

/// An `OfferAccepted` event joined with its offer
#[derive(Debug, Clone, Serialize, Deserialize, Tabled)]
pub struct AcceptedOffer {
    #[tabled(rename = "Offer")]
    pub offer_id: i64,

    #[tabled(rename = "Timestamp")]
    pub event_timestamp: String,

    #[tabled(rename = "Buyer")]
    pub buyer_address: String,

    #[tabled(rename = "Seller")]
    pub seller_address: String,

    #[tabled(rename = "Offer Token")]
    pub offer_token: String,

    #[tabled(rename = "Buyer Token")]
    pub buyer_token: String,

    #[tabled(rename = "Amount")]
    pub amount_bought: String,

    #[tabled(rename = "Price")]
    pub price_bought: String,

    #[tabled(rename = "Block")]
    pub block_number: i64,

    #[tabled(skip)]
    pub transaction_hash: String,
}

impl EventStore {
    /// Accepted offers where any of `addresses` acted in `role`, with
    /// `event_timestamp` in `[t_from, t_to]`, ascending by timestamp
    ///
    /// Addresses must be in checksum case (callers validate); datetimes
    /// accept ISO-8601 with either `T` or space separator.
    pub async fn accepted_offers(
        &self,
        role: Role,
        addresses: &[String],
        t_from: &str,
        t_to: &str,
    ) -> Result<Vec<AcceptedOffer>> {
        if addresses.is_empty() {
            return Err(YamError::Parse(
                "At least one address is required".to_string(),
            ));
        }

        let from = normalize_datetime(t_from)?;
        let to = normalize_datetime(t_to)?;

        let mut query = QueryBuilder::new(
            "SELECT \
                offer_events.offer_id, \
                offer_events.buyer_address, \
                offer_events.amount_bought, \
                offer_events.price_bought, \
                offer_events.block_number, \
                offer_events.transaction_hash, \
                offer_events.event_timestamp, \
                offers.offer_token, \
                offers.buyer_token, \
                offers.seller_address \
             FROM offer_events \
             JOIN offers ON offer_events.offer_id = offers.offer_id \
             WHERE offer_events.event_type = 'OfferAccepted' AND ",
        );

        match role {
            Role::Buyer => query.push("offer_events.buyer_address IN ("),
            Role::Seller => query.push("offers.seller_address IN ("),
        };

        let mut list = query.separated(", ");
        for address in addresses {
            list.push_bind(address.as_str());
        }
        query.push(")");

        query.push(" AND offer_events.event_timestamp BETWEEN ");
        query.push_bind(from);
        query.push(" AND ");
        query.push_bind(to);
        query.push(" ORDER BY offer_events.event_timestamp ASC");

        let rows = query.build().fetch_all(&self.pool).await?;

        Ok(rows
            .iter()
            .map(|row| AcceptedOffer {
                offer_id: row.get("offer_id"),
                event_timestamp: row.get("event_timestamp"),
                buyer_address: row.get::<Option<String>, _>("buyer_address").unwrap_or_default(),
                seller_address: row.get("seller_address"),
                offer_token: row.get("offer_token"),
                buyer_token: row.get("buyer_token"),
                amount_bought: row.get::<Option<String>, _>("amount_bought").unwrap_or_default(),
                price_bought: row.get::<Option<String>, _>("price_bought").unwrap_or_default(),
                block_number: row.get("block_number"),
                transaction_hash: row.get("transaction_hash"),
            })
            .collect())
    }
}

/// Normalise a caller-supplied datetime to the stored
/// `YYYY-MM-DD HH:MM:SS` form so string comparison works
fn normalize_datetime(input: &str) -> Result<String> {
    let parsed = NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(input, "%Y-%m-%d %H:%M:%S"))
        .or_else(|_| {
            chrono::NaiveDate::parse_from_str(input, "%Y-%m-%d")
                .map(|d| d.and_time(chrono::NaiveTime::MIN))
        })
        .map_err(|_| {
            YamError::Parse(format!(
                "Invalid datetime '{input}': expected YYYY-MM-DD[ HH:MM:SS]"
            ))
        })?;

    Ok(parsed.format("%Y-%m-%d %H:%M:%S").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_accepts_t_separator() {
        assert_eq!(
            normalize_datetime("2024-03-01T12:30:45").unwrap(),
            "2024-03-01 12:30:45"
        );
    }

    #[test]
    fn test_normalize_accepts_space_separator() {
        assert_eq!(
            normalize_datetime("2024-03-01 12:30:45").unwrap(),
            "2024-03-01 12:30:45"
        );
    }

    #[test]
    fn test_normalize_date_only_is_midnight() {
        assert_eq!(
            normalize_datetime("2024-03-01").unwrap(),
            "2024-03-01 00:00:00"
        );
    }

    #[test]
    fn test_normalize_rejects_garbage() {
        assert!(normalize_datetime("yesterday").is_err());
    }
}
