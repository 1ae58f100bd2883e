/// Subgraph client
///
/// Bulk historical retrieval of YAM events from a hosted GraphQL
/// indexing service, used to close gaps the direct RPC path missed. One
/// fetcher per entity kind, all sharing the same cursor-paginated page
/// loop. Rows come back in the exact shape the codec produces, with the
/// addition of the block timestamp, so the store cannot tell the two
/// sources apart.
///
/// A GraphQL or HTTP failure logs the error and yields an empty list:
/// the backfill attempt is abandoned and retried at the next periodic
/// tick.
use crate::error::{Result, YamError};
use crate::events::{EventKind, EventPayload, YamEvent};
use alloy::primitives::Address;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;
use tokio::time::sleep;

/// Maximum rows per page The Graph allows
const PAGE_SIZE: usize = 1000;

/// Pause between pages, to be respectful to the provider
const PAGE_DELAY: Duration = Duration::from_millis(100);

#[derive(Clone)]
pub struct SubgraphClient {
    http: reqwest::Client,
    url: String,
    api_key: String,
}

impl SubgraphClient {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: url.into(),
            api_key: api_key.into(),
        }
    }

    /// All OfferCreated entities in `[from_block, to_block]`
    /// (unbounded above when `to_block` is `None`)
    pub async fn offer_createds(&self, from_block: u64, to_block: Option<u64>) -> Vec<YamEvent> {
        self.fetch_kind::<CreatedRow>(from_block, to_block).await
    }

    /// All OfferAccepted entities in the range
    pub async fn offer_accepteds(&self, from_block: u64, to_block: Option<u64>) -> Vec<YamEvent> {
        self.fetch_kind::<AcceptedRow>(from_block, to_block).await
    }

    /// All OfferUpdated entities in the range
    pub async fn offer_updateds(&self, from_block: u64, to_block: Option<u64>) -> Vec<YamEvent> {
        self.fetch_kind::<UpdatedRow>(from_block, to_block).await
    }

    /// All OfferDeleted entities in the range
    pub async fn offer_deleteds(&self, from_block: u64, to_block: Option<u64>) -> Vec<YamEvent> {
        self.fetch_kind::<DeletedRow>(from_block, to_block).await
    }

    /// Every event kind in the range, merged and sorted chronologically
    /// (timestamp, then block number and log index), ready for a single
    /// ordered commit
    ///
    /// Unlike the per-kind fetchers this propagates failure, so a
    /// backfill is abandoned as a whole rather than committed with one
    /// kind silently missing.
    pub async fn fetch_block_range(
        &self,
        from_block: u64,
        to_block: Option<u64>,
    ) -> Result<Vec<YamEvent>> {
        let mut events = Vec::new();
        events.extend(self.fetch_all_pages::<CreatedRow>(from_block, to_block).await?);
        events.extend(self.fetch_all_pages::<AcceptedRow>(from_block, to_block).await?);
        events.extend(self.fetch_all_pages::<UpdatedRow>(from_block, to_block).await?);
        events.extend(self.fetch_all_pages::<DeletedRow>(from_block, to_block).await?);

        events.sort_by_key(|e| (e.timestamp, e.block_number, e.log_index));
        Ok(events)
    }

    async fn fetch_kind<R: SubgraphRow>(&self, from_block: u64, to_block: Option<u64>) -> Vec<YamEvent> {
        match self.fetch_all_pages::<R>(from_block, to_block).await {
            Ok(events) => events,
            Err(e) => {
                tracing::error!(
                    "Subgraph fetch of {} for blocks {}..{:?} failed: {}",
                    R::ENTITY,
                    from_block,
                    to_block,
                    e
                );
                Vec::new()
            }
        }
    }

    async fn fetch_all_pages<R: SubgraphRow>(
        &self,
        from_block: u64,
        to_block: Option<u64>,
    ) -> Result<Vec<YamEvent>> {
        let mut events = Vec::new();
        let mut last_id = String::new();

        loop {
            let rows: Vec<R> = self.fetch_page(from_block, to_block, &last_id).await?;
            let page_len = rows.len();

            if let Some(last) = rows.last() {
                last_id = last.cursor().to_string();
            }

            for row in rows {
                events.push(row.into_event()?);
            }

            // Fewer rows than a full page means we have drained the range
            if page_len < PAGE_SIZE {
                break;
            }

            sleep(PAGE_DELAY).await;
        }

        tracing::debug!(
            "Fetched {} {} row(s) from the subgraph",
            events.len(),
            R::ENTITY
        );
        Ok(events)
    }

    async fn fetch_page<R: SubgraphRow>(
        &self,
        from_block: u64,
        to_block: Option<u64>,
        last_id: &str,
    ) -> Result<Vec<R>> {
        let block_filter = match to_block {
            Some(to) => format!("blockNumber_gte: {from_block}, blockNumber_lte: {to}"),
            None => format!("blockNumber_gte: {from_block}"),
        };
        let where_clause = if last_id.is_empty() {
            block_filter
        } else {
            format!("{block_filter}, id_gt: \"{last_id}\"")
        };
        let query = format!(
            "{{ {entity}(first: {PAGE_SIZE}, where: {{{where_clause}}}, \
             orderBy: id, orderDirection: asc) {{ {fields} }} }}",
            entity = R::ENTITY,
            fields = R::FIELDS,
        );

        let response: GraphQlResponse = self
            .http
            .post(self.url.as_str())
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({ "query": query }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(errors) = response.errors {
            return Err(YamError::Subgraph(format!("GraphQL errors: {errors}")));
        }

        let rows = response
            .data
            .and_then(|mut data| data.get_mut(R::ENTITY).map(serde_json::Value::take))
            .unwrap_or(serde_json::Value::Array(Vec::new()));

        Ok(serde_json::from_value(rows)?)
    }
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    data: Option<serde_json::Value>,
    errors: Option<serde_json::Value>,
}

/// One subgraph entity kind: its name, selection set and row shape
trait SubgraphRow: DeserializeOwned {
    const ENTITY: &'static str;
    const FIELDS: &'static str;

    fn cursor(&self) -> &str;
    fn into_event(self) -> Result<YamEvent>;
}

// The Graph renders BigInt scalars as JSON strings; every numeric field
// below is a decimal string on the wire.

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedRow {
    id: String,
    offer_token: String,
    buyer_token: String,
    seller: String,
    buyer: String,
    offer_id: String,
    price: String,
    amount: String,
    transaction_hash: String,
    log_index: String,
    block_number: String,
    timestamp: String,
}

impl SubgraphRow for CreatedRow {
    const ENTITY: &'static str = "offerCreateds";
    const FIELDS: &'static str = "id offerToken buyerToken seller buyer offerId price amount \
                                  transactionHash logIndex blockNumber timestamp";

    fn cursor(&self) -> &str {
        &self.id
    }

    fn into_event(self) -> Result<YamEvent> {
        Ok(YamEvent {
            kind: EventKind::OfferCreated,
            block_number: parse_u64("blockNumber", &self.block_number)?,
            transaction_hash: self.transaction_hash,
            log_index: parse_u64("logIndex", &self.log_index)?,
            timestamp: Some(parse_i64("timestamp", &self.timestamp)?),
            payload: EventPayload::OfferCreated {
                offer_id: parse_u64("offerId", &self.offer_id)?,
                offer_token: checksum(&self.offer_token)?,
                buyer_token: checksum(&self.buyer_token)?,
                seller: checksum(&self.seller)?,
                buyer: checksum(&self.buyer)?,
                price: self.price,
                amount: self.amount,
            },
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AcceptedRow {
    id: String,
    offer_id: String,
    seller: String,
    buyer: String,
    offer_token: String,
    buyer_token: String,
    price: String,
    amount: String,
    transaction_hash: String,
    log_index: String,
    block_number: String,
    timestamp: String,
}

impl SubgraphRow for AcceptedRow {
    const ENTITY: &'static str = "offerAccepteds";
    const FIELDS: &'static str = "id offerId seller buyer offerToken buyerToken price amount \
                                  transactionHash logIndex blockNumber timestamp";

    fn cursor(&self) -> &str {
        &self.id
    }

    fn into_event(self) -> Result<YamEvent> {
        Ok(YamEvent {
            kind: EventKind::OfferAccepted,
            block_number: parse_u64("blockNumber", &self.block_number)?,
            transaction_hash: self.transaction_hash,
            log_index: parse_u64("logIndex", &self.log_index)?,
            timestamp: Some(parse_i64("timestamp", &self.timestamp)?),
            payload: EventPayload::OfferAccepted {
                offer_id: parse_u64("offerId", &self.offer_id)?,
                seller: checksum(&self.seller)?,
                buyer: checksum(&self.buyer)?,
                offer_token: checksum(&self.offer_token)?,
                buyer_token: checksum(&self.buyer_token)?,
                price: self.price,
                amount: self.amount,
            },
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdatedRow {
    id: String,
    offer_id: String,
    old_price: String,
    old_amount: String,
    new_price: String,
    new_amount: String,
    transaction_hash: String,
    log_index: String,
    block_number: String,
    timestamp: String,
}

impl SubgraphRow for UpdatedRow {
    const ENTITY: &'static str = "offerUpdateds";
    const FIELDS: &'static str = "id offerId oldPrice oldAmount newPrice newAmount \
                                  transactionHash logIndex blockNumber timestamp";

    fn cursor(&self) -> &str {
        &self.id
    }

    fn into_event(self) -> Result<YamEvent> {
        Ok(YamEvent {
            kind: EventKind::OfferUpdated,
            block_number: parse_u64("blockNumber", &self.block_number)?,
            transaction_hash: self.transaction_hash,
            log_index: parse_u64("logIndex", &self.log_index)?,
            timestamp: Some(parse_i64("timestamp", &self.timestamp)?),
            payload: EventPayload::OfferUpdated {
                offer_id: parse_u64("offerId", &self.offer_id)?,
                old_price: self.old_price,
                old_amount: self.old_amount,
                new_price: self.new_price,
                new_amount: self.new_amount,
            },
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeletedRow {
    id: String,
    offer_id: String,
    transaction_hash: String,
    log_index: String,
    block_number: String,
    timestamp: String,
}

impl SubgraphRow for DeletedRow {
    const ENTITY: &'static str = "offerDeleteds";
    const FIELDS: &'static str = "id offerId transactionHash logIndex blockNumber timestamp";

    fn cursor(&self) -> &str {
        &self.id
    }

    fn into_event(self) -> Result<YamEvent> {
        Ok(YamEvent {
            kind: EventKind::OfferDeleted,
            block_number: parse_u64("blockNumber", &self.block_number)?,
            transaction_hash: self.transaction_hash,
            log_index: parse_u64("logIndex", &self.log_index)?,
            timestamp: Some(parse_i64("timestamp", &self.timestamp)?),
            payload: EventPayload::OfferDeleted {
                offer_id: parse_u64("offerId", &self.offer_id)?,
            },
        })
    }
}

fn parse_u64(field: &str, value: &str) -> Result<u64> {
    value
        .parse()
        .map_err(|_| YamError::Parse(format!("Subgraph field {field}='{value}' is not a u64")))
}

fn parse_i64(field: &str, value: &str) -> Result<i64> {
    value
        .parse()
        .map_err(|_| YamError::Parse(format!("Subgraph field {field}='{value}' is not an i64")))
}

/// Subgraph addresses arrive lowercase; canonicalise to checksum case
fn checksum(address: &str) -> Result<String> {
    let parsed = Address::from_str(address)
        .map_err(|e| YamError::Parse(format!("Invalid address '{address}': {e}")))?;
    Ok(parsed.to_checksum(None))
}
