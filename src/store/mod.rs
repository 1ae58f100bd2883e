/// Event store
///
/// Exclusive owner of the on-disk state: offers, offer events and the
/// indexing watermark. Every mutation flows through `commit_batch`, which
/// applies a decoded batch and its watermark update inside one
/// transaction. All writes are idempotent (primary key on offer_id,
/// unique_id on events), so re-ingesting a window is harmless.
pub mod queries;
pub mod status;

use crate::error::{Result, YamError};
use crate::events::{EventPayload, YamEvent};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{Row, SqliteConnection, SqlitePool};
use status::{HistoryRecord, OfferStatus};
use std::path::Path;
use std::str::FromStr;

#[derive(Clone)]
pub struct EventStore {
    pool: SqlitePool,
}

impl EventStore {
    /// Open (creating if missing) the store at the given file path and
    /// bring the schema up to date.
    pub async fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let path = db_path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        tracing::info!("Opening SQLite store: {}", path.display());
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePool::connect_with(options).await?;
        Self::migrate(pool).await
    }

    /// In-memory store, used by tests
    ///
    /// Pinned to a single pooled connection that never retires: every
    /// `:memory:` connection is its own database.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::migrate(pool).await
    }

    async fn migrate(pool: SqlitePool) -> Result<Self> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    /// Atomically persist a decoded batch and its watermark update
    ///
    /// Events are applied in the supplied order, which must be
    /// chronological by `(block_number, log_index)`. Passing `None` for
    /// the window skips the watermark (full-sync merges seed it
    /// explicitly afterwards).
    pub async fn commit_batch(
        &self,
        window: Option<(u64, u64)>,
        events: &[YamEvent],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for event in events {
            match &event.payload {
                EventPayload::OfferCreated { .. } => {
                    insert_offer(&mut tx, event).await?;
                }
                EventPayload::OfferAccepted { .. } => {
                    insert_accepted(&mut tx, event).await?;
                    refresh_status(&mut tx, event.offer_id()).await?;
                }
                EventPayload::OfferUpdated { .. } => {
                    insert_updated(&mut tx, event).await?;
                }
                EventPayload::OfferDeleted { .. } => {
                    insert_deleted(&mut tx, event).await?;
                }
            }
        }

        if let Some((from_block, to_block)) = window {
            update_watermark(&mut tx, from_block as i64, to_block as i64).await?;
        }

        tx.commit().await?;

        tracing::debug!(
            "Committed batch of {} event(s), window {:?}",
            events.len(),
            window
        );
        Ok(())
    }

    /// The durable high-water mark, i.e. the last watermark entry's
    /// `to_block`. `None` on a fresh database.
    pub async fn last_indexed_block(&self) -> Result<Option<u64>> {
        let row =
            sqlx::query("SELECT to_block FROM indexing_state ORDER BY indexing_id DESC LIMIT 1")
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|r| r.get::<i64, _>("to_block") as u64))
    }

    /// Every committed block window, in commit order
    pub async fn watermark_entries(&self) -> Result<Vec<(u64, u64)>> {
        let rows =
            sqlx::query("SELECT from_block, to_block FROM indexing_state ORDER BY indexing_id ASC")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows
            .iter()
            .map(|r| {
                (
                    r.get::<i64, _>("from_block") as u64,
                    r.get::<i64, _>("to_block") as u64,
                )
            })
            .collect())
    }

    /// Record the block window covered by a full synchronisation
    pub async fn seed_watermark(&self, from_block: u64, to_block: u64) -> Result<()> {
        sqlx::query("INSERT INTO indexing_state (from_block, to_block) VALUES (?, ?)")
            .bind(from_block as i64)
            .bind(to_block as i64)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// The stored status of an offer, if the offer exists
    pub async fn offer_status(&self, offer_id: u64) -> Result<Option<OfferStatus>> {
        let row = sqlx::query("SELECT status FROM offers WHERE offer_id = ?")
            .bind(offer_id as i64)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| r.get::<String, _>("status").parse()).transpose()
    }

    /// Recompute an offer's status from its current event history
    ///
    /// Pure read: the stored status is not modified. `None` means the
    /// history does not determine a status.
    pub async fn resolve_status(&self, offer_id: u64) -> Result<Option<OfferStatus>> {
        let mut conn = self.pool.acquire().await?;
        let history = load_history(&mut *conn, offer_id as i64).await?;
        Ok(status::resolve(&history))
    }
}

/// `YYYY-MM-DD HH:MM:SS`, from the event's own timestamp when the source
/// supplied one (subgraph rows), otherwise wall clock at commit time
/// (RPC logs carry no timestamp).
fn event_timestamp(event: &YamEvent) -> String {
    let when = event
        .timestamp
        .and_then(|unix| DateTime::from_timestamp(unix, 0))
        .unwrap_or_else(Utc::now);
    when.format("%Y-%m-%d %H:%M:%S").to_string()
}

async fn insert_offer(tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>, event: &YamEvent) -> Result<()> {
    let EventPayload::OfferCreated {
        offer_id,
        offer_token,
        buyer_token,
        seller,
        price,
        amount,
        ..
    } = &event.payload
    else {
        return Err(YamError::Parse("Expected OfferCreated payload".to_string()));
    };

    sqlx::query(
        r#"
        INSERT INTO offers (
            offer_id, seller_address, initial_amount, price_per_unit,
            offer_token, buyer_token, transaction_hash, block_number, log_index,
            creation_timestamp
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(offer_id) DO NOTHING
        "#,
    )
    .bind(*offer_id as i64)
    .bind(seller)
    .bind(amount)
    .bind(price)
    .bind(offer_token)
    .bind(buyer_token)
    .bind(&event.transaction_hash)
    .bind(event.block_number as i64)
    .bind(event.log_index as i64)
    .bind(event_timestamp(event))
    .execute(&mut **tx)
    .await?;

    Ok(())
}

async fn insert_accepted(tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>, event: &YamEvent) -> Result<()> {
    let EventPayload::OfferAccepted {
        offer_id,
        buyer,
        price,
        amount,
        ..
    } = &event.payload
    else {
        return Err(YamError::Parse("Expected OfferAccepted payload".to_string()));
    };

    sqlx::query(
        r#"
        INSERT INTO offer_events (
            offer_id, event_type, buyer_address, amount_bought, price_bought,
            transaction_hash, block_number, log_index, unique_id,
            event_timestamp
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(unique_id) DO NOTHING
        "#,
    )
    .bind(*offer_id as i64)
    .bind(event.kind.as_str())
    .bind(buyer)
    .bind(amount)
    .bind(price)
    .bind(&event.transaction_hash)
    .bind(event.block_number as i64)
    .bind(event.log_index as i64)
    .bind(event.unique_id())
    .bind(event_timestamp(event))
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Re-derive the offer's status now that a fill is visible
///
/// Reads run on the batch's own transaction, so the just-inserted
/// `OfferAccepted` row is part of the history the resolver sees.
async fn refresh_status(tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>, offer_id: u64) -> Result<()> {
    let history = load_history(&mut **tx, offer_id as i64).await?;

    match status::resolve(&history) {
        Some(verdict) if verdict != OfferStatus::InProgress => {
            sqlx::query("UPDATE offers SET status = ? WHERE offer_id = ?")
                .bind(verdict.as_str())
                .bind(offer_id as i64)
                .execute(&mut **tx)
                .await?;
        }
        Some(_) => {}
        None => {
            // Data anomaly (gap or overfill); keep the stored status.
            tracing::warn!(
                "Status of offer {} is undetermined from its {} history record(s); leaving stored status unchanged",
                offer_id,
                history.len()
            );
        }
    }

    Ok(())
}

async fn insert_updated(tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>, event: &YamEvent) -> Result<()> {
    let EventPayload::OfferUpdated {
        offer_id,
        new_price,
        new_amount,
        ..
    } = &event.payload
    else {
        return Err(YamError::Parse("Expected OfferUpdated payload".to_string()));
    };

    sqlx::query(
        r#"
        INSERT INTO offer_events (
            offer_id, event_type, amount, price,
            transaction_hash, block_number, log_index, unique_id,
            event_timestamp
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(unique_id) DO NOTHING
        "#,
    )
    .bind(*offer_id as i64)
    .bind(event.kind.as_str())
    .bind(new_amount)
    .bind(new_price)
    .bind(&event.transaction_hash)
    .bind(event.block_number as i64)
    .bind(event.log_index as i64)
    .bind(event.unique_id())
    .bind(event_timestamp(event))
    .execute(&mut **tx)
    .await?;

    // An update reopens the offer against its new amount
    sqlx::query("UPDATE offers SET status = 'InProgress' WHERE offer_id = ?")
        .bind(*offer_id as i64)
        .execute(&mut **tx)
        .await?;

    Ok(())
}

async fn insert_deleted(tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>, event: &YamEvent) -> Result<()> {
    let EventPayload::OfferDeleted { offer_id } = &event.payload else {
        return Err(YamError::Parse("Expected OfferDeleted payload".to_string()));
    };

    sqlx::query(
        r#"
        INSERT INTO offer_events (
            offer_id, event_type, transaction_hash, block_number, log_index, unique_id,
            event_timestamp
        ) VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(unique_id) DO NOTHING
        "#,
    )
    .bind(*offer_id as i64)
    .bind(event.kind.as_str())
    .bind(&event.transaction_hash)
    .bind(event.block_number as i64)
    .bind(event.log_index as i64)
    .bind(event.unique_id())
    .bind(event_timestamp(event))
    .execute(&mut **tx)
    .await?;

    sqlx::query("UPDATE offers SET status = 'Deleted' WHERE offer_id = ?")
        .bind(*offer_id as i64)
        .execute(&mut **tx)
        .await?;

    Ok(())
}

/// Load the merged creation + event history of an offer, ascending by
/// `(block_number, log_index)`. Empty when the offer itself is unknown.
async fn load_history(conn: &mut SqliteConnection, offer_id: i64) -> Result<Vec<HistoryRecord>> {
    let mut records = Vec::new();

    let offer = sqlx::query(
        "SELECT initial_amount, block_number, log_index FROM offers WHERE offer_id = ?",
    )
    .bind(offer_id)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(offer) = offer else {
        return Ok(records);
    };

    records.push(HistoryRecord {
        event_type: crate::events::EventKind::OfferCreated,
        block_number: offer.get("block_number"),
        log_index: offer.get("log_index"),
        amount: Some(offer.get::<String, _>("initial_amount")),
        amount_bought: None,
    });

    let rows = sqlx::query(
        "SELECT event_type, amount, amount_bought, block_number, log_index \
         FROM offer_events WHERE offer_id = ?",
    )
    .bind(offer_id)
    .fetch_all(&mut *conn)
    .await?;

    for row in rows {
        records.push(HistoryRecord {
            event_type: row.get::<String, _>("event_type").parse()?,
            block_number: row.get("block_number"),
            log_index: row.get("log_index"),
            amount: row.get::<Option<String>, _>("amount"),
            amount_bought: row.get::<Option<String>, _>("amount_bought"),
        });
    }

    records.sort_by_key(|r| (r.block_number, r.log_index));
    Ok(records)
}

/// Extend-or-insert watermark update
///
/// Only the single most recent entry is ever considered, so filling a
/// gap never merges transitively across older entries. Cases, for the
/// latest entry `(f*, t*)` and this batch's `(f, t)`:
/// - forward extension: the window continues the entry (`f* <= f <= t*+1`)
///   and moves the mark forward (`t > t*`) -> entry becomes `(f*, t)`;
/// - backward extension: the window closes the gap right below the entry
///   (`f < f*`, `t + 1 >= f*`, `t <= t*`) -> entry becomes `(f, t*)`;
/// - new entry when the mark still moves forward (`t > t*`);
/// - otherwise a no-op. `to_block` never regresses.
async fn update_watermark(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    from_block: i64,
    to_block: i64,
) -> Result<()> {
    let last = sqlx::query(
        "SELECT indexing_id, from_block, to_block FROM indexing_state \
         ORDER BY indexing_id DESC LIMIT 1",
    )
    .fetch_optional(&mut **tx)
    .await?;

    if let Some(row) = last {
        let last_id: i64 = row.get("indexing_id");
        let last_from: i64 = row.get("from_block");
        let last_to: i64 = row.get("to_block");

        if last_from <= from_block && from_block <= last_to + 1 && to_block > last_to {
            sqlx::query("UPDATE indexing_state SET to_block = ? WHERE indexing_id = ?")
                .bind(to_block)
                .bind(last_id)
                .execute(&mut **tx)
                .await?;
            return Ok(());
        }

        if from_block < last_from && to_block + 1 >= last_from && to_block <= last_to {
            sqlx::query("UPDATE indexing_state SET from_block = ? WHERE indexing_id = ?")
                .bind(from_block)
                .bind(last_id)
                .execute(&mut **tx)
                .await?;
            return Ok(());
        }

        if to_block <= last_to {
            return Ok(());
        }
    }

    sqlx::query("INSERT INTO indexing_state (from_block, to_block) VALUES (?, ?)")
        .bind(from_block)
        .bind(to_block)
        .execute(&mut **tx)
        .await?;

    Ok(())
}
