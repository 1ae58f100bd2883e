//! Integration tests for the event store
//!
//! Cover the offer lifecycle scenarios, ingestion idempotence, the
//! watermark algebra and the accepted-offers query surface, all against
//! an in-memory SQLite store.

use yam_indexer::store::status::OfferStatus;
use yam_indexer::{EventKind, EventPayload, EventStore, Role, YamEvent};

const SELLER: &str = "0x1111111111111111111111111111111111111111";
const BUYER_1: &str = "0x2222222222222222222222222222222222222222";
const BUYER_2: &str = "0x3333333333333333333333333333333333333333";
const REALTOKEN: &str = "0x4444444444444444444444444444444444444444";
const WXDAI: &str = "0x5555555555555555555555555555555555555555";

// 2023-11-14 22:13:20 UTC
const BASE_TS: i64 = 1_700_000_000;
const T_FROM: &str = "2023-01-01 00:00:00";
const T_TO: &str = "2025-01-01 00:00:00";

fn created(offer_id: u64, block: u64, log_index: u64, amount: &str, price: &str) -> YamEvent {
    YamEvent {
        kind: EventKind::OfferCreated,
        block_number: block,
        transaction_hash: format!("0xc{block:03}"),
        log_index,
        timestamp: Some(BASE_TS + block as i64),
        payload: EventPayload::OfferCreated {
            offer_id,
            offer_token: REALTOKEN.to_string(),
            buyer_token: WXDAI.to_string(),
            seller: SELLER.to_string(),
            buyer: "0x0000000000000000000000000000000000000000".to_string(),
            price: price.to_string(),
            amount: amount.to_string(),
        },
    }
}

fn accepted(
    offer_id: u64,
    block: u64,
    log_index: u64,
    buyer: &str,
    amount_bought: &str,
    price_bought: &str,
) -> YamEvent {
    YamEvent {
        kind: EventKind::OfferAccepted,
        block_number: block,
        transaction_hash: format!("0xa{block:03}"),
        log_index,
        timestamp: Some(BASE_TS + block as i64),
        payload: EventPayload::OfferAccepted {
            offer_id,
            seller: SELLER.to_string(),
            buyer: buyer.to_string(),
            offer_token: REALTOKEN.to_string(),
            buyer_token: WXDAI.to_string(),
            price: price_bought.to_string(),
            amount: amount_bought.to_string(),
        },
    }
}

fn updated(offer_id: u64, block: u64, log_index: u64, new_amount: &str, new_price: &str) -> YamEvent {
    YamEvent {
        kind: EventKind::OfferUpdated,
        block_number: block,
        transaction_hash: format!("0xu{block:03}"),
        log_index,
        timestamp: Some(BASE_TS + block as i64),
        payload: EventPayload::OfferUpdated {
            offer_id,
            old_price: "0".to_string(),
            old_amount: "0".to_string(),
            new_price: new_price.to_string(),
            new_amount: new_amount.to_string(),
        },
    }
}

fn deleted(offer_id: u64, block: u64, log_index: u64) -> YamEvent {
    YamEvent {
        kind: EventKind::OfferDeleted,
        block_number: block,
        transaction_hash: format!("0xd{block:03}"),
        log_index,
        timestamp: Some(BASE_TS + block as i64),
        payload: EventPayload::OfferDeleted { offer_id },
    }
}

#[tokio::test]
async fn test_create_partial_accept_then_sellout() {
    let store = EventStore::in_memory().await.unwrap();

    let batch = vec![
        created(7, 100, 0, "100", "1000000"),
        accepted(7, 101, 0, BUYER_1, "40", "1000000"),
        accepted(7, 102, 0, BUYER_2, "60", "1000000"),
    ];
    store.commit_batch(Some((100, 102)), &batch).await.unwrap();

    assert_eq!(
        store.offer_status(7).await.unwrap(),
        Some(OfferStatus::SoldOut)
    );

    let as_seller = store
        .accepted_offers(Role::Seller, &[SELLER.to_string()], T_FROM, T_TO)
        .await
        .unwrap();
    assert_eq!(as_seller.len(), 2);
    assert_eq!(as_seller[0].amount_bought, "40");
    assert_eq!(as_seller[1].amount_bought, "60");
    // The join exposes the offer's tokens and seller
    assert_eq!(as_seller[0].offer_token, REALTOKEN);
    assert_eq!(as_seller[0].buyer_token, WXDAI);
    assert_eq!(as_seller[0].seller_address, SELLER);
}

#[tokio::test]
async fn test_update_resets_the_baseline() {
    let store = EventStore::in_memory().await.unwrap();

    let batch = vec![
        created(8, 200, 0, "100", "900000"),
        accepted(8, 201, 0, BUYER_1, "30", "900000"),
        updated(8, 202, 0, "50", "950000"),
        accepted(8, 203, 0, BUYER_2, "20", "950000"),
    ];
    store.commit_batch(Some((200, 203)), &batch).await.unwrap();

    // The 30 bought before the update is forgotten: 50 - 20 = 30 open
    assert_eq!(
        store.offer_status(8).await.unwrap(),
        Some(OfferStatus::InProgress)
    );
    assert_eq!(
        store.resolve_status(8).await.unwrap(),
        Some(OfferStatus::InProgress)
    );
}

#[tokio::test]
async fn test_delete_wins_after_partial_fill() {
    let store = EventStore::in_memory().await.unwrap();

    let batch = vec![
        created(9, 300, 0, "100", "1000"),
        accepted(9, 301, 0, BUYER_1, "10", "1000"),
        deleted(9, 302, 0),
    ];
    store.commit_batch(Some((300, 302)), &batch).await.unwrap();

    assert_eq!(
        store.offer_status(9).await.unwrap(),
        Some(OfferStatus::Deleted)
    );
}

#[tokio::test]
async fn test_reingesting_a_batch_is_idempotent() {
    let store = EventStore::in_memory().await.unwrap();

    let batch = vec![
        created(7, 100, 0, "100", "1000000"),
        accepted(7, 101, 0, BUYER_1, "40", "1000000"),
        accepted(7, 102, 0, BUYER_2, "60", "1000000"),
    ];
    store.commit_batch(Some((100, 102)), &batch).await.unwrap();
    store.commit_batch(Some((100, 102)), &batch).await.unwrap();

    assert_eq!(
        store.offer_status(7).await.unwrap(),
        Some(OfferStatus::SoldOut)
    );

    let fills = store
        .accepted_offers(Role::Seller, &[SELLER.to_string()], T_FROM, T_TO)
        .await
        .unwrap();
    assert_eq!(fills.len(), 2, "duplicate unique_ids must be skipped");
}

#[tokio::test]
async fn test_stored_status_matches_resolver_verdict() {
    let store = EventStore::in_memory().await.unwrap();

    store
        .commit_batch(
            Some((400, 410)),
            &[
                created(20, 400, 0, "10", "5"),
                created(21, 401, 0, "10", "5"),
                accepted(21, 402, 0, BUYER_1, "10", "5"),
                created(22, 403, 0, "10", "5"),
                accepted(22, 404, 0, BUYER_1, "3", "5"),
                deleted(22, 405, 0),
            ],
        )
        .await
        .unwrap();

    for offer_id in [20, 21, 22] {
        let stored = store.offer_status(offer_id).await.unwrap();
        let resolved = store.resolve_status(offer_id).await.unwrap();
        assert_eq!(stored, resolved, "offer {offer_id}");
    }
}

#[tokio::test]
async fn test_replaying_history_on_empty_store_gives_same_status() {
    let batch = vec![
        created(30, 500, 0, "100", "7"),
        accepted(30, 501, 0, BUYER_1, "100", "7"),
    ];

    let first = EventStore::in_memory().await.unwrap();
    first.commit_batch(Some((500, 501)), &batch).await.unwrap();

    let second = EventStore::in_memory().await.unwrap();
    second.commit_batch(Some((500, 501)), &batch).await.unwrap();

    assert_eq!(
        first.offer_status(30).await.unwrap(),
        second.offer_status(30).await.unwrap()
    );
    assert_eq!(
        first.offer_status(30).await.unwrap(),
        Some(OfferStatus::SoldOut)
    );
}

#[tokio::test]
async fn test_fill_for_unknown_offer_aborts_the_batch() {
    let store = EventStore::in_memory().await.unwrap();

    // Referential integrity: an OfferAccepted without its offer row
    let result = store
        .commit_batch(Some((600, 601)), &[accepted(99, 600, 0, BUYER_1, "1", "1")])
        .await;

    assert!(result.is_err());
    assert_eq!(store.last_indexed_block().await.unwrap(), None);
}

#[tokio::test]
async fn test_watermark_extends_and_gaps() {
    let store = EventStore::in_memory().await.unwrap();

    store.commit_batch(Some((100, 200)), &[]).await.unwrap();
    store.commit_batch(Some((201, 300)), &[]).await.unwrap();
    store.commit_batch(Some((500, 600)), &[]).await.unwrap();

    assert_eq!(
        store.watermark_entries().await.unwrap(),
        vec![(100, 300), (500, 600)]
    );
    assert_eq!(store.last_indexed_block().await.unwrap(), Some(600));

    // Filling the gap extends the latest entry backwards; the older
    // entry is never merged transitively
    store.commit_batch(Some((301, 499)), &[]).await.unwrap();
    assert_eq!(
        store.watermark_entries().await.unwrap(),
        vec![(100, 300), (301, 600)]
    );
}

#[tokio::test]
async fn test_watermark_never_regresses() {
    let store = EventStore::in_memory().await.unwrap();

    store.commit_batch(Some((100, 200)), &[]).await.unwrap();
    store.commit_batch(Some((150, 180)), &[]).await.unwrap();

    assert_eq!(store.watermark_entries().await.unwrap(), vec![(100, 200)]);
    assert_eq!(store.last_indexed_block().await.unwrap(), Some(200));
}

#[tokio::test]
async fn test_windowless_commit_skips_the_watermark() {
    let store = EventStore::in_memory().await.unwrap();

    store
        .commit_batch(None, &[created(40, 700, 0, "5", "1")])
        .await
        .unwrap();
    assert_eq!(store.last_indexed_block().await.unwrap(), None);

    store.seed_watermark(25_530_394, 700).await.unwrap();
    assert_eq!(store.last_indexed_block().await.unwrap(), Some(700));
}

#[tokio::test]
async fn test_query_filters_by_role_address_and_time() {
    let store = EventStore::in_memory().await.unwrap();

    store
        .commit_batch(
            Some((800, 810)),
            &[
                created(50, 800, 0, "100", "3"),
                accepted(50, 801, 0, BUYER_1, "10", "3"),
                accepted(50, 802, 0, BUYER_2, "20", "3"),
            ],
        )
        .await
        .unwrap();

    // Buyer 1 sees only their own fill
    let as_buyer = store
        .accepted_offers(Role::Buyer, &[BUYER_1.to_string()], T_FROM, T_TO)
        .await
        .unwrap();
    assert_eq!(as_buyer.len(), 1);
    assert_eq!(as_buyer[0].buyer_address, BUYER_1);
    assert_eq!(as_buyer[0].amount_bought, "10");

    // Both fills match the buyer set {B1, B2}, ascending by timestamp
    let both = store
        .accepted_offers(
            Role::Buyer,
            &[BUYER_1.to_string(), BUYER_2.to_string()],
            T_FROM,
            T_TO,
        )
        .await
        .unwrap();
    assert_eq!(both.len(), 2);
    assert!(both[0].event_timestamp <= both[1].event_timestamp);

    // A range that ends before the events excludes them
    let early = store
        .accepted_offers(
            Role::Buyer,
            &[BUYER_1.to_string()],
            "2020-01-01",
            "2020-12-31",
        )
        .await
        .unwrap();
    assert!(early.is_empty());

    // Unknown wallet matches nothing
    let stranger = store
        .accepted_offers(
            Role::Seller,
            &["0x6666666666666666666666666666666666666666".to_string()],
            T_FROM,
            T_TO,
        )
        .await
        .unwrap();
    assert!(stranger.is_empty());
}

#[tokio::test]
async fn test_query_rejects_empty_address_set() {
    let store = EventStore::in_memory().await.unwrap();
    let result = store.accepted_offers(Role::Buyer, &[], T_FROM, T_TO).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_duplicate_create_keeps_first_seen_offer() {
    let store = EventStore::in_memory().await.unwrap();

    let mut replayed = created(60, 900, 0, "100", "1");
    store
        .commit_batch(Some((900, 900)), &[replayed.clone()])
        .await
        .unwrap();

    // A re-seen creation with different values must not overwrite: were
    // the zero amount below to win, the offer would resolve as SoldOut
    replayed.payload = EventPayload::OfferCreated {
        offer_id: 60,
        offer_token: REALTOKEN.to_string(),
        buyer_token: WXDAI.to_string(),
        seller: SELLER.to_string(),
        buyer: "0x0000000000000000000000000000000000000000".to_string(),
        price: "999".to_string(),
        amount: "0".to_string(),
    };
    store
        .commit_batch(Some((900, 900)), &[replayed])
        .await
        .unwrap();

    assert_eq!(
        store.resolve_status(60).await.unwrap(),
        Some(OfferStatus::InProgress)
    );
}
