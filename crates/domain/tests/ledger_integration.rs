//! Integration tests for the offer ledger under concurrent use.

use chrono::{Duration, Utc};
use common::{CraftId, CraftsmanId, CustomerId};
use domain::{
    DomainError, Money, NewOffer, Offer, OfferLedger, OfferStatus, ServiceRequest,
    ServiceRequestStatus,
};
use store::{InMemoryStore, Store, Transaction, TransactionExt};

async fn request_with_offers(store: &InMemoryStore, count: usize) -> (ServiceRequest, Vec<Offer>) {
    let mut request = ServiceRequest::new(
        CustomerId::new(),
        CraftId::new(),
        "Tile bathroom floor",
        count as u32,
        Utc::now() + Duration::days(5),
    );

    let ledger = OfferLedger::new();
    let mut tx = store.begin().await.unwrap();
    tx.save(&mut request).await.unwrap();
    let mut offers = Vec::with_capacity(count);
    for i in 0..count {
        let offer = ledger
            .submit(
                &mut tx,
                NewOffer {
                    service_request_id: request.id,
                    craftsman_id: CraftsmanId::new(),
                    offered_price: Money::from_minor_units(40_000 + i as i64 * 1_000),
                },
            )
            .await
            .unwrap();
        offers.push(offer);
    }
    tx.commit().await.unwrap();

    (request, offers)
}

async fn accept(store: InMemoryStore, offer: Offer) -> Result<(), DomainError> {
    let ledger = OfferLedger::new();
    let mut tx = store.begin().await?;
    ledger.reserve(&mut tx, offer.id).await?;
    ledger
        .reject_siblings(&mut tx, offer.service_request_id, offer.id)
        .await?;
    tx.commit().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_acceptance_of_distinct_offers_has_one_winner() {
    let store = InMemoryStore::new();
    let (request, offers) = request_with_offers(&store, 8).await;

    let handles: Vec<_> = offers
        .iter()
        .cloned()
        .map(|offer| tokio::spawn(accept(store.clone(), offer)))
        .collect();

    let mut wins = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(()) => wins += 1,
            Err(DomainError::Conflict(_)) => conflicts += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(wins, 1);
    assert_eq!(conflicts, 7);

    let mut tx = store.begin().await.unwrap();
    let after = OfferLedger::new()
        .offers_for_request(&mut tx, request.id)
        .await
        .unwrap();
    let accepted = after.iter().filter(|o| o.status == OfferStatus::Accepted).count();
    let rejected = after.iter().filter(|o| o.status == OfferStatus::Rejected).count();
    assert_eq!(accepted, 1);
    assert_eq!(rejected, 7);

    let request = tx
        .load::<ServiceRequest>(request.id.as_uuid())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(request.status, ServiceRequestStatus::OfferAccepted);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn double_click_on_same_offer_reserves_once() {
    let store = InMemoryStore::new();
    let (_, offers) = request_with_offers(&store, 2).await;
    let target = offers[0].clone();

    let (first, second) = tokio::join!(
        tokio::spawn(accept(store.clone(), target.clone())),
        tokio::spawn(accept(store.clone(), target.clone())),
    );
    let results = [first.unwrap(), second.unwrap()];

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(
        results
            .iter()
            .any(|r| matches!(r, Err(DomainError::Conflict(_))))
    );
}

#[tokio::test]
async fn revert_makes_request_acceptable_again() {
    let store = InMemoryStore::new();
    let (request, offers) = request_with_offers(&store, 3).await;
    let ledger = OfferLedger::new();

    let mut tx = store.begin().await.unwrap();
    ledger.reserve(&mut tx, offers[0].id).await.unwrap();
    tx.commit().await.unwrap();

    let mut tx = store.begin().await.unwrap();
    ledger.revert(&mut tx, offers[0].id).await.unwrap();
    tx.commit().await.unwrap();

    // A sibling that was never rejected can now win.
    let mut tx = store.begin().await.unwrap();
    let winner = ledger.reserve(&mut tx, offers[1].id).await.unwrap();
    tx.commit().await.unwrap();
    assert_eq!(winner.status, OfferStatus::Accepted);

    let mut tx = store.begin().await.unwrap();
    let first = tx
        .load::<Offer>(offers[0].id.as_uuid())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.status, OfferStatus::Rejected);
    let request = tx
        .load::<ServiceRequest>(request.id.as_uuid())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(request.status, ServiceRequestStatus::OfferAccepted);
}
