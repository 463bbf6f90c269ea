//! The offer ledger: submission, single-winner reservation and reversal.
//!
//! Lock order is always the service request row first, then offer rows.
//! Every path that changes an offer's status goes through the request lock,
//! so two acceptances on the same request serialize even when they target
//! different offers.

use chrono::{DateTime, Utc};
use common::{CraftsmanId, OfferId, ServiceRequestId};
use store::{Transaction, TransactionExt};

use super::Offer;
use crate::error::DomainError;
use crate::money::Money;
use crate::service_request::ServiceRequest;
use crate::{REASON_ANOTHER_OFFER_ACCEPTED, REASON_PAYMENT_FAILED};

/// Input for submitting a new offer.
#[derive(Debug, Clone)]
pub struct NewOffer {
    pub service_request_id: ServiceRequestId,
    pub craftsman_id: CraftsmanId,
    pub offered_price: Money,
}

/// Owns offer lifecycle transitions.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfferLedger;

impl OfferLedger {
    pub fn new() -> Self {
        Self
    }

    /// Places a pending offer on an open request.
    #[tracing::instrument(skip(self, tx))]
    pub async fn submit<T: Transaction>(
        &self,
        tx: &mut T,
        cmd: NewOffer,
    ) -> Result<Offer, DomainError> {
        let now = Utc::now();

        if !cmd.offered_price.is_positive() {
            return Err(DomainError::Validation(format!(
                "offered price must be positive, got {}",
                cmd.offered_price
            )));
        }

        let mut request = self.lock_request(tx, cmd.service_request_id).await?;

        let existing = self.offers_for_request(tx, cmd.service_request_id).await?;
        if existing
            .iter()
            .any(|o| o.craftsman_id == cmd.craftsman_id && o.status.is_pending())
        {
            return Err(DomainError::Conflict(format!(
                "craftsman {} already has a pending offer on request {}",
                cmd.craftsman_id, cmd.service_request_id
            )));
        }

        request.register_offer(now)?;
        let mut offer = Offer::new(cmd.service_request_id, cmd.craftsman_id, cmd.offered_price);

        tx.save(&mut request).await?;
        tx.save(&mut offer).await?;

        tracing::info!(offer_id = %offer.id, "offer submitted");
        Ok(offer)
    }

    /// Pending → Accepted, and the owning request Open → OfferAccepted.
    ///
    /// Fails with `Conflict` if the offer was already decided or another
    /// offer on the same request won first.
    #[tracing::instrument(skip(self, tx))]
    pub async fn reserve<T: Transaction>(
        &self,
        tx: &mut T,
        offer_id: OfferId,
    ) -> Result<Offer, DomainError> {
        let now = Utc::now();

        let request_id = tx
            .load::<Offer>(offer_id.as_uuid())
            .await?
            .ok_or_else(|| DomainError::not_found("offer", offer_id))?
            .service_request_id;

        let mut request = self.lock_request(tx, request_id).await?;
        let mut offer = self.lock_offer(tx, offer_id).await?;

        offer.accept(now)?;
        request.mark_offer_accepted(now)?;

        tx.save(&mut offer).await?;
        tx.save(&mut request).await?;

        metrics::counter!("offers_reserved_total").increment(1);
        tracing::info!(%offer_id, %request_id, "offer reserved");
        Ok(offer)
    }

    /// Rejects every other pending offer on the request.
    ///
    /// Returns the offers that changed; empty when run again.
    #[tracing::instrument(skip(self, tx))]
    pub async fn reject_siblings<T: Transaction>(
        &self,
        tx: &mut T,
        service_request_id: ServiceRequestId,
        winning_offer_id: OfferId,
    ) -> Result<Vec<Offer>, DomainError> {
        let now = Utc::now();
        let candidates: Vec<OfferId> = self
            .offers_for_request(tx, service_request_id)
            .await?
            .into_iter()
            .filter(|o| o.id != winning_offer_id && o.status.is_pending())
            .map(|o| o.id)
            .collect();

        let mut rejected = Vec::with_capacity(candidates.len());
        for id in candidates {
            let mut offer = self.lock_offer(tx, id).await?;
            if !offer.status.is_pending() {
                continue;
            }
            offer.reject(REASON_ANOTHER_OFFER_ACCEPTED, now)?;
            tx.save(&mut offer).await?;
            rejected.push(offer);
        }

        tracing::debug!(count = rejected.len(), "sibling offers rejected");
        Ok(rejected)
    }

    /// Accepted → Rejected ("payment failed"), reopening the request.
    ///
    /// An offer in any other state is returned unchanged.
    #[tracing::instrument(skip(self, tx))]
    pub async fn revert<T: Transaction>(
        &self,
        tx: &mut T,
        offer_id: OfferId,
    ) -> Result<Offer, DomainError> {
        let now = Utc::now();

        let current = tx
            .load::<Offer>(offer_id.as_uuid())
            .await?
            .ok_or_else(|| DomainError::not_found("offer", offer_id))?;

        if !current.status.can_revert() {
            tracing::debug!(%offer_id, status = %current.status, "offer not accepted, nothing to revert");
            return Ok(current);
        }

        let request = tx
            .load_for_update::<ServiceRequest>(current.service_request_id.as_uuid())
            .await?;
        let mut offer = self.lock_offer(tx, offer_id).await?;
        if !offer.status.can_revert() {
            return Ok(offer);
        }

        offer.reject(REASON_PAYMENT_FAILED, now)?;
        tx.save(&mut offer).await?;

        match request {
            Some(mut request) => {
                if request.reopen(now) {
                    tx.save(&mut request).await?;
                }
            }
            None => tracing::warn!(
                %offer_id,
                service_request_id = %current.service_request_id,
                "reverted offer has no service request"
            ),
        }

        metrics::counter!("offers_reverted_total").increment(1);
        tracing::info!(%offer_id, "offer reservation reverted");
        Ok(offer)
    }

    /// Pending → Withdrawn, by the craftsman who placed the offer.
    #[tracing::instrument(skip(self, tx))]
    pub async fn withdraw<T: Transaction>(
        &self,
        tx: &mut T,
        offer_id: OfferId,
        craftsman_id: CraftsmanId,
    ) -> Result<Offer, DomainError> {
        let current = tx
            .load::<Offer>(offer_id.as_uuid())
            .await?
            .ok_or_else(|| DomainError::not_found("offer", offer_id))?;

        if current.craftsman_id != craftsman_id {
            return Err(DomainError::Validation(format!(
                "offer {offer_id} does not belong to craftsman {craftsman_id}"
            )));
        }

        self.lock_request(tx, current.service_request_id).await?;
        let mut offer = self.lock_offer(tx, offer_id).await?;
        offer.withdraw(Utc::now())?;
        tx.save(&mut offer).await?;

        tracing::info!(%offer_id, "offer withdrawn");
        Ok(offer)
    }

    /// Expires an open request whose deadline passed, and its pending offers.
    ///
    /// Returns the number of offers expired. A request that is not open or
    /// not yet due is left alone.
    #[tracing::instrument(skip(self, tx))]
    pub async fn expire_request<T: Transaction>(
        &self,
        tx: &mut T,
        service_request_id: ServiceRequestId,
        now: DateTime<Utc>,
    ) -> Result<usize, DomainError> {
        let mut request = self.lock_request(tx, service_request_id).await?;
        if !request.status.is_open() || !request.is_expired_at(now) {
            return Ok(0);
        }

        request.expire(now)?;
        tx.save(&mut request).await?;

        let pending: Vec<OfferId> = self
            .offers_for_request(tx, service_request_id)
            .await?
            .into_iter()
            .filter(|o| o.status.is_pending())
            .map(|o| o.id)
            .collect();

        let mut expired = 0;
        for id in pending {
            let mut offer = self.lock_offer(tx, id).await?;
            if offer.status.is_pending() {
                offer.expire(now)?;
                tx.save(&mut offer).await?;
                expired += 1;
            }
        }

        tracing::info!(%service_request_id, expired, "service request expired");
        Ok(expired)
    }

    /// Loads every offer placed on a request.
    pub async fn offers_for_request<T: Transaction>(
        &self,
        tx: &mut T,
        service_request_id: ServiceRequestId,
    ) -> Result<Vec<Offer>, DomainError> {
        Ok(tx
            .find::<Offer>(
                "service_request_id",
                serde_json::json!(service_request_id),
            )
            .await?)
    }

    async fn lock_request<T: Transaction>(
        &self,
        tx: &mut T,
        id: ServiceRequestId,
    ) -> Result<ServiceRequest, DomainError> {
        tx.load_for_update::<ServiceRequest>(id.as_uuid())
            .await?
            .ok_or_else(|| DomainError::not_found("service request", id))
    }

    async fn lock_offer<T: Transaction>(
        &self,
        tx: &mut T,
        id: OfferId,
    ) -> Result<Offer, DomainError> {
        tx.load_for_update::<Offer>(id.as_uuid())
            .await?
            .ok_or_else(|| DomainError::not_found("offer", id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::offer::OfferStatus;
    use crate::service_request::ServiceRequestStatus;
    use chrono::Duration;
    use common::{CraftId, CustomerId};
    use proptest::prelude::*;
    use store::{InMemoryStore, Store};

    async fn seed_request(store: &InMemoryStore, max_offers: u32) -> ServiceRequest {
        let mut request = ServiceRequest::new(
            CustomerId::new(),
            CraftId::new(),
            "Rewire kitchen",
            max_offers,
            Utc::now() + Duration::days(3),
        );
        let mut tx = store.begin().await.unwrap();
        tx.save(&mut request).await.unwrap();
        tx.commit().await.unwrap();
        request
    }

    async fn submit(store: &InMemoryStore, request_id: ServiceRequestId, cents: i64) -> Offer {
        let mut tx = store.begin().await.unwrap();
        let offer = OfferLedger::new()
            .submit(
                &mut tx,
                NewOffer {
                    service_request_id: request_id,
                    craftsman_id: CraftsmanId::new(),
                    offered_price: Money::from_minor_units(cents),
                },
            )
            .await
            .unwrap();
        tx.commit().await.unwrap();
        offer
    }

    async fn load_offer(store: &InMemoryStore, id: OfferId) -> Offer {
        let mut tx = store.begin().await.unwrap();
        tx.load::<Offer>(id.as_uuid()).await.unwrap().unwrap()
    }

    async fn load_request(store: &InMemoryStore, id: ServiceRequestId) -> ServiceRequest {
        let mut tx = store.begin().await.unwrap();
        tx.load::<ServiceRequest>(id.as_uuid())
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn submit_counts_offers_and_enforces_limit() {
        let store = InMemoryStore::new();
        let request = seed_request(&store, 1).await;
        submit(&store, request.id, 10_000).await;

        assert_eq!(load_request(&store, request.id).await.offers_count, 1);

        let mut tx = store.begin().await.unwrap();
        let result = OfferLedger::new()
            .submit(
                &mut tx,
                NewOffer {
                    service_request_id: request.id,
                    craftsman_id: CraftsmanId::new(),
                    offered_price: Money::from_minor_units(9_000),
                },
            )
            .await;
        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[tokio::test]
    async fn submit_rejects_zero_price() {
        let store = InMemoryStore::new();
        let request = seed_request(&store, 3).await;

        let mut tx = store.begin().await.unwrap();
        let result = OfferLedger::new()
            .submit(
                &mut tx,
                NewOffer {
                    service_request_id: request.id,
                    craftsman_id: CraftsmanId::new(),
                    offered_price: Money::zero(),
                },
            )
            .await;
        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[tokio::test]
    async fn reserve_accepts_offer_and_request() {
        let store = InMemoryStore::new();
        let request = seed_request(&store, 3).await;
        let offer = submit(&store, request.id, 50_000).await;

        let mut tx = store.begin().await.unwrap();
        let reserved = OfferLedger::new().reserve(&mut tx, offer.id).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(reserved.status, OfferStatus::Accepted);
        assert_eq!(
            load_request(&store, request.id).await.status,
            ServiceRequestStatus::OfferAccepted
        );
    }

    #[tokio::test]
    async fn reserve_twice_is_a_conflict() {
        let store = InMemoryStore::new();
        let request = seed_request(&store, 3).await;
        let offer = submit(&store, request.id, 50_000).await;

        let mut tx = store.begin().await.unwrap();
        OfferLedger::new().reserve(&mut tx, offer.id).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let result = OfferLedger::new().reserve(&mut tx, offer.id).await;
        assert!(matches!(result, Err(DomainError::Conflict(_))));
    }

    #[tokio::test]
    async fn reserve_sibling_after_winner_is_a_conflict() {
        let store = InMemoryStore::new();
        let request = seed_request(&store, 3).await;
        let winner = submit(&store, request.id, 50_000).await;
        let loser = submit(&store, request.id, 45_000).await;

        let mut tx = store.begin().await.unwrap();
        OfferLedger::new().reserve(&mut tx, winner.id).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let result = OfferLedger::new().reserve(&mut tx, loser.id).await;
        assert!(matches!(result, Err(DomainError::Conflict(_))));
        assert_eq!(load_offer(&store, loser.id).await.status, OfferStatus::Pending);
    }

    #[tokio::test]
    async fn reserve_missing_offer_is_not_found() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let result = OfferLedger::new().reserve(&mut tx, OfferId::new()).await;
        assert!(matches!(result, Err(DomainError::NotFound { .. })));
    }

    #[tokio::test]
    async fn reject_siblings_is_idempotent() {
        let store = InMemoryStore::new();
        let request = seed_request(&store, 5).await;
        let winner = submit(&store, request.id, 50_000).await;
        let a = submit(&store, request.id, 40_000).await;
        let b = submit(&store, request.id, 60_000).await;

        let ledger = OfferLedger::new();
        let mut tx = store.begin().await.unwrap();
        ledger.reserve(&mut tx, winner.id).await.unwrap();
        let rejected = ledger
            .reject_siblings(&mut tx, request.id, winner.id)
            .await
            .unwrap();
        assert_eq!(rejected.len(), 2);
        let again = ledger
            .reject_siblings(&mut tx, request.id, winner.id)
            .await
            .unwrap();
        assert!(again.is_empty());
        tx.commit().await.unwrap();

        for id in [a.id, b.id] {
            let offer = load_offer(&store, id).await;
            assert_eq!(offer.status, OfferStatus::Rejected);
            assert_eq!(
                offer.rejection_reason.as_deref(),
                Some(REASON_ANOTHER_OFFER_ACCEPTED)
            );
        }
        assert_eq!(load_offer(&store, winner.id).await.status, OfferStatus::Accepted);
    }

    #[tokio::test]
    async fn revert_rejects_offer_and_reopens_request() {
        let store = InMemoryStore::new();
        let request = seed_request(&store, 3).await;
        let offer = submit(&store, request.id, 50_000).await;

        let ledger = OfferLedger::new();
        let mut tx = store.begin().await.unwrap();
        ledger.reserve(&mut tx, offer.id).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let reverted = ledger.revert(&mut tx, offer.id).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(reverted.status, OfferStatus::Rejected);
        assert_eq!(reverted.rejection_reason.as_deref(), Some(REASON_PAYMENT_FAILED));
        assert_eq!(
            load_request(&store, request.id).await.status,
            ServiceRequestStatus::Open
        );
    }

    #[tokio::test]
    async fn revert_missing_offer_is_not_found() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let result = OfferLedger::new().revert(&mut tx, OfferId::new()).await;
        assert!(matches!(result, Err(DomainError::NotFound { .. })));
    }

    #[tokio::test]
    async fn withdraw_checks_ownership() {
        let store = InMemoryStore::new();
        let request = seed_request(&store, 3).await;
        let offer = submit(&store, request.id, 50_000).await;

        let ledger = OfferLedger::new();
        let mut tx = store.begin().await.unwrap();
        let result = ledger.withdraw(&mut tx, offer.id, CraftsmanId::new()).await;
        assert!(matches!(result, Err(DomainError::Validation(_))));

        let withdrawn = ledger
            .withdraw(&mut tx, offer.id, offer.craftsman_id)
            .await
            .unwrap();
        assert_eq!(withdrawn.status, OfferStatus::Withdrawn);
    }

    #[tokio::test]
    async fn expire_request_expires_pending_offers() {
        let store = InMemoryStore::new();
        let request = seed_request(&store, 3).await;
        submit(&store, request.id, 50_000).await;
        submit(&store, request.id, 55_000).await;

        let mut tx = store.begin().await.unwrap();
        let ledger = OfferLedger::new();
        let not_due = ledger
            .expire_request(&mut tx, request.id, Utc::now())
            .await
            .unwrap();
        assert_eq!(not_due, 0);

        let expired = ledger
            .expire_request(&mut tx, request.id, Utc::now() + Duration::days(4))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(expired, 2);
        assert_eq!(
            load_request(&store, request.id).await.status,
            ServiceRequestStatus::Expired
        );
    }

    fn offer_status() -> impl Strategy<Value = OfferStatus> {
        prop::sample::select(OfferStatus::ALL.to_vec())
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn revert_only_changes_accepted_offers(status in offer_status()) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();

            runtime.block_on(async {
                let store = InMemoryStore::new();
                let mut request = ServiceRequest::new(
                    CustomerId::new(),
                    CraftId::new(),
                    "Paint fence",
                    3,
                    Utc::now() + Duration::days(1),
                );
                if status == OfferStatus::Accepted {
                    request.mark_offer_accepted(Utc::now()).unwrap();
                }
                let mut offer = Offer::new(
                    request.id,
                    CraftsmanId::new(),
                    Money::from_minor_units(10_000),
                );
                offer.status = status;

                let mut tx = store.begin().await.unwrap();
                tx.save(&mut request).await.unwrap();
                tx.save(&mut offer).await.unwrap();
                tx.commit().await.unwrap();

                let mut tx = store.begin().await.unwrap();
                let result = OfferLedger::new().revert(&mut tx, offer.id).await;
                tx.commit().await.unwrap();

                let after = load_offer(&store, offer.id).await;
                prop_assert!(result.is_ok());
                if status == OfferStatus::Accepted {
                    prop_assert_eq!(after.status, OfferStatus::Rejected);
                } else {
                    prop_assert_eq!(after.status, status);
                    prop_assert_eq!(after.version, offer.version);
                    prop_assert_eq!(after.updated_at, offer.updated_at);
                }
                Ok(())
            })?;
        }
    }
}
