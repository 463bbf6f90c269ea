//! Booking creation and lifecycle transitions.

use chrono::{DateTime, Duration, Utc};
use common::{BookingId, CraftId, CraftsmanId, CustomerId, OfferId, ServiceRequestId};
use store::{Entity, Transaction, TransactionExt};

use super::{Booking, BookingStatus};
use crate::catalog::{Craft, Craftsman, Customer};
use crate::error::DomainError;
use crate::money::Money;
use crate::offer::Offer;
use crate::service_request::ServiceRequest;

/// Default time a customer has to pay after acceptance.
pub const DEFAULT_PAYMENT_GRACE_HOURS: i64 = 24;

/// Input for creating a booking from an accepted offer.
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub customer_id: CustomerId,
    pub craftsman_id: CraftsmanId,
    pub craft_id: CraftId,
    pub service_request_id: ServiceRequestId,
    pub offer_id: OfferId,
    pub amount: Money,
    pub booking_date: DateTime<Utc>,
}

/// Creates bookings and moves them through their lifecycle.
#[derive(Debug, Clone, Copy)]
pub struct BookingManager {
    payment_grace: Duration,
}

impl Default for BookingManager {
    fn default() -> Self {
        Self::new(Duration::hours(DEFAULT_PAYMENT_GRACE_HOURS))
    }
}

impl BookingManager {
    /// Creates a manager whose bookings must be paid within `payment_grace`.
    pub fn new(payment_grace: Duration) -> Self {
        Self { payment_grace }
    }

    /// Returns the configured payment window.
    pub fn payment_grace(&self) -> Duration {
        self.payment_grace
    }

    /// Creates a Confirmed booking with `payment_deadline = now + grace`.
    ///
    /// Fails with `Validation` if any referenced entity is missing.
    #[tracing::instrument(skip(self, tx))]
    pub async fn create_from_offer<T: Transaction>(
        &self,
        tx: &mut T,
        cmd: NewBooking,
    ) -> Result<Booking, DomainError> {
        require::<Customer, T>(tx, cmd.customer_id.as_uuid(), "customer").await?;
        require::<Craftsman, T>(tx, cmd.craftsman_id.as_uuid(), "craftsman").await?;
        require::<Craft, T>(tx, cmd.craft_id.as_uuid(), "craft").await?;
        require::<ServiceRequest, T>(tx, cmd.service_request_id.as_uuid(), "service request")
            .await?;
        require::<Offer, T>(tx, cmd.offer_id.as_uuid(), "offer").await?;

        let now = Utc::now();
        let mut booking = Booking {
            id: BookingId::new(),
            customer_id: cmd.customer_id,
            craftsman_id: cmd.craftsman_id,
            craft_id: cmd.craft_id,
            service_request_id: cmd.service_request_id,
            accepted_offer_id: Some(cmd.offer_id),
            booking_date: cmd.booking_date,
            total_amount: cmd.amount,
            status: BookingStatus::Confirmed,
            payment_deadline: now + self.payment_grace,
            cancellation_reason: None,
            created_at: now,
            updated_at: now,
            version: store::Version::initial(),
        };
        tx.save(&mut booking).await?;

        tracing::info!(booking_id = %booking.id, "booking created");
        Ok(booking)
    }

    /// Marks a booking Failed. Returns it unchanged if it already failed.
    #[tracing::instrument(skip(self, tx))]
    pub async fn mark_failed<T: Transaction>(
        &self,
        tx: &mut T,
        booking_id: BookingId,
        reason: &str,
    ) -> Result<Booking, DomainError> {
        let mut booking = self.lock(tx, booking_id).await?;
        if booking.fail(reason, Utc::now())? {
            tx.save(&mut booking).await?;
            tracing::info!(%booking_id, reason, "booking failed");
        }
        Ok(booking)
    }

    /// Confirmed → InProgress.
    #[tracing::instrument(skip(self, tx))]
    pub async fn start<T: Transaction>(
        &self,
        tx: &mut T,
        booking_id: BookingId,
    ) -> Result<Booking, DomainError> {
        let mut booking = self.lock(tx, booking_id).await?;
        booking.start(Utc::now())?;
        tx.save(&mut booking).await?;
        Ok(booking)
    }

    /// InProgress → Completed.
    #[tracing::instrument(skip(self, tx))]
    pub async fn complete<T: Transaction>(
        &self,
        tx: &mut T,
        booking_id: BookingId,
    ) -> Result<Booking, DomainError> {
        let mut booking = self.lock(tx, booking_id).await?;
        booking.complete(Utc::now())?;
        tx.save(&mut booking).await?;
        Ok(booking)
    }

    /// Confirmed or InProgress → Cancelled.
    #[tracing::instrument(skip(self, tx))]
    pub async fn cancel<T: Transaction>(
        &self,
        tx: &mut T,
        booking_id: BookingId,
        reason: &str,
    ) -> Result<Booking, DomainError> {
        let mut booking = self.lock(tx, booking_id).await?;
        booking.cancel(reason, Utc::now())?;
        tx.save(&mut booking).await?;
        Ok(booking)
    }

    /// Loads a booking without locking it.
    pub async fn get<T: Transaction>(
        &self,
        tx: &mut T,
        booking_id: BookingId,
    ) -> Result<Option<Booking>, DomainError> {
        Ok(tx.load::<Booking>(booking_id.as_uuid()).await?)
    }

    /// Loads and locks a booking, failing with `NotFound` if absent.
    pub async fn lock<T: Transaction>(
        &self,
        tx: &mut T,
        booking_id: BookingId,
    ) -> Result<Booking, DomainError> {
        tx.load_for_update::<Booking>(booking_id.as_uuid())
            .await?
            .ok_or_else(|| DomainError::not_found("booking", booking_id))
    }

    /// Confirmed bookings whose payment deadline is before `now`, oldest first.
    pub async fn find_overdue<T: Transaction>(
        &self,
        tx: &mut T,
        now: DateTime<Utc>,
    ) -> Result<Vec<Booking>, DomainError> {
        let mut overdue: Vec<Booking> = tx
            .find::<Booking>("status", serde_json::json!(BookingStatus::Confirmed))
            .await?
            .into_iter()
            .filter(|b| b.is_payment_overdue(now))
            .collect();
        overdue.sort_by_key(|b| b.payment_deadline);
        Ok(overdue)
    }
}

async fn require<E: Entity, T: Transaction>(
    tx: &mut T,
    id: uuid::Uuid,
    label: &str,
) -> Result<(), DomainError> {
    match tx.get(E::KIND, id).await? {
        Some(_) => Ok(()),
        None => Err(DomainError::Validation(format!("{label} {id} does not exist"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::offer::{NewOffer, OfferLedger};
    use common::UserId;
    use store::{InMemoryStore, Store};

    struct Fixture {
        customer: Customer,
        craftsman: Craftsman,
        craft: Craft,
        request: ServiceRequest,
        offer: Offer,
    }

    async fn fixture(store: &InMemoryStore) -> Fixture {
        let mut craft = Craft::new("Plumbing");
        let mut customer = Customer::new(UserId::new());
        let mut craftsman = Craftsman::new(UserId::new(), craft.id);
        let mut request = ServiceRequest::new(
            customer.id,
            craft.id,
            "Fix boiler",
            3,
            Utc::now() + Duration::days(2),
        );

        let mut tx = store.begin().await.unwrap();
        tx.save(&mut craft).await.unwrap();
        tx.save(&mut customer).await.unwrap();
        tx.save(&mut craftsman).await.unwrap();
        tx.save(&mut request).await.unwrap();
        let offer = OfferLedger::new()
            .submit(
                &mut tx,
                NewOffer {
                    service_request_id: request.id,
                    craftsman_id: craftsman.id,
                    offered_price: Money::from_minor_units(50_000),
                },
            )
            .await
            .unwrap();
        tx.commit().await.unwrap();

        Fixture {
            customer,
            craftsman,
            craft,
            request,
            offer,
        }
    }

    fn new_booking(f: &Fixture) -> NewBooking {
        NewBooking {
            customer_id: f.customer.id,
            craftsman_id: f.craftsman.id,
            craft_id: f.craft.id,
            service_request_id: f.request.id,
            offer_id: f.offer.id,
            amount: f.offer.offered_price,
            booking_date: Utc::now() + Duration::days(1),
        }
    }

    #[tokio::test]
    async fn create_sets_deadline_from_grace() {
        let store = InMemoryStore::new();
        let f = fixture(&store).await;
        let manager = BookingManager::new(Duration::hours(2));

        let before = Utc::now();
        let mut tx = store.begin().await.unwrap();
        let booking = manager
            .create_from_offer(&mut tx, new_booking(&f))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(booking.status, BookingStatus::Confirmed);
        assert_eq!(booking.accepted_offer_id, Some(f.offer.id));
        assert_eq!(booking.total_amount, Money::from_minor_units(50_000));
        assert!(booking.payment_deadline >= before + Duration::hours(2));
        assert!(booking.payment_deadline <= Utc::now() + Duration::hours(2));
    }

    #[tokio::test]
    async fn create_rejects_missing_references() {
        let store = InMemoryStore::new();
        let f = fixture(&store).await;
        let manager = BookingManager::default();

        let mut cmd = new_booking(&f);
        cmd.craft_id = CraftId::new();

        let mut tx = store.begin().await.unwrap();
        let result = manager.create_from_offer(&mut tx, cmd).await;
        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[tokio::test]
    async fn mark_failed_twice_changes_nothing() {
        let store = InMemoryStore::new();
        let f = fixture(&store).await;
        let manager = BookingManager::default();

        let mut tx = store.begin().await.unwrap();
        let booking = manager
            .create_from_offer(&mut tx, new_booking(&f))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let failed = manager
            .mark_failed(&mut tx, booking.id, "payment failed")
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let again = manager
            .mark_failed(&mut tx, booking.id, "something else")
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(again.status, BookingStatus::Failed);
        assert_eq!(again.updated_at, failed.updated_at);
        assert_eq!(again.version, failed.version);
        assert_eq!(again.cancellation_reason.as_deref(), Some("payment failed"));
    }

    #[tokio::test]
    async fn mark_failed_missing_booking_is_not_found() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let result = BookingManager::default()
            .mark_failed(&mut tx, BookingId::new(), "x")
            .await;
        assert!(matches!(result, Err(DomainError::NotFound { .. })));
    }

    #[tokio::test]
    async fn lifecycle_start_complete() {
        let store = InMemoryStore::new();
        let f = fixture(&store).await;
        let manager = BookingManager::default();

        let mut tx = store.begin().await.unwrap();
        let booking = manager
            .create_from_offer(&mut tx, new_booking(&f))
            .await
            .unwrap();
        manager.start(&mut tx, booking.id).await.unwrap();
        let done = manager.complete(&mut tx, booking.id).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(done.status, BookingStatus::Completed);

        let mut tx = store.begin().await.unwrap();
        let result = manager.cancel(&mut tx, booking.id, "changed mind").await;
        assert!(matches!(result, Err(DomainError::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn find_overdue_only_returns_confirmed_past_deadline() {
        let store = InMemoryStore::new();
        let f = fixture(&store).await;
        let manager = BookingManager::new(Duration::minutes(-5));

        let mut tx = store.begin().await.unwrap();
        let overdue = manager
            .create_from_offer(&mut tx, new_booking(&f))
            .await
            .unwrap();
        let cancelled = manager
            .create_from_offer(&mut tx, new_booking(&f))
            .await
            .unwrap();
        manager
            .cancel(&mut tx, cancelled.id, "customer left")
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let found = manager.find_overdue(&mut tx, Utc::now()).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, overdue.id);
    }
}
