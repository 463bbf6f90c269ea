//! Payment rows attached to bookings.
//!
//! Callers lock the booking before opening or changing its payments, so the
//! "at most one live payment" check below cannot race.

use chrono::Utc;
use common::{BookingId, PaymentId};
use store::{Transaction, TransactionExt};

use super::{Payment, PaymentStatus};
use crate::booking::Booking;
use crate::error::DomainError;

#[derive(Debug, Clone, Copy, Default)]
pub struct PaymentRegistry;

impl PaymentRegistry {
    pub fn new() -> Self {
        Self
    }

    /// Creates a Pending payment for the booking's full amount.
    ///
    /// Fails with `Conflict` while another Pending or Completed payment exists.
    #[tracing::instrument(skip(self, tx, booking), fields(booking_id = %booking.id))]
    pub async fn open<T: Transaction>(
        &self,
        tx: &mut T,
        booking: &Booking,
        payment_method: &str,
        gateway: &str,
    ) -> Result<Payment, DomainError> {
        let existing = self.for_booking(tx, booking.id).await?;
        if let Some(live) = existing.iter().find(|p| p.status.is_live()) {
            return Err(DomainError::Conflict(format!(
                "booking {} already has a {} payment {}",
                booking.id, live.status, live.id
            )));
        }

        let attempt = u32::try_from(existing.len()).unwrap_or(u32::MAX).saturating_add(1);
        let mut payment = Payment::new(
            booking.id,
            booking.total_amount,
            payment_method,
            gateway,
            attempt,
        );
        tx.save(&mut payment).await?;

        tracing::debug!(payment_id = %payment.id, attempt, "payment opened");
        Ok(payment)
    }

    /// Stores the gateway's transaction id on a payment.
    pub async fn attach_transaction<T: Transaction>(
        &self,
        tx: &mut T,
        payment_id: PaymentId,
        transaction_id: &str,
    ) -> Result<Payment, DomainError> {
        let mut payment = self.lock(tx, payment_id).await?;
        payment.transaction_id = Some(transaction_id.to_string());
        payment.updated_at = Utc::now();
        tx.save(&mut payment).await?;
        Ok(payment)
    }

    /// Marks a payment Completed. Idempotent.
    #[tracing::instrument(skip(self, tx))]
    pub async fn mark_completed<T: Transaction>(
        &self,
        tx: &mut T,
        payment_id: PaymentId,
    ) -> Result<Payment, DomainError> {
        let mut payment = self.lock(tx, payment_id).await?;
        if payment.complete(Utc::now())? {
            tx.save(&mut payment).await?;
        }
        Ok(payment)
    }

    /// Marks a payment Failed. Idempotent; the first reason is kept.
    #[tracing::instrument(skip(self, tx))]
    pub async fn mark_failed<T: Transaction>(
        &self,
        tx: &mut T,
        payment_id: PaymentId,
        reason: &str,
    ) -> Result<Payment, DomainError> {
        let mut payment = self.lock(tx, payment_id).await?;
        if payment.fail(reason, Utc::now())? {
            tx.save(&mut payment).await?;
        }
        Ok(payment)
    }

    /// Marks a payment Refunded. Idempotent.
    #[tracing::instrument(skip(self, tx))]
    pub async fn mark_refunded<T: Transaction>(
        &self,
        tx: &mut T,
        payment_id: PaymentId,
    ) -> Result<Payment, DomainError> {
        let mut payment = self.lock(tx, payment_id).await?;
        if payment.refund(Utc::now())? {
            tx.save(&mut payment).await?;
        }
        Ok(payment)
    }

    /// Every payment attempt for a booking, in attempt order.
    pub async fn for_booking<T: Transaction>(
        &self,
        tx: &mut T,
        booking_id: BookingId,
    ) -> Result<Vec<Payment>, DomainError> {
        let mut payments = tx
            .find::<Payment>("booking_id", serde_json::json!(booking_id))
            .await?;
        payments.sort_by_key(|p| p.attempt);
        Ok(payments)
    }

    /// Returns true if any payment for the booking is Completed.
    pub async fn has_completed<T: Transaction>(
        &self,
        tx: &mut T,
        booking_id: BookingId,
    ) -> Result<bool, DomainError> {
        Ok(self
            .for_booking(tx, booking_id)
            .await?
            .iter()
            .any(|p| p.status == PaymentStatus::Completed))
    }

    /// Finds the payment carrying a gateway transaction id.
    pub async fn by_transaction<T: Transaction>(
        &self,
        tx: &mut T,
        transaction_id: &str,
    ) -> Result<Option<Payment>, DomainError> {
        let mut found = tx
            .find::<Payment>("transaction_id", serde_json::json!(transaction_id))
            .await?;
        if found.len() > 1 {
            return Err(DomainError::DataIntegrity(format!(
                "{} payments share transaction id {transaction_id}",
                found.len()
            )));
        }
        Ok(found.pop())
    }

    pub async fn get<T: Transaction>(
        &self,
        tx: &mut T,
        payment_id: PaymentId,
    ) -> Result<Option<Payment>, DomainError> {
        Ok(tx.load::<Payment>(payment_id.as_uuid()).await?)
    }

    /// Loads and locks a payment, failing with `NotFound` if absent.
    pub async fn lock<T: Transaction>(
        &self,
        tx: &mut T,
        payment_id: PaymentId,
    ) -> Result<Payment, DomainError> {
        tx.load_for_update::<Payment>(payment_id.as_uuid())
            .await?
            .ok_or_else(|| DomainError::not_found("payment", payment_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::booking::BookingStatus;
    use crate::money::Money;
    use chrono::Duration;
    use common::{CraftId, CraftsmanId, CustomerId, OfferId, ServiceRequestId};
    use store::{InMemoryStore, Store, Version};

    fn booking() -> Booking {
        let now = Utc::now();
        Booking {
            id: BookingId::new(),
            customer_id: CustomerId::new(),
            craftsman_id: CraftsmanId::new(),
            craft_id: CraftId::new(),
            service_request_id: ServiceRequestId::new(),
            accepted_offer_id: Some(OfferId::new()),
            booking_date: now,
            total_amount: Money::from_minor_units(12_500),
            status: BookingStatus::Confirmed,
            payment_deadline: now + Duration::hours(1),
            cancellation_reason: None,
            created_at: now,
            updated_at: now,
            version: Version::initial(),
        }
    }

    #[tokio::test]
    async fn only_one_live_payment_per_booking() {
        let store = InMemoryStore::new();
        let registry = PaymentRegistry::new();
        let booking = booking();

        let mut tx = store.begin().await.unwrap();
        let first = registry.open(&mut tx, &booking, "card", "card").await.unwrap();
        assert_eq!(first.attempt, 1);
        assert_eq!(first.amount, booking.total_amount);

        let result = registry.open(&mut tx, &booking, "card", "card").await;
        assert!(matches!(result, Err(DomainError::Conflict(_))));

        registry
            .mark_failed(&mut tx, first.id, "declined")
            .await
            .unwrap();
        let second = registry.open(&mut tx, &booking, "card", "card").await.unwrap();
        assert_eq!(second.attempt, 2);
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let all = registry.for_booking(&mut tx, booking.id).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, first.id);
    }

    #[tokio::test]
    async fn lookup_by_transaction_id() {
        let store = InMemoryStore::new();
        let registry = PaymentRegistry::new();
        let booking = booking();

        let mut tx = store.begin().await.unwrap();
        let payment = registry.open(&mut tx, &booking, "wallet", "wallet").await.unwrap();
        registry
            .attach_transaction(&mut tx, payment.id, "txn-42")
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let found = registry.by_transaction(&mut tx, "txn-42").await.unwrap().unwrap();
        assert_eq!(found.id, payment.id);
        assert!(registry.by_transaction(&mut tx, "nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn completed_payment_is_reported() {
        let store = InMemoryStore::new();
        let registry = PaymentRegistry::new();
        let booking = booking();

        let mut tx = store.begin().await.unwrap();
        let payment = registry.open(&mut tx, &booking, "card", "card").await.unwrap();
        assert!(!registry.has_completed(&mut tx, booking.id).await.unwrap());
        registry.mark_completed(&mut tx, payment.id).await.unwrap();
        let again = registry.mark_completed(&mut tx, payment.id).await.unwrap();
        assert_eq!(again.status, PaymentStatus::Completed);
        assert!(registry.has_completed(&mut tx, booking.id).await.unwrap());
    }

    #[tokio::test]
    async fn refunded_payment_frees_the_booking() {
        let store = InMemoryStore::new();
        let registry = PaymentRegistry::new();
        let booking = booking();

        let mut tx = store.begin().await.unwrap();
        let payment = registry.open(&mut tx, &booking, "card", "card").await.unwrap();
        let refunded = registry.mark_refunded(&mut tx, payment.id).await.unwrap();
        assert_eq!(refunded.status, PaymentStatus::Refunded);
        let again = registry.mark_refunded(&mut tx, payment.id).await.unwrap();
        assert_eq!(again.version, refunded.version);

        let next = registry.open(&mut tx, &booking, "card", "card").await.unwrap();
        assert_eq!(next.attempt, 2);
    }
}
