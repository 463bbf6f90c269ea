//! Periodic cleanup of bookings nobody paid for.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::{BookingId, PaymentId, ServiceRequestId};
use domain::{BookingManager, OfferLedger, PaymentRegistry, PaymentStatus, ServiceRequest, ServiceRequestStatus};
use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use store::{Store, Transaction, TransactionExt};

use crate::compensation::FailureCompensator;
use crate::error::SagaError;
use crate::notify::Notifier;
use crate::settings::SagaSettings;
use crate::workflow::WorkflowResult;

/// Reason recorded on bookings failed by the sweeper.
pub const REASON_DEADLINE_EXCEEDED: &str = "payment deadline exceeded";

/// Counts from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Overdue bookings found.
    pub scanned: usize,
    /// Bookings this sweep failed and unwound.
    pub compensated: usize,
    /// Bookings someone else had already compensated.
    pub skipped: usize,
    /// Bookings whose compensation failed; retried next sweep.
    pub failed: usize,
    /// Open service requests moved to Expired.
    pub requests_expired: usize,
}

enum Swept {
    Compensated,
    Skipped,
    Failed,
}

/// Finds Confirmed bookings past their payment deadline and compensates each
/// in its own unit of work.
///
/// The host process owns the timer and calls [`run_once`](Self::run_once).
pub struct ExpirySweeper<S: Store> {
    store: S,
    ledger: OfferLedger,
    bookings: BookingManager,
    payments: PaymentRegistry,
    compensator: Arc<FailureCompensator<S>>,
    concurrency: usize,
}

impl<S: Store + Clone> ExpirySweeper<S> {
    pub fn new(store: S, notifier: Arc<dyn Notifier>, settings: &SagaSettings) -> Self {
        let compensator = Arc::new(FailureCompensator::new(store.clone(), notifier));
        Self::with_compensator(store, compensator, settings)
    }

    pub fn with_compensator(
        store: S,
        compensator: Arc<FailureCompensator<S>>,
        settings: &SagaSettings,
    ) -> Self {
        Self {
            store,
            ledger: OfferLedger::new(),
            bookings: BookingManager::new(settings.payment_grace),
            payments: PaymentRegistry::new(),
            compensator,
            concurrency: settings.sweep_concurrency.max(1),
        }
    }
}

impl<S: Store> ExpirySweeper<S> {
    pub async fn run_once(&self) -> Result<SweepReport, SagaError> {
        self.run_once_at(Utc::now()).await
    }

    /// Sweeps as if the clock read `now`.
    ///
    /// Only the scan can fail the sweep; a failure on one booking is logged
    /// and counted.
    #[tracing::instrument(skip(self))]
    pub async fn run_once_at(&self, now: DateTime<Utc>) -> Result<SweepReport, SagaError> {
        let targets = self.overdue(now).await?;
        let mut report = SweepReport {
            scanned: targets.len(),
            ..SweepReport::default()
        };

        let outcomes: Vec<Swept> = stream::iter(targets)
            .map(|(booking_id, payment_id)| self.compensate(booking_id, payment_id))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;
        for outcome in outcomes {
            match outcome {
                Swept::Compensated => report.compensated += 1,
                Swept::Skipped => report.skipped += 1,
                Swept::Failed => report.failed += 1,
            }
        }

        report.requests_expired = self.expire_requests(now).await;

        if report.scanned > 0 || report.requests_expired > 0 {
            tracing::info!(
                scanned = report.scanned,
                compensated = report.compensated,
                skipped = report.skipped,
                failed = report.failed,
                requests_expired = report.requests_expired,
                "sweep finished"
            );
        }
        Ok(report)
    }

    /// Overdue bookings with no Completed payment, paired with their Pending
    /// payment attempt.
    async fn overdue(&self, now: DateTime<Utc>) -> Result<Vec<(BookingId, PaymentId)>, SagaError> {
        let mut tx = self.store.begin().await?;
        let overdue = self.bookings.find_overdue(&mut tx, now).await?;

        let mut targets = Vec::with_capacity(overdue.len());
        for booking in overdue {
            let attempts = self.payments.for_booking(&mut tx, booking.id).await?;
            if attempts.iter().any(|p| p.status == PaymentStatus::Completed) {
                continue;
            }
            match attempts.iter().rfind(|p| p.status == PaymentStatus::Pending) {
                Some(live) => targets.push((booking.id, live.id)),
                None => {
                    tracing::error!(booking_id = %booking.id, attempts = attempts.len(), "overdue booking has no pending payment");
                }
            }
        }
        tx.rollback().await?;
        Ok(targets)
    }

    async fn compensate(&self, booking_id: BookingId, payment_id: PaymentId) -> Swept {
        match self
            .compensator
            .execute(booking_id, payment_id, REASON_DEADLINE_EXCEEDED)
            .await
        {
            Ok(WorkflowResult::Succeeded { value: true, .. }) => {
                metrics::counter!("sweeper_bookings_compensated_total").increment(1);
                Swept::Compensated
            }
            Ok(WorkflowResult::Succeeded { value: false, .. }) => Swept::Skipped,
            Ok(WorkflowResult::Failed(failure)) => {
                tracing::warn!(%booking_id, step = %failure.step, message = %failure.message, "sweeper could not compensate booking");
                Swept::Failed
            }
            Err(error) => {
                tracing::warn!(%booking_id, %error, "sweeper compensation errored");
                Swept::Failed
            }
        }
    }

    /// Expires Open requests past their `expires_at`, one unit of work each.
    async fn expire_requests(&self, now: DateTime<Utc>) -> usize {
        let stale = match self.stale_requests(now).await {
            Ok(ids) => ids,
            Err(error) => {
                tracing::warn!(%error, "could not scan for expired service requests");
                return 0;
            }
        };

        let mut expired = 0;
        for request_id in stale {
            match self.expire_request(request_id, now).await {
                Ok(()) => expired += 1,
                Err(error) => {
                    tracing::warn!(%request_id, %error, "could not expire service request");
                }
            }
        }
        expired
    }

    async fn stale_requests(&self, now: DateTime<Utc>) -> Result<Vec<ServiceRequestId>, SagaError> {
        let mut tx = self.store.begin().await?;
        let open = tx
            .find::<ServiceRequest>("status", serde_json::json!(ServiceRequestStatus::Open))
            .await?;
        tx.rollback().await?;
        Ok(open
            .into_iter()
            .filter(|r| r.is_expired_at(now))
            .map(|r| r.id)
            .collect())
    }

    async fn expire_request(&self, request_id: ServiceRequestId, now: DateTime<Utc>) -> Result<(), SagaError> {
        let mut tx = self.store.begin().await?;
        self.ledger.expire_request(&mut tx, request_id, now).await?;
        tx.commit().await?;
        Ok(())
    }
}
