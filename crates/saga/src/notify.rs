//! Fire-and-forget notification port.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use common::UserId;
use domain::{DomainEvent, MarketplaceEvent};

/// Delivers marketplace events to users.
///
/// Workflows call this only after their unit of work committed. Failures are
/// logged by the caller and never change a workflow's outcome.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, user_id: UserId, event: &MarketplaceEvent) -> Result<(), String>;
}

/// Sends `event` and logs a failure instead of returning it.
pub(crate) async fn dispatch(notifier: &dyn Notifier, user_id: UserId, event: MarketplaceEvent) {
    if let Err(error) = notifier.notify(user_id, &event).await {
        tracing::warn!(%user_id, event_type = event.event_type(), %error, "notification failed");
    }
}

/// Writes every event to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, user_id: UserId, event: &MarketplaceEvent) -> Result<(), String> {
        tracing::info!(%user_id, event_type = event.event_type(), "notification");
        Ok(())
    }
}

/// Keeps every event in memory for assertions.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<(UserId, MarketplaceEvent)>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything sent so far, in order.
    pub fn sent(&self) -> Vec<(UserId, MarketplaceEvent)> {
        self.sent
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// Event type names sent so far, in order.
    pub fn event_types(&self) -> Vec<&'static str> {
        self.sent().iter().map(|(_, e)| e.event_type()).collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, user_id: UserId, event: &MarketplaceEvent) -> Result<(), String> {
        self.sent
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push((user_id, event.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::BookingId;
    use domain::events::BookingFailedData;

    struct FailingNotifier;

    #[async_trait]
    impl Notifier for FailingNotifier {
        async fn notify(&self, _: UserId, _: &MarketplaceEvent) -> Result<(), String> {
            Err("smtp down".to_string())
        }
    }

    fn event() -> MarketplaceEvent {
        MarketplaceEvent::BookingFailed(BookingFailedData {
            booking_id: BookingId::new(),
            reason: "payment failed".into(),
        })
    }

    #[tokio::test]
    async fn records_events() {
        let notifier = RecordingNotifier::new();
        dispatch(&notifier, UserId::new(), event()).await;
        assert_eq!(notifier.event_types(), vec!["BookingFailed"]);
    }

    #[tokio::test]
    async fn dispatch_swallows_failures() {
        dispatch(&FailingNotifier, UserId::new(), event()).await;
    }
}
