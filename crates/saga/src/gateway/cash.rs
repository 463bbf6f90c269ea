//! Cash on completion: no provider, nothing to charge up front.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use domain::Money;
use uuid::Uuid;

use super::{
    PaymentGateway, PaymentInitRequest, PaymentInitResponse, PaymentVerification, RefundRequest,
    RefundResponse, Settlement,
};
use crate::error::GatewayError;

/// Issues local `CASH-…` transaction ids. A cash payment stays unconfirmed
/// until [`CashGateway::mark_collected`] is called for it.
#[derive(Debug, Clone, Default)]
pub struct CashGateway {
    collected: Arc<Mutex<HashSet<String>>>,
    amounts: Arc<Mutex<HashMap<String, Money>>>,
}

impl CashGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that the craftsman received the cash.
    pub fn mark_collected(&self, transaction_id: &str) {
        lock(&self.collected).insert(transaction_id.to_string());
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl PaymentGateway for CashGateway {
    fn provider_name(&self) -> &str {
        "cash"
    }

    async fn initialize(
        &self,
        request: &PaymentInitRequest,
    ) -> Result<PaymentInitResponse, GatewayError> {
        let transaction_id = format!("CASH-{}", Uuid::new_v4().simple());
        lock(&self.amounts).insert(transaction_id.clone(), request.amount);

        Ok(PaymentInitResponse {
            is_success: true,
            payment_link: None,
            payment_token: None,
            transaction_id: Some(transaction_id),
            error_message: None,
        })
    }

    async fn verify(&self, transaction_id: &str) -> Result<PaymentVerification, GatewayError> {
        let amount = lock(&self.amounts).get(transaction_id).copied();
        let Some(amount) = amount else {
            return Ok(PaymentVerification {
                is_success: false,
                is_confirmed: false,
                paid_amount: Money::zero(),
                payment_date: None,
                error_message: Some(format!("unknown cash transaction {transaction_id}")),
                settlement: Settlement::Pending,
            });
        };

        let collected = lock(&self.collected).contains(transaction_id);
        Ok(PaymentVerification {
            is_success: true,
            is_confirmed: collected,
            paid_amount: if collected { amount } else { Money::zero() },
            payment_date: collected.then(Utc::now),
            error_message: (!collected).then(|| "cash not collected yet".to_string()),
            settlement: if collected {
                Settlement::Paid
            } else {
                Settlement::Pending
            },
        })
    }

    async fn refund(&self, request: &RefundRequest) -> Result<RefundResponse, GatewayError> {
        // Cash is handed back in person.
        Ok(RefundResponse {
            is_success: true,
            refund_transaction_id: request
                .original_transaction_id
                .as_ref()
                .map(|id| format!("{id}-REFUND")),
            refund_amount: request.amount,
            refund_date: Some(Utc::now()),
            error_message: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{BookingId, PaymentId};

    fn request() -> PaymentInitRequest {
        PaymentInitRequest {
            booking_id: BookingId::new(),
            payment_id: PaymentId::new(),
            amount: Money::from_minor_units(20_000),
            customer_email: "c@example.com".into(),
            customer_phone: "000".into(),
            customer_name: "Customer".into(),
            customer_address: None,
            craft_name: "Carpentry".into(),
            craftsman_name: "Craftsman".into(),
            booking_date: Utc::now(),
        }
    }

    #[tokio::test]
    async fn unconfirmed_until_collected() {
        let gateway = CashGateway::new();
        let init = gateway.initialize(&request()).await.unwrap();
        let txn = init.transaction_id.unwrap();
        assert!(txn.starts_with("CASH-"));

        let before = gateway.verify(&txn).await.unwrap();
        assert!(before.is_success);
        assert!(!before.is_confirmed);
        assert_eq!(before.status(), Settlement::Pending);

        gateway.mark_collected(&txn);
        let after = gateway.verify(&txn).await.unwrap();
        assert!(after.is_confirmed);
        assert_eq!(after.status(), Settlement::Paid);
        assert_eq!(after.paid_amount, Money::from_minor_units(20_000));
    }

    #[tokio::test]
    async fn unknown_transaction_is_not_success() {
        let result = CashGateway::new().verify("CASH-missing").await.unwrap();
        assert!(!result.is_success);
    }
}
