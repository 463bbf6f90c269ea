//! Scriptable in-memory gateway for tests and local runs.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use domain::Money;

use super::{
    PaymentGateway, PaymentInitRequest, PaymentInitResponse, PaymentVerification, RefundRequest,
    RefundResponse, Settlement,
};
use crate::error::GatewayError;

#[derive(Debug)]
struct Transaction {
    amount: Money,
    settlement: Settlement,
    paid_amount: Option<Money>,
}

#[derive(Debug, Default)]
struct InMemoryGatewayState {
    transactions: HashMap<String, Transaction>,
    requests: Vec<PaymentInitRequest>,
    next_id: u32,
    decline_message: Option<String>,
    refund_decline: Option<String>,
    unavailable: bool,
    delay: Option<Duration>,
    initialize_calls: usize,
    verify_calls: usize,
    refund_calls: usize,
}

/// In-memory payment gateway.
///
/// Issues sequential `TXN-0001` style ids. Behaviour is scripted with the
/// `set_*` methods and payments are settled with [`confirm`](Self::confirm)
/// or [`decline`](Self::decline).
#[derive(Debug, Clone)]
pub struct InMemoryGateway {
    name: String,
    state: Arc<RwLock<InMemoryGatewayState>>,
}

impl Default for InMemoryGateway {
    fn default() -> Self {
        Self::new("in-memory")
    }
}

impl InMemoryGateway {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::default(),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, InMemoryGatewayState> {
        self.state.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, InMemoryGatewayState> {
        self.state.write().unwrap_or_else(|p| p.into_inner())
    }

    /// Makes `initialize` decline with the given message. `None` clears it.
    pub fn set_decline(&self, message: Option<&str>) {
        self.write().decline_message = message.map(str::to_string);
    }

    /// Makes `refund` decline with the given message. `None` clears it.
    pub fn set_refund_decline(&self, message: Option<&str>) {
        self.write().refund_decline = message.map(str::to_string);
    }

    /// Makes every call fail at the transport level.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.write().unavailable = unavailable;
    }

    /// Delays `initialize` answers.
    pub fn set_delay(&self, delay: Option<Duration>) {
        self.write().delay = delay;
    }

    /// Settles a transaction as paid in full.
    pub fn confirm(&self, transaction_id: &str) {
        if let Some(txn) = self.write().transactions.get_mut(transaction_id) {
            txn.settlement = Settlement::Paid;
            txn.paid_amount = Some(txn.amount);
        }
    }

    /// Settles a transaction as paid with a specific amount.
    pub fn confirm_with_amount(&self, transaction_id: &str, amount: Money) {
        if let Some(txn) = self.write().transactions.get_mut(transaction_id) {
            txn.settlement = Settlement::Paid;
            txn.paid_amount = Some(amount);
        }
    }

    /// Settles a transaction as declined.
    pub fn decline(&self, transaction_id: &str) {
        if let Some(txn) = self.write().transactions.get_mut(transaction_id) {
            txn.settlement = Settlement::Declined;
        }
    }

    pub fn initialize_calls(&self) -> usize {
        self.read().initialize_calls
    }

    pub fn verify_calls(&self) -> usize {
        self.read().verify_calls
    }

    pub fn refund_calls(&self) -> usize {
        self.read().refund_calls
    }

    /// Number of transactions issued.
    pub fn transaction_count(&self) -> usize {
        self.read().transactions.len()
    }

    /// The most recent initialize request.
    pub fn last_request(&self) -> Option<PaymentInitRequest> {
        self.read().requests.last().cloned()
    }
}

#[async_trait]
impl PaymentGateway for InMemoryGateway {
    fn provider_name(&self) -> &str {
        &self.name
    }

    async fn initialize(
        &self,
        request: &PaymentInitRequest,
    ) -> Result<PaymentInitResponse, GatewayError> {
        let delay = {
            let mut state = self.write();
            state.initialize_calls += 1;
            state.requests.push(request.clone());
            state.delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.write();
        if state.unavailable {
            return Err(GatewayError::Unavailable("connection refused".to_string()));
        }
        if let Some(message) = state.decline_message.clone() {
            return Ok(PaymentInitResponse::declined(message));
        }

        state.next_id += 1;
        let transaction_id = format!("TXN-{:04}", state.next_id);
        state.transactions.insert(
            transaction_id.clone(),
            Transaction {
                amount: request.amount,
                settlement: Settlement::Pending,
                paid_amount: None,
            },
        );

        Ok(PaymentInitResponse {
            is_success: true,
            payment_link: Some(format!("https://pay.test/checkout/{transaction_id}")),
            payment_token: Some(format!("tok_{transaction_id}")),
            transaction_id: Some(transaction_id),
            error_message: None,
        })
    }

    async fn verify(&self, transaction_id: &str) -> Result<PaymentVerification, GatewayError> {
        let mut state = self.write();
        state.verify_calls += 1;
        if state.unavailable {
            return Err(GatewayError::Unavailable("connection refused".to_string()));
        }

        let verification = match state.transactions.get(transaction_id) {
            None => PaymentVerification {
                is_success: false,
                is_confirmed: false,
                paid_amount: Money::zero(),
                payment_date: None,
                error_message: Some(format!("unknown transaction {transaction_id}")),
                settlement: Settlement::Pending,
            },
            Some(txn) => match txn.settlement {
                Settlement::Paid => PaymentVerification {
                    is_success: true,
                    is_confirmed: true,
                    paid_amount: txn.paid_amount.unwrap_or(txn.amount),
                    payment_date: Some(Utc::now()),
                    error_message: None,
                    settlement: Settlement::Paid,
                },
                Settlement::Declined => PaymentVerification {
                    is_success: true,
                    is_confirmed: false,
                    paid_amount: Money::zero(),
                    payment_date: None,
                    error_message: Some("payment declined".to_string()),
                    settlement: Settlement::Declined,
                },
                Settlement::Pending => PaymentVerification {
                    is_success: true,
                    is_confirmed: false,
                    paid_amount: Money::zero(),
                    payment_date: None,
                    error_message: Some("payment not completed".to_string()),
                    settlement: Settlement::Pending,
                },
            },
        };
        Ok(verification)
    }

    async fn refund(&self, request: &RefundRequest) -> Result<RefundResponse, GatewayError> {
        let mut state = self.write();
        state.refund_calls += 1;
        if state.unavailable {
            return Err(GatewayError::Unavailable("connection refused".to_string()));
        }

        let known = request
            .original_transaction_id
            .as_deref()
            .is_some_and(|id| state.transactions.contains_key(id));
        let rejection = if known {
            state.refund_decline.clone()
        } else {
            Some("original transaction not found".to_string())
        };
        if let Some(message) = rejection {
            return Ok(RefundResponse {
                is_success: false,
                refund_transaction_id: None,
                refund_amount: Money::zero(),
                refund_date: None,
                error_message: Some(message),
            });
        }

        state.next_id += 1;
        Ok(RefundResponse {
            is_success: true,
            refund_transaction_id: Some(format!("RFD-{:04}", state.next_id)),
            refund_amount: request.amount,
            refund_date: Some(Utc::now()),
            error_message: None,
        })
    }
}
