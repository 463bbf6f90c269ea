//! Payment gateway adapters.
//!
//! One [`PaymentGateway`] per payment method, selected at runtime by
//! [`GatewayFactory`]. Adapters are stateless per call and are the
//! workflows' only external dependency.

mod cash;
mod http;
mod memory;

pub use cash::CashGateway;
pub use http::{HttpGateway, HttpGatewayConfig};
pub use memory::InMemoryGateway;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{BookingId, PaymentId};
use domain::{DomainError, Money};
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

/// Everything the provider needs to start a checkout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentInitRequest {
    pub booking_id: BookingId,
    pub payment_id: PaymentId,
    pub amount: Money,
    pub customer_email: String,
    pub customer_phone: String,
    pub customer_name: String,
    pub customer_address: Option<String>,
    pub craft_name: String,
    pub craftsman_name: String,
    pub booking_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaymentInitResponse {
    pub is_success: bool,
    pub payment_link: Option<String>,
    pub payment_token: Option<String>,
    pub transaction_id: Option<String>,
    pub error_message: Option<String>,
}

impl PaymentInitResponse {
    pub fn declined(message: impl Into<String>) -> Self {
        Self {
            is_success: false,
            error_message: Some(message.into()),
            ..Self::default()
        }
    }
}

/// How far a checkout has got at the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Settlement {
    /// Still open, or the provider could not say.
    #[default]
    Pending,
    Paid,
    /// Final decline; the customer cannot pay this checkout any more.
    Declined,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentVerification {
    pub is_success: bool,
    pub is_confirmed: bool,
    pub paid_amount: Money,
    pub payment_date: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    #[serde(default)]
    pub settlement: Settlement,
}

impl PaymentVerification {
    /// Where the checkout stands.
    ///
    /// A failed lookup is never final. Providers that only report
    /// `is_confirmed` are read as paid or pending.
    pub fn status(&self) -> Settlement {
        if !self.is_success {
            Settlement::Pending
        } else if self.is_confirmed {
            Settlement::Paid
        } else {
            self.settlement
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefundRequest {
    pub booking_id: BookingId,
    pub payment_id: PaymentId,
    pub original_transaction_id: Option<String>,
    pub amount: Money,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefundResponse {
    pub is_success: bool,
    pub refund_transaction_id: Option<String>,
    pub refund_amount: Money,
    pub refund_date: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

/// Contract every payment provider adapter fulfils.
///
/// Ordinary provider rejections come back as `Ok` with `is_success = false`;
/// only transport failures are `Err`.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Name stored on payment rows created through this adapter.
    fn provider_name(&self) -> &str;

    async fn initialize(
        &self,
        request: &PaymentInitRequest,
    ) -> Result<PaymentInitResponse, GatewayError>;

    /// Idempotent for a given transaction id.
    async fn verify(&self, transaction_id: &str) -> Result<PaymentVerification, GatewayError>;

    async fn refund(&self, request: &RefundRequest) -> Result<RefundResponse, GatewayError>;
}

/// Chooses a gateway by payment method name.
#[derive(Clone, Default)]
pub struct GatewayFactory {
    gateways: HashMap<String, Arc<dyn PaymentGateway>>,
}

impl GatewayFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `gateway` for `method` (case-insensitive).
    pub fn register(mut self, method: &str, gateway: Arc<dyn PaymentGateway>) -> Self {
        self.gateways.insert(normalize(method), gateway);
        self
    }

    /// The production wiring: card and wallet over HTTP, cash locally.
    pub fn standard(config: HttpGatewayConfig) -> Result<Self, GatewayError> {
        let card = HttpGateway::new("card", config.clone())?;
        let wallet = HttpGateway::new("wallet", config)?;
        Ok(Self::new()
            .register("card", Arc::new(card))
            .register("wallet", Arc::new(wallet))
            .register("cash", Arc::new(CashGateway::new())))
    }

    /// Returns the gateway for a method, or `Validation` if none is registered.
    pub fn for_method(&self, method: &str) -> Result<Arc<dyn PaymentGateway>, DomainError> {
        self.gateways
            .get(&normalize(method))
            .cloned()
            .ok_or_else(|| DomainError::Validation(format!("unsupported payment method: {method}")))
    }

    /// Finds the gateway whose provider name matches a stored payment row.
    pub fn for_provider(&self, provider: &str) -> Option<Arc<dyn PaymentGateway>> {
        self.gateways
            .values()
            .find(|g| g.provider_name() == provider)
            .cloned()
    }

    /// Registered method names, sorted.
    pub fn methods(&self) -> Vec<String> {
        let mut methods: Vec<String> = self.gateways.keys().cloned().collect();
        methods.sort();
        methods
    }
}

impl std::fmt::Debug for GatewayFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayFactory")
            .field("methods", &self.methods())
            .finish()
    }
}

fn normalize(method: &str) -> String {
    method.trim().to_ascii_lowercase()
}
