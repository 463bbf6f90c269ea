//! Card and wallet payments through an HTTP payment provider.

use std::time::Duration;

use async_trait::async_trait;
use domain::Money;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;

use super::{
    PaymentGateway, PaymentInitRequest, PaymentInitResponse, PaymentVerification, RefundRequest,
    RefundResponse, Settlement,
};
use crate::error::GatewayError;

/// Connection settings for the payment provider.
#[derive(Debug, Clone)]
pub struct HttpGatewayConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout: Duration,
}

impl Default for HttpGatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8089".to_string(),
            api_key: String::new(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Talks JSON to `{base_url}/{method}/{initialize|verify|refund}`.
///
/// 4xx answers are provider rejections; 5xx and transport errors are
/// [`GatewayError::Unavailable`].
pub struct HttpGateway {
    client: Client,
    method: String,
    base_url: String,
    api_key: String,
}

impl HttpGateway {
    pub fn new(method: impl Into<String>, config: HttpGatewayConfig) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .pool_max_idle_per_host(10)
            .timeout(config.timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            method: method.into(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key,
        })
    }

    fn url(&self, action: &str) -> String {
        format!("{}/{}/{}", self.base_url, self.method, action)
    }

    async fn post(&self, action: &str, body: &serde_json::Value) -> Result<Response, GatewayError> {
        let response = self
            .client
            .post(self.url(action))
            .header("X-API-Key", &self.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_server_error() {
            let text = response.text().await.unwrap_or_default();
            return Err(GatewayError::Unavailable(format!("{status}: {text}")));
        }
        Ok(response)
    }

    /// Decodes a 2xx body, or returns the rejection text for 4xx.
    async fn decode<T: DeserializeOwned>(
        response: Response,
    ) -> Result<Result<T, String>, GatewayError> {
        let status = response.status();
        if status.is_success() {
            return Ok(Ok(response.json::<T>().await?));
        }
        let text = response.text().await.unwrap_or_default();
        Ok(Err(rejection_message(status, &text)))
    }
}

fn rejection_message(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
        .unwrap_or_else(|| format!("provider rejected request ({status})"))
}

#[async_trait]
impl PaymentGateway for HttpGateway {
    fn provider_name(&self) -> &str {
        &self.method
    }

    #[tracing::instrument(skip(self, request), fields(provider = %self.method, booking_id = %request.booking_id))]
    async fn initialize(
        &self,
        request: &PaymentInitRequest,
    ) -> Result<PaymentInitResponse, GatewayError> {
        let body = serde_json::to_value(request)
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;
        let response = self.post("initialize", &body).await?;

        match Self::decode::<PaymentInitResponse>(response).await? {
            Ok(answer) => Ok(answer),
            Err(message) => {
                tracing::warn!(%message, "payment initialization rejected");
                Ok(PaymentInitResponse::declined(message))
            }
        }
    }

    #[tracing::instrument(skip(self), fields(provider = %self.method))]
    async fn verify(&self, transaction_id: &str) -> Result<PaymentVerification, GatewayError> {
        let response = self
            .post("verify", &json!({ "transaction_id": transaction_id }))
            .await?;

        match Self::decode::<PaymentVerification>(response).await? {
            Ok(answer) => Ok(answer),
            Err(message) => Ok(PaymentVerification {
                is_success: false,
                is_confirmed: false,
                paid_amount: Money::zero(),
                payment_date: None,
                error_message: Some(message),
                settlement: Settlement::Pending,
            }),
        }
    }

    #[tracing::instrument(skip(self, request), fields(provider = %self.method, payment_id = %request.payment_id))]
    async fn refund(&self, request: &RefundRequest) -> Result<RefundResponse, GatewayError> {
        let body = serde_json::to_value(request)
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;
        let response = self.post("refund", &body).await?;

        match Self::decode::<RefundResponse>(response).await? {
            Ok(answer) => Ok(answer),
            Err(message) => Ok(RefundResponse {
                is_success: false,
                refund_transaction_id: None,
                refund_amount: Money::zero(),
                refund_date: None,
                error_message: Some(message),
            }),
        }
    }
}
