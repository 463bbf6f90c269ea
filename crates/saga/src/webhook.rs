//! Payment provider webhook payloads and their signatures.

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use domain::Money;

type HmacSha256 = Hmac<Sha256>;

/// Body the provider posts when a checkout settles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub transaction_id: String,
    pub success: bool,
    pub amount_cents: i64,
    pub currency: String,
    pub order_reference: String,
    /// Lowercase hex HMAC-SHA256 of [`WebhookPayload::signing_input`].
    pub signature: String,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl WebhookPayload {
    /// The exact bytes the provider signs.
    pub fn signing_input(&self) -> String {
        format!(
            "{}{}{}{}{}",
            self.amount_cents, self.currency, self.order_reference, self.success, self.transaction_id
        )
    }

    /// The paid amount, from minor units.
    pub fn amount(&self) -> Money {
        Money::from_minor_units(self.amount_cents)
    }

    /// Reason recorded when the payload reports a failed payment.
    pub fn failure_reason(&self) -> String {
        self.error_message
            .clone()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| "payment failed at provider".to_string())
    }
}

/// Computes the hex signature for a payload.
pub fn sign(secret: &[u8], payload: &WebhookPayload) -> String {
    // HMAC accepts keys of any length.
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return String::new();
    };
    mac.update(payload.signing_input().as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Returns true if the payload's signature was produced with `secret`.
///
/// The comparison runs in constant time.
pub fn verify_signature(secret: &[u8], payload: &WebhookPayload) -> bool {
    if secret.is_empty() {
        return false;
    }
    let Ok(expected) = hex::decode(payload.signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(payload.signing_input().as_bytes());
    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"whsec_test";

    fn payload(success: bool) -> WebhookPayload {
        let mut payload = WebhookPayload {
            transaction_id: "TXN-0001".into(),
            success,
            amount_cents: 50_000,
            currency: "EGP".into(),
            order_reference: "booking-1".into(),
            signature: String::new(),
            error_message: None,
        };
        payload.signature = sign(SECRET, &payload);
        payload
    }

    #[test]
    fn signing_input_field_order() {
        assert_eq!(payload(true).signing_input(), "50000EGPbooking-1trueTXN-0001");
    }

    #[test]
    fn valid_signature_verifies() {
        assert!(verify_signature(SECRET, &payload(true)));
    }

    #[test]
    fn tampered_payload_fails() {
        let mut p = payload(false);
        p.success = true;
        assert!(!verify_signature(SECRET, &p));

        let mut p = payload(true);
        p.amount_cents = 1;
        assert!(!verify_signature(SECRET, &p));
    }

    #[test]
    fn wrong_secret_or_garbage_fails() {
        assert!(!verify_signature(b"other", &payload(true)));
        assert!(!verify_signature(b"", &payload(true)));

        let mut p = payload(true);
        p.signature = "not-hex".into();
        assert!(!verify_signature(SECRET, &p));
    }

    #[test]
    fn keys_of_any_length_sign() {
        for secret in [&b"k"[..], &[7u8; 200][..]] {
            let mut p = payload(true);
            p.signature = sign(secret, &p);
            assert_eq!(p.signature.len(), 64);
            assert!(verify_signature(secret, &p));
        }
    }

    #[test]
    fn amount_from_minor_units() {
        assert_eq!(payload(true).amount(), Money::from_minor_units(50_000));
    }
}
