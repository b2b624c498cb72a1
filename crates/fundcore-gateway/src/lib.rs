//! Fundcore Gateway - Webhook verification and payload normalization
//!
//! The adapter is a pure function of its inputs: it authenticates an inbound
//! gateway notification against the shared secret and normalizes the
//! vendor-specific field names into the canonical [`TransactionResult`]
//! consumed by the settlement engine. No side effects happen here; a
//! signature mismatch must cause the caller to reject the request outright.
//!
//! The keyed digest is HMAC-SHA256 over the raw request body bytes, compared
//! constant-time. The raw bytes matter: re-serializing parsed JSON changes
//! key order and whitespace and breaks verification.

use fundcore_types::{Currency, FundcoreError, Money, Result, TransactionResult};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// A verified, normalized gateway notification
#[derive(Debug, Clone)]
pub enum GatewayNotification {
    /// Card tokenization callback; carries no money movement
    Token { token_id: String },
    /// Payment transaction result
    Transaction(TransactionResult),
}

// Vendor wire shapes. Field names follow the gateway's documentation and
// are not exposed outside this crate.

#[derive(Debug, Deserialize)]
struct VendorEnvelope {
    #[serde(rename = "type")]
    kind: VendorKind,
    token: Option<VendorToken>,
    transaction: Option<VendorTransaction>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum VendorKind {
    Token,
    Transaction,
}

#[derive(Debug, Deserialize)]
struct VendorToken {
    id: String,
}

#[derive(Debug, Deserialize)]
struct VendorTransaction {
    id: String,
    success: bool,
    amount: i64,
    currency: String,
    order: Option<VendorOrder>,
    source: Option<VendorSource>,
}

#[derive(Debug, Deserialize)]
struct VendorOrder {
    id: Option<String>,
    reference: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VendorSource {
    company: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

/// The gateway adapter
#[derive(Clone)]
pub struct GatewayAdapter {
    secret: Vec<u8>,
}

impl GatewayAdapter {
    /// Create an adapter for the shared webhook secret
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
        }
    }

    /// Verify the signature and normalize the payload
    ///
    /// Returns `SignatureInvalid` on any authenticity failure and
    /// `MalformedPayload` if the body is not a recognizable notification.
    pub fn verify_and_normalize(
        &self,
        raw_payload: &[u8],
        signature: &str,
    ) -> Result<GatewayNotification> {
        self.verify_signature(raw_payload, signature)?;
        self.normalize(raw_payload)
    }

    fn verify_signature(&self, raw_payload: &[u8], signature: &str) -> Result<()> {
        let provided = hex::decode(signature.trim()).map_err(|_| FundcoreError::SignatureInvalid)?;

        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|_| FundcoreError::SignatureInvalid)?;
        mac.update(raw_payload);

        // verify_slice is constant-time
        mac.verify_slice(&provided)
            .map_err(|_| FundcoreError::SignatureInvalid)
    }

    fn normalize(&self, raw_payload: &[u8]) -> Result<GatewayNotification> {
        let raw: serde_json::Value =
            serde_json::from_slice(raw_payload).map_err(|e| FundcoreError::MalformedPayload {
                reason: e.to_string(),
            })?;
        let envelope: VendorEnvelope =
            serde_json::from_value(raw.clone()).map_err(|e| FundcoreError::MalformedPayload {
                reason: e.to_string(),
            })?;

        match envelope.kind {
            VendorKind::Token => {
                let token = envelope.token.ok_or_else(|| FundcoreError::MalformedPayload {
                    reason: "token notification without token object".to_string(),
                })?;
                Ok(GatewayNotification::Token { token_id: token.id })
            }
            VendorKind::Transaction => {
                let tx = envelope
                    .transaction
                    .ok_or_else(|| FundcoreError::MalformedPayload {
                        reason: "transaction notification without transaction object".to_string(),
                    })?;

                let currency = Currency::from_code(&tx.currency)?;
                let (order_id, reference) = match tx.order {
                    Some(order) => (order.id, order.reference),
                    None => (None, None),
                };
                let payment_method = tx.source.and_then(|s| s.company.or(s.kind));

                Ok(GatewayNotification::Transaction(TransactionResult {
                    gateway_transaction_id: tx.id,
                    gateway_order_id: order_id,
                    merchant_reference: reference,
                    success: tx.success,
                    amount: Money::new(tx.amount, currency),
                    payment_method,
                    raw,
                }))
            }
        }
    }

    /// Compute the signature this adapter expects for a payload
    ///
    /// Exposed for outbound use and tests; hex-encoded HMAC-SHA256.
    pub fn sign(&self, raw_payload: &[u8]) -> String {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts any key length");
        mac.update(raw_payload);
        hex::encode(mac.finalize().into_bytes())
    }
}
