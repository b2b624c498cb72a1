//! Canonical gateway transaction result
//!
//! The gateway adapter normalizes vendor-specific webhook payloads into this
//! shape; the settlement engine never sees vendor field names.

use crate::Money;
use serde::{Deserialize, Serialize};

/// A normalized gateway payment notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionResult {
    /// Gateway-assigned transaction id
    pub gateway_transaction_id: String,
    /// Gateway-assigned order id, if present on this delivery
    pub gateway_order_id: Option<String>,
    /// Caller-supplied merchant reference, if present on this delivery
    pub merchant_reference: Option<String>,
    /// Whether the payment succeeded
    pub success: bool,
    /// Amount as reported by the gateway, in minor units
    pub amount: Money,
    /// Payment method label (card scheme, wallet provider, ...)
    pub payment_method: Option<String>,
    /// The raw payload, retained verbatim for audit storage
    pub raw: serde_json::Value,
}

impl TransactionResult {
    /// A human-readable reference for diagnostics, preferring the strongest
    /// correlation identifier present
    pub fn reference(&self) -> &str {
        self.gateway_order_id
            .as_deref()
            .or(self.merchant_reference.as_deref())
            .unwrap_or(&self.gateway_transaction_id)
    }
}
