//! Payment intention model
//!
//! A `PaymentIntention` records one attempted external payment and its
//! gateway correlation identifiers. Mutation happens only inside the
//! intention store; this module carries the data shape and the status
//! machine rules.
//!
//! # Invariants
//!
//! 1. `is_executed` is true iff the completion side effect has run, and only
//!    ever transitions false -> true
//! 2. Status transitions: Created -> Active -> {Completed, Failed}; any
//!    non-terminal intention past `expires_at` may become Expired
//! 3. Terminal statuses (Completed, Failed, Expired) are final

use crate::{IntentionId, InvestmentMode, Money, OpportunityId, ProfileId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a payment intention
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentionStatus {
    /// Created locally, not yet registered with the gateway
    Created,
    /// Gateway session opened, awaiting the payer
    Active,
    /// Payment succeeded and the side effect was applied
    Completed,
    /// Gateway reported failure
    Failed,
    /// Expired before completion
    Expired,
}

impl IntentionStatus {
    /// Terminal statuses are final
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Expired)
    }

    /// Whether the state machine allows moving to `next`
    pub fn can_transition_to(&self, next: IntentionStatus) -> bool {
        match (self, next) {
            (Self::Created, Self::Active) => true,
            (Self::Created | Self::Active, Self::Completed) => true,
            (Self::Created | Self::Active, Self::Failed) => true,
            (Self::Created | Self::Active, Self::Expired) => true,
            _ => false,
        }
    }
}

impl fmt::Display for IntentionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Expired => "expired",
        };
        f.write_str(s)
    }
}

/// Declared purpose of a payment, with purpose-specific extras
///
/// Modeled as a tagged union so only valid fields exist for a given purpose;
/// an investment intention cannot be settled as a wallet top-up by reading
/// the wrong column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "purpose", rename_all = "snake_case")]
pub enum IntentionPurpose {
    /// Top up the owner's custodial wallet
    WalletCharge,
    /// Purchase shares in an opportunity
    Investment {
        opportunity: OpportunityId,
        shares: u32,
        mode: InvestmentMode,
        /// Price per share quoted when the intention was created
        share_price: Decimal,
    },
}

impl IntentionPurpose {
    pub fn label(&self) -> &'static str {
        match self {
            Self::WalletCharge => "wallet_charge",
            Self::Investment { .. } => "investment",
        }
    }
}

/// A single attempted external payment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntention {
    pub id: IntentionId,
    /// Order id assigned by the gateway when the session opened
    pub gateway_order_id: Option<String>,
    /// Intention id assigned by the gateway when the session opened
    pub gateway_intention_id: Option<String>,
    /// Caller-generated reference, unique per attempt
    pub merchant_reference: String,
    /// Transaction id assigned by the gateway on completion
    pub gateway_transaction_id: Option<String>,
    pub owner: ProfileId,
    pub purpose: IntentionPurpose,
    pub amount: Money,
    pub status: IntentionStatus,
    /// True iff the completion side effect has run; never reset
    pub is_executed: bool,
    /// Payment method label, set on completion
    pub payment_method: Option<String>,
    /// Raw gateway response, stored verbatim for audit
    pub raw_response: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl PaymentIntention {
    /// Build a new Created intention
    pub fn new(
        owner: ProfileId,
        purpose: IntentionPurpose,
        amount: Money,
        merchant_reference: String,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: IntentionId::new(),
            gateway_order_id: None,
            gateway_intention_id: None,
            merchant_reference,
            gateway_transaction_id: None,
            owner,
            purpose,
            amount,
            status: IntentionStatus::Created,
            is_executed: false,
            payment_method: None,
            raw_response: None,
            created_at: Utc::now(),
            expires_at,
            processed_at: None,
        }
    }

    /// Whether the expiry sweep may mark this intention expired at `now`
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        !self.status.is_terminal() && now > self.expires_at
    }
}
