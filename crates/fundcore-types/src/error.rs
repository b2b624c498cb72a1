//! Error types for Fundcore
//!
//! Caller-facing validation failures carry a stable machine-readable code
//! (`error_code`) next to the human-readable message; infrastructure
//! failures are collapsed to a generic code while the full detail stays in
//! the log.

use thiserror::Error;

/// Result type for Fundcore operations
pub type Result<T> = std::result::Result<T, FundcoreError>;

/// Fundcore error types
#[derive(Debug, Clone, Error)]
pub enum FundcoreError {
    // ========================================================================
    // Amount Errors
    // ========================================================================

    /// Amount overflow during arithmetic
    #[error("Amount overflow during arithmetic operation")]
    AmountOverflow,

    /// Zero or negative amount where a positive one is required
    #[error("Invalid amount: {message}")]
    InvalidAmount { message: String },

    /// Currency mismatch
    #[error("Currency mismatch: expected {expected}, got {actual}")]
    CurrencyMismatch { expected: String, actual: String },

    // ========================================================================
    // Gateway Errors
    // ========================================================================

    /// Webhook signature did not verify
    #[error("Invalid webhook signature")]
    SignatureInvalid,

    /// Webhook payload could not be parsed
    #[error("Malformed gateway payload: {reason}")]
    MalformedPayload { reason: String },

    // ========================================================================
    // Intention Errors
    // ========================================================================

    /// No payment intention matched the gateway notification
    #[error("Payment not found for reference {reference}")]
    PaymentNotFound { reference: String },

    /// Intention not found by internal id
    #[error("Payment intention {intention_id} not found")]
    IntentionNotFound { intention_id: String },

    /// Intention side effect already applied (idempotency short-circuit)
    #[error("Payment intention {intention_id} has already been executed")]
    AlreadyExecuted { intention_id: String },

    /// Invalid status transition on an intention
    #[error("Payment intention {intention_id} cannot move from {from} to {to}")]
    InvalidTransition {
        intention_id: String,
        from: String,
        to: String,
    },

    /// Merchant reference already used by another intention
    #[error("Merchant reference {reference} is already in use")]
    DuplicateReference { reference: String },

    // ========================================================================
    // Wallet Errors
    // ========================================================================

    /// Wallet account not found
    #[error("Wallet account for {profile_id} not found")]
    WalletNotFound { profile_id: String },

    /// Insufficient balance
    #[error("Insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: String, available: String },

    /// Wallet store could not be accessed
    #[error("Wallet access failed: {reason}")]
    WalletAccessFailed { reason: String },

    // ========================================================================
    // Allocation Errors
    // ========================================================================

    /// Opportunity not found
    #[error("Opportunity {opportunity_id} not found")]
    OpportunityNotFound { opportunity_id: String },

    /// Opportunity is not in a fundable state
    #[error("Opportunity {opportunity_id} is not available for investment")]
    OpportunityNotAvailable { opportunity_id: String },

    /// Owners may not invest in their own opportunities
    #[error("Cannot invest in your own opportunity {opportunity_id}")]
    OwnOpportunityInvestment { opportunity_id: String },

    /// Requested shares outside the per-investor [min, max] range
    #[error("Invalid share count {requested}: must be between {min} and {max}")]
    InvalidShares { requested: u32, min: u32, max: u32 },

    /// Share pool cannot cover the request
    #[error("Insufficient shares: requested {requested}, available {available}")]
    InsufficientShares { requested: u32, available: u32 },

    // ========================================================================
    // Distribution Errors
    // ========================================================================

    /// Investment not found
    #[error("Investment {investment_id} not found")]
    InvestmentNotFound { investment_id: String },

    /// Operation does not apply to the investment's mode
    #[error("Investment {investment_id} has mode {mode}, which does not support this operation")]
    WrongInvestmentMode { investment_id: String, mode: String },

    /// Actual profit already recorded for the opportunity
    #[error("Actual profit for opportunity {opportunity_id} has already been recorded")]
    ProfitAlreadyRecorded { opportunity_id: String },

    /// Distribution requires a recorded actual profit
    #[error("Actual profit for opportunity {opportunity_id} has not been recorded")]
    ProfitNotRecorded { opportunity_id: String },

    // ========================================================================
    // General Errors
    // ========================================================================

    /// Payment pipeline failure
    #[error("Payment processing failed: {reason}")]
    PaymentProcessingFailed { reason: String },

    /// Generic internal failure
    #[error("Processing failed")]
    ProcessingFailed { detail: String },

    /// Invalid input
    #[error("Invalid input: {field} - {reason}")]
    InvalidInput { field: String, reason: String },
}

impl FundcoreError {
    /// Create a generic processing failure, keeping the detail for logs
    pub fn processing(detail: impl Into<String>) -> Self {
        Self::ProcessingFailed {
            detail: detail.into(),
        }
    }

    /// Caller-facing validation failures, safe to return verbatim
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidAmount { .. }
                | Self::InvalidShares { .. }
                | Self::InsufficientShares { .. }
                | Self::InsufficientBalance { .. }
                | Self::OpportunityNotAvailable { .. }
                | Self::OwnOpportunityInvestment { .. }
                | Self::InvalidInput { .. }
                | Self::DuplicateReference { .. }
        )
    }

    /// Get a stable error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::AmountOverflow => "AMOUNT_OVERFLOW",
            Self::InvalidAmount { .. } => "INVALID_AMOUNT",
            Self::CurrencyMismatch { .. } => "CURRENCY_MISMATCH",
            Self::SignatureInvalid => "SIGNATURE_INVALID",
            Self::MalformedPayload { .. } => "MALFORMED_PAYLOAD",
            Self::PaymentNotFound { .. } => "PAYMENT_NOT_FOUND",
            Self::IntentionNotFound { .. } => "INTENTION_NOT_FOUND",
            Self::AlreadyExecuted { .. } => "ALREADY_EXECUTED",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::DuplicateReference { .. } => "DUPLICATE_REFERENCE",
            Self::WalletNotFound { .. } => "WALLET_NOT_FOUND",
            Self::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            Self::WalletAccessFailed { .. } => "WALLET_ACCESS_FAILED",
            Self::OpportunityNotFound { .. } => "OPPORTUNITY_NOT_FOUND",
            Self::OpportunityNotAvailable { .. } => "OPPORTUNITY_NOT_AVAILABLE",
            Self::OwnOpportunityInvestment { .. } => "OWN_OPPORTUNITY_INVESTMENT",
            Self::InvalidShares { .. } => "INVALID_SHARES",
            Self::InsufficientShares { .. } => "INSUFFICIENT_SHARES",
            Self::InvestmentNotFound { .. } => "INVESTMENT_NOT_FOUND",
            Self::WrongInvestmentMode { .. } => "WRONG_INVESTMENT_MODE",
            Self::ProfitAlreadyRecorded { .. } => "PROFIT_ALREADY_RECORDED",
            Self::ProfitNotRecorded { .. } => "PROFIT_NOT_RECORDED",
            Self::PaymentProcessingFailed { .. } => "PAYMENT_PROCESSING_FAILED",
            Self::ProcessingFailed { .. } => "PROCESSING_FAILED",
            Self::InvalidInput { .. } => "INVALID_INPUT",
        }
    }
}
