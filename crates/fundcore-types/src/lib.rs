//! Fundcore Types - Canonical domain types for the investment marketplace core
//!
//! This crate is the foundation layer: strongly-typed identifiers, money,
//! payment-intention and investment models, and the error taxonomy. It has
//! zero dependencies on other fundcore crates.

pub mod error;
pub mod gateway;
pub mod identity;
pub mod intention;
pub mod investment;
pub mod money;
pub mod opportunity;

pub use error::{FundcoreError, Result};
pub use gateway::TransactionResult;
pub use identity::*;
pub use intention::{IntentionPurpose, IntentionStatus, PaymentIntention};
pub use investment::{
    DistributionStatus, Investment, InvestmentMode, InvestmentStatus, MerchandiseStatus,
};
pub use money::{Currency, Money};
pub use opportunity::{Opportunity, OpportunityStatus};
