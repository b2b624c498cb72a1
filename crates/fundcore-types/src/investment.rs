//! Investment model
//!
//! One row per (investor, opportunity) pair; repeat purchases merge into the
//! existing row. Post-funding lifecycle fields are monotonic: merchandise
//! can only arrive once, profit can only be distributed once.

use crate::{InvestmentId, OpportunityId, ProfileId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How the investor participates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvestmentMode {
    /// Investor takes delivery of the merchandise themselves
    Myself,
    /// Investor authorizes the platform to sell and distribute profit
    Authorize,
}

impl fmt::Display for InvestmentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Myself => "myself",
            Self::Authorize => "authorize",
        };
        f.write_str(s)
    }
}

/// Overall investment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvestmentStatus {
    Active,
    Completed,
    Cancelled,
}

/// Merchandise delivery state, meaningful only for `Myself` investments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MerchandiseStatus {
    Pending,
    Arrived,
}

/// Profit distribution state, meaningful only for `Authorize` investments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistributionStatus {
    Pending,
    Distributed,
}

/// An investor's position in one opportunity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Investment {
    pub id: InvestmentId,
    pub investor: ProfileId,
    pub opportunity: OpportunityId,
    /// Total shares held, across all merged purchases
    pub shares: u32,
    /// Price per share snapshotted at first purchase
    pub share_price: Decimal,
    pub mode: InvestmentMode,
    /// Principal: shares x share_price
    pub total_investment: Decimal,
    /// Principal plus the per-share service fee (fee applies only to Myself)
    pub total_payment_required: Decimal,
    pub status: InvestmentStatus,
    pub merchandise_status: MerchandiseStatus,
    pub distribution_status: DistributionStatus,
    pub expected_profit_per_share: Option<Decimal>,
    pub actual_profit_per_share: Option<Decimal>,
    pub actual_net_profit_per_share: Option<Decimal>,
    /// Total profit credited to the investor's wallet
    pub distributed_profit: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub merchandise_arrived_at: Option<DateTime<Utc>>,
    pub distributed_at: Option<DateTime<Utc>>,
}

impl Investment {
    /// Compute the principal for a share count at a price
    pub fn principal(shares: u32, share_price: Decimal) -> Decimal {
        Decimal::from(shares) * share_price
    }

    /// Compute the total payment required for a share count
    ///
    /// The per-share service fee applies only to `Myself` investments.
    pub fn payment_required(
        shares: u32,
        share_price: Decimal,
        service_fee_per_share: Decimal,
        mode: InvestmentMode,
    ) -> Decimal {
        let principal = Self::principal(shares, share_price);
        match mode {
            InvestmentMode::Myself => principal + Decimal::from(shares) * service_fee_per_share,
            InvestmentMode::Authorize => principal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_principal() {
        assert_eq!(Investment::principal(2, dec!(1000)), dec!(2000));
    }

    #[test]
    fn test_myself_mode_pays_service_fee() {
        let total = Investment::payment_required(2, dec!(1000), dec!(50), InvestmentMode::Myself);
        assert_eq!(total, dec!(2100));
    }

    #[test]
    fn test_authorize_mode_pays_principal_only() {
        let total =
            Investment::payment_required(2, dec!(1000), dec!(50), InvestmentMode::Authorize);
        assert_eq!(total, dec!(2000));
    }
}
