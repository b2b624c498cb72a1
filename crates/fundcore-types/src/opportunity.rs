//! Investment opportunity, as consumed by the settlement core
//!
//! Opportunity CRUD lives with an external collaborator; the core only reads
//! availability, owner identity, pricing, and mutates the share counters.
//! Invariant enforced on every write: `reserved_shares <= total_shares`.

use crate::{OpportunityId, ProfileId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Funding status of an opportunity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpportunityStatus {
    /// Listed but not yet open for funding
    Draft,
    /// Open for investment
    Open,
    /// Share pool exhausted or funding window closed
    Closed,
    /// Merchandise sold / lifecycle finished
    Completed,
    /// Withdrawn by the owner or an admin
    Cancelled,
}

impl OpportunityStatus {
    /// Whether new investments are accepted
    pub fn is_fundable(&self) -> bool {
        matches!(self, Self::Open)
    }
}

/// The slice of an opportunity the settlement core works with
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Opportunity {
    pub id: OpportunityId,
    pub owner: ProfileId,
    pub status: OpportunityStatus,
    /// Total share pool
    pub total_shares: u32,
    /// Shares already reserved by investments
    pub reserved_shares: u32,
    /// Per-investor minimum shares per purchase
    pub min_shares: u32,
    /// Per-investor maximum total shares
    pub max_shares: u32,
    pub share_price: Decimal,
    /// Service fee per share, charged on Myself investments
    pub service_fee_per_share: Decimal,
    pub expected_profit_per_share: Option<Decimal>,
    /// Recorded once, after the merchandise is sold
    pub actual_profit_per_share: Option<Decimal>,
    /// Actual profit net of platform charges, the figure distributed
    pub actual_net_profit_per_share: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Opportunity {
    /// Shares still available for reservation
    pub fn available_shares(&self) -> u32 {
        self.total_shares.saturating_sub(self.reserved_shares)
    }
}
