//! Purchase allocation
//!
//! Validation order is fixed and short-circuits on the first failure:
//! opportunity availability, self-investment, share range, pool coverage.
//! Nothing is mutated until every check has passed; the pool reservation
//! and the row upsert then form one all-or-nothing unit.

use crate::{InvestmentBook, OpportunityDirectory};
use fundcore_types::{
    FundcoreError, Investment, InvestmentMode, OpportunityId, ProfileId, Result,
};
use std::sync::Arc;
use tracing::{info, warn};

/// Result of a successful purchase
#[derive(Debug, Clone)]
pub struct PurchaseOutcome {
    pub investment: Investment,
    /// False when the purchase merged into an existing row
    pub is_new: bool,
    pub shares_added: u32,
}

/// The investment allocator
#[derive(Clone)]
pub struct Allocator {
    directory: Arc<dyn OpportunityDirectory>,
    book: InvestmentBook,
}

impl Allocator {
    pub fn new(directory: Arc<dyn OpportunityDirectory>, book: InvestmentBook) -> Self {
        Self { directory, book }
    }

    pub fn book(&self) -> &InvestmentBook {
        &self.book
    }

    /// Allocate shares to an investor
    pub async fn purchase(
        &self,
        investor: ProfileId,
        opportunity_id: &OpportunityId,
        shares: u32,
        mode: InvestmentMode,
    ) -> Result<PurchaseOutcome> {
        let opportunity = self.directory.get(opportunity_id).await?;

        if !opportunity.status.is_fundable() {
            return Err(FundcoreError::OpportunityNotAvailable {
                opportunity_id: opportunity_id.to_string(),
            });
        }
        if opportunity.owner == investor {
            return Err(FundcoreError::OwnOpportunityInvestment {
                opportunity_id: opportunity_id.to_string(),
            });
        }

        let existing = self.book.find_for_pair(&investor, opportunity_id).await;
        let held = existing.as_ref().map(|i| i.shares).unwrap_or(0);
        if shares < opportunity.min_shares || held + shares > opportunity.max_shares {
            return Err(FundcoreError::InvalidShares {
                requested: shares,
                min: opportunity.min_shares,
                max: opportunity.max_shares,
            });
        }

        let available = opportunity.available_shares();
        if available < shares {
            return Err(FundcoreError::InsufficientShares {
                requested: shares,
                available,
            });
        }

        // Reservation re-checks availability atomically; a concurrent
        // purchase may have shrunk the pool since the read above.
        let opportunity = self.directory.reserve_shares(opportunity_id, shares).await?;

        match self
            .book
            .upsert_purchase(investor, &opportunity, shares, mode)
            .await
        {
            Ok((investment, is_new)) => {
                info!(
                    investor = %investor,
                    opportunity = %opportunity_id,
                    shares,
                    merged = !is_new,
                    "shares allocated"
                );
                Ok(PurchaseOutcome {
                    investment,
                    is_new,
                    shares_added: shares,
                })
            }
            Err(e) => {
                // All-or-nothing: return the reserved shares to the pool.
                if let Err(release_err) = self.directory.release_shares(opportunity_id, shares).await
                {
                    warn!(
                        opportunity = %opportunity_id,
                        error = %release_err,
                        "failed to release shares after upsert failure"
                    );
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryOpportunityDirectory;
    use chrono::Utc;
    use fundcore_types::{Opportunity, OpportunityStatus};
    use rust_decimal_macros::dec;

    struct Setup {
        allocator: Allocator,
        directory: Arc<InMemoryOpportunityDirectory>,
        opportunity: Opportunity,
    }

    async fn setup(total_shares: u32, max_shares: u32) -> Setup {
        let directory = Arc::new(InMemoryOpportunityDirectory::new());
        let opportunity = Opportunity {
            id: OpportunityId::new(),
            owner: ProfileId::new(),
            status: OpportunityStatus::Open,
            total_shares,
            reserved_shares: 0,
            min_shares: 1,
            max_shares,
            share_price: dec!(1000),
            service_fee_per_share: dec!(50),
            expected_profit_per_share: Some(dec!(120)),
            actual_profit_per_share: None,
            actual_net_profit_per_share: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        directory.insert(opportunity.clone()).await;
        let allocator = Allocator::new(directory.clone(), InvestmentBook::new());
        Setup {
            allocator,
            directory,
            opportunity,
        }
    }

    #[tokio::test]
    async fn test_purchase_reserves_and_creates() {
        let s = setup(100, 20).await;
        let investor = ProfileId::new();

        let outcome = s
            .allocator
            .purchase(investor, &s.opportunity.id, 2, InvestmentMode::Myself)
            .await
            .unwrap();

        assert!(outcome.is_new);
        assert_eq!(outcome.investment.total_payment_required, dec!(2100));
        assert_eq!(
            s.directory.get(&s.opportunity.id).await.unwrap().reserved_shares,
            2
        );
    }

    #[tokio::test]
    async fn test_merge_law() {
        let s = setup(100, 20).await;
        let investor = ProfileId::new();

        s.allocator
            .purchase(investor, &s.opportunity.id, 2, InvestmentMode::Myself)
            .await
            .unwrap();
        let merged = s
            .allocator
            .purchase(investor, &s.opportunity.id, 1, InvestmentMode::Myself)
            .await
            .unwrap();

        assert!(!merged.is_new);
        assert_eq!(merged.investment.shares, 3);
        assert_eq!(merged.investment.total_investment, dec!(3000));
        assert_eq!(merged.investment.total_payment_required, dec!(3150));

        // One row, and the pool reflects both purchases.
        assert_eq!(
            s.allocator.book().total_shares_for_opportunity(&s.opportunity.id).await,
            3
        );
        assert_eq!(
            s.directory.get(&s.opportunity.id).await.unwrap().reserved_shares,
            3
        );
    }

    #[tokio::test]
    async fn test_own_opportunity_rejected() {
        let s = setup(100, 20).await;

        let result = s
            .allocator
            .purchase(s.opportunity.owner, &s.opportunity.id, 2, InvestmentMode::Myself)
            .await;
        assert!(matches!(
            result,
            Err(FundcoreError::OwnOpportunityInvestment { .. })
        ));
        assert_eq!(
            s.directory.get(&s.opportunity.id).await.unwrap().reserved_shares,
            0
        );
    }

    #[tokio::test]
    async fn test_insufficient_shares_carries_available() {
        let s = setup(10, 100).await;
        let investor = ProfileId::new();

        let result = s
            .allocator
            .purchase(investor, &s.opportunity.id, 100, InvestmentMode::Authorize)
            .await;
        assert!(matches!(
            result,
            Err(FundcoreError::InsufficientShares {
                requested: 100,
                available: 10
            })
        ));
        assert!(s
            .allocator
            .book()
            .find_for_pair(&investor, &s.opportunity.id)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_share_range_enforced_across_merges() {
        let s = setup(100, 5).await;
        let investor = ProfileId::new();

        s.allocator
            .purchase(investor, &s.opportunity.id, 4, InvestmentMode::Myself)
            .await
            .unwrap();

        // 4 held + 2 requested exceeds the per-investor max of 5.
        let result = s
            .allocator
            .purchase(investor, &s.opportunity.id, 2, InvestmentMode::Myself)
            .await;
        assert!(matches!(result, Err(FundcoreError::InvalidShares { .. })));
    }

    #[tokio::test]
    async fn test_unfundable_opportunity_rejected() {
        let s = setup(100, 20).await;
        let mut closed = s.opportunity.clone();
        closed.status = OpportunityStatus::Closed;
        s.directory.insert(closed).await;

        let result = s
            .allocator
            .purchase(ProfileId::new(), &s.opportunity.id, 2, InvestmentMode::Myself)
            .await;
        assert!(matches!(
            result,
            Err(FundcoreError::OpportunityNotAvailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_failed_merge_releases_reservation() {
        let s = setup(100, 20).await;
        let investor = ProfileId::new();

        s.allocator
            .purchase(investor, &s.opportunity.id, 2, InvestmentMode::Myself)
            .await
            .unwrap();

        // Mode mismatch fails the upsert after reservation; the pool must
        // be restored.
        let result = s
            .allocator
            .purchase(investor, &s.opportunity.id, 1, InvestmentMode::Authorize)
            .await;
        assert!(result.is_err());
        assert_eq!(
            s.directory.get(&s.opportunity.id).await.unwrap().reserved_shares,
            2
        );
    }
}
