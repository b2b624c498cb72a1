//! Investment book
//!
//! One row per (investor, opportunity) pair. Purchases merge into the
//! existing row; post-funding transitions are guarded and monotonic.

use chrono::{DateTime, Utc};
use fundcore_types::{
    DistributionStatus, FundcoreError, Investment, InvestmentId, InvestmentMode, InvestmentStatus,
    MerchandiseStatus, Opportunity, OpportunityId, ProfileId, Result,
};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Result of confirming merchandise arrival
#[derive(Debug, Clone)]
pub enum ArrivalOutcome {
    /// First confirmation; the timestamp was just stamped
    Confirmed(Investment),
    /// Already arrived earlier; safe no-op for admin retries
    AlreadyArrived(Investment),
}

#[derive(Default)]
struct BookInner {
    investments: HashMap<InvestmentId, Investment>,
    by_pair: HashMap<(ProfileId, OpportunityId), InvestmentId>,
}

/// The investment store
#[derive(Clone, Default)]
pub struct InvestmentBook {
    inner: Arc<RwLock<BookInner>>,
}

impl InvestmentBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get an investment by id
    pub async fn get(&self, id: &InvestmentId) -> Option<Investment> {
        self.inner.read().await.investments.get(id).cloned()
    }

    /// Get the row for an (investor, opportunity) pair
    pub async fn find_for_pair(
        &self,
        investor: &ProfileId,
        opportunity: &OpportunityId,
    ) -> Option<Investment> {
        let inner = self.inner.read().await;
        inner
            .by_pair
            .get(&(*investor, *opportunity))
            .and_then(|id| inner.investments.get(id))
            .cloned()
    }

    /// All investments in an opportunity
    pub async fn list_for_opportunity(&self, opportunity: &OpportunityId) -> Vec<Investment> {
        let inner = self.inner.read().await;
        inner
            .investments
            .values()
            .filter(|i| &i.opportunity == opportunity)
            .cloned()
            .collect()
    }

    /// All investments held by an investor
    pub async fn list_for_investor(&self, investor: &ProfileId) -> Vec<Investment> {
        let inner = self.inner.read().await;
        inner
            .investments
            .values()
            .filter(|i| &i.investor == investor)
            .cloned()
            .collect()
    }

    /// Create a row for a first purchase or merge a repeat purchase
    ///
    /// Totals are recomputed from the snapshotted share price so that the
    /// merged row is indistinguishable from a single purchase of the total
    /// share count. Returns the row and whether it was newly created.
    pub async fn upsert_purchase(
        &self,
        investor: ProfileId,
        opportunity: &Opportunity,
        shares: u32,
        mode: InvestmentMode,
    ) -> Result<(Investment, bool)> {
        let mut inner = self.inner.write().await;
        let now = Utc::now();

        if let Some(id) = inner.by_pair.get(&(investor, opportunity.id)).copied() {
            let investment = inner
                .investments
                .get_mut(&id)
                .ok_or_else(|| FundcoreError::processing("investment index out of sync"))?;

            if investment.mode != mode {
                return Err(FundcoreError::InvalidInput {
                    field: "mode".to_string(),
                    reason: format!(
                        "existing investment uses mode {}, repeat purchase requested {}",
                        investment.mode, mode
                    ),
                });
            }

            investment.shares += shares;
            investment.total_investment =
                Investment::principal(investment.shares, investment.share_price);
            investment.total_payment_required = Investment::payment_required(
                investment.shares,
                investment.share_price,
                opportunity.service_fee_per_share,
                investment.mode,
            );
            investment.updated_at = now;
            return Ok((investment.clone(), false));
        }

        let investment = Investment {
            id: InvestmentId::new(),
            investor,
            opportunity: opportunity.id,
            shares,
            share_price: opportunity.share_price,
            mode,
            total_investment: Investment::principal(shares, opportunity.share_price),
            total_payment_required: Investment::payment_required(
                shares,
                opportunity.share_price,
                opportunity.service_fee_per_share,
                mode,
            ),
            status: InvestmentStatus::Active,
            merchandise_status: MerchandiseStatus::Pending,
            distribution_status: DistributionStatus::Pending,
            expected_profit_per_share: opportunity.expected_profit_per_share,
            actual_profit_per_share: None,
            actual_net_profit_per_share: None,
            distributed_profit: Decimal::ZERO,
            created_at: now,
            updated_at: now,
            merchandise_arrived_at: None,
            distributed_at: None,
        };

        inner.by_pair.insert((investor, opportunity.id), investment.id);
        inner.investments.insert(investment.id, investment.clone());
        Ok((investment, true))
    }

    /// Confirm merchandise arrival (Myself investments only)
    ///
    /// Monotonic: a repeat confirmation is reported as `AlreadyArrived`, not
    /// an error, so the calling admin tool can retry safely.
    pub async fn confirm_merchandise_arrival(
        &self,
        id: &InvestmentId,
        now: DateTime<Utc>,
    ) -> Result<ArrivalOutcome> {
        let mut inner = self.inner.write().await;
        let investment =
            inner
                .investments
                .get_mut(id)
                .ok_or_else(|| FundcoreError::InvestmentNotFound {
                    investment_id: id.to_string(),
                })?;

        if investment.mode != InvestmentMode::Myself {
            return Err(FundcoreError::WrongInvestmentMode {
                investment_id: id.to_string(),
                mode: investment.mode.to_string(),
            });
        }

        match investment.merchandise_status {
            MerchandiseStatus::Arrived => Ok(ArrivalOutcome::AlreadyArrived(investment.clone())),
            MerchandiseStatus::Pending => {
                investment.merchandise_status = MerchandiseStatus::Arrived;
                investment.merchandise_arrived_at = Some(now);
                investment.updated_at = now;
                Ok(ArrivalOutcome::Confirmed(investment.clone()))
            }
        }
    }

    /// Cascade the opportunity's recorded actual profit to its Authorize
    /// investments that do not yet carry a value
    ///
    /// Per-investment values are settable once; rows that already carry one
    /// are left untouched. Returns the number of rows updated.
    pub async fn cascade_actual_profit(
        &self,
        opportunity: &OpportunityId,
        profit_per_share: Decimal,
        net_profit_per_share: Decimal,
    ) -> usize {
        let mut inner = self.inner.write().await;
        let now = Utc::now();
        let mut updated = 0;

        for investment in inner.investments.values_mut() {
            if &investment.opportunity != opportunity
                || investment.mode != InvestmentMode::Authorize
                || investment.actual_profit_per_share.is_some()
            {
                continue;
            }
            investment.actual_profit_per_share = Some(profit_per_share);
            investment.actual_net_profit_per_share = Some(net_profit_per_share);
            investment.updated_at = now;
            updated += 1;
        }
        updated
    }

    /// Record a completed profit distribution on one investment
    ///
    /// Guarded: Authorize mode, a recorded actual profit, and Pending
    /// distribution status are all required; the flip is monotonic.
    pub async fn mark_distributed(
        &self,
        id: &InvestmentId,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Investment> {
        let mut inner = self.inner.write().await;
        let investment =
            inner
                .investments
                .get_mut(id)
                .ok_or_else(|| FundcoreError::InvestmentNotFound {
                    investment_id: id.to_string(),
                })?;

        if investment.mode != InvestmentMode::Authorize {
            return Err(FundcoreError::WrongInvestmentMode {
                investment_id: id.to_string(),
                mode: investment.mode.to_string(),
            });
        }
        if investment.actual_net_profit_per_share.is_none() {
            return Err(FundcoreError::ProfitNotRecorded {
                opportunity_id: investment.opportunity.to_string(),
            });
        }
        if investment.distribution_status == DistributionStatus::Distributed {
            return Err(FundcoreError::ProfitAlreadyRecorded {
                opportunity_id: investment.opportunity.to_string(),
            });
        }

        investment.distribution_status = DistributionStatus::Distributed;
        investment.distributed_profit = amount;
        investment.distributed_at = Some(now);
        investment.updated_at = now;
        Ok(investment.clone())
    }

    /// Total shares recorded across an opportunity's investments
    pub async fn total_shares_for_opportunity(&self, opportunity: &OpportunityId) -> u32 {
        let inner = self.inner.read().await;
        inner
            .investments
            .values()
            .filter(|i| &i.opportunity == opportunity)
            .map(|i| i.shares)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fundcore_types::OpportunityStatus;
    use rust_decimal_macros::dec;

    fn opportunity() -> Opportunity {
        Opportunity {
            id: OpportunityId::new(),
            owner: ProfileId::new(),
            status: OpportunityStatus::Open,
            total_shares: 100,
            reserved_shares: 0,
            min_shares: 1,
            max_shares: 20,
            share_price: dec!(1000),
            service_fee_per_share: dec!(50),
            expected_profit_per_share: Some(dec!(120)),
            actual_profit_per_share: None,
            actual_net_profit_per_share: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_first_purchase_snapshots_price() {
        let book = InvestmentBook::new();
        let investor = ProfileId::new();
        let opp = opportunity();

        let (investment, is_new) = book
            .upsert_purchase(investor, &opp, 2, InvestmentMode::Myself)
            .await
            .unwrap();

        assert!(is_new);
        assert_eq!(investment.shares, 2);
        assert_eq!(investment.share_price, dec!(1000));
        assert_eq!(investment.total_investment, dec!(2000));
        assert_eq!(investment.total_payment_required, dec!(2100));
    }

    #[tokio::test]
    async fn test_repeat_purchase_merges() {
        let book = InvestmentBook::new();
        let investor = ProfileId::new();
        let opp = opportunity();

        let (first, _) = book
            .upsert_purchase(investor, &opp, 2, InvestmentMode::Myself)
            .await
            .unwrap();
        let (merged, is_new) = book
            .upsert_purchase(investor, &opp, 1, InvestmentMode::Myself)
            .await
            .unwrap();

        assert!(!is_new);
        assert_eq!(merged.id, first.id);
        assert_eq!(merged.shares, 3);
        assert_eq!(merged.total_investment, dec!(3000));
        assert_eq!(merged.total_payment_required, dec!(3150));
    }

    #[tokio::test]
    async fn test_mode_mismatch_on_merge_rejected() {
        let book = InvestmentBook::new();
        let investor = ProfileId::new();
        let opp = opportunity();

        book.upsert_purchase(investor, &opp, 2, InvestmentMode::Myself)
            .await
            .unwrap();
        let result = book
            .upsert_purchase(investor, &opp, 1, InvestmentMode::Authorize)
            .await;
        assert!(matches!(result, Err(FundcoreError::InvalidInput { .. })));
    }

    #[tokio::test]
    async fn test_merchandise_arrival_is_monotonic() {
        let book = InvestmentBook::new();
        let investor = ProfileId::new();
        let opp = opportunity();
        let (investment, _) = book
            .upsert_purchase(investor, &opp, 2, InvestmentMode::Myself)
            .await
            .unwrap();

        let first = book
            .confirm_merchandise_arrival(&investment.id, Utc::now())
            .await
            .unwrap();
        assert!(matches!(first, ArrivalOutcome::Confirmed(_)));

        let second = book
            .confirm_merchandise_arrival(&investment.id, Utc::now())
            .await
            .unwrap();
        let ArrivalOutcome::AlreadyArrived(row) = second else {
            panic!("expected AlreadyArrived");
        };
        assert_eq!(row.merchandise_status, MerchandiseStatus::Arrived);
    }

    #[tokio::test]
    async fn test_merchandise_arrival_rejected_for_authorize() {
        let book = InvestmentBook::new();
        let investor = ProfileId::new();
        let opp = opportunity();
        let (investment, _) = book
            .upsert_purchase(investor, &opp, 2, InvestmentMode::Authorize)
            .await
            .unwrap();

        let result = book
            .confirm_merchandise_arrival(&investment.id, Utc::now())
            .await;
        assert!(matches!(
            result,
            Err(FundcoreError::WrongInvestmentMode { .. })
        ));
    }

    #[tokio::test]
    async fn test_cascade_skips_rows_with_recorded_profit() {
        let book = InvestmentBook::new();
        let opp = opportunity();
        let (a, _) = book
            .upsert_purchase(ProfileId::new(), &opp, 2, InvestmentMode::Authorize)
            .await
            .unwrap();
        book.upsert_purchase(ProfileId::new(), &opp, 3, InvestmentMode::Authorize)
            .await
            .unwrap();
        // Myself rows never receive a cascade.
        book.upsert_purchase(ProfileId::new(), &opp, 1, InvestmentMode::Myself)
            .await
            .unwrap();

        assert_eq!(book.cascade_actual_profit(&opp.id, dec!(150), dec!(130)).await, 2);
        // Re-running cascades nothing new.
        assert_eq!(book.cascade_actual_profit(&opp.id, dec!(999), dec!(999)).await, 0);

        let row = book.get(&a.id).await.unwrap();
        assert_eq!(row.actual_net_profit_per_share, Some(dec!(130)));
    }

    #[tokio::test]
    async fn test_mark_distributed_requires_recorded_profit() {
        let book = InvestmentBook::new();
        let opp = opportunity();
        let (investment, _) = book
            .upsert_purchase(ProfileId::new(), &opp, 2, InvestmentMode::Authorize)
            .await
            .unwrap();

        let premature = book
            .mark_distributed(&investment.id, dec!(260), Utc::now())
            .await;
        assert!(matches!(
            premature,
            Err(FundcoreError::ProfitNotRecorded { .. })
        ));

        book.cascade_actual_profit(&opp.id, dec!(150), dec!(130)).await;
        let distributed = book
            .mark_distributed(&investment.id, dec!(260), Utc::now())
            .await
            .unwrap();
        assert_eq!(distributed.distribution_status, DistributionStatus::Distributed);
        assert_eq!(distributed.distributed_profit, dec!(260));

        // Monotonic: cannot distribute twice.
        let again = book
            .mark_distributed(&investment.id, dec!(260), Utc::now())
            .await;
        assert!(again.is_err());
    }
}
