//! Opportunity directory
//!
//! Opportunity CRUD belongs to an external collaborator; the settlement core
//! consumes it through this trait: read availability and owner identity,
//! mutate the share counters, record the actual profit. Counter mutations
//! are atomic read-modify-write under the implementation's lock.

use async_trait::async_trait;
use chrono::Utc;
use fundcore_types::{FundcoreError, Opportunity, OpportunityId, Result};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Lookup/mutation interface for opportunities
#[async_trait]
pub trait OpportunityDirectory: Send + Sync {
    /// Fetch an opportunity
    async fn get(&self, id: &OpportunityId) -> Result<Opportunity>;

    /// Atomically reserve shares from the pool
    ///
    /// Re-checks availability under the write lock and returns the updated
    /// opportunity, or `InsufficientShares` carrying the current
    /// availability.
    async fn reserve_shares(&self, id: &OpportunityId, shares: u32) -> Result<Opportunity>;

    /// Return previously reserved shares to the pool (compensation path)
    async fn release_shares(&self, id: &OpportunityId, shares: u32) -> Result<()>;

    /// Record the actual (and net) profit per share, once
    ///
    /// A second attempt is rejected with `ProfitAlreadyRecorded`.
    async fn record_actual_profit(
        &self,
        id: &OpportunityId,
        profit_per_share: Decimal,
        net_profit_per_share: Decimal,
    ) -> Result<Opportunity>;
}

/// In-memory opportunity directory
#[derive(Clone, Default)]
pub struct InMemoryOpportunityDirectory {
    opportunities: Arc<RwLock<HashMap<OpportunityId, Opportunity>>>,
}

impl InMemoryOpportunityDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed or replace an opportunity
    pub async fn insert(&self, opportunity: Opportunity) {
        self.opportunities
            .write()
            .await
            .insert(opportunity.id, opportunity);
    }
}

#[async_trait]
impl OpportunityDirectory for InMemoryOpportunityDirectory {
    async fn get(&self, id: &OpportunityId) -> Result<Opportunity> {
        self.opportunities
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| FundcoreError::OpportunityNotFound {
                opportunity_id: id.to_string(),
            })
    }

    async fn reserve_shares(&self, id: &OpportunityId, shares: u32) -> Result<Opportunity> {
        let mut opportunities = self.opportunities.write().await;
        let opportunity =
            opportunities
                .get_mut(id)
                .ok_or_else(|| FundcoreError::OpportunityNotFound {
                    opportunity_id: id.to_string(),
                })?;

        let available = opportunity.available_shares();
        if available < shares {
            return Err(FundcoreError::InsufficientShares {
                requested: shares,
                available,
            });
        }

        opportunity.reserved_shares += shares;
        opportunity.updated_at = Utc::now();
        Ok(opportunity.clone())
    }

    async fn release_shares(&self, id: &OpportunityId, shares: u32) -> Result<()> {
        let mut opportunities = self.opportunities.write().await;
        let opportunity =
            opportunities
                .get_mut(id)
                .ok_or_else(|| FundcoreError::OpportunityNotFound {
                    opportunity_id: id.to_string(),
                })?;

        opportunity.reserved_shares = opportunity.reserved_shares.saturating_sub(shares);
        opportunity.updated_at = Utc::now();
        Ok(())
    }

    async fn record_actual_profit(
        &self,
        id: &OpportunityId,
        profit_per_share: Decimal,
        net_profit_per_share: Decimal,
    ) -> Result<Opportunity> {
        let mut opportunities = self.opportunities.write().await;
        let opportunity =
            opportunities
                .get_mut(id)
                .ok_or_else(|| FundcoreError::OpportunityNotFound {
                    opportunity_id: id.to_string(),
                })?;

        if opportunity.actual_profit_per_share.is_some() {
            return Err(FundcoreError::ProfitAlreadyRecorded {
                opportunity_id: id.to_string(),
            });
        }

        opportunity.actual_profit_per_share = Some(profit_per_share);
        opportunity.actual_net_profit_per_share = Some(net_profit_per_share);
        opportunity.updated_at = Utc::now();
        Ok(opportunity.clone())
    }
}
