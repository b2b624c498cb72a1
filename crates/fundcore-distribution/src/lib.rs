//! Fundcore Distribution - Post-funding lifecycle transitions
//!
//! Two administrative operations, each idempotent per investment:
//!
//! - **Merchandise arrival** (Myself investments): Pending -> Arrived, once;
//!   retries are no-op successes so admin tooling can repeat safely.
//! - **Profit distribution** (Authorize investments): the actual profit is
//!   recorded once per opportunity and cascaded to its investments; the
//!   distribution batch then credits each pending investment's wallet and
//!   flips it to Distributed. A failure on one investment never aborts its
//!   siblings, and whatever stayed Pending is picked up by a re-run.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use fundcore_allocation::{ArrivalOutcome, InvestmentBook, OpportunityDirectory};
use fundcore_events::{DomainEvent, EventKind, EventSink};
use fundcore_ledger::{EntryMeta, Ledger};
use fundcore_types::{
    DistributionStatus, FundcoreError, Investment, InvestmentId, InvestmentMode, OpportunityId,
    Result,
};
use rust_decimal::Decimal;
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};

/// Summary of one distribution batch
#[derive(Debug, Clone, Default)]
pub struct DistributionReport {
    /// Investments credited and flipped in this run
    pub distributed: usize,
    /// Investments left Pending (no recorded profit, or a credit failure)
    pub skipped: usize,
    /// Total amount credited across the batch
    pub total_credited: Decimal,
}

/// The distribution engine
#[derive(Clone)]
pub struct DistributionEngine {
    directory: Arc<dyn OpportunityDirectory>,
    book: InvestmentBook,
    ledger: Ledger,
    events: Arc<dyn EventSink>,
    /// Serializes distribution batches per opportunity
    batch_guards: Arc<RwLock<HashMap<OpportunityId, Arc<Mutex<()>>>>>,
}

impl DistributionEngine {
    pub fn new(
        directory: Arc<dyn OpportunityDirectory>,
        book: InvestmentBook,
        ledger: Ledger,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            directory,
            book,
            ledger,
            events,
            batch_guards: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Confirm that the merchandise of a Myself investment has arrived
    ///
    /// Idempotent: confirming an already-arrived investment succeeds without
    /// re-stamping or re-publishing.
    pub async fn confirm_merchandise_arrival(&self, id: &InvestmentId) -> Result<Investment> {
        match self.book.confirm_merchandise_arrival(id, Utc::now()).await? {
            ArrivalOutcome::Confirmed(investment) => {
                info!(investment = %id, "merchandise arrival confirmed");
                self.publish(EventKind::MerchandiseArrived {
                    investor: investment.investor,
                    investment: investment.id,
                })
                .await;
                Ok(investment)
            }
            ArrivalOutcome::AlreadyArrived(investment) => Ok(investment),
        }
    }

    /// Record the actual profit for an opportunity and cascade it
    ///
    /// Settable once per opportunity; the cascade writes the figure onto
    /// every Authorize investment that does not yet carry one. Returns the
    /// number of investments updated.
    pub async fn record_actual_profit(
        &self,
        opportunity_id: &OpportunityId,
        profit_per_share: Decimal,
        net_profit_per_share: Decimal,
    ) -> Result<usize> {
        if profit_per_share <= Decimal::ZERO || net_profit_per_share <= Decimal::ZERO {
            return Err(FundcoreError::InvalidAmount {
                message: "Profit per share must be greater than zero".to_string(),
            });
        }
        if net_profit_per_share > profit_per_share {
            return Err(FundcoreError::InvalidInput {
                field: "net_profit_per_share".to_string(),
                reason: "net profit cannot exceed gross profit".to_string(),
            });
        }

        self.directory
            .record_actual_profit(opportunity_id, profit_per_share, net_profit_per_share)
            .await?;
        let updated = self
            .book
            .cascade_actual_profit(opportunity_id, profit_per_share, net_profit_per_share)
            .await;
        info!(
            opportunity = %opportunity_id,
            updated,
            "actual profit recorded and cascaded"
        );
        Ok(updated)
    }

    /// Distribute profit for every eligible investment in an opportunity
    ///
    /// Eligible: Authorize mode, a recorded actual profit, distribution
    /// status Pending. Each credit-and-flip is atomic; investments that fail
    /// stay Pending so the batch is safely re-runnable.
    pub async fn distribute_profits(
        &self,
        opportunity_id: &OpportunityId,
    ) -> Result<DistributionReport> {
        let guard_handle = {
            let mut guards = self.batch_guards.write().await;
            guards
                .entry(*opportunity_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let _guard = guard_handle.lock().await;

        let opportunity = self.directory.get(opportunity_id).await?;
        if opportunity.actual_net_profit_per_share.is_none() {
            return Err(FundcoreError::ProfitNotRecorded {
                opportunity_id: opportunity_id.to_string(),
            });
        }

        let mut report = DistributionReport::default();
        for investment in self.book.list_for_opportunity(opportunity_id).await {
            if investment.mode != InvestmentMode::Authorize
                || investment.distribution_status != DistributionStatus::Pending
            {
                continue;
            }

            // A row without a recorded value (e.g. settled after the profit
            // was recorded) stays Pending for a later cascade and re-run.
            let Some(net_per_share) = investment.actual_net_profit_per_share else {
                report.skipped += 1;
                continue;
            };

            let amount = Decimal::from(investment.shares) * net_per_share;
            let meta = EntryMeta::new("profit_distribution", Some(investment.id.to_string()));
            if let Err(e) = self.ledger.deposit(&investment.investor, amount, meta).await {
                warn!(
                    investment = %investment.id,
                    error = %e,
                    "profit credit failed; investment stays pending"
                );
                report.skipped += 1;
                continue;
            }

            match self
                .book
                .mark_distributed(&investment.id, amount, Utc::now())
                .await
            {
                Ok(distributed) => {
                    report.distributed += 1;
                    report.total_credited += amount;
                    self.publish(EventKind::ProfitDistributed {
                        investor: distributed.investor,
                        opportunity: *opportunity_id,
                        investment: distributed.id,
                        amount,
                    })
                    .await;
                }
                Err(e) => {
                    // The credit is committed; surface loudly and keep going.
                    error!(
                        investment = %investment.id,
                        error = %e,
                        "credited but could not flip distribution status"
                    );
                    report.skipped += 1;
                }
            }
        }

        info!(
            opportunity = %opportunity_id,
            distributed = report.distributed,
            skipped = report.skipped,
            total = %report.total_credited,
            "profit distribution batch finished"
        );
        Ok(report)
    }

    async fn publish(&self, kind: EventKind) {
        if let Err(e) = self.events.publish(DomainEvent::new(kind)).await {
            warn!(error = %e, "event sink rejected distribution event");
        }
    }
}
