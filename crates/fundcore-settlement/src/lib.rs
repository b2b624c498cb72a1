//! Fundcore Settlement - Webhook-driven payment finalization
//!
//! The engine consumes canonical gateway transaction results and applies the
//! financial side effect of each payment intention exactly once, no matter
//! how many times and how concurrently the gateway delivers the event.
//!
//! Guard layering:
//!
//! 1. A short-TTL [`LeaseMap`] keyed by intention id absorbs
//!    near-simultaneous duplicate deliveries cheaply.
//! 2. The authoritative guard is the intention store's execution ticket: the
//!    persisted `is_executed` flag is re-read under the per-intention
//!    execution lock, and the side effect commits together with the flag.
//!
//! A delivery that matches no intention is acknowledged benignly (the
//! gateway is never pushed into a retry storm) and surfaced as a diagnostic
//! event.

mod lease;

pub use lease::{Lease, LeaseMap};

use std::sync::Arc;
use std::time::Duration;

use fundcore_allocation::Allocator;
use fundcore_events::{DomainEvent, EventKind, EventSink};
use fundcore_intentions::IntentionStore;
use fundcore_ledger::{EntryMeta, Ledger};
use fundcore_types::{
    FundcoreError, IntentionPurpose, PaymentIntention, Result, TransactionResult,
};
use tracing::{error, info, warn};

/// Default TTL for the idempotency lease
pub const DEFAULT_LEASE_TTL: Duration = Duration::from_secs(5);

/// What a settlement attempt did
#[derive(Debug, Clone)]
pub enum SettlementOutcome {
    /// No intention matched any correlation identifier; acknowledged
    NotMatched { reference: String },
    /// The intention was already finalized; nothing was re-applied
    AlreadyFinalized { intention: PaymentIntention },
    /// The side effect was applied and the intention completed
    Completed { intention: PaymentIntention },
    /// The gateway reported failure; the intention was marked failed
    Failed { intention: PaymentIntention },
}

/// The settlement engine
#[derive(Clone)]
pub struct SettlementEngine {
    intentions: IntentionStore,
    ledger: Ledger,
    allocator: Allocator,
    events: Arc<dyn EventSink>,
    leases: LeaseMap,
}

impl SettlementEngine {
    pub fn new(
        intentions: IntentionStore,
        ledger: Ledger,
        allocator: Allocator,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self::with_lease_ttl(intentions, ledger, allocator, events, DEFAULT_LEASE_TTL)
    }

    pub fn with_lease_ttl(
        intentions: IntentionStore,
        ledger: Ledger,
        allocator: Allocator,
        events: Arc<dyn EventSink>,
        lease_ttl: Duration,
    ) -> Self {
        Self {
            intentions,
            ledger,
            allocator,
            events,
            leases: LeaseMap::new(lease_ttl),
        }
    }

    /// Settle a canonical gateway transaction result
    ///
    /// Errors are returned only for failures *before* the commit point; the
    /// intention is then untouched and the next duplicate delivery (or a
    /// manual replay) retries safely.
    pub async fn settle(&self, result: TransactionResult) -> Result<SettlementOutcome> {
        let Some(intention) = self.lookup(&result).await else {
            let reference = result.reference().to_string();
            warn!(reference = %reference, "gateway notification matched no intention");
            self.publish(EventKind::PaymentNotFound {
                reference: reference.clone(),
            })
            .await;
            return Ok(SettlementOutcome::NotMatched { reference });
        };

        // Cheap pre-check before taking the lease.
        if intention.is_executed || intention.status.is_terminal() {
            return Ok(SettlementOutcome::AlreadyFinalized { intention });
        }

        // Performance guard. On timeout we proceed regardless; the execution
        // ticket below is the guard that actually matters.
        let lease_key = intention.id.to_string();
        let _lease = self.leases.acquire(&lease_key).await;

        let ticket = match self.intentions.begin_execution(&intention.id).await {
            Ok(ticket) => ticket,
            Err(FundcoreError::AlreadyExecuted { .. })
            | Err(FundcoreError::InvalidTransition { .. }) => {
                let current = self
                    .intentions
                    .get(&intention.id)
                    .await
                    .unwrap_or(intention);
                info!(intention = %current.id, status = %current.status, "duplicate delivery ignored");
                return Ok(SettlementOutcome::AlreadyFinalized { intention: current });
            }
            Err(e) => return Err(e),
        };

        let intention = ticket.intention().clone();

        if !result.success {
            let finalized = ticket
                .commit_failure(result.gateway_transaction_id.clone(), result.raw.clone())
                .await?;
            info!(intention = %finalized.id, "payment failed at the gateway");
            self.publish(EventKind::PaymentFailed {
                owner: finalized.owner,
                intention: finalized.id,
            })
            .await;
            return Ok(SettlementOutcome::Failed {
                intention: finalized,
            });
        }

        if result.amount != intention.amount {
            error!(
                intention = %intention.id,
                expected = %intention.amount,
                reported = %result.amount,
                "gateway amount does not match the intention"
            );
            return Err(FundcoreError::PaymentProcessingFailed {
                reason: "gateway amount does not match the intention".to_string(),
            });
        }

        // Apply the side effect, then commit it together with the executed
        // flag through the ticket. A failure here drops the ticket and the
        // intention stays retryable.
        let event = match &intention.purpose {
            IntentionPurpose::WalletCharge => {
                let amount = intention.amount.to_decimal();
                let meta = EntryMeta::new("gateway", Some(intention.merchant_reference.clone()));
                self.ledger.deposit(&intention.owner, amount, meta).await?;
                EventKind::WalletCharged {
                    owner: intention.owner,
                    intention: intention.id,
                    amount: intention.amount,
                }
            }
            IntentionPurpose::Investment {
                opportunity,
                shares,
                mode,
                ..
            } => {
                let outcome = self
                    .allocator
                    .purchase(intention.owner, opportunity, *shares, *mode)
                    .await?;
                if outcome.is_new {
                    EventKind::InvestmentPurchased {
                        investor: intention.owner,
                        opportunity: *opportunity,
                        investment: outcome.investment.id,
                        shares: outcome.shares_added,
                    }
                } else {
                    EventKind::InvestmentUpdated {
                        investor: intention.owner,
                        opportunity: *opportunity,
                        investment: outcome.investment.id,
                        shares_added: outcome.shares_added,
                        shares_total: outcome.investment.shares,
                    }
                }
            }
        };

        let finalized = ticket
            .commit_success(
                result.gateway_transaction_id.clone(),
                result.payment_method.clone(),
                result.raw.clone(),
            )
            .await?;

        info!(
            intention = %finalized.id,
            purpose = finalized.purpose.label(),
            "payment settled"
        );
        self.publish(event).await;

        Ok(SettlementOutcome::Completed {
            intention: finalized,
        })
    }

    /// Locate the matching intention
    ///
    /// Tried in order: gateway order id, merchant reference, gateway
    /// transaction id. Retries and redirects can omit any of the first two;
    /// the transaction id only resolves intentions that already completed.
    async fn lookup(&self, result: &TransactionResult) -> Option<PaymentIntention> {
        if let Some(order_id) = result.gateway_order_id.as_deref() {
            if let Some(intention) = self.intentions.find_by_order_id(order_id).await {
                return Some(intention);
            }
        }
        if let Some(reference) = result.merchant_reference.as_deref() {
            if let Some(intention) = self.intentions.find_by_reference(reference).await {
                return Some(intention);
            }
        }
        self.intentions
            .find_by_transaction_id(&result.gateway_transaction_id)
            .await
    }

    /// Best-effort event emission; never blocks or reverses settlement
    async fn publish(&self, kind: EventKind) {
        if let Err(e) = self.events.publish(DomainEvent::new(kind)).await {
            warn!(error = %e, "event sink rejected settlement event");
        }
    }
}
