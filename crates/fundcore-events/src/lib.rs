//! Fundcore Events - Domain events for external collaborators
//!
//! The settlement and distribution engines publish facts ("wallet charged",
//! "investment purchased") after committing state. Delivery is best-effort:
//! a sink failure is logged and never blocks or reverses the committed side
//! effect. Notification rendering and channels live entirely with the
//! consuming collaborator.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fundcore_types::{EventId, IntentionId, InvestmentId, Money, OpportunityId, ProfileId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

/// A domain event emitted by the settlement core
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent {
    pub id: EventId,
    pub occurred_at: DateTime<Utc>,
    pub kind: EventKind,
}

impl DomainEvent {
    pub fn new(kind: EventKind) -> Self {
        Self {
            id: EventId::new(),
            occurred_at: Utc::now(),
            kind,
        }
    }
}

/// The facts external collaborators consume
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    /// A wallet top-up settled
    WalletCharged {
        owner: ProfileId,
        intention: IntentionId,
        amount: Money,
    },
    /// An investment purchase settled (first purchase for the pair)
    InvestmentPurchased {
        investor: ProfileId,
        opportunity: OpportunityId,
        investment: InvestmentId,
        shares: u32,
    },
    /// A repeat purchase merged into an existing investment
    InvestmentUpdated {
        investor: ProfileId,
        opportunity: OpportunityId,
        investment: InvestmentId,
        shares_added: u32,
        shares_total: u32,
    },
    /// A payment attempt failed at the gateway
    PaymentFailed {
        owner: ProfileId,
        intention: IntentionId,
    },
    /// Diagnostic: a gateway notification matched no intention
    PaymentNotFound { reference: String },
    /// Merchandise arrival confirmed for a Myself investment
    MerchandiseArrived {
        investor: ProfileId,
        investment: InvestmentId,
    },
    /// Profit credited to an investor's wallet
    ProfitDistributed {
        investor: ProfileId,
        opportunity: OpportunityId,
        investment: InvestmentId,
        amount: Decimal,
    },
}

/// Sink for domain events
///
/// Implementations must not assume exactly-once delivery; the engines may
/// re-publish after a retried settlement attempt that failed before commit.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: DomainEvent) -> Result<(), EventSinkError>;
}

/// Sink failure, surfaced to the log only
#[derive(Debug, thiserror::Error)]
#[error("event sink failure: {0}")]
pub struct EventSinkError(pub String);

/// In-memory sink, primarily for tests and local runs
#[derive(Clone, Default)]
pub struct InMemorySink {
    events: Arc<RwLock<Vec<DomainEvent>>>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<DomainEvent> {
        self.events.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.events.read().await.is_empty()
    }
}

#[async_trait]
impl EventSink for InMemorySink {
    async fn publish(&self, event: DomainEvent) -> Result<(), EventSinkError> {
        self.events.write().await.push(event);
        Ok(())
    }
}

/// Sink that writes events to the tracing log
#[derive(Clone, Default)]
pub struct TracingSink;

#[async_trait]
impl EventSink for TracingSink {
    async fn publish(&self, event: DomainEvent) -> Result<(), EventSinkError> {
        tracing::info!(event_id = %event.id, kind = ?event.kind, "domain event");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fundcore_types::Currency;

    #[tokio::test]
    async fn test_in_memory_sink_records_events() {
        let sink = InMemorySink::new();
        let owner = ProfileId::new();
        let intention = IntentionId::new();

        sink.publish(DomainEvent::new(EventKind::WalletCharged {
            owner,
            intention,
            amount: Money::new(10000, Currency::Sar),
        }))
        .await
        .unwrap();

        let events = sink.events().await;
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0].kind, EventKind::WalletCharged { .. }));
    }

    #[tokio::test]
    async fn test_event_kind_serializes_with_tag() {
        let event = DomainEvent::new(EventKind::PaymentNotFound {
            reference: "order-9".to_string(),
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"]["type"], "payment_not_found");
    }
}
