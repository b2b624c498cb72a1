//! Fundcore Intentions - Payment intention store and state machine
//!
//! Every attempted external payment is recorded as a `PaymentIntention` and
//! finalized through an [`ExecutionTicket`]: the ticket holds a per-intention
//! exclusive guard, re-checks the persisted `is_executed` flag under it, and
//! commits the settlement side effect together with the status flip as one
//! unit. A ticket dropped before commit leaves the intention untouched and
//! retryable by the next duplicate delivery.
//!
//! # Invariants
//!
//! 1. `is_executed` transitions false -> true exactly once, never back
//! 2. Terminal statuses are final; the expiry sweep never overwrites them
//! 3. Lookup indexes (gateway order id, merchant reference, gateway
//!    transaction id) always point at the intention that registered them

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use fundcore_types::{
    FundcoreError, IntentionId, IntentionPurpose, IntentionStatus, Money, PaymentIntention,
    ProfileId, Result,
};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{info, warn};

#[derive(Default)]
struct StoreInner {
    intentions: HashMap<IntentionId, PaymentIntention>,
    by_order: HashMap<String, IntentionId>,
    by_reference: HashMap<String, IntentionId>,
    by_transaction: HashMap<String, IntentionId>,
    exec_guards: HashMap<IntentionId, Arc<Mutex<()>>>,
}

/// The payment intention store
///
/// Thread-safe; intentions are never deleted.
#[derive(Clone, Default)]
pub struct IntentionStore {
    inner: Arc<RwLock<StoreInner>>,
}

impl IntentionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new intention in Created status
    ///
    /// The merchant reference must be unique per attempt; reuse is rejected.
    pub async fn create(
        &self,
        owner: ProfileId,
        purpose: IntentionPurpose,
        amount: Money,
        merchant_reference: String,
        time_to_live: Duration,
    ) -> Result<PaymentIntention> {
        if !amount.is_positive() {
            return Err(FundcoreError::InvalidAmount {
                message: "Payment amount must be greater than zero".to_string(),
            });
        }

        let mut inner = self.inner.write().await;
        if inner.by_reference.contains_key(&merchant_reference) {
            return Err(FundcoreError::DuplicateReference {
                reference: merchant_reference,
            });
        }

        let intention = PaymentIntention::new(
            owner,
            purpose,
            amount,
            merchant_reference.clone(),
            Utc::now() + time_to_live,
        );
        info!(intention = %intention.id, purpose = intention.purpose.label(), "payment intention created");

        inner.by_reference.insert(merchant_reference, intention.id);
        inner.intentions.insert(intention.id, intention.clone());
        Ok(intention)
    }

    /// Register the gateway session: Created -> Active, indexes the gateway ids
    pub async fn mark_active(
        &self,
        id: &IntentionId,
        gateway_order_id: String,
        gateway_intention_id: String,
    ) -> Result<PaymentIntention> {
        let mut inner = self.inner.write().await;
        let intention = inner
            .intentions
            .get_mut(id)
            .ok_or_else(|| FundcoreError::IntentionNotFound {
                intention_id: id.to_string(),
            })?;

        if !intention.status.can_transition_to(IntentionStatus::Active) {
            return Err(FundcoreError::InvalidTransition {
                intention_id: id.to_string(),
                from: intention.status.to_string(),
                to: IntentionStatus::Active.to_string(),
            });
        }

        intention.status = IntentionStatus::Active;
        intention.gateway_order_id = Some(gateway_order_id.clone());
        intention.gateway_intention_id = Some(gateway_intention_id);
        let snapshot = intention.clone();

        inner.by_order.insert(gateway_order_id, *id);
        Ok(snapshot)
    }

    /// Lookup by internal id
    pub async fn get(&self, id: &IntentionId) -> Option<PaymentIntention> {
        self.inner.read().await.intentions.get(id).cloned()
    }

    /// Lookup by gateway order id
    pub async fn find_by_order_id(&self, order_id: &str) -> Option<PaymentIntention> {
        let inner = self.inner.read().await;
        inner
            .by_order
            .get(order_id)
            .and_then(|id| inner.intentions.get(id))
            .cloned()
    }

    /// Lookup by merchant reference
    pub async fn find_by_reference(&self, reference: &str) -> Option<PaymentIntention> {
        let inner = self.inner.read().await;
        inner
            .by_reference
            .get(reference)
            .and_then(|id| inner.intentions.get(id))
            .cloned()
    }

    /// Lookup by gateway transaction id (only indexed after completion)
    pub async fn find_by_transaction_id(&self, transaction_id: &str) -> Option<PaymentIntention> {
        let inner = self.inner.read().await;
        inner
            .by_transaction
            .get(transaction_id)
            .and_then(|id| inner.intentions.get(id))
            .cloned()
    }

    /// Open an execution ticket for finalizing an intention
    ///
    /// Awaits the per-intention exclusive guard, then re-reads the persisted
    /// state under it: this is the authoritative idempotency check. Returns
    /// `AlreadyExecuted` if the side effect already ran, `InvalidTransition`
    /// if the intention is otherwise terminal.
    pub async fn begin_execution(&self, id: &IntentionId) -> Result<ExecutionTicket> {
        let guard_handle = {
            let mut inner = self.inner.write().await;
            if !inner.intentions.contains_key(id) {
                return Err(FundcoreError::IntentionNotFound {
                    intention_id: id.to_string(),
                });
            }
            inner
                .exec_guards
                .entry(*id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };

        // Serialize executions for this intention; the store lock is not
        // held while waiting.
        let guard = guard_handle.lock_owned().await;

        let intention = self
            .get(id)
            .await
            .ok_or_else(|| FundcoreError::IntentionNotFound {
                intention_id: id.to_string(),
            })?;

        if intention.is_executed {
            return Err(FundcoreError::AlreadyExecuted {
                intention_id: id.to_string(),
            });
        }
        if intention.status.is_terminal() {
            return Err(FundcoreError::InvalidTransition {
                intention_id: id.to_string(),
                from: intention.status.to_string(),
                to: "executing".to_string(),
            });
        }

        Ok(ExecutionTicket {
            store: self.inner.clone(),
            intention,
            _guard: guard,
        })
    }

    /// Expiry sweep: mark overdue non-terminal intentions Expired
    ///
    /// Intentions whose execution guard is currently held are skipped; the
    /// in-flight settlement decides their fate. Terminal intentions are
    /// never touched. Returns the ids that were expired.
    pub async fn expire_overdue(&self, now: DateTime<Utc>) -> Vec<IntentionId> {
        let candidates: Vec<IntentionId> = {
            let inner = self.inner.read().await;
            inner
                .intentions
                .values()
                .filter(|i| i.is_overdue(now))
                .map(|i| i.id)
                .collect()
        };

        let mut expired = Vec::new();
        for id in candidates {
            let guard_handle = {
                let mut inner = self.inner.write().await;
                inner
                    .exec_guards
                    .entry(id)
                    .or_insert_with(|| Arc::new(Mutex::new(())))
                    .clone()
            };
            let Ok(_guard) = guard_handle.try_lock() else {
                continue;
            };

            let mut inner = self.inner.write().await;
            if let Some(intention) = inner.intentions.get_mut(&id) {
                // Re-check under the guard: a settlement may have finished
                // between the scan and here.
                if intention.is_overdue(now) {
                    intention.status = IntentionStatus::Expired;
                    intention.processed_at = Some(now);
                    warn!(intention = %id, "payment intention expired");
                    expired.push(id);
                }
            }
        }
        expired
    }

    /// Number of stored intentions
    pub async fn len(&self) -> usize {
        self.inner.read().await.intentions.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.intentions.is_empty()
    }
}

/// Exclusive right to finalize one intention
///
/// Holds the per-intention guard from [`IntentionStore::begin_execution`]
/// until dropped. Committing applies the final state; dropping without a
/// commit leaves the intention exactly as it was.
pub struct ExecutionTicket {
    store: Arc<RwLock<StoreInner>>,
    intention: PaymentIntention,
    _guard: OwnedMutexGuard<()>,
}

impl ExecutionTicket {
    /// The intention snapshot taken under the guard
    pub fn intention(&self) -> &PaymentIntention {
        &self.intention
    }

    /// Commit a successful settlement: Completed + `is_executed = true`
    pub async fn commit_success(
        self,
        gateway_transaction_id: String,
        payment_method: Option<String>,
        raw_response: serde_json::Value,
    ) -> Result<PaymentIntention> {
        self.commit(
            IntentionStatus::Completed,
            true,
            gateway_transaction_id,
            payment_method,
            raw_response,
        )
        .await
    }

    /// Commit a failed settlement: Failed, no side effect, flag untouched
    pub async fn commit_failure(
        self,
        gateway_transaction_id: String,
        raw_response: serde_json::Value,
    ) -> Result<PaymentIntention> {
        self.commit(
            IntentionStatus::Failed,
            false,
            gateway_transaction_id,
            None,
            raw_response,
        )
        .await
    }

    async fn commit(
        self,
        status: IntentionStatus,
        executed: bool,
        gateway_transaction_id: String,
        payment_method: Option<String>,
        raw_response: serde_json::Value,
    ) -> Result<PaymentIntention> {
        let id = self.intention.id;
        let mut inner = self.store.write().await;
        let intention =
            inner
                .intentions
                .get_mut(&id)
                .ok_or_else(|| FundcoreError::IntentionNotFound {
                    intention_id: id.to_string(),
                })?;

        if !intention.status.can_transition_to(status) {
            return Err(FundcoreError::InvalidTransition {
                intention_id: id.to_string(),
                from: intention.status.to_string(),
                to: status.to_string(),
            });
        }

        intention.status = status;
        intention.is_executed = executed;
        intention.gateway_transaction_id = Some(gateway_transaction_id.clone());
        intention.payment_method = payment_method;
        intention.raw_response = Some(raw_response);
        intention.processed_at = Some(Utc::now());
        let snapshot = intention.clone();

        inner.by_transaction.insert(gateway_transaction_id, id);
        info!(intention = %id, status = %snapshot.status, "payment intention finalized");
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fundcore_types::Currency;
    use serde_json::json;

    fn store() -> IntentionStore {
        IntentionStore::new()
    }

    async fn charge(store: &IntentionStore, reference: &str) -> PaymentIntention {
        store
            .create(
                ProfileId::new(),
                IntentionPurpose::WalletCharge,
                Money::new(10000, Currency::Sar),
                reference.to_string(),
                Duration::minutes(30),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_and_lookup_by_reference() {
        let store = store();
        let intention = charge(&store, "ref-1").await;

        let found = store.find_by_reference("ref-1").await.unwrap();
        assert_eq!(found.id, intention.id);
        assert_eq!(found.status, IntentionStatus::Created);
    }

    #[tokio::test]
    async fn test_duplicate_reference_rejected() {
        let store = store();
        charge(&store, "ref-1").await;

        let result = store
            .create(
                ProfileId::new(),
                IntentionPurpose::WalletCharge,
                Money::new(500, Currency::Sar),
                "ref-1".to_string(),
                Duration::minutes(30),
            )
            .await;
        assert!(matches!(
            result,
            Err(FundcoreError::DuplicateReference { .. })
        ));
    }

    #[tokio::test]
    async fn test_mark_active_indexes_order_id() {
        let store = store();
        let intention = charge(&store, "ref-1").await;

        store
            .mark_active(&intention.id, "order-55".to_string(), "gi-55".to_string())
            .await
            .unwrap();

        let found = store.find_by_order_id("order-55").await.unwrap();
        assert_eq!(found.id, intention.id);
        assert_eq!(found.status, IntentionStatus::Active);
    }

    #[tokio::test]
    async fn test_commit_success_sets_flag_and_indexes_transaction() {
        let store = store();
        let intention = charge(&store, "ref-1").await;

        let ticket = store.begin_execution(&intention.id).await.unwrap();
        let finalized = ticket
            .commit_success("tx-9".to_string(), Some("mada".to_string()), json!({"ok": true}))
            .await
            .unwrap();

        assert_eq!(finalized.status, IntentionStatus::Completed);
        assert!(finalized.is_executed);
        assert_eq!(finalized.payment_method.as_deref(), Some("mada"));

        let by_tx = store.find_by_transaction_id("tx-9").await.unwrap();
        assert_eq!(by_tx.id, intention.id);
    }

    #[tokio::test]
    async fn test_second_execution_is_rejected() {
        let store = store();
        let intention = charge(&store, "ref-1").await;

        let ticket = store.begin_execution(&intention.id).await.unwrap();
        ticket
            .commit_success("tx-9".to_string(), None, json!({}))
            .await
            .unwrap();

        let second = store.begin_execution(&intention.id).await;
        assert!(matches!(second, Err(FundcoreError::AlreadyExecuted { .. })));
    }

    #[tokio::test]
    async fn test_dropped_ticket_leaves_intention_retryable() {
        let store = store();
        let intention = charge(&store, "ref-1").await;

        {
            let ticket = store.begin_execution(&intention.id).await.unwrap();
            // Side effect failed before commit; ticket dropped.
            drop(ticket);
        }

        let current = store.get(&intention.id).await.unwrap();
        assert_eq!(current.status, IntentionStatus::Created);
        assert!(!current.is_executed);

        // Retry succeeds.
        let ticket = store.begin_execution(&intention.id).await.unwrap();
        ticket
            .commit_success("tx-1".to_string(), None, json!({}))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_failure_commit_keeps_flag_false() {
        let store = store();
        let intention = charge(&store, "ref-1").await;

        let ticket = store.begin_execution(&intention.id).await.unwrap();
        let finalized = ticket
            .commit_failure("tx-2".to_string(), json!({"success": false}))
            .await
            .unwrap();

        assert_eq!(finalized.status, IntentionStatus::Failed);
        assert!(!finalized.is_executed);

        // Terminal: no further executions allowed.
        let again = store.begin_execution(&intention.id).await;
        assert!(matches!(
            again,
            Err(FundcoreError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_expiry_sweep_skips_terminal() {
        let store = store();
        let open = store
            .create(
                ProfileId::new(),
                IntentionPurpose::WalletCharge,
                Money::new(100, Currency::Sar),
                "ref-open".to_string(),
                Duration::minutes(-5),
            )
            .await
            .unwrap();
        let done = store
            .create(
                ProfileId::new(),
                IntentionPurpose::WalletCharge,
                Money::new(100, Currency::Sar),
                "ref-done".to_string(),
                Duration::minutes(-5),
            )
            .await
            .unwrap();

        let ticket = store.begin_execution(&done.id).await.unwrap();
        ticket
            .commit_success("tx-3".to_string(), None, json!({}))
            .await
            .unwrap();

        let expired = store.expire_overdue(Utc::now()).await;
        assert_eq!(expired, vec![open.id]);

        assert_eq!(
            store.get(&open.id).await.unwrap().status,
            IntentionStatus::Expired
        );
        assert_eq!(
            store.get(&done.id).await.unwrap().status,
            IntentionStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_expiry_sweep_skips_inflight_execution() {
        let store = store();
        let intention = store
            .create(
                ProfileId::new(),
                IntentionPurpose::WalletCharge,
                Money::new(100, Currency::Sar),
                "ref-1".to_string(),
                Duration::minutes(-5),
            )
            .await
            .unwrap();

        let ticket = store.begin_execution(&intention.id).await.unwrap();
        let expired = store.expire_overdue(Utc::now()).await;
        assert!(expired.is_empty());

        // The in-flight settlement still wins.
        ticket
            .commit_success("tx-4".to_string(), None, json!({}))
            .await
            .unwrap();
        assert_eq!(
            store.get(&intention.id).await.unwrap().status,
            IntentionStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_non_positive_amount_rejected() {
        let store = store();
        let result = store
            .create(
                ProfileId::new(),
                IntentionPurpose::WalletCharge,
                Money::new(0, Currency::Sar),
                "ref-1".to_string(),
                Duration::minutes(30),
            )
            .await;
        assert!(matches!(result, Err(FundcoreError::InvalidAmount { .. })));
    }
}
