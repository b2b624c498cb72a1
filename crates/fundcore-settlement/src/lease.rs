//! TTL leases for duplicate-delivery suppression
//!
//! A lease narrows the window in which two deliveries of the same gateway
//! event run the settlement path concurrently. It is a performance guard
//! only: the TTL means a crashed holder cannot wedge retries forever, and
//! correctness always falls back to the persisted `is_executed` flag checked
//! under the intention's execution guard.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

#[derive(Clone, Copy)]
struct LeaseSlot {
    holder: Uuid,
    expires_at: Instant,
}

/// In-process lease table with per-key TTL
#[derive(Clone)]
pub struct LeaseMap {
    slots: Arc<DashMap<String, LeaseSlot>>,
    ttl: Duration,
}

impl LeaseMap {
    /// Create a lease table; `ttl` bounds both the hold time and the wait
    /// time of contending acquirers
    pub fn new(ttl: Duration) -> Self {
        Self {
            slots: Arc::new(DashMap::new()),
            ttl,
        }
    }

    /// Acquire the lease for `key`, waiting up to one TTL for the current
    /// holder to release or expire
    ///
    /// Returns `None` on timeout; callers proceed anyway and rely on the
    /// authoritative flag.
    pub async fn acquire(&self, key: &str) -> Option<Lease> {
        let deadline = Instant::now() + self.ttl;
        loop {
            if let Some(lease) = self.try_acquire(key) {
                return Some(lease);
            }
            if Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    /// Acquire without waiting
    pub fn try_acquire(&self, key: &str) -> Option<Lease> {
        let holder = Uuid::new_v4();
        let now = Instant::now();

        match self.slots.entry(key.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(mut occupied) => {
                if occupied.get().expires_at > now {
                    return None;
                }
                // Expired holder; take over.
                occupied.insert(LeaseSlot {
                    holder,
                    expires_at: now + self.ttl,
                });
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(LeaseSlot {
                    holder,
                    expires_at: now + self.ttl,
                });
            }
        }

        Some(Lease {
            slots: self.slots.clone(),
            key: key.to_string(),
            holder,
        })
    }
}

/// A held lease; released on drop
///
/// Release only removes the slot if this guard is still the holder, so a
/// takeover after expiry is never clobbered by the stale guard.
pub struct Lease {
    slots: Arc<DashMap<String, LeaseSlot>>,
    key: String,
    holder: Uuid,
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.slots
            .remove_if(&self.key, |_, slot| slot.holder == self.holder);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_exclusive_while_held() {
        let leases = LeaseMap::new(Duration::from_secs(5));
        let held = leases.try_acquire("intent_1").unwrap();
        assert!(leases.try_acquire("intent_1").is_none());
        drop(held);
        assert!(leases.try_acquire("intent_1").is_some());
    }

    #[tokio::test]
    async fn test_different_keys_do_not_contend() {
        let leases = LeaseMap::new(Duration::from_secs(5));
        let _a = leases.try_acquire("intent_1").unwrap();
        assert!(leases.try_acquire("intent_2").is_some());
    }

    #[tokio::test]
    async fn test_expired_lease_can_be_taken_over() {
        let leases = LeaseMap::new(Duration::from_millis(30));
        let stale = leases.try_acquire("intent_1").unwrap();

        tokio::time::sleep(Duration::from_millis(60)).await;
        let fresh = leases.try_acquire("intent_1");
        assert!(fresh.is_some());

        // The stale guard must not release the new holder's slot.
        drop(stale);
        assert!(leases.try_acquire("intent_1").is_none());
        drop(fresh);
    }

    #[tokio::test]
    async fn test_acquire_waits_for_release() {
        let leases = LeaseMap::new(Duration::from_secs(2));
        let held = leases.try_acquire("intent_1").unwrap();

        let contender = {
            let leases = leases.clone();
            tokio::spawn(async move { leases.acquire("intent_1").await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(held);

        let lease = contender.await.unwrap();
        assert!(lease.is_some());
    }
}
