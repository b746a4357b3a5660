//! Per-key serialization of vote casts.
//!
//! Casts for the same `(voter, target)` pair queue behind one async mutex;
//! casts for different pairs never contend. Slots are dropped from the map
//! once the last holder or waiter lets go, so the map only grows with the
//! number of pairs being written right now.

use std::sync::Arc;

use agora_shared::types::UserId;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::types::VoteTarget;

/// Compound key identifying one ledger slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VoteKey {
    /// Voter.
    pub voter_id: UserId,
    /// Target.
    pub target: VoteTarget,
}

impl VoteKey {
    /// Creates a key.
    #[must_use]
    pub const fn new(voter_id: UserId, target: VoteTarget) -> Self {
        Self { voter_id, target }
    }
}

/// Map of per-key async mutexes.
#[derive(Debug, Default)]
pub struct KeyLocks {
    slots: DashMap<VoteKey, Arc<Mutex<()>>>,
}

impl KeyLocks {
    /// Creates an empty lock map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `key`.
    ///
    /// Waiters are served in arrival order.
    pub async fn acquire(&self, key: VoteKey) -> KeyGuard<'_> {
        let slot = self.slots.entry(key).or_default().clone();
        let guard = slot.lock_owned().await;

        KeyGuard {
            locks: self,
            key,
            guard: Some(guard),
        }
    }

    /// Number of keys currently held or awaited.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True when no key is held or awaited.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Exclusive access to one key; released on drop.
#[derive(Debug)]
pub struct KeyGuard<'a> {
    locks: &'a KeyLocks,
    key: VoteKey,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        // Release before the count check so our own Arc is gone.
        drop(self.guard.take());
        self.locks
            .slots
            .remove_if(&self.key, |_, slot| Arc::strong_count(slot) == 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voting::types::TargetKind;
    use std::time::Duration;
    use uuid::Uuid;

    fn key() -> VoteKey {
        VoteKey::new(
            UserId::new(),
            VoteTarget::new(TargetKind::Post, Uuid::new_v4()),
        )
    }

    #[tokio::test]
    async fn test_slot_removed_after_release() {
        let locks = KeyLocks::new();
        {
            let _guard = locks.acquire(key()).await;
            assert_eq!(locks.len(), 1);
        }
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_block() {
        let locks = KeyLocks::new();
        let _a = locks.acquire(key()).await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.acquire(key())).await;

        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn test_same_key_blocks_until_release() {
        let locks = KeyLocks::new();
        let k = key();
        let first = locks.acquire(k).await;

        let blocked = tokio::time::timeout(Duration::from_millis(50), locks.acquire(k)).await;
        assert!(blocked.is_err());

        drop(first);
        let second = tokio::time::timeout(Duration::from_millis(100), locks.acquire(k)).await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn test_waiter_keeps_slot_alive() {
        let locks = Arc::new(KeyLocks::new());
        let k = key();
        let first = locks.acquire(k).await;

        let waiter = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _guard = locks.acquire(k).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        drop(first);
        assert_eq!(locks.len(), 1);

        waiter.await.unwrap();
        assert!(locks.is_empty());
    }
}
