//! Per-authority serialization.
//!
//! Each signing authority may have at most one transaction in flight.
//! Requests for the same authority queue on a shared async mutex; distinct
//! authorities never contend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::OwnedMutexGuard;
use treasury_chain::Address;

type Registry = HashMap<Address, Arc<tokio::sync::Mutex<()>>>;

/// Registry of one async mutex per authority address.
///
/// An entry lives only while some request holds or waits for it.
#[derive(Debug, Default)]
pub struct AuthorityLocks {
    locks: Mutex<Registry>,
}

impl AuthorityLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until `authority` has nothing in flight and claim it.
    ///
    /// The claim is released when the returned guard is dropped. Waiters are
    /// served in FIFO order (tokio's mutex is fair).
    pub async fn acquire(&self, authority: &Address) -> AuthorityClaim<'_> {
        let lock = self
            .registry()
            .entry(*authority)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        AuthorityClaim {
            locks: self,
            authority: *authority,
            guard: Some(lock.lock_owned().await),
        }
    }

    /// Number of authorities currently claimed or waited on.
    pub fn len(&self) -> usize {
        self.registry().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Exclusive use of one authority until dropped.
#[derive(Debug)]
pub struct AuthorityClaim<'a> {
    locks: &'a AuthorityLocks,
    authority: Address,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for AuthorityClaim<'_> {
    fn drop(&mut self) {
        let mut registry = self.locks.registry();
        // Only the registry and this claim reference the mutex: no waiters.
        let idle = registry
            .get(&self.authority)
            .is_some_and(|lock| Arc::strong_count(lock) <= 2);
        if idle {
            registry.remove(&self.authority);
        }
        self.guard.take();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn same_authority_is_serialized() {
        let locks = Arc::new(AuthorityLocks::new());
        let authority = Address::new([1u8; 32]);

        let guard = locks.acquire(&authority).await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire(&authority).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn distinct_authorities_do_not_contend() {
        let locks = AuthorityLocks::new();
        let _a = locks.acquire(&Address::new([1u8; 32])).await;

        let b = tokio::time::timeout(
            Duration::from_millis(100),
            locks.acquire(&Address::new([2u8; 32])),
        )
        .await;
        assert!(b.is_ok());
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn released_authorities_leave_the_registry() {
        let locks = Arc::new(AuthorityLocks::new());
        let authority = Address::new([1u8; 32]);

        let first = locks.acquire(&authority).await;
        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _claim = locks.acquire(&authority).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        // A queued waiter keeps the entry alive.
        drop(first);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(locks.is_empty());

        for seed in 0..16u8 {
            drop(locks.acquire(&Address::new([seed; 32])).await);
        }
        assert!(locks.is_empty());
    }
}
