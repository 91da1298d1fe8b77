use std::sync::Arc;
use std::time::Instant;

use super::models::{InsertReceipt, NewTransaction};
use super::traits::TransactionStore;
use super::{Error, Result};

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 7,
            backoff_base_ms: 100,
            backoff_max_ms: 2_000,
        }
    }
}

impl RetryPolicy {
    #[tracing::instrument(level = "debug")]
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::message("max_attempts must be > 0"));
        }
        if self.backoff_base_ms == 0 {
            return Err(Error::message("backoff_base_ms must be > 0"));
        }
        if self.backoff_max_ms < self.backoff_base_ms {
            return Err(Error::message(
                "backoff_max_ms must be >= backoff_base_ms",
            ));
        }
        Ok(())
    }

    #[tracing::instrument(level = "debug")]
    pub fn backoff_ms(&self, retry_count: u32) -> u64 {
        // Exponential backoff: base * 2^retry_count, capped.
        let shift = retry_count.min(63);
        let exp = 1u128 << shift;
        let ms = (self.backoff_base_ms as u128).saturating_mul(exp);
        (ms.min(self.backoff_max_ms as u128)) as u64
    }
}

/// Client-side compensation for store-assigned display-id sequencing.
///
/// Collisions on the `(owner, display_id)` constraint are expected under
/// concurrent writers and retried with bounded backoff; every other storage
/// error is fatal immediately: retrying a non-collision error risks masking
/// a real defect or duplicating a write.
pub struct InsertRetrier {
    store: Arc<dyn TransactionStore>,
    policy: RetryPolicy,
}

impl InsertRetrier {
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn new(store: Arc<dyn TransactionStore>, policy: RetryPolicy) -> Result<Self> {
        policy.validate()?;
        Ok(Self { store, policy })
    }

    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn insert_with_retry(&self, new: &NewTransaction) -> Result<InsertReceipt> {
        let started = Instant::now();

        for attempt in 1..=self.policy.max_attempts {
            match self.store.insert(new).await {
                Ok(transaction) => {
                    return Ok(InsertReceipt {
                        transaction,
                        attempts: attempt,
                        duration_ms: started.elapsed().as_millis() as u64,
                    });
                }
                Err(Error::DisplayIdCollision) => {
                    if attempt == self.policy.max_attempts {
                        break;
                    }
                    let delay_ms = self.policy.backoff_ms(attempt - 1);
                    tracing::debug!(
                        owner = %new.owner,
                        attempt,
                        delay_ms,
                        "display id collision, backing off"
                    );
                    tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
                }
                Err(other) => return Err(other),
            }
        }

        Err(Error::ContentionExhausted {
            attempts: self.policy.max_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::OwnerId;
    use crate::records::memory::MemoryTransactionStore;
    use crate::records::models::{OwnerTotals, Transaction};
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex;
    use uuid::Uuid;

    fn draft(owner: i64) -> NewTransaction {
        NewTransaction::new(OwnerId(owner), 1_250, "EUR", "coffee", None, None).unwrap()
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            backoff_base_ms: 1,
            backoff_max_ms: 4,
        }
    }

    /// Fails with a collision for the first `collisions` inserts, then
    /// delegates to a real in-memory store.
    struct CollidingStore {
        collisions: AtomicUsize,
        inner: MemoryTransactionStore,
    }

    #[async_trait]
    impl TransactionStore for CollidingStore {
        async fn insert(&self, new: &NewTransaction) -> Result<Transaction> {
            if self
                .collisions
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(Error::DisplayIdCollision);
            }
            self.inner.insert(new).await
        }

        async fn totals_since(&self, owner: OwnerId, since: DateTime<Utc>) -> Result<OwnerTotals> {
            self.inner.totals_since(owner, since).await
        }

        async fn recent(&self, owner: OwnerId, limit: usize) -> Result<Vec<Transaction>> {
            self.inner.recent(owner, limit).await
        }
    }

    #[tokio::test]
    async fn collision_is_retried_until_the_insert_lands() {
        let store = Arc::new(CollidingStore {
            collisions: AtomicUsize::new(2),
            inner: MemoryTransactionStore::new(),
        });
        let retrier = InsertRetrier::new(store, fast_policy(7)).unwrap();

        let receipt = retrier.insert_with_retry(&draft(1)).await.unwrap();
        assert_eq!(receipt.attempts, 3);
        assert_eq!(receipt.transaction.display_id, 1);
    }

    #[tokio::test]
    async fn exhausted_retries_surface_as_a_distinct_error() {
        let store = Arc::new(CollidingStore {
            collisions: AtomicUsize::new(usize::MAX),
            inner: MemoryTransactionStore::new(),
        });
        let retrier = InsertRetrier::new(store, fast_policy(3)).unwrap();

        let err = retrier.insert_with_retry(&draft(1)).await.unwrap_err();
        assert!(matches!(err, Error::ContentionExhausted { attempts: 3 }));
    }

    /// Always fails with a non-collision storage error; counts calls.
    struct BrokenStore {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TransactionStore for BrokenStore {
        async fn insert(&self, _new: &NewTransaction) -> Result<Transaction> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::message("connection reset"))
        }

        async fn totals_since(
            &self,
            _owner: OwnerId,
            _since: DateTime<Utc>,
        ) -> Result<OwnerTotals> {
            Err(Error::message("connection reset"))
        }

        async fn recent(&self, _owner: OwnerId, _limit: usize) -> Result<Vec<Transaction>> {
            Err(Error::message("connection reset"))
        }
    }

    #[tokio::test]
    async fn non_collision_errors_are_not_retried() {
        let store = Arc::new(BrokenStore {
            calls: AtomicUsize::new(0),
        });
        let retrier = InsertRetrier::new(store.clone(), fast_policy(7)).unwrap();

        let err = retrier.insert_with_retry(&draft(1)).await.unwrap_err();
        assert!(matches!(err, Error::Message { .. }));
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);
    }

    /// Store with a deliberately widened read-then-write race: the next
    /// display id is computed, the task yields, then the uniqueness check
    /// runs, which is exactly the contention the real store exhibits.
    #[derive(Default)]
    struct RacyStore {
        rows: Mutex<Vec<Transaction>>,
    }

    #[async_trait]
    impl TransactionStore for RacyStore {
        async fn insert(&self, new: &NewTransaction) -> Result<Transaction> {
            let next = {
                let rows = self.rows.lock().await;
                rows.iter()
                    .filter(|t| t.owner == new.owner)
                    .map(|t| t.display_id)
                    .max()
                    .unwrap_or(0)
                    + 1
            };

            tokio::time::sleep(std::time::Duration::from_millis(1)).await;

            let mut rows = self.rows.lock().await;
            if rows
                .iter()
                .any(|t| t.owner == new.owner && t.display_id == next)
            {
                return Err(Error::DisplayIdCollision);
            }
            let transaction = Transaction {
                id: Uuid::new_v4(),
                owner: new.owner,
                display_id: next,
                amount_minor: new.amount_minor,
                currency: new.currency.clone(),
                description: new.description.clone(),
                category: new.category.clone(),
                occurred_at: new.occurred_at,
                created_at: Utc::now(),
            };
            rows.push(transaction.clone());
            Ok(transaction)
        }

        async fn totals_since(
            &self,
            _owner: OwnerId,
            _since: DateTime<Utc>,
        ) -> Result<OwnerTotals> {
            Ok(OwnerTotals::default())
        }

        async fn recent(&self, _owner: OwnerId, _limit: usize) -> Result<Vec<Transaction>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn concurrent_inserts_for_one_owner_converge_to_distinct_ids() {
        let store = Arc::new(RacyStore::default());
        let retrier = Arc::new(InsertRetrier::new(store, fast_policy(16)).unwrap());

        let mut handles = Vec::new();
        for _ in 0..5 {
            let retrier = retrier.clone();
            handles.push(tokio::spawn(async move {
                retrier.insert_with_retry(&draft(1)).await
            }));
        }

        let mut display_ids = Vec::new();
        for handle in handles {
            let receipt = handle.await.unwrap().unwrap();
            display_ids.push(receipt.transaction.display_id);
        }

        display_ids.sort_unstable();
        assert_eq!(display_ids, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_ms(0), 100);
        assert_eq!(policy.backoff_ms(1), 200);
        assert_eq!(policy.backoff_ms(2), 400);
        assert_eq!(policy.backoff_ms(5), 2_000);
        assert_eq!(policy.backoff_ms(63), 2_000);
    }
}
