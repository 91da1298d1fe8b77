use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::Result;
use super::models::{NewTransaction, OwnerTotals, Transaction};
use crate::OwnerId;

#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Insert `new`, with the store assigning the per-owner display id at
    /// insert time.
    ///
    /// A concurrent insert for the same owner may be assigned the same next
    /// id; the `(owner, display_id)` uniqueness constraint rejects one of
    /// the two and the failure surfaces as
    /// [`Error::DisplayIdCollision`](super::Error::DisplayIdCollision),
    /// distinguishable from every other storage error.
    async fn insert(&self, new: &NewTransaction) -> Result<Transaction>;

    /// Count and sum of an owner's transactions since `since`.
    async fn totals_since(&self, owner: OwnerId, since: DateTime<Utc>) -> Result<OwnerTotals>;

    /// Most recent transactions for an owner, newest first.
    async fn recent(&self, owner: OwnerId, limit: usize) -> Result<Vec<Transaction>>;
}
