use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::Result;
use super::models::{NewTransaction, OwnerTotals, Transaction};
use super::traits::TransactionStore;
use crate::OwnerId;

/// In-memory transaction store for local development and unit tests.
///
/// Display ids are assigned under one lock, so this backend never collides;
/// contention behavior is exercised against fakes that do.
#[derive(Clone, Default)]
pub struct MemoryTransactionStore {
    rows: Arc<Mutex<Vec<Transaction>>>,
}

impl MemoryTransactionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all rows (primarily for tests).
    pub async fn all(&self) -> Vec<Transaction> {
        self.rows.lock().await.clone()
    }
}

#[async_trait]
impl TransactionStore for MemoryTransactionStore {
    async fn insert(&self, new: &NewTransaction) -> Result<Transaction> {
        let mut rows = self.rows.lock().await;
        let display_id = rows
            .iter()
            .filter(|t| t.owner == new.owner)
            .map(|t| t.display_id)
            .max()
            .unwrap_or(0)
            + 1;

        let transaction = Transaction {
            id: Uuid::new_v4(),
            owner: new.owner,
            display_id,
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

    async fn totals_since(&self, owner: OwnerId, since: DateTime<Utc>) -> Result<OwnerTotals> {
        let rows = self.rows.lock().await;
        let mut totals = OwnerTotals::default();
        for t in rows.iter() {
            if t.owner == owner && t.occurred_at >= since {
                totals.count += 1;
                totals.total_minor += t.amount_minor;
            }
        }
        Ok(totals)
    }

    async fn recent(&self, owner: OwnerId, limit: usize) -> Result<Vec<Transaction>> {
        let rows = self.rows.lock().await;
        let mut out: Vec<Transaction> = rows.iter().filter(|t| t.owner == owner).cloned().collect();
        out.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at));
        out.truncate(limit);
        Ok(out)
    }
}
