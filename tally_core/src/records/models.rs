use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Error, Result};
use crate::OwnerId;

/// A logged transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub owner: OwnerId,
    /// Per-owner sequential number used in user-facing references ("#42").
    /// Assigned by the store at insert time.
    pub display_id: i64,
    /// Amount in minor units (cents); negative for refunds.
    pub amount_minor: i64,
    pub currency: String,
    pub description: String,
    pub category: Option<String>,
    pub occurred_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// A transaction about to be inserted. Carries no id and no display id;
/// both are assigned by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTransaction {
    pub owner: OwnerId,
    pub amount_minor: i64,
    pub currency: String,
    pub description: String,
    pub category: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl NewTransaction {
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn new(
        owner: OwnerId,
        amount_minor: i64,
        currency: impl Into<String>,
        description: impl Into<String>,
        category: Option<String>,
        occurred_at: Option<DateTime<Utc>>,
    ) -> Result<Self> {
        let currency = currency.into();
        if currency.trim().is_empty() {
            return Err(Error::InvalidTransaction("currency is empty".to_string()));
        }

        let description = description.into();
        if description.trim().is_empty() {
            return Err(Error::InvalidTransaction(
                "description is empty".to_string(),
            ));
        }

        if amount_minor == 0 {
            return Err(Error::InvalidTransaction("amount is zero".to_string()));
        }

        Ok(Self {
            owner,
            amount_minor,
            currency,
            description,
            category,
            occurred_at: occurred_at.unwrap_or_else(Utc::now),
        })
    }
}

/// Result of a successful retried insert.
#[derive(Debug, Clone)]
pub struct InsertReceipt {
    pub transaction: Transaction,
    pub attempts: u32,
    pub duration_ms: u64,
}

/// Aggregate over an owner's transactions, for spending queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OwnerTotals {
    pub count: i64,
    pub total_minor: i64,
}
