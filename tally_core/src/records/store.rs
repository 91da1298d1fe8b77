use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::postgres::{PgPool, PgPoolOptions};
use uuid::Uuid;

use super::models::{NewTransaction, OwnerTotals, Transaction};
use super::traits::TransactionStore;
use super::{Error, Result};
use crate::OwnerId;

/// Name of the unique index guarding `(owner_id, display_id)`. Violations of
/// exactly this constraint are the benign contention case; anything else is
/// a real storage error.
const DISPLAY_ID_CONSTRAINT: &str = "transactions_owner_display_idx";

#[derive(Debug, Clone)]
pub struct PgTransactionStore {
    pool: PgPool,
}

impl PgTransactionStore {
    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn connect(postgres_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(postgres_url)
            .await?;
        Ok(Self { pool })
    }

    #[tracing::instrument(level = "debug", skip_all)]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS transactions (
                id           UUID PRIMARY KEY,
                owner_id     BIGINT NOT NULL,
                display_id   BIGINT NOT NULL,
                amount_minor BIGINT NOT NULL,
                currency     TEXT NOT NULL,
                description  TEXT NOT NULL,
                category     TEXT NULL,
                occurred_at  TIMESTAMPTZ NOT NULL,
                created_at   TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS transactions_owner_display_idx
              ON transactions (owner_id, display_id);
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS transactions_owner_occurred_idx
              ON transactions (owner_id, occurred_at);
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl TransactionStore for PgTransactionStore {
    #[tracing::instrument(level = "debug", skip_all)]
    async fn insert(&self, new: &NewTransaction) -> Result<Transaction> {
        let id = Uuid::new_v4();
        let created_at = Utc::now();

        // The display id is computed inside the statement so sequencing
        // stays with the store. Two concurrent inserts for one owner can
        // read the same MAX and collide on the unique index.
        let res = sqlx::query(
            r#"
            INSERT INTO transactions
                (id, owner_id, display_id, amount_minor, currency, description,
                 category, occurred_at, created_at)
            VALUES
                ($1, $2,
                 (SELECT COALESCE(MAX(display_id), 0) + 1
                    FROM transactions
                   WHERE owner_id = $2),
                 $3, $4, $5, $6, $7, $8)
            RETURNING display_id
            "#,
        )
        .bind(id)
        .bind(new.owner)
        .bind(new.amount_minor)
        .bind(&new.currency)
        .bind(&new.description)
        .bind(&new.category)
        .bind(new.occurred_at)
        .bind(created_at)
        .fetch_one(&self.pool)
        .await;

        let row = match res {
            Ok(row) => row,
            Err(sqlx::Error::Database(db))
                if db.is_unique_violation()
                    && db.constraint() == Some(DISPLAY_ID_CONSTRAINT) =>
            {
                return Err(Error::DisplayIdCollision);
            }
            Err(other) => return Err(other.into()),
        };

        let display_id: i64 = row.try_get("display_id")?;
        Ok(Transaction {
            id,
            owner: new.owner,
            display_id,
            amount_minor: new.amount_minor,
            currency: new.currency.clone(),
            description: new.description.clone(),
            category: new.category.clone(),
            occurred_at: new.occurred_at,
            created_at,
        })
    }

    #[tracing::instrument(level = "debug", skip_all)]
    async fn totals_since(&self, owner: OwnerId, since: DateTime<Utc>) -> Result<OwnerTotals> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS count,
                   COALESCE(SUM(amount_minor), 0)::BIGINT AS total_minor
              FROM transactions
             WHERE owner_id = $1 AND occurred_at >= $2
            "#,
        )
        .bind(owner)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok(OwnerTotals {
            count: row.try_get("count")?,
            total_minor: row.try_get("total_minor")?,
        })
    }

    #[tracing::instrument(level = "debug", skip_all)]
    async fn recent(&self, owner: OwnerId, limit: usize) -> Result<Vec<Transaction>> {
        let rows = sqlx::query(
            r#"
            SELECT id, owner_id, display_id, amount_minor, currency, description,
                   category, occurred_at, created_at
              FROM transactions
             WHERE owner_id = $1
             ORDER BY occurred_at DESC
             LIMIT $2
            "#,
        )
        .bind(owner)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(Transaction {
                    id: row.try_get("id")?,
                    owner: row.try_get("owner_id")?,
                    display_id: row.try_get("display_id")?,
                    amount_minor: row.try_get("amount_minor")?,
                    currency: row.try_get("currency")?,
                    description: row.try_get("description")?,
                    category: row.try_get("category")?,
                    occurred_at: row.try_get("occurred_at")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }
}
