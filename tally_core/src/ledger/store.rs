use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;

use super::models::{IngestStatus, IngestedUpdate};
use super::traits::IngestLedger;
use super::{Error, Result};

#[derive(Debug, Clone)]
pub struct PgIngestLedger {
    pool: PgPool,
}

impl PgIngestLedger {
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
        // Append-only except for status/error/processed_at.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS ingested_updates (
                update_id    BIGINT PRIMARY KEY,
                payload      JSONB NOT NULL,
                status       TEXT NOT NULL,
                error        TEXT NULL,
                received_at  TIMESTAMPTZ NOT NULL,
                processed_at TIMESTAMPTZ NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS ingested_updates_status_received_idx
              ON ingested_updates (status, received_at);
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl IngestLedger for PgIngestLedger {
    #[tracing::instrument(level = "debug", skip_all)]
    async fn record_if_new(&self, update_id: i64, payload: &serde_json::Value) -> Result<bool> {
        let res = sqlx::query(
            r#"
            INSERT INTO ingested_updates
                (update_id, payload, status, error, received_at, processed_at)
            VALUES
                ($1, $2, $3, NULL, $4, NULL)
            ON CONFLICT (update_id) DO NOTHING
            "#,
        )
        .bind(update_id)
        .bind(sqlx::types::Json(payload))
        .bind(status_to_str(IngestStatus::Pending))
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        // Zero rows affected means the unique key already existed: a
        // duplicate delivery, not a storage failure.
        Ok(res.rows_affected() > 0)
    }

    #[tracing::instrument(level = "debug", skip_all)]
    async fn is_duplicate(&self, update_id: i64) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM ingested_updates WHERE update_id = $1 LIMIT 1")
            .bind(update_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    #[tracing::instrument(level = "debug", skip_all)]
    async fn mark_processing(&self, update_id: i64) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE ingested_updates
               SET status = $2
             WHERE update_id = $1
            "#,
        )
        .bind(update_id)
        .bind(status_to_str(IngestStatus::Processing))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip_all)]
    async fn mark_completed(&self, update_id: i64) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE ingested_updates
               SET status = $2,
                   processed_at = $3
             WHERE update_id = $1
            "#,
        )
        .bind(update_id)
        .bind(status_to_str(IngestStatus::Completed))
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip_all)]
    async fn mark_failed(&self, update_id: i64, error: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE ingested_updates
               SET status = $2,
                   error = $3,
                   processed_at = $4
             WHERE update_id = $1
            "#,
        )
        .bind(update_id)
        .bind(status_to_str(IngestStatus::Failed))
        .bind(error)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip_all)]
    async fn get(&self, update_id: i64) -> Result<Option<IngestedUpdate>> {
        let row = sqlx::query(
            r#"
            SELECT update_id, payload, status, error, received_at, processed_at
              FROM ingested_updates
             WHERE update_id = $1
             LIMIT 1
            "#,
        )
        .bind(update_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            let payload: sqlx::types::Json<serde_json::Value> = row.try_get("payload")?;
            let status_s: String = row.try_get("status")?;
            let received_at: DateTime<Utc> = row.try_get("received_at")?;
            let processed_at: Option<DateTime<Utc>> = row.try_get("processed_at")?;
            Ok(IngestedUpdate {
                update_id: row.try_get("update_id")?,
                payload: payload.0,
                status: status_from_str(&status_s)?,
                error: row.try_get("error")?,
                received_at,
                processed_at,
            })
        })
        .transpose()
    }
}

pub(crate) fn status_to_str(s: IngestStatus) -> &'static str {
    match s {
        IngestStatus::Pending => "pending",
        IngestStatus::Processing => "processing",
        IngestStatus::Completed => "completed",
        IngestStatus::Failed => "failed",
    }
}

pub(crate) fn status_from_str(s: &str) -> Result<IngestStatus> {
    match s {
        "pending" => Ok(IngestStatus::Pending),
        "processing" => Ok(IngestStatus::Processing),
        "completed" => Ok(IngestStatus::Completed),
        "failed" => Ok(IngestStatus::Failed),
        other => Err(Error::UnknownStatus(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Integration-style test; requires a running Postgres. Set
    /// `TALLY_TEST_POSTGRES_URL` to run, otherwise this is a no-op.
    #[tokio::test]
    async fn record_if_new_dedupes_against_postgres() {
        let Ok(url) = std::env::var("TALLY_TEST_POSTGRES_URL") else {
            return;
        };
        let ledger = PgIngestLedger::connect(&url).await.unwrap();
        ledger.migrate().await.unwrap();

        // Nanosecond timestamp as a per-run unique id.
        let update_id = Utc::now().timestamp_nanos_opt().unwrap_or(1);
        let payload = serde_json::json!({"probe": true});

        assert!(ledger.record_if_new(update_id, &payload).await.unwrap());
        assert!(!ledger.record_if_new(update_id, &payload).await.unwrap());
        assert!(ledger.is_duplicate(update_id).await.unwrap());

        ledger.mark_processing(update_id).await.unwrap();
        ledger.mark_completed(update_id).await.unwrap();
        let record = ledger.get(update_id).await.unwrap().unwrap();
        assert_eq!(record.status, IngestStatus::Completed);
        assert!(record.processed_at.is_some());
    }
}
