use anyhow::bail;

use tally_core::progress::UpdatePolicy;
use tally_core::records::RetryPolicy;

/// Server configuration, read from the environment.
///
/// Everything is optional so a bare `tally serve` starts a fully in-memory
/// dev instance: no database, no bot token, updates logged instead of sent.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Postgres URL for the ingestion ledger and transaction store. `None`
    /// selects the in-memory dev backends.
    pub postgres_url: Option<String>,
    /// Telegram bot token. `None` selects the logging sink.
    pub bot_token: Option<String>,
    /// Shared secret for inbound webhook signature verification. `None`
    /// disables enforcement.
    pub webhook_signing_secret: Option<String>,
    pub retry: RetryPolicy,
    pub progress_policy: UpdatePolicy,
}

impl AppConfig {
    #[tracing::instrument(level = "debug")]
    pub fn from_env() -> anyhow::Result<Self> {
        let postgres_url = std::env::var("TALLY_DATABASE_URL")
            .or_else(|_| std::env::var("DATABASE_URL"))
            .ok();
        let bot_token = std::env::var("TALLY_BOT_TOKEN").ok();
        let webhook_signing_secret = std::env::var("TALLY_WEBHOOK_SECRET").ok();

        let progress_policy = match std::env::var("TALLY_PROGRESS_POLICY").as_deref() {
            Ok("coalesce") => UpdatePolicy::CoalesceLatest,
            Ok("drop") | Err(_) => UpdatePolicy::DropWhileBusy,
            Ok(other) => bail!("unknown TALLY_PROGRESS_POLICY: {other}"),
        };

        let cfg = Self {
            postgres_url,
            bot_token,
            webhook_signing_secret,
            retry: RetryPolicy::default(),
            progress_policy,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    #[tracing::instrument(level = "debug")]
    pub fn validate(&self) -> anyhow::Result<()> {
        if let Some(url) = &self.postgres_url {
            if url.trim().is_empty() {
                bail!("database url is empty");
            }
        }
        if let Some(secret) = &self.webhook_signing_secret {
            if secret.trim().is_empty() {
                bail!("webhook signing secret is empty");
            }
        }
        self.retry.validate()?;
        Ok(())
    }
}
