use clap::Parser;
use std::net::SocketAddr;
use tracing_subscriber::EnvFilter;

use tally_server::cli::{Cli, Commands};
use tally_server::config::AppConfig;
use tally_server::{dev_backends, server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let cmd = cli.command.unwrap_or(Commands::Serve {
        host: "0.0.0.0".to_string(),
        port: 8080,
    });

    match cmd {
        Commands::Serve { host, port } => {
            let cfg = AppConfig::from_env()?;
            let state = dev_backends::build_state(&cfg).await?;
            let addr: SocketAddr = format!("{host}:{port}").parse()?;
            server::serve(addr, state).await
        }
        Commands::Migrate { database_url } => {
            let db_url = database_url
                .or_else(|| std::env::var("TALLY_DATABASE_URL").ok())
                .or_else(|| std::env::var("DATABASE_URL").ok());
            let Some(url) = db_url else {
                tracing::info!("no database configured; skipping migrations");
                return Ok(());
            };

            let ledger = tally_core::ledger::store::PgIngestLedger::connect(&url).await?;
            ledger.migrate().await?;
            tracing::info!("ingestion ledger migrations applied");

            let store = tally_core::records::store::PgTransactionStore::connect(&url).await?;
            store.migrate().await?;
            tracing::info!("transaction store migrations applied");
            Ok(())
        }
    }
}
