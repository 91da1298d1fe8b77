use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "tally", version, about = "Tally chat finance assistant")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Start the webhook server (default if no subcommand given).
    Serve {
        #[arg(long, default_value = "0.0.0.0")]
        host: String,

        #[arg(long, default_value = "8080")]
        port: u16,
    },

    /// Run database migrations for the ingestion ledger and the transaction
    /// store (when a database is configured).
    Migrate {
        /// Postgres URL override (else TALLY_DATABASE_URL / DATABASE_URL).
        #[arg(long)]
        database_url: Option<String>,
    },
}
