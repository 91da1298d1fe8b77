#![forbid(unsafe_code)]

//! Idempotent ingestion ledger.
//!
//! Records externally-delivered update ids and their processing status so
//! that at-least-once delivery never produces duplicate side effects. The
//! ledger is a dedup/observability aid, not the source of truth for whether
//! the user-visible effect happened: bookkeeping failures are logged and
//! never abort request handling.

mod error;

pub mod intake;
pub mod memory;
pub mod models;
pub mod store;
pub mod traits;

pub use error::{Error, Result};
