//! Tally core library: the message-delivery reliability layer behind the bot.
//!
//! The four load-bearing pieces live here: the typed pipeline executor
//! ([`pipeline`]), the idempotent ingestion ledger ([`ledger`]), the
//! progress-message reporter ([`progress`]), and the optimistic insert
//! retrier for logged transactions ([`records`]). The [`assistant`] module
//! wires them into the concrete message-handling pipeline.

pub mod assistant;
pub mod error;
pub mod ledger;
pub mod models;
pub mod pipeline;
pub mod progress;
pub mod records;

pub use error::{Error, Result};
pub use models::{ChatId, OwnerId};
