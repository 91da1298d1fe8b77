//! The concrete message-handling pipeline behind the bot.
//!
//! Wires the executor, ledger, progress reporter, and insert retrier into
//! one flow: decode the inbound update, extract text (transcribing voice or
//! reading a receipt photo through their trait seams), classify intent,
//! branch into the matching specialist routine, and reply by editing the
//! status message in place. LLM prompt content, model selection, and the
//! extraction backends stay behind the traits in [`traits`].

pub mod cache;
pub mod handler;
pub mod models;
pub mod pipeline;
pub mod traits;

pub use handler::Assistant;
