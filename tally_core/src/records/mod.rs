//! Persisted transactions with per-owner sequential display identifiers.
//!
//! The display id is assigned by the store at insert time, inside the insert
//! statement, guarded by a uniqueness constraint on `(owner, display_id)`.
//! Concurrent inserts for one owner can therefore collide; the
//! [`InsertRetrier`] resolves that expected collision with bounded
//! exponential backoff. Precomputing the next id in application code would
//! reintroduce the exact read-then-write race this shape exists to avoid.

mod error;

pub mod memory;
pub mod models;
pub mod retrier;
pub mod store;
pub mod traits;

pub use error::{Error, Result};
pub use retrier::{InsertRetrier, RetryPolicy};
