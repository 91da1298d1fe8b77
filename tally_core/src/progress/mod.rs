//! Progress reporting over a single live status message.
//!
//! One [`ProgressReporter`] manages one outbound status message per in-flight
//! request: stage updates are serialized (exactly one edit in flight per
//! session), redundant or late updates are dropped or coalesced per policy,
//! and once a session is terminal no further stage text is ever written.
//! Progress is cosmetic feedback: every failure in here is logged and
//! contained, never surfaced to the caller.

pub mod models;
pub mod reporter;
pub mod traits;

pub use models::{MessageRef, Stage, UpdatePolicy};
pub use reporter::ProgressReporter;
pub use traits::MessageSink;
