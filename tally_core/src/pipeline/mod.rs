//! Typed, branching pipeline executor.
//!
//! A [`Pipeline`] threads one owned payload value through an ordered list of
//! fallible async steps. A step may be a branch point: exactly one arm is
//! selected by predicate, runs, and is normalized back to the common payload
//! shape by a join step. Step transitions are reported to an optional
//! single-subscriber [`StepObserver`].

mod engine;
mod models;

pub use engine::{Arm, Branch, Node, Pipeline, Step};
pub use models::{
    RunError, RunOutcome, RunReport, RunStatus, StepId, StepObserver, StepRecord, StepStatus,
};
