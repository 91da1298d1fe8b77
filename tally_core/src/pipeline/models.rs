use std::fmt;

use crate::Error;

/// Stable identifier of a pipeline step. Step ids are compile-time constants;
/// consumers (progress reporting, logs) match on them by value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StepId(pub &'static str);

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Succeeded,
    Failed,
}

/// One executed step (or branch arm, or join) within a run.
#[derive(Debug, Clone, Copy)]
pub struct StepRecord {
    pub step: StepId,
    pub status: StepStatus,
    pub duration_ms: u64,
}

/// Why a run failed.
///
/// `Step` is a runtime failure of a transform. The remaining variants are
/// configuration defects in the pipeline itself: the executor refuses to
/// guess and fails the run loudly instead.
#[derive(thiserror::Error, Debug)]
pub enum RunError {
    #[error("step {step} failed: {source}")]
    Step {
        step: StepId,
        #[source]
        source: Error,
    },

    #[error("no branch arm matched at {step}")]
    NoBranchMatched { step: StepId },

    #[error("{matched} branch arms matched at {step}; expected exactly one")]
    MultipleBranchesMatched { step: StepId, matched: usize },

    #[error("branch {step} left {outputs} outputs on the payload; join requires exactly one")]
    JoinContract { step: StepId, outputs: usize },
}

impl RunError {
    /// True for defects in the pipeline definition rather than runtime
    /// failures of a step transform.
    pub fn is_contract_violation(&self) -> bool {
        !matches!(self, Self::Step { .. })
    }
}

#[derive(Debug)]
pub enum RunOutcome<C> {
    Succeeded(C),
    Failed(RunError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Succeeded,
    Failed,
}

/// Structured result of one pipeline run.
///
/// `steps` records everything that actually executed, in order, so a caller
/// can distinguish "ran and failed at step X" from "never started".
#[derive(Debug)]
pub struct RunReport<C> {
    /// ULID (sortable by time).
    pub run_id: String,
    pub steps: Vec<StepRecord>,
    pub outcome: RunOutcome<C>,
}

impl<C> RunReport<C> {
    pub fn status(&self) -> RunStatus {
        match self.outcome {
            RunOutcome::Succeeded(_) => RunStatus::Succeeded,
            RunOutcome::Failed(_) => RunStatus::Failed,
        }
    }

    pub fn into_result(self) -> Result<C, RunError> {
        match self.outcome {
            RunOutcome::Succeeded(payload) => Ok(payload),
            RunOutcome::Failed(error) => Err(error),
        }
    }
}

/// Single-subscriber step-transition callback.
///
/// The executor calls `step_started` immediately before each step, branch,
/// arm, and join runs. Delivery is fire-and-forget from the executor's point
/// of view: implementations must not block and must not fail.
pub trait StepObserver: Send + Sync {
    fn step_started(&self, step: StepId);
}
