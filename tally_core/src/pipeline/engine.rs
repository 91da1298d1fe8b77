use std::future::Future;
use std::time::Instant;

use futures_util::future::BoxFuture;

use super::models::{
    RunError, RunOutcome, RunReport, StepId, StepObserver, StepRecord, StepStatus,
};
use crate::Result;

type Transform<C> = Box<dyn Fn(C) -> BoxFuture<'static, Result<C>> + Send + Sync>;

/// A fallible async transform from payload to payload.
pub struct Step<C> {
    id: StepId,
    transform: Transform<C>,
}

impl<C: Send + 'static> Step<C> {
    pub fn new<F, Fut>(id: &'static str, f: F) -> Self
    where
        F: Fn(C) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<C>> + Send + 'static,
    {
        Self {
            id: StepId(id),
            transform: Box::new(move |payload| Box::pin(f(payload))),
        }
    }

    pub fn id(&self) -> StepId {
        self.id
    }
}

/// One alternative within a branch: a predicate over the current payload and
/// the step to run when it matches.
pub struct Arm<C> {
    matches: fn(&C) -> bool,
    step: Step<C>,
}

impl<C> Arm<C> {
    pub fn new(matches: fn(&C) -> bool, step: Step<C>) -> Self {
        Self { matches, step }
    }
}

/// A branch point: exactly one arm is selected per run, then `join`
/// normalizes the arm's output back to the common payload shape.
///
/// `produced` reports how many of this branch's outputs are present on the
/// payload. The executor requires it to be exactly one after the arm runs,
/// before the join is invoked; anything else fails the run as a contract
/// violation rather than letting the join guess.
pub struct Branch<C> {
    id: StepId,
    arms: Vec<Arm<C>>,
    produced: fn(&C) -> usize,
    join: Step<C>,
}

impl<C> Branch<C> {
    pub fn new(id: &'static str, arms: Vec<Arm<C>>, produced: fn(&C) -> usize, join: Step<C>) -> Self {
        Self {
            id: StepId(id),
            arms,
            produced,
            join,
        }
    }
}

pub enum Node<C> {
    Step(Step<C>),
    Branch(Branch<C>),
}

/// Ordered, optionally branching step sequence over a typed payload.
///
/// Within one run steps execute strictly in sequence; the executor never
/// interleaves two steps of the same run. Concurrency only exists across
/// independent runs.
pub struct Pipeline<C> {
    nodes: Vec<Node<C>>,
}

impl<C: Send + 'static> Pipeline<C> {
    pub fn new(nodes: Vec<Node<C>>) -> Self {
        Self { nodes }
    }

    /// Run the pipeline to completion or first failure.
    ///
    /// The first failing transform ends the run: later steps do not execute
    /// and the report's outcome carries the failing step id. There is no
    /// retry at this layer.
    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn run(&self, payload: C, observer: Option<&dyn StepObserver>) -> RunReport<C> {
        let run_id = ulid::Ulid::new().to_string();
        let mut steps = Vec::new();
        let mut payload = payload;

        for node in &self.nodes {
            let next = match node {
                Node::Step(step) => run_step(step, payload, observer, &mut steps).await,
                Node::Branch(branch) => run_branch(branch, payload, observer, &mut steps).await,
            };
            payload = match next {
                Ok(p) => p,
                Err(error) => {
                    tracing::debug!(run_id = %run_id, %error, "pipeline run failed");
                    return RunReport {
                        run_id,
                        steps,
                        outcome: RunOutcome::Failed(error),
                    };
                }
            };
        }

        RunReport {
            run_id,
            steps,
            outcome: RunOutcome::Succeeded(payload),
        }
    }
}

async fn run_step<C>(
    step: &Step<C>,
    payload: C,
    observer: Option<&dyn StepObserver>,
    records: &mut Vec<StepRecord>,
) -> std::result::Result<C, RunError> {
    if let Some(obs) = observer {
        obs.step_started(step.id);
    }

    let started = Instant::now();
    match (step.transform)(payload).await {
        Ok(next) => {
            records.push(StepRecord {
                step: step.id,
                status: StepStatus::Succeeded,
                duration_ms: started.elapsed().as_millis() as u64,
            });
            Ok(next)
        }
        Err(source) => {
            records.push(StepRecord {
                step: step.id,
                status: StepStatus::Failed,
                duration_ms: started.elapsed().as_millis() as u64,
            });
            Err(RunError::Step {
                step: step.id,
                source,
            })
        }
    }
}

async fn run_branch<C>(
    branch: &Branch<C>,
    payload: C,
    observer: Option<&dyn StepObserver>,
    records: &mut Vec<StepRecord>,
) -> std::result::Result<C, RunError> {
    if let Some(obs) = observer {
        obs.step_started(branch.id);
    }

    // The branch outcome is decided exactly once per run, up front.
    let matched: Vec<usize> = branch
        .arms
        .iter()
        .enumerate()
        .filter(|(_, arm)| (arm.matches)(&payload))
        .map(|(i, _)| i)
        .collect();

    let arm = match matched.as_slice() {
        [i] => &branch.arms[*i],
        [] => return Err(RunError::NoBranchMatched { step: branch.id }),
        _ => {
            return Err(RunError::MultipleBranchesMatched {
                step: branch.id,
                matched: matched.len(),
            });
        }
    };

    let payload = run_step(&arm.step, payload, observer, records).await?;

    let outputs = (branch.produced)(&payload);
    if outputs != 1 {
        return Err(RunError::JoinContract {
            step: branch.id,
            outputs,
        });
    }

    run_step(&branch.join, payload, observer, records).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::pipeline::RunStatus;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct Trace {
        visited: Vec<&'static str>,
        left: Option<&'static str>,
        right: Option<&'static str>,
    }

    fn visit(id: &'static str) -> Step<Trace> {
        Step::new(id, move |mut t: Trace| async move {
            t.visited.push(id);
            Ok(t)
        })
    }

    fn branch_outputs(t: &Trace) -> usize {
        t.left.iter().count() + t.right.iter().count()
    }

    #[tokio::test]
    async fn steps_run_in_order() {
        let pipeline = Pipeline::new(vec![
            Node::Step(visit("a")),
            Node::Step(visit("b")),
            Node::Step(visit("c")),
        ]);

        let report = pipeline.run(Trace::default(), None).await;
        assert_eq!(report.status(), RunStatus::Succeeded);
        let trace = report.into_result().unwrap();
        assert_eq!(trace.visited, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn failure_halts_the_run() {
        let pipeline = Pipeline::new(vec![
            Node::Step(visit("a")),
            Node::Step(Step::new("boom", |_t: Trace| async {
                Err(Error::BackendMessage("boom".to_string()))
            })),
            Node::Step(visit("never")),
        ]);

        let report = pipeline.run(Trace::default(), None).await;
        assert_eq!(report.status(), RunStatus::Failed);
        assert_eq!(report.steps.len(), 2);
        assert_eq!(report.steps[1].status, StepStatus::Failed);

        match report.outcome {
            RunOutcome::Failed(RunError::Step { step, .. }) => assert_eq!(step.0, "boom"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn branch_runs_exactly_the_matching_arm() {
        let pipeline = Pipeline::new(vec![Node::Branch(Branch::new(
            "pick",
            vec![
                Arm::new(
                    |t: &Trace| t.visited.is_empty(),
                    Step::new("left", |mut t: Trace| async move {
                        t.visited.push("left");
                        t.left = Some("out");
                        Ok(t)
                    }),
                ),
                Arm::new(
                    |t: &Trace| !t.visited.is_empty(),
                    Step::new("right", |mut t: Trace| async move {
                        t.visited.push("right");
                        t.right = Some("out");
                        Ok(t)
                    }),
                ),
            ],
            branch_outputs,
            visit("join"),
        ))]);

        let trace = pipeline
            .run(Trace::default(), None)
            .await
            .into_result()
            .unwrap();
        assert_eq!(trace.visited, vec!["left", "join"]);
        assert!(trace.right.is_none());
    }

    #[tokio::test]
    async fn zero_matching_arms_is_a_contract_violation() {
        let pipeline = Pipeline::new(vec![Node::Branch(Branch::new(
            "pick",
            vec![Arm::new(|_t: &Trace| false, visit("left"))],
            branch_outputs,
            visit("join"),
        ))]);

        let err = pipeline
            .run(Trace::default(), None)
            .await
            .into_result()
            .unwrap_err();
        assert!(err.is_contract_violation());
        assert!(matches!(err, RunError::NoBranchMatched { .. }));
    }

    #[tokio::test]
    async fn multiple_matching_arms_is_a_contract_violation() {
        let pipeline = Pipeline::new(vec![Node::Branch(Branch::new(
            "pick",
            vec![
                Arm::new(|_t: &Trace| true, visit("left")),
                Arm::new(|_t: &Trace| true, visit("right")),
            ],
            branch_outputs,
            visit("join"),
        ))]);

        let err = pipeline
            .run(Trace::default(), None)
            .await
            .into_result()
            .unwrap_err();
        assert!(err.is_contract_violation());
        assert!(matches!(
            err,
            RunError::MultipleBranchesMatched { matched: 2, .. }
        ));
    }

    #[tokio::test]
    async fn arm_that_produces_no_output_fails_before_the_join() {
        // The arm forgets to set its output; the executor must refuse to run
        // the join rather than hand it an ambiguous payload.
        let pipeline = Pipeline::new(vec![Node::Branch(Branch::new(
            "pick",
            vec![Arm::new(|_t: &Trace| true, visit("left"))],
            branch_outputs,
            visit("join"),
        ))]);

        let err = pipeline
            .run(Trace::default(), None)
            .await
            .into_result()
            .unwrap_err();
        assert!(matches!(err, RunError::JoinContract { outputs: 0, .. }));
    }

    struct Recorder(Mutex<Vec<&'static str>>);

    impl StepObserver for Recorder {
        fn step_started(&self, step: StepId) {
            self.0.lock().unwrap().push(step.0);
        }
    }

    #[tokio::test]
    async fn observer_sees_every_transition_in_order() {
        let pipeline = Pipeline::new(vec![
            Node::Step(visit("a")),
            Node::Branch(Branch::new(
                "pick",
                vec![Arm::new(
                    |_t: &Trace| true,
                    Step::new("left", |mut t: Trace| async move {
                        t.left = Some("out");
                        Ok(t)
                    }),
                )],
                branch_outputs,
                visit("join"),
            )),
        ]);

        let recorder = Recorder(Mutex::new(Vec::new()));
        let report = pipeline.run(Trace::default(), Some(&recorder)).await;
        assert_eq!(report.status(), RunStatus::Succeeded);
        assert_eq!(
            *recorder.0.lock().unwrap(),
            vec!["a", "pick", "left", "join"]
        );
    }
}
