//! Runs a [`StepGraph`] against a [`RemoteExecutor`].
//!
//! Steps execute one at a time in schedule order over the single
//! executor. The first failure of a step that does not allow
//! continuing halts the run; nothing is retried or rolled back.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;

use crate::error::{DeployError, DeployResult};
use crate::graph::{Step, StepGraph};
use crate::remote::RemoteExecutor;
use crate::report::{Execution, FailureKind, RunStatus, StepOutcome, StepStatus};

/// Shared flags asking a run to stop.
///
/// [`cancel`](Self::cancel) lets the running step finish and stops
/// before the next one. [`abort`](Self::abort) also asks executors
/// that watch the token to kill the running step.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    aborted: Arc<AtomicBool>,
}

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn abort(&self) {
        self.cancel();
        self.aborted.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }
}

pub struct Orchestrator {
    graph: StepGraph,
    step_timeout: Option<Duration>,
    cancel: CancelToken,
}

impl Orchestrator {
    #[must_use]
    pub fn new(graph: StepGraph) -> Self {
        Self {
            graph,
            step_timeout: None,
            cancel: CancelToken::new(),
        }
    }

    /// Default timeout for steps that do not set their own.
    #[must_use]
    pub const fn step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    #[must_use]
    pub const fn graph(&self) -> &StepGraph {
        &self.graph
    }

    /// Execute every step in schedule order.
    ///
    /// Returns `Err` only if the graph cannot be scheduled. Step
    /// failures and cancellation are reported through the returned
    /// [`Execution`]; see [`Execution::error`].
    pub fn run(&self, executor: &mut dyn RemoteExecutor) -> DeployResult<Execution> {
        let schedule = self.graph.schedule()?;
        let total = schedule.len();
        let mut steps: Vec<StepOutcome> = schedule
            .iter()
            .map(|s| StepOutcome::pending(&s.name))
            .collect();

        for (pos, step) in schedule.iter().enumerate() {
            if self.cancel.is_cancelled() {
                tracing::warn!(step = %step.name, "run cancelled, not dispatching further steps");
                return Ok(Execution {
                    status: RunStatus::Cancelled,
                    steps,
                });
            }

            tracing::info!(step = %step.name, position = pos + 1, total, "starting step");
            let outcome = &mut steps[pos];
            self.dispatch(step, outcome, executor);

            if outcome.failure == Some(FailureKind::Interrupted) {
                tracing::warn!(step = %step.name, "step interrupted, run aborted");
                return Ok(Execution {
                    status: RunStatus::Cancelled,
                    steps,
                });
            }

            let status = outcome.status;
            match status {
                StepStatus::Failed if step.continue_on_failure => {
                    outcome.tolerated = true;
                    tracing::warn!(
                        step = %step.name,
                        failure = ?outcome.failure,
                        "step failed, continuing as configured"
                    );
                }
                StepStatus::Failed => {
                    tracing::error!(
                        step = %step.name,
                        failure = ?outcome.failure,
                        exit_code = ?outcome.exit_code,
                        "step failed, halting run"
                    );
                    return Ok(Execution {
                        status: RunStatus::Failed,
                        steps,
                    });
                }
                _ => {
                    let secs = outcome.duration().map_or(0, |d| d.num_seconds());
                    tracing::info!(step = %step.name, secs, "step succeeded");
                }
            }
        }

        Ok(Execution {
            status: RunStatus::Succeeded,
            steps,
        })
    }

    fn dispatch(&self, step: &Step, outcome: &mut StepOutcome, executor: &mut dyn RemoteExecutor) {
        outcome.status = StepStatus::Running;
        outcome.started_at = Some(Utc::now());

        let timeout = step.timeout.or(self.step_timeout);
        let result = executor.execute(&step.command, timeout);
        outcome.finished_at = Some(Utc::now());

        let failure = match result {
            Ok(output) => {
                outcome.exit_code = Some(output.exit_code);
                outcome.output = output.combined();
                (!output.success()).then_some(FailureKind::ExecutionFailed)
            }
            Err(DeployError::CommandTimeout {
                timeout, output, ..
            }) => {
                outcome.output = format!("{output}\ntimed out after {}s", timeout.as_secs());
                Some(FailureKind::TimedOut)
            }
            Err(DeployError::Interrupted { output, .. }) => {
                outcome.output = format!("{output}\ninterrupted");
                Some(FailureKind::Interrupted)
            }
            Err(e) => {
                outcome.output = e.to_string();
                Some(FailureKind::ConnectionUnavailable)
            }
        };

        outcome.status = if failure.is_some() {
            StepStatus::Failed
        } else {
            StepStatus::Succeeded
        };
        outcome.failure = failure;
    }
}
