use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::Config;
use crate::error::{DeployError, DeployResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

/// Why a step failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The command ran and exited non-zero.
    ExecutionFailed,
    /// The host could not be reached or authenticated.
    ConnectionUnavailable,
    /// The step exceeded its timeout and was killed.
    TimedOut,
    /// The step was killed because the run was aborted.
    Interrupted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Succeeded,
    Failed,
    Cancelled,
}

/// Per-step result, created pending when the run is scheduled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepOutcome {
    pub name: String,
    pub status: StepStatus,
    pub exit_code: Option<i32>,
    /// Captured stdout followed by stderr.
    pub output: String,
    pub failure: Option<FailureKind>,
    /// Failed, but the step allowed the run to continue.
    pub tolerated: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl StepOutcome {
    #[must_use]
    pub fn pending(name: &str) -> Self {
        Self {
            name: name.to_string(),
            status: StepStatus::Pending,
            exit_code: None,
            output: String::new(),
            failure: None,
            tolerated: false,
            started_at: None,
            finished_at: None,
        }
    }

    #[must_use]
    pub fn duration(&self) -> Option<chrono::Duration> {
        Some(self.finished_at? - self.started_at?)
    }
}

/// What the orchestrator did: overall status plus one outcome per
/// scheduled step, in schedule order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Execution {
    pub status: RunStatus,
    pub steps: Vec<StepOutcome>,
}

impl Execution {
    /// The step that halted the run, if any.
    #[must_use]
    pub fn failed_step(&self) -> Option<&StepOutcome> {
        self.steps
            .iter()
            .find(|s| s.status == StepStatus::Failed && !s.tolerated)
    }

    /// Names of steps in the order they were scheduled.
    #[must_use]
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name.as_str()).collect()
    }

    /// Map a failed or cancelled run onto the error taxonomy.
    #[must_use]
    pub fn error(&self) -> Option<DeployError> {
        match self.status {
            RunStatus::Succeeded => None,
            RunStatus::Cancelled => {
                let step = self
                    .steps
                    .iter()
                    .find(|s| {
                        s.failure == Some(FailureKind::Interrupted)
                            || s.status == StepStatus::Pending
                    })
                    .map(|s| s.name.clone())
                    .unwrap_or_default();
                Some(DeployError::Cancelled { step })
            }
            RunStatus::Failed => {
                let failed = self.failed_step()?;
                Some(match failed.failure {
                    Some(FailureKind::ConnectionUnavailable) => DeployError::ConnectionUnavailable {
                        step: failed.name.clone(),
                        message: failed.output.clone(),
                    },
                    _ => DeployError::StepExecutionFailed {
                        step: failed.name.clone(),
                        output: failed.output.clone(),
                    },
                })
            }
        }
    }
}

/// Final summary handed back to the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub status: RunStatus,
    pub app_name: String,
    pub domain: String,
    pub deployment_path: String,
    pub failed_step: Option<String>,
    pub failure: Option<FailureKind>,
    pub failure_output: Option<String>,
    pub steps: Vec<StepOutcome>,
}

impl RunReport {
    #[must_use]
    pub fn new(config: &Config, execution: Execution) -> Self {
        let failed = execution.failed_step().cloned();
        Self {
            status: execution.status,
            app_name: config.app_name.clone(),
            domain: config.domain.clone(),
            deployment_path: config.deployment_path.clone(),
            failed_step: failed.as_ref().map(|s| s.name.clone()),
            failure: failed.as_ref().and_then(|s| s.failure),
            failure_output: failed.map(|s| s.output),
            steps: execution.steps,
        }
    }

    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.status == RunStatus::Succeeded
    }

    pub fn to_json(&self) -> DeployResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = match self.status {
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "FAILED",
            RunStatus::Cancelled => "cancelled",
        };
        writeln!(f, "Deployment {status}")?;
        writeln!(f, "  Application: {}", self.app_name)?;
        writeln!(f, "  Domain:      {}", self.domain)?;
        writeln!(f, "  Path:        {}", self.deployment_path)?;
        writeln!(f)?;

        for step in &self.steps {
            let mark = match step.status {
                StepStatus::Succeeded => "ok",
                StepStatus::Failed if step.tolerated => "warn",
                StepStatus::Failed => "FAIL",
                StepStatus::Running => "run",
                StepStatus::Pending => "-",
            };
            write!(f, "  [{mark:>4}] {}", step.name)?;
            if let Some(d) = step.duration() {
                write!(f, " ({}s)", d.num_seconds())?;
            }
            writeln!(f)?;
        }

        if let (Some(step), Some(output)) = (&self.failed_step, &self.failure_output) {
            writeln!(f)?;
            writeln!(f, "Output of {step}:")?;
            for line in output.lines() {
                writeln!(f, "  {line}")?;
            }
        }
        Ok(())
    }
}
