use std::collections::HashMap;
use std::time::Duration;

use trebuchet::error::{DeployError, DeployResult};
use trebuchet::remote::CommandOutput;
use trebuchet::report::{FailureKind, RunStatus, StepStatus};
use trebuchet::{CancelToken, Orchestrator, RemoteExecutor, Step, StepGraph};

enum Reply {
    Exit(i32, &'static str),
    Unreachable,
    TimedOut,
    Interrupted,
}

/// Records every command it is asked to run. Commands without a
/// scripted reply succeed.
#[derive(Default)]
struct Recorder {
    calls: Vec<(String, Option<Duration>)>,
    replies: HashMap<&'static str, Reply>,
    cancel_after: Option<(&'static str, CancelToken)>,
}

impl Recorder {
    fn reply(mut self, command: &'static str, reply: Reply) -> Self {
        self.replies.insert(command, reply);
        self
    }

    fn commands(&self) -> Vec<&str> {
        self.calls.iter().map(|(c, _)| c.as_str()).collect()
    }
}

impl RemoteExecutor for Recorder {
    fn execute(&mut self, command: &str, timeout: Option<Duration>) -> DeployResult<CommandOutput> {
        self.calls.push((command.to_string(), timeout));
        if let Some((after, token)) = &self.cancel_after {
            if *after == command {
                token.cancel();
            }
        }

        match self.replies.get(command) {
            None => Ok(CommandOutput {
                exit_code: 0,
                stdout: format!("ran {command}\n"),
                stderr: String::new(),
            }),
            Some(Reply::Exit(code, stderr)) => Ok(CommandOutput {
                exit_code: *code,
                stdout: String::new(),
                stderr: (*stderr).to_string(),
            }),
            Some(Reply::Unreachable) => Err(DeployError::SshFailed("Connection refused".into())),
            Some(Reply::TimedOut) => Err(DeployError::CommandTimeout {
                command: "ssh".into(),
                timeout: timeout.unwrap_or_default(),
                output: "still building\n".into(),
            }),
            Some(Reply::Interrupted) => Err(DeployError::Interrupted {
                command: "ssh".into(),
                output: "compiling\n".into(),
            }),
        }
    }
}

fn diamond() -> StepGraph {
    StepGraph::new(vec![
        Step::new("A", "a"),
        Step::new("B", "b").requires("A"),
        Step::new("C", "c").requires("A"),
        Step::new("D", "d").requires("B").requires("C"),
    ])
    .expect("valid graph")
}

fn statuses(steps: &[trebuchet::report::StepOutcome]) -> Vec<StepStatus> {
    steps.iter().map(|s| s.status).collect()
}

#[test]
fn runs_every_step_in_schedule_order() {
    let mut executor = Recorder::default();

    let execution = Orchestrator::new(diamond())
        .run(&mut executor)
        .expect("schedulable");

    assert_eq!(execution.status, RunStatus::Succeeded);
    assert_eq!(executor.commands(), ["a", "b", "c", "d"]);
    assert_eq!(execution.step_names(), ["A", "B", "C", "D"]);
    assert!(
        execution
            .steps
            .iter()
            .all(|s| s.status == StepStatus::Succeeded && s.exit_code == Some(0))
    );
    assert_eq!(execution.steps[1].output, "ran b\n");
    assert!(execution.error().is_none());
}

#[test]
fn outcomes_carry_timestamps() {
    let mut executor = Recorder::default();

    let execution = Orchestrator::new(diamond())
        .run(&mut executor)
        .expect("schedulable");

    for step in &execution.steps {
        let started = step.started_at.expect("started");
        let finished = step.finished_at.expect("finished");
        assert!(started <= finished);
    }
}

#[test]
fn failure_halts_remaining_steps() {
    let mut executor =
        Recorder::default().reply("c", Reply::Exit(2, "npm ERR! build failed\n"));

    let execution = Orchestrator::new(diamond())
        .run(&mut executor)
        .expect("schedulable");

    assert_eq!(execution.status, RunStatus::Failed);
    assert_eq!(executor.commands(), ["a", "b", "c"]);
    assert_eq!(
        statuses(&execution.steps),
        [
            StepStatus::Succeeded,
            StepStatus::Succeeded,
            StepStatus::Failed,
            StepStatus::Pending,
        ]
    );

    let failed = execution.failed_step().expect("failed step");
    assert_eq!(failed.name, "C");
    assert_eq!(failed.exit_code, Some(2));
    assert_eq!(failed.failure, Some(FailureKind::ExecutionFailed));
    assert_eq!(failed.output, "npm ERR! build failed\n");
    assert!(execution.steps[3].started_at.is_none());

    match execution.error() {
        Some(DeployError::StepExecutionFailed { step, output }) => {
            assert_eq!(step, "C");
            assert!(output.contains("build failed"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn first_step_failure_dispatches_nothing_else() {
    let mut executor = Recorder::default().reply("a", Reply::Exit(1, ""));

    let execution = Orchestrator::new(diamond())
        .run(&mut executor)
        .expect("schedulable");

    assert_eq!(executor.commands(), ["a"]);
    assert_eq!(execution.failed_step().map(|s| s.name.as_str()), Some("A"));
    assert_eq!(execution.steps.len(), 4);
}

#[test]
fn rerun_is_deterministic() {
    let orchestrator = Orchestrator::new(diamond());

    let mut first = Recorder::default();
    let mut second = Recorder::default();
    let one = orchestrator.run(&mut first).expect("schedulable");
    let two = orchestrator.run(&mut second).expect("schedulable");

    assert_eq!(one.status, RunStatus::Succeeded);
    assert_eq!(two.status, RunStatus::Succeeded);
    assert_eq!(one.step_names(), two.step_names());
    assert_eq!(first.commands(), second.commands());
}

#[test]
fn tolerated_failure_lets_run_continue() {
    let graph = StepGraph::new(vec![
        Step::new("A", "a"),
        Step::new("B", "b").requires("A").continue_on_failure(),
        Step::new("C", "c").requires("B"),
    ])
    .expect("valid graph");
    let mut executor = Recorder::default().reply("b", Reply::Exit(1, "migration skipped\n"));

    let execution = Orchestrator::new(graph)
        .run(&mut executor)
        .expect("schedulable");

    assert_eq!(execution.status, RunStatus::Succeeded);
    assert_eq!(executor.commands(), ["a", "b", "c"]);
    assert_eq!(execution.steps[1].status, StepStatus::Failed);
    assert!(execution.steps[1].tolerated);
    assert_eq!(execution.steps[2].status, StepStatus::Succeeded);
    assert!(execution.failed_step().is_none());
    assert!(execution.error().is_none());
}

#[test]
fn unreachable_host_is_connection_unavailable() {
    let mut executor = Recorder::default().reply("b", Reply::Unreachable);

    let execution = Orchestrator::new(diamond())
        .run(&mut executor)
        .expect("schedulable");

    assert_eq!(execution.status, RunStatus::Failed);
    assert_eq!(executor.commands(), ["a", "b"]);
    let failed = execution.failed_step().expect("failed step");
    assert_eq!(failed.failure, Some(FailureKind::ConnectionUnavailable));
    assert_eq!(failed.exit_code, None);

    match execution.error() {
        Some(DeployError::ConnectionUnavailable { step, message }) => {
            assert_eq!(step, "B");
            assert!(message.contains("Connection refused"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn timeout_fails_step_and_keeps_partial_output() {
    let mut executor = Recorder::default().reply("b", Reply::TimedOut);

    let execution = Orchestrator::new(diamond())
        .step_timeout(Duration::from_secs(5))
        .run(&mut executor)
        .expect("schedulable");

    let failed = execution.failed_step().expect("failed step");
    assert_eq!(failed.name, "B");
    assert_eq!(failed.failure, Some(FailureKind::TimedOut));
    assert!(failed.output.starts_with("still building"));
    assert!(failed.output.contains("timed out after 5s"));
    assert!(matches!(
        execution.error(),
        Some(DeployError::StepExecutionFailed { .. })
    ));
}

#[test]
fn step_timeout_overrides_default() {
    let graph = StepGraph::new(vec![
        Step::new("A", "a"),
        Step::new("B", "b").timeout(Duration::from_secs(3600)),
    ])
    .expect("valid graph");
    let mut executor = Recorder::default();

    Orchestrator::new(graph)
        .step_timeout(Duration::from_secs(600))
        .run(&mut executor)
        .expect("schedulable");

    assert_eq!(executor.calls[0].1, Some(Duration::from_secs(600)));
    assert_eq!(executor.calls[1].1, Some(Duration::from_secs(3600)));
}

#[test]
fn no_timeout_by_default() {
    let mut executor = Recorder::default();

    Orchestrator::new(diamond())
        .run(&mut executor)
        .expect("schedulable");

    assert!(executor.calls.iter().all(|(_, t)| t.is_none()));
}

#[test]
fn cancellation_stops_before_next_dispatch() {
    let token = CancelToken::new();
    let mut executor = Recorder {
        cancel_after: Some(("b", token.clone())),
        ..Recorder::default()
    };

    let execution = Orchestrator::new(diamond())
        .cancel_token(token)
        .run(&mut executor)
        .expect("schedulable");

    assert_eq!(execution.status, RunStatus::Cancelled);
    assert_eq!(executor.commands(), ["a", "b"]);
    assert_eq!(execution.steps[1].status, StepStatus::Succeeded);
    assert_eq!(
        &statuses(&execution.steps)[2..],
        [StepStatus::Pending, StepStatus::Pending]
    );
    assert!(execution.failed_step().is_none());
    match execution.error() {
        Some(DeployError::Cancelled { step }) => assert_eq!(step, "C"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn cancelled_before_start_runs_nothing() {
    let token = CancelToken::new();
    token.cancel();
    let mut executor = Recorder::default();

    let execution = Orchestrator::new(diamond())
        .cancel_token(token)
        .run(&mut executor)
        .expect("schedulable");

    assert_eq!(execution.status, RunStatus::Cancelled);
    assert!(executor.calls.is_empty());
    assert!(
        execution
            .steps
            .iter()
            .all(|s| s.status == StepStatus::Pending)
    );
}

#[test]
fn interrupted_step_cancels_run() {
    let mut executor = Recorder::default().reply("b", Reply::Interrupted);

    let execution = Orchestrator::new(diamond())
        .run(&mut executor)
        .expect("schedulable");

    assert_eq!(execution.status, RunStatus::Cancelled);
    assert_eq!(executor.commands(), ["a", "b"]);
    assert_eq!(
        statuses(&execution.steps),
        [
            StepStatus::Succeeded,
            StepStatus::Failed,
            StepStatus::Pending,
            StepStatus::Pending,
        ]
    );
    let interrupted = &execution.steps[1];
    assert_eq!(interrupted.failure, Some(FailureKind::Interrupted));
    assert!(interrupted.output.starts_with("compiling"));
    assert!(interrupted.output.ends_with("interrupted"));
    match execution.error() {
        Some(DeployError::Cancelled { step }) => assert_eq!(step, "B"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn interrupted_step_is_never_tolerated() {
    let graph = StepGraph::new(vec![
        Step::new("A", "a").continue_on_failure(),
        Step::new("B", "b").requires("A"),
    ])
    .expect("valid graph");
    let mut executor = Recorder::default().reply("a", Reply::Interrupted);

    let execution = Orchestrator::new(graph)
        .run(&mut executor)
        .expect("schedulable");

    assert_eq!(execution.status, RunStatus::Cancelled);
    assert_eq!(executor.commands(), ["a"]);
    assert!(!execution.steps[0].tolerated);
    assert_eq!(execution.steps[1].status, StepStatus::Pending);
}
