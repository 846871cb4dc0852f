use chrono::{TimeZone, Utc};
use trebuchet::Config;
use trebuchet::report::{
    Execution, FailureKind, RunReport, RunStatus, StepOutcome, StepStatus,
};

fn config() -> Config {
    Config {
        app_name: "shop".into(),
        host: "203.0.113.10".into(),
        user: "root".into(),
        ssh_port: 22,
        private_key: "KEY".into(),
        repo_url: "https://github.com/acme/shop.git".into(),
        branch: "main".into(),
        domain: "shop.example.com".into(),
        node_version: "22".into(),
        deployment_path: "/var/www/shop".into(),
        env_backend: String::new(),
        env_frontend: String::new(),
        backend_port: 8000,
        frontend_port: 3000,
        cert_email: "admin@shop.example.com".into(),
    }
}

fn finished(name: &str, status: StepStatus, secs: i64) -> StepOutcome {
    let start = Utc.with_ymd_and_hms(2026, 1, 5, 12, 0, 0).unwrap();
    StepOutcome {
        status,
        exit_code: Some(if status == StepStatus::Failed { 1 } else { 0 }),
        started_at: Some(start),
        finished_at: Some(start + chrono::Duration::seconds(secs)),
        ..StepOutcome::pending(name)
    }
}

fn failed_run() -> RunReport {
    let mut failed = finished("GitDeploy", StepStatus::Failed, 3);
    failed.failure = Some(FailureKind::ExecutionFailed);
    failed.output = "fatal: repository not found\nexit 128\n".into();

    RunReport::new(
        &config(),
        Execution {
            status: RunStatus::Failed,
            steps: vec![
                finished("SystemSetup", StepStatus::Succeeded, 95),
                finished("SSLSetup", StepStatus::Succeeded, 12),
                failed,
                StepOutcome::pending("EnvUpload"),
            ],
        },
    )
}

#[test]
fn failed_report_names_step_and_output() {
    let report = failed_run();

    assert!(!report.succeeded());
    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(report.failed_step.as_deref(), Some("GitDeploy"));
    assert_eq!(report.failure, Some(FailureKind::ExecutionFailed));
    assert_eq!(
        report.failure_output.as_deref(),
        Some("fatal: repository not found\nexit 128\n")
    );
    assert_eq!(report.app_name, "shop");
    assert_eq!(report.domain, "shop.example.com");
    assert_eq!(report.deployment_path, "/var/www/shop");
}

#[test]
fn text_summary() {
    let text = failed_run().to_string();

    assert!(text.starts_with("Deployment FAILED\n"));
    assert!(text.contains("  Domain:      shop.example.com\n"));
    assert!(text.contains("  [  ok] SystemSetup (95s)\n"));
    assert!(text.contains("  [FAIL] GitDeploy (3s)\n"));
    assert!(text.contains("  [   -] EnvUpload\n"));
    assert!(text.contains("Output of GitDeploy:\n  fatal: repository not found\n  exit 128\n"));
}

#[test]
fn json_summary() {
    let json: serde_json::Value =
        serde_json::from_str(&failed_run().to_json().expect("serializable")).expect("json");

    assert_eq!(json["status"], "failed");
    assert_eq!(json["failed_step"], "GitDeploy");
    assert_eq!(json["failure"], "execution_failed");
    assert_eq!(json["steps"].as_array().map(Vec::len), Some(4));
    assert_eq!(json["steps"][0]["status"], "succeeded");
    assert_eq!(json["steps"][3]["status"], "pending");
    assert!(json["steps"][3]["started_at"].is_null());
    assert_eq!(json["steps"][0]["started_at"], "2026-01-05T12:00:00Z");
}

#[test]
fn successful_report_has_no_failure_fields() {
    let report = RunReport::new(
        &config(),
        Execution {
            status: RunStatus::Succeeded,
            steps: vec![finished("SystemSetup", StepStatus::Succeeded, 1)],
        },
    );

    assert!(report.succeeded());
    assert!(report.failed_step.is_none());
    assert!(report.failure_output.is_none());
    let text = report.to_string();
    assert!(text.starts_with("Deployment succeeded\n"));
    assert!(!text.contains("Output of"));
}

#[test]
fn tolerated_failure_is_a_warning() {
    let mut tolerated = finished("BackendBuild", StepStatus::Failed, 2);
    tolerated.tolerated = true;
    tolerated.failure = Some(FailureKind::ExecutionFailed);

    let report = RunReport::new(
        &config(),
        Execution {
            status: RunStatus::Succeeded,
            steps: vec![tolerated],
        },
    );

    assert!(report.succeeded());
    assert!(report.failed_step.is_none());
    assert!(report.to_string().contains("[warn] BackendBuild"));
}

#[test]
fn cancelled_report() {
    let report = RunReport::new(
        &config(),
        Execution {
            status: RunStatus::Cancelled,
            steps: vec![
                finished("SystemSetup", StepStatus::Succeeded, 1),
                StepOutcome::pending("SSLSetup"),
            ],
        },
    );

    assert!(!report.succeeded());
    assert!(report.failed_step.is_none());
    assert!(report.to_string().starts_with("Deployment cancelled\n"));
}
