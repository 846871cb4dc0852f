use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use tempfile::{NamedTempFile, TempDir};

use crate::cmd;
use crate::config::Connection;
use crate::error::{DeployError, DeployResult};
use crate::orchestrator::CancelToken;
use crate::remote::{CommandOutput, RemoteExecutor};

/// Exit code OpenSSH uses for its own failures.
const SSH_ERROR_EXIT: i32 = 255;
const CONNECT_ATTEMPTS: u32 = 3;
const CONNECT_INTERVAL: Duration = Duration::from_secs(5);

/// One persistent SSH connection to the deployment target.
///
/// The first command starts an OpenSSH control master; every command
/// then runs as a multiplexed session over it, so a run
/// authenticates once. The private key is written to a temp file
/// readable only by the current user and removed when the session
/// is dropped, which also shuts the master down.
pub struct SshSession {
    host: String,
    user: String,
    port: u16,
    key_file: NamedTempFile,
    control_dir: TempDir,
    connect_attempts: u32,
    abort: Option<CancelToken>,
}

impl SshSession {
    /// Prepare a session for `connection`. Nothing is dialled until
    /// [`connect`](Self::connect) or the first command.
    pub fn new(connection: &Connection) -> DeployResult<Self> {
        let mut key_file = tempfile::Builder::new()
            .prefix("trebuchet-key-")
            .tempfile()?;
        key_file.write_all(connection.private_key.as_bytes())?;
        if !connection.private_key.ends_with('\n') {
            key_file.write_all(b"\n")?;
        }
        key_file.flush()?;

        let control_dir = tempfile::Builder::new()
            .prefix("trebuchet-ssh-")
            .tempdir()?;

        Ok(Self {
            host: connection.host.clone(),
            user: connection.user.clone(),
            port: connection.port,
            key_file,
            control_dir,
            connect_attempts: CONNECT_ATTEMPTS,
            abort: None,
        })
    }

    /// How many times to try opening the connection before giving
    /// up.
    #[must_use]
    pub fn connect_attempts(mut self, attempts: u32) -> Self {
        self.connect_attempts = attempts.max(1);
        self
    }

    /// Kill the running command once `token` is aborted.
    #[must_use]
    pub fn abort_on(mut self, token: CancelToken) -> Self {
        self.abort = Some(token);
        self
    }

    /// Open the control master unless it is already running,
    /// retrying while the host comes up.
    pub fn connect(&self) -> DeployResult<()> {
        if !cmd::command_exists("ssh") {
            return Err(DeployError::CommandNotFound("ssh".into()));
        }
        if self.master_alive() {
            return Ok(());
        }
        self.wait_for_master(self.connect_attempts, CONNECT_INTERVAL)
    }

    #[must_use]
    pub fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }

    fn wait_for_master(&self, max_attempts: u32, interval: Duration) -> DeployResult<()> {
        let mut last_error = String::new();
        for attempt in 1..=max_attempts {
            match self.open_master() {
                Ok(()) => {
                    tracing::info!(destination = %self.destination(), "connected");
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(attempt, max_attempts, error = %e, "SSH not ready");
                    last_error = e.to_string();
                }
            }
            if attempt < max_attempts {
                thread::sleep(interval);
            }
        }

        Err(DeployError::SshFailed(format!(
            "could not connect to {} after {max_attempts} attempts: {last_error}",
            self.destination()
        )))
    }

    fn open_master(&self) -> DeployResult<()> {
        let log = self.master_log();
        let mut args = self.ssh_base_args();
        args.extend(
            [
                "-o",
                "ControlMaster=yes",
                "-o",
                "ControlPersist=300",
                "-E",
            ]
            .map(String::from),
        );
        args.push(log.display().to_string());
        args.extend(["-N", "-f"].map(String::from));
        args.push(self.destination());

        let refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let status = cmd::run_detached("ssh", &refs)?;

        if status.success() && self.master_alive() {
            return Ok(());
        }

        let reason = fs::read_to_string(&log).unwrap_or_default();
        let reason = reason.trim();
        Err(DeployError::SshFailed(if reason.is_empty() {
            format!("ssh exited with {status}")
        } else {
            reason.to_string()
        }))
    }

    fn master_alive(&self) -> bool {
        self.control("check").is_ok_and(|s| s.success())
    }

    fn control(&self, op: &str) -> DeployResult<std::process::ExitStatus> {
        let mut args = self.ssh_base_args();
        args.push("-O".to_string());
        args.push(op.to_string());
        args.push(self.destination());
        let refs: Vec<&str> = args.iter().map(String::as_str).collect();
        cmd::run_detached("ssh", &refs)
    }

    fn control_path(&self) -> PathBuf {
        self.control_dir.path().join("mux")
    }

    fn master_log(&self) -> PathBuf {
        self.control_dir.path().join("master.log")
    }

    fn ssh_base_args(&self) -> Vec<String> {
        vec![
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            "StrictHostKeyChecking=accept-new".to_string(),
            "-o".to_string(),
            "ConnectTimeout=10".to_string(),
            "-o".to_string(),
            "ServerAliveInterval=30".to_string(),
            "-o".to_string(),
            "IdentitiesOnly=yes".to_string(),
            "-o".to_string(),
            format!("ControlPath={}", self.control_path().display()),
            "-i".to_string(),
            self.key_file.path().display().to_string(),
            "-p".to_string(),
            self.port.to_string(),
        ]
    }
}

impl RemoteExecutor for SshSession {
    /// Run `command` through `bash -s` on the host, the script fed
    /// over stdin.
    fn execute(&mut self, command: &str, timeout: Option<Duration>) -> DeployResult<CommandOutput> {
        self.connect()?;

        let mut args = self.ssh_base_args();
        args.push("-o".to_string());
        args.push("ControlMaster=no".to_string());
        args.push(self.destination());
        args.push("bash -s".to_string());

        let refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let abort = self.abort.clone();
        let output = cmd::capture_until("ssh", &refs, Some(command.as_bytes()), timeout, || {
            abort.as_ref().is_some_and(CancelToken::is_aborted)
        })?;

        let result = CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        };

        if result.exit_code == SSH_ERROR_EXIT {
            let stderr = result.stderr.trim();
            return Err(DeployError::SshFailed(if stderr.is_empty() {
                format!("connection to {} failed", self.destination())
            } else {
                stderr.to_string()
            }));
        }

        Ok(result)
    }
}

impl Drop for SshSession {
    fn drop(&mut self) {
        if self.master_alive() {
            let _ = self.control("exit");
            tracing::debug!(destination = %self.destination(), "connection closed");
        }
    }
}
