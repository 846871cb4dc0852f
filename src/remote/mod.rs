pub mod ssh;

use std::time::Duration;

use crate::error::DeployResult;

/// Result of running one command on the remote host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    #[must_use]
    pub const fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Stdout followed by stderr, as shown to the operator.
    #[must_use]
    pub fn combined(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => {
                let sep = if self.stdout.ends_with('\n') { "" } else { "\n" };
                format!("{}{sep}{}", self.stdout, self.stderr)
            }
        }
    }
}

/// Runs commands against the one remote target of a run.
///
/// Implementations report a command that ran and exited non-zero
/// as `Ok` with a non-zero `exit_code`. `Err` is reserved for
/// transport problems: [`SshFailed`] when the host cannot be
/// reached or authenticated, [`CommandTimeout`] when the timeout
/// expired.
///
/// [`SshFailed`]: crate::error::DeployError::SshFailed
/// [`CommandTimeout`]: crate::error::DeployError::CommandTimeout
pub trait RemoteExecutor {
    /// Run `command` on the remote host and wait for it to finish.
    fn execute(&mut self, command: &str, timeout: Option<Duration>) -> DeployResult<CommandOutput>;
}
