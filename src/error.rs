use std::time::Duration;

pub type DeployResult<T> = Result<T, DeployError>;

#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("invalid configuration: {0}")]
    ConfigurationInvalid(String),

    #[error("invalid step graph: {0}")]
    GraphInvalid(String),

    #[error("step '{step}' failed")]
    StepExecutionFailed { step: String, output: String },

    #[error("connection unavailable during step '{step}': {message}")]
    ConnectionUnavailable { step: String, message: String },

    #[error("run cancelled before step '{step}'")]
    Cancelled { step: String },

    #[error("SSH connection failed: {0}")]
    SshFailed(String),

    #[error("command not found: {0}")]
    CommandNotFound(String),

    #[error("command timed out after {}s: {command}", timeout.as_secs())]
    CommandTimeout {
        command: String,
        timeout: Duration,
        output: String,
    },

    #[error("command interrupted: {command}")]
    Interrupted { command: String, output: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
