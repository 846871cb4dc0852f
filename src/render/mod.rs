//! Remote script renderers, one per deployment step.
//!
//! Renderers are pure: they read the resolved [`Config`] and
//! return a self-contained bash script. Configuration values only
//! enter a script through the quoted variable preamble built by
//! [`script`], never by splicing them into command text.

pub mod apache;
pub mod build;
pub mod finalize;
pub mod git;
pub mod pm2;
pub mod ssl;
pub mod system;

use std::fmt;
use std::str::FromStr;

use crate::config::Config;
use crate::shell;

/// The steps of the standard deployment, in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepKind {
    SystemSetup,
    SslSetup,
    GitDeploy,
    EnvUpload,
    BackendBuild,
    FrontendBuild,
    Pm2Config,
    ApacheConfig,
    FinalSetup,
}

impl StepKind {
    pub const ALL: [Self; 9] = [
        Self::SystemSetup,
        Self::SslSetup,
        Self::GitDeploy,
        Self::EnvUpload,
        Self::BackendBuild,
        Self::FrontendBuild,
        Self::Pm2Config,
        Self::ApacheConfig,
        Self::FinalSetup,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::SystemSetup => "SystemSetup",
            Self::SslSetup => "SSLSetup",
            Self::GitDeploy => "GitDeploy",
            Self::EnvUpload => "EnvUpload",
            Self::BackendBuild => "BackendBuild",
            Self::FrontendBuild => "FrontendBuild",
            Self::Pm2Config => "PM2Config",
            Self::ApacheConfig => "ApacheConfig",
            Self::FinalSetup => "FinalSetup",
        }
    }

    /// Steps that must have completed before this one may start.
    #[must_use]
    pub const fn prerequisites(self) -> &'static [Self] {
        match self {
            Self::SystemSetup => &[],
            Self::SslSetup | Self::GitDeploy => &[Self::SystemSetup],
            Self::EnvUpload => &[Self::GitDeploy],
            Self::BackendBuild | Self::FrontendBuild => &[Self::EnvUpload],
            Self::Pm2Config => &[Self::BackendBuild, Self::FrontendBuild],
            Self::ApacheConfig => &[Self::SslSetup, Self::Pm2Config],
            Self::FinalSetup => &[Self::ApacheConfig],
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StepKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                let names: Vec<&str> = Self::ALL.iter().map(|k| k.name()).collect();
                format!("unknown step '{s}', expected one of: {}", names.join(", "))
            })
    }
}

/// Render the remote script for `kind`.
#[must_use]
pub fn render(kind: StepKind, config: &Config) -> String {
    match kind {
        StepKind::SystemSetup => system::render(config),
        StepKind::SslSetup => ssl::render(config),
        StepKind::GitDeploy => git::render_deploy(config),
        StepKind::EnvUpload => git::render_env_upload(config),
        StepKind::BackendBuild => build::render_backend(config),
        StepKind::FrontendBuild => build::render_frontend(config),
        StepKind::Pm2Config => pm2::render(config),
        StepKind::ApacheConfig => apache::render(config),
        StepKind::FinalSetup => finalize::render(config),
    }
}

/// Assemble a script: `set -e`, the quoted variable preamble, then
/// `body` which must only reference configuration through those
/// variables.
///
/// The body is a single group with stdin from `/dev/null`. Scripts
/// arrive on the remote shell's stdin, so bash parses the whole body
/// before running it and no command inside can read the rest.
pub(crate) fn script(vars: &[(&str, &str)], body: &str) -> String {
    format!(
        "set -e\n\n{}\n{{\n{}\n}} < /dev/null\n",
        shell::assignments(vars),
        body.trim_matches('\n')
    )
}
