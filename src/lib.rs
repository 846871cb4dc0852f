//! Dependency-gated deployment of a Node.js application to a
//! single server over SSH.
//!
//! Trebuchet provisions one Linux host, checks out an application's
//! backend and frontend, builds both, puts them under PM2 and fronts
//! them with Apache and a Let's Encrypt certificate. Every part of
//! that is a bash script sent over one persistent SSH connection.
//!
//! # Overview
//!
//! - [`Config`] is resolved once from a `KEY=VALUE` file, the
//!   process environment and defaults.
//! - [`render`] turns it into one self-contained script per
//!   [`StepKind`](render::StepKind). Configuration values only reach
//!   a script through a quoted variable preamble.
//! - A [`StepGraph`] holds named [`Step`]s and their prerequisites,
//!   and is rejected up front if a prerequisite is unknown or the
//!   graph has a cycle.
//! - The [`Orchestrator`] runs the schedule one step at a time over a
//!   [`RemoteExecutor`], halting on the first failure, and the
//!   outcome is summarized in a [`RunReport`].
//!
//! # Architecture
//!
//! Scheduling is a topological sort that always picks the ready
//! step declared first, so the order is fully determined by the
//! declaration:
//!
//! ```text
//! SystemSetup -> SSLSetup -> GitDeploy -> EnvUpload
//!   -> BackendBuild -> FrontendBuild -> PM2Config
//!   -> ApacheConfig -> FinalSetup
//! ```
//!
//! The orchestrator does not retry, roll back or remember earlier
//! runs. Re-running is safe because each script detects state left
//! by a previous run.
//!
//! # Examples
//!
//! Custom step graphs can be run against any executor:
//!
//! ```rust,no_run
//! use trebuchet::{Orchestrator, SshSession, Step, StepGraph};
//! use trebuchet::config::Connection;
//!
//! fn main() -> anyhow::Result<()> {
//!     let graph = StepGraph::new(vec![
//!         Step::new("update", "apt-get update"),
//!         Step::new("nginx", "apt-get install -y nginx").requires("update"),
//!         Step::new("motd", "echo hello > /etc/motd")
//!             .requires("update")
//!             .continue_on_failure(),
//!     ])?;
//!
//!     let mut ssh = SshSession::new(&Connection {
//!         host: "203.0.113.10".into(),
//!         user: "root".into(),
//!         port: 22,
//!         private_key: std::fs::read_to_string("id_ed25519")?,
//!     })?;
//!
//!     let execution = Orchestrator::new(graph).run(&mut ssh)?;
//!     if let Some(err) = execution.error() {
//!         eprintln!("{err}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! The `trebuchet` binary wraps the standard [`Pipeline`]:
//!
//! ```sh
//! # Show the schedule
//! trebuchet plan
//!
//! # Print every script without connecting
//! trebuchet deploy --dry-run
//!
//! # Deploy, killing any step that runs past 30 minutes
//! trebuchet --config prod.env deploy --step-timeout 1800
//! ```

// Allow noisy pedantic lints that don't add value for a
// deployment tool crate.
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions
)]

pub mod cmd;
pub mod config;
pub mod error;
pub mod graph;
pub mod logging;
pub mod orchestrator;
pub mod pipeline;
pub mod remote;
pub mod render;
pub mod report;
pub mod shell;

#[cfg(test)]
mod test_support;

pub use config::Config;
pub use error::{DeployError, DeployResult};
pub use graph::{Step, StepGraph};
pub use orchestrator::{CancelToken, Orchestrator};
pub use pipeline::Pipeline;
pub use remote::RemoteExecutor;
pub use remote::ssh::SshSession;
pub use report::RunReport;
