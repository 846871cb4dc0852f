use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::signal;

use crate::config::{Config, DEFAULT_CONFIG_FILE};
use crate::error::DeployResult;
use crate::graph::{Step, StepGraph};
use crate::logging::{self, LogLevel};
use crate::orchestrator::{CancelToken, Orchestrator};
use crate::remote::RemoteExecutor;
use crate::remote::ssh::SshSession;
use crate::render::{self, StepKind};
use crate::report::RunReport;

const STATUS_TIMEOUT: Duration = Duration::from_secs(60);

/// The standard deployment: system packages, TLS, checkout, build,
/// process supervision and reverse proxy for one application on one
/// host.
pub struct Pipeline {
    config: Config,
    step_timeout: Option<Duration>,
    cancel: CancelToken,
}

impl Pipeline {
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            step_timeout: None,
            cancel: CancelToken::new(),
        }
    }

    /// Kill any step still running after `timeout`.
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
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Steps in declaration order, each with its rendered script.
    #[must_use]
    pub fn steps(&self) -> Vec<Step> {
        standard_steps(&self.config)
    }

    pub fn graph(&self) -> DeployResult<StepGraph> {
        StepGraph::new(self.steps())
    }

    pub fn orchestrator(&self) -> DeployResult<Orchestrator> {
        let mut orchestrator = Orchestrator::new(self.graph()?).cancel_token(self.cancel.clone());
        if let Some(timeout) = self.step_timeout {
            orchestrator = orchestrator.step_timeout(timeout);
        }
        Ok(orchestrator)
    }

    /// Run every step against `executor` and summarize the result.
    ///
    /// Only an invalid step graph is returned as `Err`; step
    /// failures and cancellation come back inside the report.
    pub fn deploy(&self, executor: &mut dyn RemoteExecutor) -> DeployResult<RunReport> {
        let orchestrator = self.orchestrator()?;
        tracing::info!(
            app = %self.config.app_name,
            domain = %self.config.domain,
            host = %self.config.host,
            steps = orchestrator.graph().len(),
            "starting deployment"
        );

        let execution = orchestrator.run(executor)?;
        match execution.error() {
            Some(e) => tracing::error!(error = %e, "deployment did not complete"),
            None => tracing::info!(domain = %self.config.domain, "deployment complete"),
        }

        Ok(RunReport::new(&self.config, execution))
    }

    fn cmd_deploy(&self, dry_run: bool, json: bool) -> anyhow::Result<ExitCode> {
        if dry_run {
            self.cmd_deploy_dry_run()?;
            return Ok(ExitCode::SUCCESS);
        }

        cancel_on_interrupt(self.cancel.clone());
        let mut session =
            SshSession::new(&self.config.connection())?.abort_on(self.cancel.clone());
        let report = self.deploy(&mut session)?;
        drop(session);

        if json {
            println!("{}", report.to_json()?);
        } else {
            print!("{report}");
        }

        Ok(if report.succeeded() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        })
    }

    fn cmd_deploy_dry_run(&self) -> DeployResult<()> {
        let graph = self.graph()?;
        let schedule = graph.schedule()?;

        eprintln!("=== Dry run: no changes will be made ===");
        eprintln!(
            "Target: {}@{}:{}",
            self.config.user, self.config.host, self.config.ssh_port
        );
        eprintln!();

        for (pos, step) in schedule.iter().enumerate() {
            eprintln!("--- {}. {} ---", pos + 1, step.name);
            println!("{}", step.command);
        }
        Ok(())
    }

    fn cmd_plan(&self) -> DeployResult<()> {
        let graph = self.graph()?;
        for (pos, step) in graph.schedule()?.iter().enumerate() {
            let requires = if step.requires.is_empty() {
                "-".to_string()
            } else {
                step.requires.join(", ")
            };
            println!("{:>2}. {:<14} requires: {requires}", pos + 1, step.name);
        }
        Ok(())
    }

    fn cmd_status(&self) -> anyhow::Result<ExitCode> {
        let mut session = SshSession::new(&self.config.connection())?;
        let output = session.execute("pm2 list", Some(STATUS_TIMEOUT))?;
        print!("{}", output.combined());
        Ok(if output.success() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        })
    }
}

/// The nine standard steps, rendered for `config`.
#[must_use]
pub fn standard_steps(config: &Config) -> Vec<Step> {
    StepKind::ALL
        .into_iter()
        .map(|kind| {
            kind.prerequisites()
                .iter()
                .fold(
                    Step::new(kind.name(), &render::render(kind, config)),
                    |step, dep| step.requires(dep.name()),
                )
                .delete_before_replace(false)
        })
        .collect()
}

/// Parse CLI arguments, load configuration and dispatch.
pub fn run() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    logging::init(cli.log_level, cli.json_logs)?;

    match &cli.command {
        Command::Render { step } => {
            let config = load_config(&cli)?;
            println!("{}", render::render(*step, &config));
            Ok(ExitCode::SUCCESS)
        }
        Command::Plan => {
            Pipeline::new(load_config(&cli)?).cmd_plan()?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Status => Pipeline::new(load_config(&cli)?).cmd_status(),
        Command::Deploy {
            dry_run,
            step_timeout,
            json,
        } => {
            let mut pipeline = Pipeline::new(load_config(&cli)?);
            if let Some(secs) = step_timeout {
                pipeline = pipeline.step_timeout(Duration::from_secs(*secs));
            }
            pipeline.cmd_deploy(*dry_run, *json)
        }
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    Config::load(&cli.config)
        .with_context(|| format!("loading configuration from {}", cli.config.display()))
}

/// Cancel `token` on the first Ctrl-C; a second one aborts the
/// running step. Either way the deployment returns normally, so the
/// SSH session is torn down before the process exits.
fn cancel_on_interrupt(token: CancelToken) {
    thread::spawn(move || {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(e) => {
                tracing::warn!(error = %e, "Ctrl-C handling unavailable");
                return;
            }
        };

        runtime.block_on(async {
            if signal::ctrl_c().await.is_err() {
                return;
            }
            tracing::warn!("interrupt received, stopping after the current step");
            token.cancel();

            if signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupted again, killing the current step");
                token.abort();
            }
        });
    });
}

#[derive(Parser)]
#[command(name = "trebuchet", version)]
#[command(about = "Deploy a Node.js backend and frontend to a single server")]
struct Cli {
    /// KEY=VALUE configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Log verbosity, overridden by RUST_LOG
    #[arg(long, global = true, value_enum, default_value_t = LogLevel::Info)]
    log_level: LogLevel,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full deployment
    Deploy {
        /// Print the schedule and scripts without connecting
        #[arg(long)]
        dry_run: bool,

        /// Kill any step running longer than this
        #[arg(long, value_name = "SECS")]
        step_timeout: Option<u64>,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the step schedule
    Plan,

    /// Print the rendered script of one step
    Render {
        /// Step name, e.g. ApacheConfig
        step: StepKind,
    },

    /// Show PM2 process status on the server
    Status,
}
