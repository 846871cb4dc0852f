use serde::Serialize;

use crate::config::Config;
use crate::shell;

const LOG_DIR: &str = "/var/log/pm2";
const MAX_MEMORY: &str = "1G";

#[derive(Debug, Serialize)]
struct Ecosystem {
    apps: Vec<Process>,
}

#[derive(Debug, Serialize)]
struct Process {
    name: String,
    cwd: String,
    script: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    args: Option<String>,
    instances: u32,
    autorestart: bool,
    watch: bool,
    max_memory_restart: String,
    env: ProcessEnv,
    error_file: String,
    out_file: String,
    log_date_format: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct ProcessEnv {
    node_env: String,
    port: u16,
}

/// PM2 process name of the backend.
#[must_use]
pub fn backend_name(config: &Config) -> String {
    format!("{}-backend", config.app_name)
}

/// PM2 process name of the frontend.
#[must_use]
pub fn frontend_name(config: &Config) -> String {
    format!("{}-frontend", config.app_name)
}

/// Render `ecosystem.config.json` describing both processes.
#[must_use]
pub fn ecosystem(config: &Config) -> String {
    let backend = backend_name(config);
    let frontend = frontend_name(config);

    let ecosystem = Ecosystem {
        apps: vec![
            process(
                &backend,
                format!("{}/backend", config.deployment_path),
                "dist/server.js",
                None,
                config.backend_port,
            ),
            process(
                &frontend,
                format!("{}/frontend", config.deployment_path),
                "npm",
                Some("start"),
                config.frontend_port,
            ),
        ],
    };

    serde_json::to_string_pretty(&ecosystem).expect("failed to serialize ecosystem")
}

/// Write the ecosystem file and (re)start both processes under PM2.
#[must_use]
pub fn render(config: &Config) -> String {
    let backend = backend_name(config);
    let frontend = frontend_name(config);

    let body = format!(
        r#"
echo "Configuring PM2..."

{write}
mkdir -p {LOG_DIR}

pm2 delete "$BACKEND_NAME" "$FRONTEND_NAME" 2>/dev/null || true

echo "Starting applications with PM2..."
cd "$DEPLOY_PATH"
pm2 start ecosystem.config.json
pm2 save

echo "PM2 configuration complete"
"#,
        write = shell::write_file("\"$DEPLOY_PATH/ecosystem.config.json\"", &ecosystem(config)),
    );

    super::script(
        &[
            ("DEPLOY_PATH", &config.deployment_path),
            ("BACKEND_NAME", &backend),
            ("FRONTEND_NAME", &frontend),
        ],
        &body,
    )
}

fn process(name: &str, cwd: String, script: &str, args: Option<&str>, port: u16) -> Process {
    Process {
        name: name.to_string(),
        cwd,
        script: script.to_string(),
        args: args.map(ToString::to_string),
        instances: 1,
        autorestart: true,
        watch: false,
        max_memory_restart: MAX_MEMORY.to_string(),
        env: ProcessEnv {
            node_env: "production".to_string(),
            port,
        },
        error_file: format!("{LOG_DIR}/{name}-error.log"),
        out_file: format!("{LOG_DIR}/{name}-out.log"),
        log_date_format: "YYYY-MM-DD HH:mm:ss Z".to_string(),
    }
}
