use std::fmt;
use std::fs;
use std::path::Path;

use indexmap::IndexMap;

use crate::error::{DeployError, DeployResult};

/// Config file read when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = ".env";

const DEFAULT_APP_NAME: &str = "app";
const DEFAULT_SSH_USER: &str = "root";
const DEFAULT_SSH_PORT: u16 = 22;
const DEFAULT_BRANCH: &str = "main";
const DEFAULT_NODE_VERSION: &str = "22";
const DEFAULT_BACKEND_ENV_FILE: &str = ".env.backend";
const DEFAULT_FRONTEND_ENV_FILE: &str = ".env.frontend";
const DEFAULT_BACKEND_PORT: u16 = 8000;
const DEFAULT_FRONTEND_PORT: u16 = 3000;

/// Everything a deployment run needs, resolved once at startup and
/// shared read-only by the renderers and the pipeline.
#[derive(Clone, PartialEq, Eq)]
pub struct Config {
    pub app_name: String,
    pub host: String,
    pub user: String,
    pub ssh_port: u16,
    /// Private key material, not a path.
    pub private_key: String,
    /// Repository URL with the access token already spliced in.
    pub repo_url: String,
    pub branch: String,
    pub domain: String,
    pub node_version: String,
    pub deployment_path: String,
    pub env_backend: String,
    pub env_frontend: String,
    pub backend_port: u16,
    pub frontend_port: u16,
    pub cert_email: String,
}

/// The single remote target of a run.
#[derive(Clone, PartialEq, Eq)]
pub struct Connection {
    pub host: String,
    pub user: String,
    pub port: u16,
    pub private_key: String,
}

impl Config {
    /// Resolve configuration from `path` (missing file means no
    /// file values), the process environment, and defaults.
    pub fn load(path: &Path) -> DeployResult<Self> {
        let settings = Settings::from_file(path)?;
        Self::resolve(&settings)
    }

    /// Build a `Config` from already-gathered settings, reading the
    /// key and environment payload files they reference.
    pub fn resolve(settings: &Settings) -> DeployResult<Self> {
        let host = settings.lookup("SERVER_IP");
        let key_path = settings.lookup("SSH_KEY_PATH");
        let repo = settings.lookup("GIT_REPO_URL");
        let domain = settings.lookup("DOMAIN");

        let missing: Vec<&str> = [
            ("SERVER_IP", &host),
            ("SSH_KEY_PATH", &key_path),
            ("GIT_REPO_URL", &repo),
            ("DOMAIN", &domain),
        ]
        .iter()
        .filter(|(_, v)| v.is_none())
        .map(|(k, _)| *k)
        .collect();

        let (Some(host), Some(key_path), Some(repo), Some(domain)) = (host, key_path, repo, domain)
        else {
            return Err(DeployError::ConfigurationInvalid(format!(
                "missing required settings: {}",
                missing.join(", ")
            )));
        };

        let private_key = read_payload("SSH_KEY_PATH", &key_path)?;
        if private_key.trim().is_empty() {
            return Err(DeployError::ConfigurationInvalid(format!(
                "SSH key file {key_path} is empty"
            )));
        }

        let backend_env_path = settings.get_or("BACKEND_ENV_FILE", DEFAULT_BACKEND_ENV_FILE);
        let frontend_env_path = settings.get_or("FRONTEND_ENV_FILE", DEFAULT_FRONTEND_ENV_FILE);
        let env_backend = read_payload("BACKEND_ENV_FILE", &backend_env_path)?;
        let env_frontend = read_payload("FRONTEND_ENV_FILE", &frontend_env_path)?;

        tracing::info!(
            backend = %backend_env_path,
            frontend = %frontend_env_path,
            "using environment files"
        );

        let app_name = settings.get_or("APP_NAME", DEFAULT_APP_NAME);
        let deployment_path = settings
            .lookup("DEPLOYMENT_PATH")
            .unwrap_or_else(|| format!("/var/www/{app_name}"));
        let token = settings.lookup("GIT_TOKEN");
        let cert_email = settings
            .lookup("CERT_EMAIL")
            .unwrap_or_else(|| format!("admin@{domain}"));

        Ok(Self {
            user: settings.get_or("SSH_USER", DEFAULT_SSH_USER),
            ssh_port: settings.port("SSH_PORT", DEFAULT_SSH_PORT)?,
            repo_url: splice_token(&repo, token.as_deref()),
            branch: settings.get_or("GIT_BRANCH", DEFAULT_BRANCH),
            node_version: settings.get_or("NODE_VERSION", DEFAULT_NODE_VERSION),
            backend_port: settings.port("BACKEND_PORT", DEFAULT_BACKEND_PORT)?,
            frontend_port: settings.port("FRONTEND_PORT", DEFAULT_FRONTEND_PORT)?,
            app_name,
            host,
            private_key,
            domain,
            deployment_path,
            env_backend,
            env_frontend,
            cert_email,
        })
    }

    #[must_use]
    pub fn connection(&self) -> Connection {
        Connection {
            host: self.host.clone(),
            user: self.user.clone(),
            port: self.ssh_port,
            private_key: self.private_key.clone(),
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("app_name", &self.app_name)
            .field("host", &self.host)
            .field("user", &self.user)
            .field("ssh_port", &self.ssh_port)
            .field("private_key", &"<redacted>")
            .field("repo_url", &redact_userinfo(&self.repo_url))
            .field("branch", &self.branch)
            .field("domain", &self.domain)
            .field("node_version", &self.node_version)
            .field("deployment_path", &self.deployment_path)
            .field("env_backend", &format!("<{} bytes>", self.env_backend.len()))
            .field("env_frontend", &format!("<{} bytes>", self.env_frontend.len()))
            .field("backend_port", &self.backend_port)
            .field("frontend_port", &self.frontend_port)
            .field("cert_email", &self.cert_email)
            .finish()
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("host", &self.host)
            .field("user", &self.user)
            .field("port", &self.port)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// Prioritized key/value sources: config file first, then the
/// environment. Empty values count as unset in both.
pub struct Settings {
    file: IndexMap<String, String>,
    env: Box<dyn Fn(&str) -> Option<String>>,
}

impl Settings {
    /// Settings backed by `file` values and the process environment.
    #[must_use]
    pub fn new(file: IndexMap<String, String>) -> Self {
        Self {
            file,
            env: Box::new(|key| std::env::var(key).ok()),
        }
    }

    /// Replace the environment lookup. Tests use this to avoid
    /// touching process state.
    #[must_use]
    pub fn env(mut self, lookup: impl Fn(&str) -> Option<String> + 'static) -> Self {
        self.env = Box::new(lookup);
        self
    }

    /// Read a `KEY=VALUE` file. A file that does not exist yields no
    /// values rather than an error.
    pub fn from_file(path: &Path) -> DeployResult<Self> {
        let vars = if path.exists() {
            parse_env_file(&fs::read_to_string(path)?)
        } else {
            tracing::debug!(path = %path.display(), "config file not found, using environment only");
            IndexMap::new()
        };
        Ok(Self::new(vars))
    }

    /// Look up `key`: file value, else environment value, else
    /// `None`.
    #[must_use]
    pub fn lookup(&self, key: &str) -> Option<String> {
        self.file
            .get(key)
            .filter(|v| !v.is_empty())
            .cloned()
            .or_else(|| (self.env)(key).filter(|v| !v.is_empty()))
    }

    fn get_or(&self, key: &str, default: &str) -> String {
        self.lookup(key).unwrap_or_else(|| default.to_string())
    }

    fn port(&self, key: &str, default: u16) -> DeployResult<u16> {
        self.lookup(key).map_or(Ok(default), |raw| {
            raw.parse().map_err(|_| {
                DeployError::ConfigurationInvalid(format!("{key} is not a valid port: {raw}"))
            })
        })
    }
}

/// Parse `KEY=VALUE` lines. Blank lines and `#` comments are
/// skipped, keys and values are trimmed, and one pair of matching
/// surrounding quotes is removed from values. Later keys win.
#[must_use]
pub fn parse_env_file(content: &str) -> IndexMap<String, String> {
    let mut vars = IndexMap::new();

    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let Some((key, value)) = trimmed.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        vars.insert(key.to_string(), strip_quotes(value.trim()).to_string());
    }

    vars
}

/// Insert `token` as userinfo into an `https://` repository URL.
///
/// ```
/// use trebuchet::config::splice_token;
///
/// assert_eq!(
///     splice_token("https://github.com/acme/app.git", Some("ghp_x")),
///     "https://ghp_x@github.com/acme/app.git"
/// );
/// assert_eq!(
///     splice_token("git@github.com:acme/app.git", Some("ghp_x")),
///     "git@github.com:acme/app.git"
/// );
/// ```
#[must_use]
pub fn splice_token(url: &str, token: Option<&str>) -> String {
    match (token, url.strip_prefix("https://")) {
        (Some(token), Some(rest)) if !token.is_empty() => format!("https://{token}@{rest}"),
        _ => url.to_string(),
    }
}

fn strip_quotes(value: &str) -> &str {
    for q in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(q) && value.ends_with(q) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

fn redact_userinfo(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    let authority_end = rest.find('/').unwrap_or(rest.len());
    match rest[..authority_end].rfind('@') {
        Some(at) => format!("{scheme}://***@{}", &rest[at + 1..]),
        None => url.to_string(),
    }
}

fn read_payload(key: &str, path: &str) -> DeployResult<String> {
    if !Path::new(path).is_file() {
        return Err(DeployError::ConfigurationInvalid(format!(
            "file not found: {path} (set {key} to point at it)"
        )));
    }
    Ok(fs::read_to_string(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_comments_quotes_and_equals_in_values() {
        let vars = parse_env_file(
            "\
# deployment target
SERVER_IP=203.0.113.7
  DOMAIN = \"app.example.com\"
GIT_TOKEN='abc'
DATABASE_URL=mysql://u:p@localhost/db?a=b

NOT_A_PAIR
",
        );

        assert_eq!(vars["SERVER_IP"], "203.0.113.7");
        assert_eq!(vars["DOMAIN"], "app.example.com");
        assert_eq!(vars["GIT_TOKEN"], "abc");
        assert_eq!(vars["DATABASE_URL"], "mysql://u:p@localhost/db?a=b");
        assert!(!vars.contains_key("NOT_A_PAIR"));
        assert_eq!(vars.len(), 4);
    }

    #[test]
    fn mismatched_quotes_are_kept() {
        let vars = parse_env_file("A=\"open\nB='x\"\nC=\"\"");

        assert_eq!(vars["A"], "\"open");
        assert_eq!(vars["B"], "'x\"");
        assert_eq!(vars["C"], "");
    }

    #[test]
    fn file_wins_over_environment() {
        let mut file = IndexMap::new();
        file.insert("DOMAIN".to_string(), "from-file".to_string());
        file.insert("GIT_BRANCH".to_string(), String::new());
        let settings = Settings::new(file).env(|key| match key {
            "DOMAIN" => Some("from-env".into()),
            "GIT_BRANCH" => Some("develop".into()),
            _ => None,
        });

        assert_eq!(settings.lookup("DOMAIN").as_deref(), Some("from-file"));
        assert_eq!(settings.lookup("GIT_BRANCH").as_deref(), Some("develop"));
        assert_eq!(settings.lookup("NODE_VERSION"), None);
    }

    #[test]
    fn redacts_token_in_debug() {
        assert_eq!(
            redact_userinfo("https://ghp_secret@github.com/a/b.git"),
            "https://***@github.com/a/b.git"
        );
        assert_eq!(
            redact_userinfo("https://github.com/a/b@c.git"),
            "https://github.com/a/b@c.git"
        );
    }

    #[test]
    fn splice_ignores_empty_token() {
        assert_eq!(
            splice_token("https://github.com/a/b.git", Some("")),
            "https://github.com/a/b.git"
        );
        assert_eq!(
            splice_token("https://github.com/a/b.git", None),
            "https://github.com/a/b.git"
        );
    }
}
