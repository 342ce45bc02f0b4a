//! Layered configuration for CoPri.
//!
//! Resolution order: built-in defaults → `copri.toml` → `COPRI_*` environment
//! variables → CLI flags (applied by the caller).
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 5000
//! dev_mode = false
//!
//! [secret]
//! path = "instance/github_pat"
//!
//! [repository]
//! path = "."
//! remote = "origin"
//! branch = "main"
//! auth_mode = "header"
//! command_timeout_secs = 120
//! commit_message_prefix = "Automated update from CoPri"
//!
//! [github]
//! api_base_url = "https://api.github.com"
//!
//! [logging]
//! level = "info"
//! format = "pretty"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::git::remote::AuthMode;
use crate::push::{DEFAULT_COMMIT_PREFIX, PushSettings};

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "copri.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Permissive CORS and bind on all interfaces.
    #[serde(default)]
    pub dev_mode: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5000
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            dev_mode: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretSection {
    #[serde(default = "default_secret_path")]
    pub path: PathBuf,
}

fn default_secret_path() -> PathBuf {
    PathBuf::from("instance/github_pat")
}

impl Default for SecretSection {
    fn default() -> Self {
        Self {
            path: default_secret_path(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositorySection {
    #[serde(default = "default_repo_path")]
    pub path: PathBuf,
    #[serde(default = "default_remote")]
    pub remote: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default)]
    pub auth_mode: AuthMode,
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
    #[serde(default = "default_commit_prefix")]
    pub commit_message_prefix: String,
}

fn default_repo_path() -> PathBuf {
    PathBuf::from(".")
}

fn default_remote() -> String {
    "origin".to_string()
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_command_timeout_secs() -> u64 {
    120
}

fn default_commit_prefix() -> String {
    DEFAULT_COMMIT_PREFIX.to_string()
}

impl Default for RepositorySection {
    fn default() -> Self {
        Self {
            path: default_repo_path(),
            remote: default_remote(),
            branch: default_branch(),
            remote_url: None,
            username: None,
            auth_mode: AuthMode::default(),
            command_timeout_secs: default_command_timeout_secs(),
            commit_message_prefix: default_commit_prefix(),
        }
    }
}

impl RepositorySection {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn push_settings(&self) -> PushSettings {
        PushSettings {
            remote: self.remote.clone(),
            branch: self.branch.clone(),
            remote_url: self.remote_url.clone(),
            username: self.username.clone(),
            auth_mode: self.auth_mode,
            commit_message_prefix: self.commit_message_prefix.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitHubSection {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
}

fn default_api_base_url() -> String {
    "https://api.github.com".to_string()
}

impl Default for GitHubSection {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Pretty => write!(f, "pretty"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => anyhow::bail!("Invalid log format '{}'. Valid values: pretty, json", s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
    /// Daily rolling log files are written here in addition to stderr.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            directory: None,
        }
    }
}

/// Complete CoPri configuration, as read from `copri.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopriConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub secret: SecretSection,
    #[serde(default)]
    pub repository: RepositorySection,
    #[serde(default)]
    pub github: GitHubSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl CopriConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse copri.toml")
    }

    /// Load `explicit` if given (it must exist), else `./copri.toml` when present,
    /// else defaults.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::load(path),
            None => {
                let path = Path::new(CONFIG_FILE_NAME);
                if path.exists() {
                    Self::load(path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize copri.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Apply `COPRI_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply `COPRI_*` overrides using `lookup` to read variables.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(host) = var("COPRI_HOST") {
            self.server.host = host;
        }
        if let Some(port) = var("COPRI_PORT") {
            self.server.port = port
                .trim()
                .parse()
                .with_context(|| format!("Invalid COPRI_PORT '{}'", port))?;
        }
        if let Some(path) = var("COPRI_SECRET_PATH") {
            self.secret.path = PathBuf::from(path);
        }
        if let Some(path) = var("COPRI_REPO_PATH") {
            self.repository.path = PathBuf::from(path);
        }
        if let Some(remote) = var("COPRI_REMOTE") {
            self.repository.remote = remote;
        }
        if let Some(branch) = var("COPRI_BRANCH") {
            self.repository.branch = branch;
        }
        if let Some(url) = var("COPRI_REMOTE_URL") {
            self.repository.remote_url = Some(url);
        }
        if let Some(username) = var("COPRI_GITHUB_USERNAME") {
            self.repository.username = Some(username);
        }
        if let Some(mode) = var("COPRI_AUTH_MODE") {
            self.repository.auth_mode = mode.parse()?;
        }
        if let Some(secs) = var("COPRI_GIT_TIMEOUT_SECS") {
            self.repository.command_timeout_secs = secs
                .trim()
                .parse()
                .with_context(|| format!("Invalid COPRI_GIT_TIMEOUT_SECS '{}'", secs))?;
        }
        if let Some(url) = var("COPRI_GITHUB_API_URL") {
            self.github.api_base_url = url;
        }
        if let Some(format) = var("COPRI_LOG_FORMAT") {
            self.logging.format = format.parse()?;
        }
        Ok(())
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.repository.command_timeout_secs == 0 {
            warnings.push(
                "command_timeout_secs is 0: every git command will time out immediately"
                    .to_string(),
            );
        }
        if self.repository.branch.trim().is_empty() {
            warnings.push("repository.branch is empty".to_string());
        }
        if self.repository.remote.trim().is_empty() {
            warnings.push("repository.remote is empty".to_string());
        }
        if self.secret.path.as_os_str().is_empty() {
            warnings.push("secret.path is empty".to_string());
        } else if self.secret.path.is_dir() {
            warnings.push(format!(
                "secret.path '{}' is a directory",
                self.secret.path.display()
            ));
        }
        if secret_inside_repository(&self.secret.path, &self.repository.path) {
            warnings.push(format!(
                "secret.path '{}' is inside the repository; make sure it is ignored by git",
                self.secret.path.display()
            ));
        }
        if !self.repository.path.exists() {
            warnings.push(format!(
                "repository.path '{}' does not exist",
                self.repository.path.display()
            ));
        }
        if let Some(url) = &self.repository.remote_url {
            if url.contains('@') && url.contains("://") {
                warnings.push(
                    "repository.remote_url embeds credentials; they are stripped before use"
                        .to_string(),
                );
            }
            if self.repository.auth_mode == AuthMode::RemoteUrl
                && !(url.starts_with("https://") || url.starts_with("http://"))
            {
                warnings.push(format!(
                    "auth_mode 'remote-url' needs an http(s) remote_url, got '{}'",
                    url
                ));
            }
        }
        if !(self.github.api_base_url.starts_with("https://")
            || self.github.api_base_url.starts_with("http://"))
        {
            warnings.push(format!(
                "github.api_base_url '{}' is not an http(s) URL",
                self.github.api_base_url
            ));
        }
        if self.server.dev_mode {
            warnings.push(
                "server.dev_mode binds 0.0.0.0 with permissive CORS; do not expose publicly"
                    .to_string(),
            );
        }

        warnings
    }
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    }
}

/// Lexical check; symlinks are not resolved.
fn secret_inside_repository(secret: &Path, repo: &Path) -> bool {
    absolute(secret).starts_with(absolute(repo))
}
