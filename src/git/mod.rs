//! Thin async wrapper around the `git` CLI.
//!
//! Every invocation runs as a child process in the configured working copy,
//! bounded by a timeout, with stdout, stderr and the exit status captured
//! separately.

pub mod remote;

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::errors::GitError;

/// One `git` invocation: arguments plus extra environment.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct GitInvocation {
    pub args: Vec<String>,
    pub envs: Vec<(String, String)>,
}

impl GitInvocation {
    pub fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
            envs: Vec::new(),
        }
    }

    pub fn with_envs(mut self, envs: Vec<(String, String)>) -> Self {
        self.envs = envs;
        self
    }

    /// First argument, used for log lines and timeout errors.
    pub fn subcommand(&self) -> &str {
        self.args.first().map(String::as_str).unwrap_or("")
    }

    /// `git <args>` as a single string. May contain credentials; redact before surfacing.
    pub fn display(&self) -> String {
        let mut text = String::from("git");
        for arg in &self.args {
            text.push(' ');
            if arg.contains(char::is_whitespace) {
                text.push('"');
                text.push_str(arg);
                text.push('"');
            } else {
                text.push_str(arg);
            }
        }
        text
    }
}

// Env values can carry credentials, so only keys are shown.
impl std::fmt::Debug for GitInvocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys: Vec<&str> = self.envs.iter().map(|(k, _)| k.as_str()).collect();
        f.debug_struct("GitInvocation")
            .field("subcommand", &self.subcommand())
            .field("env_keys", &keys)
            .finish()
    }
}

/// Captured result of a finished `git` process.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Executes git commands against one working copy.
#[async_trait]
pub trait GitRunner: Send + Sync {
    async fn run(&self, invocation: &GitInvocation) -> Result<CommandOutput, GitError>;

    fn repo_path(&self) -> &Path;
}

/// `GitRunner` backed by the `git` binary on `PATH`.
#[derive(Debug, Clone)]
pub struct GitCli {
    repo_path: PathBuf,
    program: String,
    timeout: Duration,
}

impl GitCli {
    pub fn new(repo_path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            repo_path: repo_path.into(),
            program: "git".to_string(),
            timeout,
        }
    }

    /// Override the executable, e.g. an absolute path to `git`.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl GitRunner for GitCli {
    async fn run(&self, invocation: &GitInvocation) -> Result<CommandOutput, GitError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&invocation.args)
            .current_dir(&self.repo_path)
            // Never block on an interactive credential prompt.
            .env("GIT_TERMINAL_PROMPT", "0")
            .envs(invocation.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!(
            subcommand = invocation.subcommand(),
            repo = %self.repo_path.display(),
            "Running git"
        );

        let child = cmd.spawn().map_err(GitError::Spawn)?;
        // Dropping the future on timeout drops the child, which kills it.
        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| GitError::TimedOut {
                subcommand: invocation.subcommand().to_string(),
                after: self.timeout,
            })?
            .map_err(GitError::Spawn)?;

        let result = CommandOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        tracing::debug!(
            subcommand = invocation.subcommand(),
            exit_code = ?result.exit_code,
            "git finished"
        );
        Ok(result)
    }

    fn repo_path(&self) -> &Path {
        &self.repo_path
    }
}
