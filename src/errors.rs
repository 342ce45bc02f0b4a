//! Typed error hierarchy for the CoPri push service.
//!
//! - `StagingError`: secret staging store failures
//! - `GitError`: failures launching or waiting on a `git` process
//! - `PushError`: terminal outcomes of one push attempt
//! - `GitHubApiError`: REST calls made with the staged token

use std::path::PathBuf;
use std::time::Duration;

use axum::http::StatusCode;
use serde::Serialize;
use thiserror::Error;

use crate::push::PushStep;

/// Errors from the secret staging store.
#[derive(Debug, Error)]
pub enum StagingError {
    #[error("Secret value is empty")]
    Empty,

    #[error("No secret is staged")]
    NotStaged,

    #[error("Failed to write staged secret at {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read staged secret at {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to remove staged secret at {path}: {source}")]
    ClearFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StagingError {
    /// True when the store simply holds no usable credential.
    pub fn is_missing(&self) -> bool {
        matches!(self, StagingError::Empty | StagingError::NotStaged)
    }
}

/// Errors from running a single `git` invocation.
///
/// A non-zero exit status is not an error at this level; callers inspect
/// `CommandOutput::success()` instead.
#[derive(Debug, Error)]
pub enum GitError {
    #[error("Failed to spawn git: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("git {subcommand} timed out after {after:?}")]
    TimedOut { subcommand: String, after: Duration },
}

/// Captured detail of a git command that exited unsuccessfully.
///
/// All text fields are redacted before construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandFailure {
    pub command: String,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl std::fmt::Display for CommandFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.exit_code {
            Some(code) => write!(f, "`{}` exited with code {}", self.command, code)?,
            None => write!(f, "`{}` failed without an exit code", self.command)?,
        }
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            write!(f, ": {}", stderr)?;
        }
        Ok(())
    }
}

/// Terminal failure of one push attempt.
#[derive(Debug, Error)]
pub enum PushError {
    #[error("GitHub PAT not found. Please submit it via /input-secure-token first.")]
    CredentialMissing,

    #[error("Remote configuration failed: {0}")]
    RemoteConfigFailed(CommandFailure),

    #[error("Commit failed: {0}")]
    CommitFailed(CommandFailure),

    #[error("Push failed: {0}")]
    PushFailed(CommandFailure),

    #[error("Git command timed out during {step} after {after:?}")]
    TimedOut { step: PushStep, after: Duration },

    #[error("Push cancelled before {step}")]
    Cancelled { step: PushStep },

    #[error("Unexpected failure during {step}: {detail}")]
    Unexpected { step: PushStep, detail: String },
}

impl PushError {
    /// Stable machine-readable kind used in JSON responses and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            PushError::CredentialMissing => "credential_missing",
            PushError::RemoteConfigFailed(_) => "remote_config_failed",
            PushError::CommitFailed(_) => "commit_failed",
            PushError::PushFailed(_) => "push_failed",
            PushError::TimedOut { .. } => "timed_out",
            PushError::Cancelled { .. } => "cancelled",
            PushError::Unexpected { .. } => "unexpected_failure",
        }
    }

    /// Operator-facing summary line.
    pub fn message(&self) -> &'static str {
        match self {
            PushError::CredentialMissing => {
                "GitHub PAT not found. Please submit it via /input-secure-token first."
            }
            PushError::RemoteConfigFailed(_) => "Failed to configure git remote.",
            PushError::CommitFailed(_) => "Failed to commit changes.",
            PushError::PushFailed(_) => "Failed to push changes to GitHub.",
            PushError::TimedOut { .. } => "Git command timed out.",
            PushError::Cancelled { .. } => "Push cancelled before completion.",
            PushError::Unexpected { .. } => "An unexpected error occurred during push.",
        }
    }

    /// Whether resubmitting the push request can succeed without operator action.
    pub fn retryable(&self) -> bool {
        !matches!(self, PushError::CredentialMissing)
    }

    pub fn step(&self) -> PushStep {
        match self {
            PushError::CredentialMissing => PushStep::CheckSecret,
            PushError::RemoteConfigFailed(_) => PushStep::ConfigureRemote,
            PushError::CommitFailed(_) => PushStep::StageAndCommit,
            PushError::PushFailed(_) => PushStep::Push,
            PushError::TimedOut { step, .. }
            | PushError::Cancelled { step }
            | PushError::Unexpected { step, .. } => *step,
        }
    }

    pub fn command_failure(&self) -> Option<&CommandFailure> {
        match self {
            PushError::RemoteConfigFailed(f)
            | PushError::CommitFailed(f)
            | PushError::PushFailed(f) => Some(f),
            _ => None,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            PushError::CredentialMissing => StatusCode::BAD_REQUEST,
            PushError::Cancelled { .. } => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Errors from the GitHub REST connector.
#[derive(Debug, Error)]
pub enum GitHubApiError {
    #[error("GitHub request failed: {0}")]
    Request(#[source] reqwest::Error),

    #[error("GitHub returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Failed to decode GitHub response: {0}")]
    Decode(#[source] reqwest::Error),
}

impl GitHubApiError {
    /// HTTP status GitHub answered with, if it answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            GitHubApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}
