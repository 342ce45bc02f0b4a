use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::errors::{CommandFailure, PushError};
use crate::git::remote::{AuthMode, DEFAULT_TOKEN_USERNAME};

pub const DEFAULT_COMMIT_PREFIX: &str = "Automated update from CoPri";

/// One stage of the linear push pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PushStep {
    CheckSecret,
    CheckChanges,
    ConfigureRemote,
    StageAndCommit,
    Push,
    Cleanup,
}

impl PushStep {
    pub const ALL: [PushStep; 6] = [
        PushStep::CheckSecret,
        PushStep::CheckChanges,
        PushStep::ConfigureRemote,
        PushStep::StageAndCommit,
        PushStep::Push,
        PushStep::Cleanup,
    ];

    /// Wrap a failed command in the error kind this step reports.
    pub fn failure(self, failure: CommandFailure) -> PushError {
        match self {
            PushStep::ConfigureRemote => PushError::RemoteConfigFailed(failure),
            PushStep::StageAndCommit => PushError::CommitFailed(failure),
            PushStep::Push => PushError::PushFailed(failure),
            step => PushError::Unexpected {
                step,
                detail: failure.to_string(),
            },
        }
    }
}

impl std::fmt::Display for PushStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PushStep::CheckSecret => "check-secret",
            PushStep::CheckChanges => "check-changes",
            PushStep::ConfigureRemote => "configure-remote",
            PushStep::StageAndCommit => "stage-and-commit",
            PushStep::Push => "push",
            PushStep::Cleanup => "cleanup",
        };
        f.write_str(name)
    }
}

/// Repository-side settings for the push pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushSettings {
    pub remote: String,
    pub branch: String,
    /// Clean URL of the remote. When unset, read from `git remote get-url`.
    pub remote_url: Option<String>,
    pub username: Option<String>,
    pub auth_mode: AuthMode,
    pub commit_message_prefix: String,
}

impl Default for PushSettings {
    fn default() -> Self {
        Self {
            remote: "origin".to_string(),
            branch: "main".to_string(),
            remote_url: None,
            username: None,
            auth_mode: AuthMode::default(),
            commit_message_prefix: DEFAULT_COMMIT_PREFIX.to_string(),
        }
    }
}

impl PushSettings {
    pub fn username(&self) -> &str {
        self.username
            .as_deref()
            .filter(|u| !u.is_empty())
            .unwrap_or(DEFAULT_TOKEN_USERNAME)
    }

    pub fn commit_message(&self, now: DateTime<Utc>) -> String {
        format!(
            "{}: {}",
            self.commit_message_prefix,
            now.format("%Y-%m-%d %H:%M:%S UTC")
        )
    }
}

/// What a completed push sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PushSummary {
    pub branch: String,
    pub remote: String,
    pub repository: Option<String>,
    pub commit_message: String,
    pub commit_sha: Option<String>,
    pub changed_files: usize,
    pub output: String,
}

/// Successful end states of a push attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    /// Working copy was clean; nothing ran past the status check.
    NoChanges,
    Pushed(PushSummary),
}

impl PushOutcome {
    pub fn message(&self) -> &'static str {
        match self {
            PushOutcome::NoChanges => "No changes to push.",
            PushOutcome::Pushed(_) => "Updates pushed to GitHub successfully.",
        }
    }
}

/// Transient record of one attempt, logged once and then dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PushAttempt {
    pub had_changes: Option<bool>,
    pub commit_message: Option<String>,
    pub success: bool,
    pub failed_step: Option<PushStep>,
    pub error: Option<String>,
}

impl PushAttempt {
    pub fn from_result(result: &Result<PushOutcome, PushError>) -> Self {
        match result {
            Ok(PushOutcome::NoChanges) => Self {
                had_changes: Some(false),
                commit_message: None,
                success: true,
                failed_step: None,
                error: None,
            },
            Ok(PushOutcome::Pushed(summary)) => Self {
                had_changes: Some(true),
                commit_message: Some(summary.commit_message.clone()),
                success: true,
                failed_step: None,
                error: None,
            },
            Err(err) => {
                let step = err.step();
                // Steps after the status check only run when changes exist.
                let had_changes = match step {
                    PushStep::CheckSecret | PushStep::CheckChanges => None,
                    _ => Some(true),
                };
                Self {
                    had_changes,
                    commit_message: None,
                    success: false,
                    failed_step: Some(step),
                    error: Some(err.to_string()),
                }
            }
        }
    }

    pub fn log(&self) {
        if self.success {
            tracing::info!(
                had_changes = ?self.had_changes,
                commit_message = self.commit_message.as_deref().unwrap_or(""),
                "Push attempt finished"
            );
        } else {
            tracing::warn!(
                step = ?self.failed_step,
                error = self.error.as_deref().unwrap_or(""),
                "Push attempt failed"
            );
        }
    }
}
