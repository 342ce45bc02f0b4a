//! Credential-gated push pipeline.
//!
//! ```text
//! CheckSecret → CheckChanges → ConfigureRemote → StageAndCommit → Push → Cleanup
//! ```
//!
//! Every step either advances or ends the attempt. Only a successful `Push`
//! reaches `Cleanup`, which is the single path that removes the staged
//! credential. Earlier steps are never rolled back: a local commit left behind
//! by a failed push stays in place.
//!
//! The staged secret and the working copy are process-wide singletons, so
//! the whole sequence runs under one mutex.

mod types;

pub use types::{
    DEFAULT_COMMIT_PREFIX, PushAttempt, PushOutcome, PushSettings, PushStep, PushSummary,
};

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::errors::{CommandFailure, GitError, PushError};
use crate::git::remote::{self, AuthMode, Redactor};
use crate::git::{CommandOutput, GitInvocation, GitRunner};
use crate::secret::{Secret, SecretStore};

/// Where and how the push step authenticates.
struct PreparedRemote {
    /// Remote name or URL handed to `git push`.
    target: String,
    clean_url: String,
    envs: Vec<(String, String)>,
    /// Remote URL currently holds inline credentials and must be reset.
    restore: bool,
}

pub struct PushOrchestrator {
    store: Arc<dyn SecretStore>,
    git: Arc<dyn GitRunner>,
    settings: PushSettings,
    lock: Mutex<()>,
    in_flight: std::sync::Mutex<Option<CancellationToken>>,
}

impl PushOrchestrator {
    pub fn new(
        store: Arc<dyn SecretStore>,
        git: Arc<dyn GitRunner>,
        settings: PushSettings,
    ) -> Self {
        Self {
            store,
            git,
            settings,
            lock: Mutex::new(()),
            in_flight: std::sync::Mutex::new(None),
        }
    }

    pub fn settings(&self) -> &PushSettings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<dyn SecretStore> {
        &self.store
    }

    /// Run one push attempt. Concurrent callers queue behind the running one.
    pub async fn push(&self) -> Result<PushOutcome, PushError> {
        let _guard = self.lock.lock().await;
        let cancel = CancellationToken::new();
        self.set_in_flight(Some(cancel.clone()));

        tracing::info!(
            repo = %self.git.repo_path().display(),
            remote = %self.settings.remote,
            branch = %self.settings.branch,
            auth_mode = %self.settings.auth_mode,
            "Starting push attempt"
        );
        let result = self.run_steps(&cancel).await;

        self.set_in_flight(None);
        PushAttempt::from_result(&result).log();
        result
    }

    /// Ask the running attempt to stop at its next step boundary.
    ///
    /// Returns `false` when no attempt is running.
    pub fn cancel(&self) -> bool {
        let guard = match self.in_flight.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match guard.as_ref() {
            Some(token) => {
                tracing::info!("Cancellation requested for in-flight push");
                token.cancel();
                true
            }
            None => false,
        }
    }

    fn set_in_flight(&self, token: Option<CancellationToken>) {
        let mut guard = match self.in_flight.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = token;
    }

    async fn run_steps(&self, cancel: &CancellationToken) -> Result<PushOutcome, PushError> {
        let secret = self.check_secret().await?;
        let redactor = Redactor::new(self.settings.username(), secret.expose());

        checkpoint(cancel, PushStep::CheckChanges)?;
        let changed_files = self.check_changes(&redactor).await?;
        if changed_files == 0 {
            tracing::info!("Working copy clean; staged credential retained");
            return Ok(PushOutcome::NoChanges);
        }

        checkpoint(cancel, PushStep::ConfigureRemote)?;
        let prepared = self.configure_remote(&secret, &redactor).await?;

        let result = self
            .commit_and_push(cancel, &prepared, &redactor, changed_files)
            .await;
        if prepared.restore {
            self.restore_remote(&prepared, &redactor).await;
        }
        let summary = result?;

        self.store.clear().await.map_err(|e| PushError::Unexpected {
            step: PushStep::Cleanup,
            detail: format!(
                "push succeeded but the staged credential could not be removed: {}",
                e
            ),
        })?;
        tracing::info!(step = %PushStep::Cleanup, "Staged credential removed after push");

        Ok(PushOutcome::Pushed(summary))
    }

    async fn check_secret(&self) -> Result<Secret, PushError> {
        match self.store.consume().await {
            Ok(secret) => {
                tracing::debug!(step = %PushStep::CheckSecret, secret = %secret, "Credential found");
                Ok(secret)
            }
            Err(e) if e.is_missing() => Err(PushError::CredentialMissing),
            Err(e) => Err(PushError::Unexpected {
                step: PushStep::CheckSecret,
                detail: e.to_string(),
            }),
        }
    }

    /// Number of entries reported by `git status --porcelain`.
    async fn check_changes(&self, redactor: &Redactor) -> Result<usize, PushError> {
        let out = self
            .exec(
                PushStep::CheckChanges,
                &GitInvocation::new(["status", "--porcelain"]),
                redactor,
            )
            .await?;
        let count = out.stdout.lines().filter(|l| !l.trim().is_empty()).count();
        tracing::debug!(step = %PushStep::CheckChanges, changed_files = count, "Status checked");
        Ok(count)
    }

    async fn configure_remote(
        &self,
        secret: &Secret,
        redactor: &Redactor,
    ) -> Result<PreparedRemote, PushError> {
        let step = PushStep::ConfigureRemote;
        let remote_name = self.settings.remote.as_str();

        let clean_url = match &self.settings.remote_url {
            Some(url) => remote::strip_credentials(url),
            None => {
                let out = self
                    .exec(
                        step,
                        &GitInvocation::new(["remote", "get-url", remote_name]),
                        redactor,
                    )
                    .await?;
                let persisted = out.stdout.trim().to_string();
                let clean = remote::strip_credentials(&persisted);
                if clean != persisted {
                    // Left over from an interrupted run; scrub before going further.
                    tracing::warn!(remote = remote_name, "Removing inline credentials from remote URL");
                    self.exec(
                        step,
                        &GitInvocation::new(["remote", "set-url", remote_name, clean.as_str()]),
                        redactor,
                    )
                    .await?;
                }
                clean
            }
        };

        match self.settings.auth_mode {
            AuthMode::Header => {
                let target = if self.settings.remote_url.is_some() {
                    clean_url.clone()
                } else {
                    remote_name.to_string()
                };
                tracing::debug!(step = %step, target = %target, "Using transient auth header");
                Ok(PreparedRemote {
                    target,
                    clean_url,
                    envs: remote::header_auth_env(self.settings.username(), secret.expose()),
                    restore: false,
                })
            }
            AuthMode::RemoteUrl => {
                let authed =
                    remote::authenticated_url(&clean_url, self.settings.username(), secret.expose())
                        .ok_or_else(|| {
                            PushError::RemoteConfigFailed(CommandFailure {
                                command: format!("git remote set-url {}", remote_name),
                                exit_code: None,
                                stdout: String::new(),
                                stderr: format!(
                                    "remote URL '{}' is not http(s); inline credentials are unsupported",
                                    clean_url
                                ),
                            })
                        })?;
                self.exec(
                    step,
                    &GitInvocation::new(["remote", "set-url", remote_name, authed.as_str()]),
                    redactor,
                )
                .await?;
                tracing::debug!(step = %step, remote = remote_name, "Remote URL carries credentials for this attempt");
                Ok(PreparedRemote {
                    target: remote_name.to_string(),
                    clean_url,
                    envs: Vec::new(),
                    restore: true,
                })
            }
        }
    }

    async fn commit_and_push(
        &self,
        cancel: &CancellationToken,
        prepared: &PreparedRemote,
        redactor: &Redactor,
        changed_files: usize,
    ) -> Result<PushSummary, PushError> {
        checkpoint(cancel, PushStep::StageAndCommit)?;
        let commit_message = self.settings.commit_message(Utc::now());
        self.exec(
            PushStep::StageAndCommit,
            &GitInvocation::new(["add", "--all"]),
            redactor,
        )
        .await?;
        self.exec(
            PushStep::StageAndCommit,
            &GitInvocation::new(["commit", "-m", commit_message.as_str()]),
            redactor,
        )
        .await?;
        tracing::info!(step = %PushStep::StageAndCommit, message = %commit_message, "Committed changes");
        let commit_sha = self.head_sha().await;

        checkpoint(cancel, PushStep::Push)?;
        let push = GitInvocation::new([
            "push",
            prepared.target.as_str(),
            self.settings.branch.as_str(),
        ])
        .with_envs(prepared.envs.clone());
        let out = self.exec(PushStep::Push, &push, redactor).await?;
        tracing::info!(step = %PushStep::Push, branch = %self.settings.branch, "Pushed to remote");

        let output = redactor.redact(
            [out.stdout.trim(), out.stderr.trim()]
                .iter()
                .filter(|s| !s.is_empty())
                .copied()
                .collect::<Vec<_>>()
                .join("\n")
                .as_str(),
        );
        Ok(PushSummary {
            branch: self.settings.branch.clone(),
            remote: redactor.redact(&prepared.target),
            repository: remote::parse_owner_repo(&prepared.clean_url),
            commit_message,
            commit_sha,
            changed_files,
            output,
        })
    }

    async fn head_sha(&self) -> Option<String> {
        let out = self
            .git
            .run(&GitInvocation::new(["rev-parse", "HEAD"]))
            .await
            .ok()?;
        let sha = out.stdout.trim();
        (out.success() && !sha.is_empty()).then(|| sha.to_string())
    }

    async fn restore_remote(&self, prepared: &PreparedRemote, redactor: &Redactor) {
        let inv = GitInvocation::new([
            "remote",
            "set-url",
            self.settings.remote.as_str(),
            prepared.clean_url.as_str(),
        ]);
        match self.exec(PushStep::Push, &inv, redactor).await {
            Ok(_) => tracing::debug!(remote = %self.settings.remote, "Restored clean remote URL"),
            Err(e) => tracing::warn!(
                remote = %self.settings.remote,
                error = %e,
                "Failed to restore clean remote URL; it may still embed the credential"
            ),
        }
    }

    /// Run one git command; any non-zero exit becomes the step's failure.
    async fn exec(
        &self,
        step: PushStep,
        invocation: &GitInvocation,
        redactor: &Redactor,
    ) -> Result<CommandOutput, PushError> {
        let command = redactor.redact(&invocation.display());
        tracing::debug!(step = %step, command = %command, "Running step command");

        match self.git.run(invocation).await {
            Ok(out) if out.success() => Ok(out),
            Ok(out) => Err(step.failure(CommandFailure {
                command,
                exit_code: out.exit_code,
                stdout: redactor.redact(&out.stdout),
                stderr: redactor.redact(&out.stderr),
            })),
            Err(GitError::TimedOut { after, .. }) => Err(PushError::TimedOut { step, after }),
            Err(GitError::Spawn(e)) => Err(step.failure(CommandFailure {
                command,
                exit_code: None,
                stdout: String::new(),
                stderr: redactor.redact(&e.to_string()),
            })),
        }
    }
}

fn checkpoint(cancel: &CancellationToken, next: PushStep) -> Result<(), PushError> {
    if cancel.is_cancelled() {
        return Err(PushError::Cancelled { step: next });
    }
    Ok(())
}
