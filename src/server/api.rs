use std::sync::Arc;

use axum::{
    Form, Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use super::pages;
use crate::connectors::{GitHubClient, GitHubRepo, is_valid_github_token};
use crate::errors::{PushError, StagingError};
use crate::push::{PushOrchestrator, PushOutcome, PushSummary};
use crate::secret::{Secret, SecretStore};

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub orchestrator: Arc<PushOrchestrator>,
    pub github_api_base: String,
}

impl AppState {
    pub fn store(&self) -> &Arc<dyn SecretStore> {
        self.orchestrator.store()
    }
}

pub type SharedState = Arc<AppState>;

// ── Request / response payload types ──────────────────────────────────

#[derive(Deserialize)]
pub struct TokenForm {
    #[serde(default)]
    pub pat: Option<String>,
}

#[derive(Deserialize)]
pub struct RepoListQuery {
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

fn default_per_page() -> u32 {
    30
}

#[derive(Serialize)]
pub struct PushSuccess {
    pub success: bool,
    pub message: &'static str,
    /// `null` when nothing was pushed.
    pub details: Option<PushSummary>,
}

#[derive(Serialize)]
pub struct PushFailureBody {
    pub success: bool,
    pub message: &'static str,
    pub error: PushErrorDetail,
}

#[derive(Serialize)]
pub struct PushErrorDetail {
    pub kind: &'static str,
    pub step: String,
    pub retryable: bool,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
}

impl From<&PushError> for PushFailureBody {
    fn from(err: &PushError) -> Self {
        let failure = err.command_failure();
        Self {
            success: false,
            message: err.message(),
            error: PushErrorDetail {
                kind: err.kind(),
                step: err.step().to_string(),
                retryable: err.retryable(),
                detail: err.to_string(),
                command: failure.map(|f| f.command.clone()),
                exit_code: failure.and_then(|f| f.exit_code),
                stdout: failure.map(|f| f.stdout.clone()),
                stderr: failure.map(|f| f.stderr.clone()),
            },
        }
    }
}

#[derive(Serialize)]
pub struct TokenStatus {
    pub staged: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub masked: Option<String>,
}

#[derive(Serialize)]
pub struct VerifiedUser {
    pub login: String,
    pub id: u64,
    pub token: String,
}

// ── Error handling ────────────────────────────────────────────────────

pub enum ApiError {
    BadRequest(String),
    Internal(String),
    BadGateway(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
        };
        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

impl From<StagingError> for ApiError {
    fn from(err: StagingError) -> Self {
        if err.is_missing() {
            ApiError::BadRequest(PushError::CredentialMissing.message().to_string())
        } else {
            tracing::error!(error = %err, "Secret store failure");
            ApiError::Internal(err.to_string())
        }
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health_check))
        .route("/input-secure-token", get(token_form).post(submit_token))
        .route("/github/push", post(trigger_push))
        .route("/github/push/cancel", post(cancel_push))
        .route("/github/token", get(token_status).delete(clear_token))
        .route("/github/verify", get(verify_token))
        .route("/github/repos", get(list_repos))
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn index() -> &'static str {
    "Hello from CoPri App Prototype!"
}

async fn health_check() -> &'static str {
    "ok"
}

async fn token_form(State(state): State<SharedState>) -> Html<String> {
    let masked = state.store().consume().await.ok().map(|s| s.masked());
    Html(pages::token_form(masked.as_deref()))
}

async fn submit_token(State(state): State<SharedState>, Form(form): Form<TokenForm>) -> Response {
    // The form stages the trimmed value.
    let pat = form.pat.unwrap_or_default();
    let pat = pat.trim();
    match state.store().stage(pat).await {
        Ok(ack) => {
            let unknown_prefix = !is_valid_github_token(pat);
            if unknown_prefix {
                tracing::warn!(token = %ack.masked, "Staged token has no known GitHub prefix");
            }
            tracing::info!(token = %ack.masked, location = %ack.location, "Token staged via form");
            Html(pages::token_staged(&ack.masked, unknown_prefix)).into_response()
        }
        Err(StagingError::Empty) => (
            StatusCode::BAD_REQUEST,
            Html(pages::token_error("The token must not be empty.")),
        )
            .into_response(),
        Err(err) => {
            tracing::error!(error = %err, "Failed to stage token");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Html(pages::token_error(
                    "The token could not be stored on the server. Check the server logs.",
                )),
            )
                .into_response()
        }
    }
}

async fn trigger_push(State(state): State<SharedState>) -> Response {
    match state.orchestrator.push().await {
        Ok(outcome) => {
            let details = match outcome {
                PushOutcome::NoChanges => None,
                PushOutcome::Pushed(ref summary) => Some(summary.clone()),
            };
            Json(PushSuccess {
                success: true,
                message: outcome.message(),
                details,
            })
            .into_response()
        }
        Err(err) => (err.status_code(), Json(PushFailureBody::from(&err))).into_response(),
    }
}

async fn cancel_push(State(state): State<SharedState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({"cancelled": state.orchestrator.cancel()}))
}

async fn token_status(State(state): State<SharedState>) -> Result<Json<TokenStatus>, ApiError> {
    match state.store().consume().await {
        Ok(secret) => Ok(Json(TokenStatus {
            staged: true,
            masked: Some(secret.masked()),
        })),
        Err(err) if err.is_missing() => Ok(Json(TokenStatus {
            staged: false,
            masked: None,
        })),
        Err(err) => Err(err.into()),
    }
}

async fn clear_token(State(state): State<SharedState>) -> Result<Json<serde_json::Value>, ApiError> {
    state.store().clear().await?;
    tracing::info!("Staged token cleared via API");
    Ok(Json(serde_json::json!({"cleared": true})))
}

async fn github_client(state: &AppState) -> Result<GitHubClient, ApiError> {
    let secret: Secret = state.store().consume().await?;
    GitHubClient::new(&state.github_api_base, secret).map_err(|e| ApiError::Internal(e.to_string()))
}

async fn verify_token(State(state): State<SharedState>) -> Result<Json<VerifiedUser>, ApiError> {
    let client = github_client(&state).await?;
    let masked = client.token().masked();
    let user = client
        .authenticated_user()
        .await
        .map_err(|e| ApiError::BadGateway(e.to_string()))?;
    tracing::info!(login = %user.login, "Staged token verified against GitHub");
    Ok(Json(VerifiedUser {
        login: user.login,
        id: user.id,
        token: masked,
    }))
}

async fn list_repos(
    State(state): State<SharedState>,
    Query(query): Query<RepoListQuery>,
) -> Result<Json<Vec<GitHubRepo>>, ApiError> {
    let client = github_client(&state).await?;
    let repos = client
        .list_repos(query.per_page)
        .await
        .map_err(|e| ApiError::BadGateway(e.to_string()))?;
    tracing::debug!(count = repos.len(), "Listed repositories for staged token");
    Ok(Json(repos))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::GitError;
    use crate::git::{CommandOutput, GitInvocation, GitRunner};
    use crate::push::PushSettings;
    use crate::secret::MemorySecretStore;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{HeaderMap, Request};
    use http_body_util::BodyExt;
    use std::path::Path;
    use std::sync::Mutex;
    use tower::ServiceExt;

    /// Answers `status --porcelain` with a fixed listing and fails `push` on request.
    struct StubGit {
        status: String,
        push_exit: i32,
        calls: Mutex<Vec<String>>,
    }

    impl StubGit {
        fn new(status: &str, push_exit: i32) -> Self {
            Self {
                status: status.to_string(),
                push_exit,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl GitRunner for StubGit {
        async fn run(&self, invocation: &GitInvocation) -> Result<CommandOutput, GitError> {
            self.calls.lock().unwrap().push(invocation.args.join(" "));
            let out = match invocation.subcommand() {
                "status" => CommandOutput {
                    exit_code: Some(0),
                    stdout: self.status.clone(),
                    stderr: String::new(),
                },
                "remote" => CommandOutput {
                    exit_code: Some(0),
                    stdout: "https://github.com/owner/repo.git\n".into(),
                    stderr: String::new(),
                },
                "push" => CommandOutput {
                    exit_code: Some(self.push_exit),
                    stdout: String::new(),
                    stderr: if self.push_exit == 0 {
                        String::new()
                    } else {
                        "remote: Permission to owner/repo.git denied to ghp_abc123.".into()
                    },
                },
                _ => CommandOutput {
                    exit_code: Some(0),
                    ..Default::default()
                },
            };
            Ok(out)
        }

        fn repo_path(&self) -> &Path {
            Path::new("/tmp/stub-repo")
        }
    }

    struct TestApp {
        router: Router,
        store: Arc<MemorySecretStore>,
        git: Arc<StubGit>,
    }

    fn test_app_with(git: StubGit, api_base: &str) -> TestApp {
        let store = Arc::new(MemorySecretStore::new());
        let git = Arc::new(git);
        let orchestrator = Arc::new(PushOrchestrator::new(
            store.clone(),
            git.clone(),
            PushSettings::default(),
        ));
        let state = Arc::new(AppState {
            orchestrator,
            github_api_base: api_base.to_string(),
        });
        TestApp {
            router: api_router().with_state(state),
            store,
            git,
        }
    }

    fn test_app() -> TestApp {
        test_app_with(StubGit::new(" M README.md\n", 0), "http://127.0.0.1:9")
    }

    async fn body_json<T: serde::de::DeserializeOwned>(body: Body) -> T {
        let bytes = body.collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn body_text(body: Body) -> String {
        let bytes = body.collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn post_form(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn request(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_and_index() {
        let app = test_app();
        let response = app.router.clone().oneshot(request("GET", "/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response.into_body()).await, "ok");

        let response = app.router.oneshot(request("GET", "/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_text(response.into_body()).await,
            "Hello from CoPri App Prototype!"
        );
    }

    #[tokio::test]
    async fn test_form_page_renders() {
        let app = test_app();
        let response = app
            .router
            .oneshot(request("GET", "/input-secure-token"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response.into_body()).await;
        assert!(html.contains("name=\"pat\""));
    }

    #[tokio::test]
    async fn test_submit_token_stages_and_masks() {
        let app = test_app();
        let response = app
            .router
            .oneshot(post_form("/input-secure-token", "pat=ghp_abc123"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response.into_body()).await;
        assert!(html.contains("******c123"));
        assert!(!html.contains("ghp_abc123"));
        assert!(!html.contains("does not look like"));
        assert_eq!(app.store.consume().await.unwrap().expose(), "ghp_abc123");
    }

    #[tokio::test]
    async fn test_submit_token_trims_form_input() {
        let app = test_app();
        let response = app
            .router
            .oneshot(post_form("/input-secure-token", "pat=%20ghp_abc123%0A"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(!body_text(response.into_body()).await.contains("does not look like"));
        assert_eq!(app.store.consume().await.unwrap().expose(), "ghp_abc123");
    }

    #[tokio::test]
    async fn test_submit_token_unknown_prefix_warns_but_stages() {
        let app = test_app();
        let response = app
            .router
            .oneshot(post_form("/input-secure-token", "pat=hunter2hunter2"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response.into_body()).await.contains("does not look like"));
        assert!(app.store.consume().await.is_ok());
    }

    #[tokio::test]
    async fn test_submit_empty_token_is_bad_request() {
        let app = test_app();
        for body in ["pat=", "pat=%20%20", ""] {
            let response = app
                .router
                .clone()
                .oneshot(post_form("/input-secure-token", body))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body {:?}", body);
        }
        assert!(app.store.consume().await.is_err());
    }

    #[tokio::test]
    async fn test_push_without_token_is_400() {
        let app = test_app();
        let response = app.router.oneshot(request("POST", "/github/push")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body: serde_json::Value = body_json(response.into_body()).await;
        assert_eq!(body["success"], false);
        assert!(
            body["message"]
                .as_str()
                .unwrap()
                .starts_with("GitHub PAT not found")
        );
        assert_eq!(body["error"]["kind"], "credential_missing");
        assert_eq!(body["error"]["retryable"], false);
        assert!(app.git.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_push_success_clears_token() {
        let app = test_app();
        app.store.stage("ghp_abc123").await.unwrap();

        let response = app.router.oneshot(request("POST", "/github/push")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = body_json(response.into_body()).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["message"], "Updates pushed to GitHub successfully.");
        assert_eq!(body["details"]["branch"], "main");
        assert_eq!(body["details"]["repository"], "owner/repo");
        assert!(app.store.consume().await.is_err());
    }

    #[tokio::test]
    async fn test_push_no_changes_keeps_token() {
        let app = test_app_with(StubGit::new("", 0), "http://127.0.0.1:9");
        app.store.stage("ghp_abc123").await.unwrap();

        let response = app.router.oneshot(request("POST", "/github/push")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = body_json(response.into_body()).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["message"], "No changes to push.");
        assert!(body["details"].is_null());
        assert!(app.store.consume().await.is_ok());
    }

    #[tokio::test]
    async fn test_push_failure_is_500_redacted_and_keeps_token() {
        let app = test_app_with(StubGit::new(" M a\n", 1), "http://127.0.0.1:9");
        app.store.stage("ghp_abc123").await.unwrap();

        let response = app.router.oneshot(request("POST", "/github/push")).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let text = body_text(response.into_body()).await;
        assert!(!text.contains("ghp_abc123"));

        let body: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Failed to push changes to GitHub.");
        assert_eq!(body["error"]["kind"], "push_failed");
        assert_eq!(body["error"]["exit_code"], 1);
        assert!(body["error"]["stderr"].as_str().unwrap().contains("denied to ***"));
        assert!(app.store.consume().await.is_ok());
    }

    #[tokio::test]
    async fn test_cancel_without_push_in_flight() {
        let app = test_app();
        let response = app
            .router
            .oneshot(request("POST", "/github/push/cancel"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = body_json(response.into_body()).await;
        assert_eq!(body["cancelled"], false);
    }

    #[tokio::test]
    async fn test_token_status_and_clear() {
        let app = test_app();

        let response = app
            .router
            .clone()
            .oneshot(request("GET", "/github/token"))
            .await
            .unwrap();
        let body: serde_json::Value = body_json(response.into_body()).await;
        assert_eq!(body["staged"], false);
        assert!(body.get("masked").is_none());

        app.store.stage("ghp_abc123").await.unwrap();
        let response = app
            .router
            .clone()
            .oneshot(request("GET", "/github/token"))
            .await
            .unwrap();
        let body: serde_json::Value = body_json(response.into_body()).await;
        assert_eq!(body["staged"], true);
        assert_eq!(body["masked"], "******c123");

        let response = app
            .router
            .oneshot(request("DELETE", "/github/token"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = body_json(response.into_body()).await;
        assert_eq!(body["cleared"], true);
        assert!(app.store.consume().await.is_err());
    }

    #[tokio::test]
    async fn test_verify_without_token_is_400() {
        let app = test_app();
        let response = app
            .router
            .oneshot(request("GET", "/github/verify"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    async fn spawn_fake_github() -> String {
        async fn user(headers: HeaderMap) -> Response {
            let auth = headers.get("authorization").and_then(|v| v.to_str().ok());
            if auth == Some("Bearer ghp_abc123") {
                Json(serde_json::json!({"login": "octocat", "id": 1})).into_response()
            } else {
                (
                    StatusCode::UNAUTHORIZED,
                    Json(serde_json::json!({"message": "Bad credentials"})),
                )
                    .into_response()
            }
        }
        async fn repos(
            headers: HeaderMap,
            Query(params): Query<std::collections::HashMap<String, String>>,
        ) -> Response {
            let auth = headers.get("authorization").and_then(|v| v.to_str().ok());
            if auth != Some("Bearer ghp_abc123") {
                return (
                    StatusCode::UNAUTHORIZED,
                    Json(serde_json::json!({"message": "Bad credentials"})),
                )
                    .into_response();
            }
            let per_page: usize = params
                .get("per_page")
                .and_then(|v| v.parse().ok())
                .unwrap_or(30);
            let repos: Vec<serde_json::Value> = (0..3.min(per_page))
                .map(|i| {
                    serde_json::json!({
                        "full_name": format!("octocat/repo{}", i),
                        "name": format!("repo{}", i),
                        "private": i == 0,
                        "html_url": format!("https://github.com/octocat/repo{}", i),
                        "clone_url": format!("https://github.com/octocat/repo{}.git", i),
                        "description": null,
                        "default_branch": "main"
                    })
                })
                .collect();
            Json(repos).into_response()
        }
        let app = Router::new()
            .route("/user", get(user))
            .route("/user/repos", get(repos));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_verify_returns_login_and_masked_token() {
        let base = spawn_fake_github().await;
        let app = test_app_with(StubGit::new("", 0), &base);
        app.store.stage("ghp_abc123").await.unwrap();

        let response = app
            .router
            .oneshot(request("GET", "/github/verify"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = body_json(response.into_body()).await;
        assert_eq!(body["login"], "octocat");
        assert_eq!(body["id"], 1);
        assert_eq!(body["token"], "******c123");
    }

    #[tokio::test]
    async fn test_verify_rejected_token_is_502() {
        let base = spawn_fake_github().await;
        let app = test_app_with(StubGit::new("", 0), &base);
        app.store.stage("ghp_wrongtoken").await.unwrap();

        let response = app
            .router
            .oneshot(request("GET", "/github/verify"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let text = body_text(response.into_body()).await;
        assert!(text.contains("401"));
        assert!(!text.contains("ghp_wrongtoken"));
    }

    #[tokio::test]
    async fn test_repos_lists_repositories_for_staged_token() {
        let base = spawn_fake_github().await;
        let app = test_app_with(StubGit::new("", 0), &base);
        app.store.stage("ghp_abc123").await.unwrap();

        let response = app
            .router
            .oneshot(request("GET", "/github/repos?per_page=2"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = body_json(response.into_body()).await;
        let repos = body.as_array().unwrap();
        assert_eq!(repos.len(), 2);
        assert_eq!(repos[0]["full_name"], "octocat/repo0");
        assert_eq!(repos[0]["private"], true);
        assert!(app.store.consume().await.is_ok());
    }

    #[tokio::test]
    async fn test_repos_without_token_is_400() {
        let app = test_app();
        let response = app
            .router
            .oneshot(request("GET", "/github/repos"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_repos_rejected_token_is_502() {
        let base = spawn_fake_github().await;
        let app = test_app_with(StubGit::new("", 0), &base);
        app.store.stage("ghp_wrongtoken").await.unwrap();

        let response = app
            .router
            .oneshot(request("GET", "/github/repos"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert!(!body_text(response.into_body()).await.contains("ghp_wrongtoken"));
    }
}
