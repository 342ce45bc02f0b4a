use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::GitHubApiError;
use crate::secret::Secret;

pub const DEFAULT_API_BASE_URL: &str = "https://api.github.com";
const API_VERSION: &str = "2022-11-28";
const ACCEPT: &str = "application/vnd.github+json";
const USER_AGENT: &str = concat!("copri/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Known GitHub token prefixes.
/// See: https://github.blog/2021-04-05-behind-githubs-new-authentication-token-formats/
const GITHUB_TOKEN_PREFIXES: &[&str] = &[
    "ghp_",        // Personal access tokens (classic)
    "github_pat_", // Fine-grained personal access tokens
    "gho_",        // OAuth access tokens
    "ghu_",        // GitHub App user-to-server tokens
    "ghs_",        // GitHub App server-to-server tokens
    "ghr_",        // GitHub App refresh tokens
];

/// Check that a string carries one of the known GitHub token prefixes.
///
/// Format check only; says nothing about whether the token is live.
pub fn is_valid_github_token(token: &str) -> bool {
    if token.is_empty() {
        return false;
    }
    GITHUB_TOKEN_PREFIXES
        .iter()
        .any(|prefix| token.starts_with(prefix))
}

/// The account a token authenticates as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitHubUser {
    pub login: String,
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub html_url: Option<String>,
}

/// A GitHub repository (subset of fields we care about).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubRepo {
    pub full_name: String,
    pub name: String,
    pub private: bool,
    pub html_url: String,
    pub clone_url: String,
    pub description: Option<String>,
    pub default_branch: String,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    message: String,
}

/// Minimal REST client authenticated with a staged token.
pub struct GitHubClient {
    http: reqwest::Client,
    base_url: String,
    token: Secret,
}

impl GitHubClient {
    pub fn new(base_url: &str, token: Secret) -> Result<Self, GitHubApiError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(GitHubApiError::Request)?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn token(&self) -> &Secret {
        &self.token
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.http
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(self.token.expose())
            .header("Accept", ACCEPT)
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    async fn send<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, GitHubApiError> {
        let resp = request.send().await.map_err(GitHubApiError::Request)?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .map(|b| b.message)
                .unwrap_or_else(|_| status.canonical_reason().unwrap_or("error").to_string());
            tracing::warn!(status = status.as_u16(), %message, "GitHub API request failed");
            return Err(GitHubApiError::Status {
                status: status.as_u16(),
                message,
            });
        }
        resp.json::<T>().await.map_err(GitHubApiError::Decode)
    }

    /// `GET /user`: who the token belongs to.
    pub async fn authenticated_user(&self) -> Result<GitHubUser, GitHubApiError> {
        tracing::debug!(token = %self.token, "Verifying token against GitHub");
        self.send(self.get("/user")).await
    }

    /// `GET /user/repos`, most recently updated first.
    pub async fn list_repos(&self, per_page: u32) -> Result<Vec<GitHubRepo>, GitHubApiError> {
        let per_page = per_page.clamp(1, 100).to_string();
        let request = self
            .get("/user/repos")
            .query(&[("sort", "updated"), ("per_page", per_page.as_str())]);
        self.send(request).await
    }
}
