//! Remote URL handling and per-push authentication.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

/// Username GitHub accepts for token-only HTTPS authentication.
pub const DEFAULT_TOKEN_USERNAME: &str = "x-access-token";

const REDACTED: &str = "***";

/// How the staged secret reaches `git push`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthMode {
    /// Pass an `http.extraHeader` through the environment of the push process only.
    #[default]
    Header,
    /// Rewrite the remote URL with inline credentials, restoring it afterwards.
    RemoteUrl,
}

impl std::fmt::Display for AuthMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthMode::Header => write!(f, "header"),
            AuthMode::RemoteUrl => write!(f, "remote-url"),
        }
    }
}

impl std::str::FromStr for AuthMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "header" => Ok(AuthMode::Header),
            "remote-url" | "remote_url" | "url" => Ok(AuthMode::RemoteUrl),
            _ => anyhow::bail!(
                "Invalid auth mode '{}'. Valid values: header, remote-url",
                s
            ),
        }
    }
}

/// Split `scheme://rest` into `(scheme, rest)`.
fn split_scheme(url: &str) -> Option<(&str, &str)> {
    let idx = url.find("://")?;
    Some((&url[..idx], &url[idx + 3..]))
}

/// Remove any `user[:password]@` segment from a scheme URL.
///
/// scp-style (`git@host:owner/repo`) and local paths are returned unchanged.
pub fn strip_credentials(url: &str) -> String {
    let url = url.trim();
    let Some((scheme, rest)) = split_scheme(url) else {
        return url.to_string();
    };
    let authority_end = rest.find('/').unwrap_or(rest.len());
    match rest[..authority_end].rfind('@') {
        Some(at) => format!("{}://{}", scheme, &rest[at + 1..]),
        None => url.to_string(),
    }
}

/// Embed `username:secret@` into an http(s) URL. Returns `None` for other transports.
pub fn authenticated_url(base: &str, username: &str, secret: &str) -> Option<String> {
    let clean = strip_credentials(base);
    let (scheme, rest) = split_scheme(&clean)?;
    if scheme != "https" && scheme != "http" {
        return None;
    }
    Some(format!("{}://{}:{}@{}", scheme, username, secret, rest))
}

/// `Authorization` header value for HTTP Basic auth.
pub fn basic_auth_header(username: &str, secret: &str) -> String {
    let encoded = STANDARD.encode(format!("{}:{}", username, secret));
    format!("Authorization: Basic {}", encoded)
}

/// Environment that injects the auth header as transient git configuration.
///
/// Uses `GIT_CONFIG_COUNT`/`GIT_CONFIG_KEY_n`/`GIT_CONFIG_VALUE_n`, so nothing
/// lands in argv or in any config file.
pub fn header_auth_env(username: &str, secret: &str) -> Vec<(String, String)> {
    vec![
        ("GIT_CONFIG_COUNT".to_string(), "1".to_string()),
        ("GIT_CONFIG_KEY_0".to_string(), "http.extraHeader".to_string()),
        (
            "GIT_CONFIG_VALUE_0".to_string(),
            basic_auth_header(username, secret),
        ),
    ]
}

/// Parse `owner/repo` from common GitHub remote URL forms.
pub fn parse_owner_repo(url: &str) -> Option<String> {
    let clean = strip_credentials(url);
    let path = if let Some(rest) = clean.strip_prefix("git@github.com:") {
        rest
    } else {
        let (_, rest) = split_scheme(&clean)?;
        rest.strip_prefix("github.com/")?
    };
    let path = path.trim_end_matches('/');
    let path = path.strip_suffix(".git").unwrap_or(path);
    let parts: Vec<&str> = path.split('/').collect();
    if parts.len() == 2 && !parts[0].is_empty() && !parts[1].is_empty() {
        Some(format!("{}/{}", parts[0], parts[1]))
    } else {
        None
    }
}

/// Replaces every known encoding of a secret with `***`.
#[derive(Debug, Clone)]
pub struct Redactor {
    needles: Vec<String>,
}

impl Redactor {
    pub fn new(username: &str, secret: &str) -> Self {
        let mut needles = vec![
            secret.to_string(),
            STANDARD.encode(format!("{}:{}", username, secret)),
        ];
        // Longest first so a needle never leaves a fragment of a longer one.
        needles.sort_by_key(|n| std::cmp::Reverse(n.len()));
        needles.retain(|n| !n.is_empty());
        Self { needles }
    }

    /// A redactor that leaves text untouched.
    pub fn none() -> Self {
        Self {
            needles: Vec::new(),
        }
    }

    pub fn redact(&self, text: &str) -> String {
        let mut out = text.to_string();
        for needle in &self.needles {
            if out.contains(needle.as_str()) {
                out = out.replace(needle.as_str(), REDACTED);
            }
        }
        out
    }
}
