//! Outbound integrations that use the staged credential.

pub mod github;

pub use github::{GitHubClient, GitHubRepo, GitHubUser, is_valid_github_token};
