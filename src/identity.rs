//! GitHub handle verification for leaderboard identities.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, USER_AGENT};
use serde::Deserialize;
use tracing::{info, instrument};

use crate::domain::VerifiedIdentity;
use crate::error::IdentityError;
use crate::pipeline::IdentityLookup;

#[derive(Clone)]
pub struct GitHubLookup {
  client: reqwest::Client,
  pub base_url: String,
}

impl GitHubLookup {
  pub fn new(base_url: String) -> Result<Self, IdentityError> {
    let client = reqwest::Client::builder().timeout(Duration::from_secs(10)).build()?;
    Ok(Self { client, base_url: base_url.trim_end_matches('/').to_string() })
  }

  /// GITHUB_API_BASE_URL overrides the public API (useful for GitHub Enterprise).
  pub fn from_env() -> Result<Self, IdentityError> {
    let base = std::env::var("GITHUB_API_BASE_URL").unwrap_or_else(|_| "https://api.github.com".into());
    Self::new(base)
  }
}

#[derive(Deserialize)]
struct GitHubUser {
  login: String,
  avatar_url: String,
  html_url: String,
}

#[async_trait]
impl IdentityLookup for GitHubLookup {
  #[instrument(level = "info", skip(self))]
  async fn lookup(&self, handle: &str) -> Result<VerifiedIdentity, IdentityError> {
    let handle = handle.trim();
    if handle.is_empty() {
      return Err(IdentityError::EmptyHandle);
    }
    // Handles are alphanumeric plus '-'; anything else cannot exist and must not reach the URL path.
    if !handle.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
      return Err(IdentityError::NotFound(handle.to_string()));
    }

    let res = self
      .client
      .get(format!("{}/users/{}", self.base_url, handle))
      .header(USER_AGENT, "vibebench-backend/0.1")
      .header(ACCEPT, "application/vnd.github+json")
      .send()
      .await?;
    if !res.status().is_success() {
      return Err(IdentityError::NotFound(handle.to_string()));
    }
    let user: GitHubUser = res.json().await?;
    info!(target: "vibebench", login = %user.login, "GitHub identity verified");
    Ok(VerifiedIdentity { login: user.login, avatar_url: user.avatar_url, profile_url: user.html_url })
  }
}
