//! Error types for the remote collaborators and the HTTP surface.
//!
//! Remote failures never reach the player as a crash: the pipeline turns
//! LLM errors into fallbacks, and everything else becomes an `ApiError` body.

use axum::{
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use serde_json::json;
use tracing::warn;

use crate::pipeline::EntryError;
use crate::session::SessionError;

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
  #[error("LLM integration disabled (no GEMINI_API_KEY)")]
  Disabled,
  #[error("request failed: {0}")]
  Transport(String),
  #[error("Gemini HTTP {status}: {message}")]
  Status { status: u16, message: String },
  #[error("no response from model")]
  EmptyResponse,
  #[error("JSON parse error: {0}")]
  Parse(String),
}

impl From<reqwest::Error> for LlmError {
  fn from(e: reqwest::Error) -> Self {
    LlmError::Transport(e.to_string())
  }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
  #[error("leaderboard request failed: {0}")]
  Transport(String),
  #[error("leaderboard HTTP {status}: {message}")]
  Status { status: u16, message: String },
  #[error("leaderboard decode error: {0}")]
  Decode(String),
}

impl From<reqwest::Error> for StoreError {
  fn from(e: reqwest::Error) -> Self {
    if e.is_decode() {
      StoreError::Decode(e.to_string())
    } else {
      StoreError::Transport(e.to_string())
    }
  }
}

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
  #[error("handle is empty")]
  EmptyHandle,
  #[error("GitHub user not found: {0}")]
  NotFound(String),
  #[error("identity lookup failed: {0}")]
  Transport(String),
}

impl From<reqwest::Error> for IdentityError {
  fn from(e: reqwest::Error) -> Self {
    IdentityError::Transport(e.to_string())
  }
}

/// Errors surfaced by HTTP handlers. Rendered as `{ "error": message }`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
  #[error("{0}")]
  NotFound(String),
  #[error("{0}")]
  BadRequest(String),
  #[error("{0}")]
  Conflict(String),
  #[error("{0}")]
  Upstream(String),
}

impl ApiError {
  pub fn status(&self) -> StatusCode {
    match self {
      ApiError::NotFound(_) => StatusCode::NOT_FOUND,
      ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
      ApiError::Conflict(_) => StatusCode::CONFLICT,
      ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    if status.is_server_error() {
      warn!(target: "vibebench", %status, error = %self, "Request failed upstream");
    }
    (status, Json(json!({ "error": self.to_string() }))).into_response()
  }
}

impl From<SessionError> for ApiError {
  fn from(e: SessionError) -> Self {
    match e {
      SessionError::EmptyPrompt | SessionError::MissingAudio | SessionError::EmptyAudio => ApiError::BadRequest(e.to_string()),
      _ => ApiError::Conflict(e.to_string()),
    }
  }
}

impl From<EntryError> for ApiError {
  fn from(e: EntryError) -> Self {
    match e {
      EntryError::EmptyUserName => ApiError::BadRequest(e.to_string()),
      EntryError::NotCompleted(_) => ApiError::Conflict(e.to_string()),
    }
  }
}

impl From<StoreError> for ApiError {
  fn from(e: StoreError) -> Self {
    ApiError::Upstream(e.to_string())
  }
}

impl From<IdentityError> for ApiError {
  fn from(e: IdentityError) -> Self {
    match e {
      IdentityError::EmptyHandle => ApiError::BadRequest(e.to_string()),
      IdentityError::NotFound(_) => ApiError::NotFound(e.to_string()),
      IdentityError::Transport(_) => ApiError::Upstream(e.to_string()),
    }
  }
}
