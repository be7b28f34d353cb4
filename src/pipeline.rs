//! Result submission pipeline: generation, then judging, then (on confirmation) persistence.
//!
//! The remote collaborators sit behind narrow traits so the pipeline can be
//! driven by fakes in tests. Generation and judging never fail from the
//! caller's point of view: errors become an error-comment solution and the
//! "System Failure" verdict respectively, so an attempt always completes.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::domain::{Challenge, EvaluationResult, LeaderboardEntry, PromptPayload, VerifiedIdentity};
use crate::error::{IdentityError, LlmError, StoreError};
use crate::session::{PhaseKind, Session};

#[async_trait]
pub trait CodeGenerator: Send + Sync {
  async fn generate(&self, payload: &PromptPayload, challenge: &Challenge) -> Result<String, LlmError>;
}

#[async_trait]
pub trait Judge: Send + Sync {
  async fn judge(&self, payload: &PromptPayload, code: &str, challenge: &Challenge) -> Result<EvaluationResult, LlmError>;
}

/// Append-only leaderboard table.
#[async_trait]
pub trait ScoreStore: Send + Sync {
  async fn insert(&self, entry: &LeaderboardEntry) -> Result<(), StoreError>;
  /// All records, best score first.
  async fn list(&self) -> Result<Vec<LeaderboardEntry>, StoreError>;
}

#[async_trait]
pub trait IdentityLookup: Send + Sync {
  async fn lookup(&self, handle: &str) -> Result<VerifiedIdentity, IdentityError>;
}

/// Stand-in model used when no API key is configured. Every call fails, so
/// the pipeline serves its documented fallbacks.
#[derive(Clone, Copy, Debug, Default)]
pub struct OfflineModel;

#[async_trait]
impl CodeGenerator for OfflineModel {
  async fn generate(&self, _payload: &PromptPayload, _challenge: &Challenge) -> Result<String, LlmError> {
    Err(LlmError::Disabled)
  }
}

#[async_trait]
impl Judge for OfflineModel {
  async fn judge(&self, _payload: &PromptPayload, _code: &str, _challenge: &Challenge) -> Result<EvaluationResult, LlmError> {
    Err(LlmError::Disabled)
  }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EntryError {
  #[error("user name is required")]
  EmptyUserName,
  #[error("attempt is not completed (phase {0})")]
  NotCompleted(PhaseKind),
}

#[derive(Clone)]
pub struct Pipeline {
  generator: Arc<dyn CodeGenerator>,
  judge: Arc<dyn Judge>,
  store: Arc<dyn ScoreStore>,
}

impl Pipeline {
  pub fn new(generator: Arc<dyn CodeGenerator>, judge: Arc<dyn Judge>, store: Arc<dyn ScoreStore>) -> Self {
    Self { generator, judge, store }
  }

  /// Step 1. Always resolves to some code text.
  #[instrument(level = "info", skip(self, challenge, payload), fields(challenge = %challenge.id, payload_len = payload.log_len()))]
  pub async fn generate(&self, challenge: &Challenge, payload: &PromptPayload) -> String {
    let start = Instant::now();
    match self.generator.generate(payload, challenge).await {
      Ok(code) if code.trim().is_empty() => {
        warn!(target: "pipeline", elapsed = ?start.elapsed(), "Generator returned empty output");
        "// No code generated.".into()
      }
      Ok(code) => {
        info!(target: "pipeline", elapsed = ?start.elapsed(), code_len = code.len(), "Solution generated");
        code
      }
      Err(e) => {
        error!(target: "pipeline", elapsed = ?start.elapsed(), error = %e, "Generation failed; substituting error comment");
        format!("// Error generating solution: {e}")
      }
    }
  }

  /// Steps 2 and 3. Failure or garbage yields the all-zero "System Failure" result.
  #[instrument(level = "info", skip(self, challenge, payload, code), fields(challenge = %challenge.id, code_len = code.len()))]
  pub async fn judge(&self, challenge: &Challenge, payload: &PromptPayload, code: &str) -> EvaluationResult {
    let start = Instant::now();
    match self.judge.judge(payload, code, challenge).await {
      Ok(result) => {
        let result = result.normalized();
        info!(
          target: "pipeline",
          elapsed = ?start.elapsed(),
          final_score = result.final_score,
          traps = result.traps_triggered.len(),
          bonuses = result.bonuses_awarded.len(),
          "Prompt judged"
        );
        result
      }
      Err(e) => {
        error!(target: "pipeline", elapsed = ?start.elapsed(), error = %e, "Judging failed; substituting fallback verdict");
        EvaluationResult::system_failure()
      }
    }
  }

  /// Step 4. The caller keeps displaying its evaluation whatever happens here.
  #[instrument(level = "info", skip(self, entry), fields(id = %entry.id, challenge = %entry.problem_id, score = entry.total_score))]
  pub async fn save(&self, entry: &LeaderboardEntry) -> Result<(), StoreError> {
    self.store.insert(entry).await.map_err(|e| {
      error!(target: "pipeline", error = %e, "Failed to save score");
      e
    })
  }

  pub async fn leaderboard(&self) -> Result<Vec<LeaderboardEntry>, StoreError> {
    self.store.list().await
  }
}

/// Build the leaderboard record for a completed attempt.
///
/// A verified identity pins the name to its login; `user_name` only applies
/// to anonymous sessions.
pub fn derive_entry(session: &Session, user_name: &str, timestamp_ms: i64) -> Result<LeaderboardEntry, EntryError> {
  let identity = session.identity.as_ref();
  let user_name = match identity {
    Some(verified) => verified.login.as_str(),
    None => user_name.trim(),
  };
  if user_name.is_empty() {
    return Err(EntryError::EmptyUserName);
  }
  let (Some(evaluation), Some(payload)) = (session.evaluation(), session.payload()) else {
    return Err(EntryError::NotCompleted(session.kind()));
  };

  Ok(LeaderboardEntry {
    id: Uuid::new_v4().to_string(),
    problem_id: session.challenge.id.clone(),
    user_name: user_name.to_string(),
    avatar_url: identity.map(|i| i.avatar_url.clone()),
    profile_url: identity.map(|i| i.profile_url.clone()),
    prompt_length: u32::try_from(payload.prompt_length()).unwrap_or(u32::MAX),
    duration_ms: u64::try_from(session.elapsed(Instant::now()).as_millis()).unwrap_or(u64::MAX),
    total_score: evaluation.final_score,
    breakdown: evaluation.breakdown(),
    timestamp: timestamp_ms,
  })
}
