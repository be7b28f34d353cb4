//! Core behaviors shared by both HTTP and WebSocket handlers.
//!
//! This includes:
//!   - Opening, inspecting and closing sessions
//!   - Driving the attempt state machine (start, draft, recording, reset)
//!   - Launching a run: submit under the lock, then generate and judge in a background task
//!   - Standing (percentile / projected rank), identity verification, leaderboard submission
//!
//! The session lock is only ever held for a state transition, never across a remote call.

use std::sync::Arc;
use std::time::Instant;

use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::domain::{AudioClip, Challenge, VerifiedIdentity};
use crate::error::ApiError;
use crate::pipeline::derive_entry;
use crate::protocol::{
  to_card, to_session_out, ChallengeCard, LeaderboardOut, LeaderboardQuery, ScoreOut, SessionOut, StandingOut,
};
use crate::scoring::{self, leaderboard_view, score_equation, share_text, user_rank};
use crate::session::{PhaseKind, Session, SessionError, Submission};
use crate::state::AppState;
use crate::util::now_epoch_ms;

const DEFAULT_AUDIO_MIME: &str = "audio/webm";

fn session_not_found(id: Uuid) -> ApiError {
  ApiError::NotFound(format!("Unknown session: {id}"))
}

/// Apply `f` to a session and snapshot the result. Missing session is a 404.
async fn transition<T>(
  state: &AppState,
  id: Uuid,
  f: impl FnOnce(&mut Session) -> Result<T, SessionError>,
) -> Result<(T, SessionOut), ApiError> {
  let now = Instant::now();
  let applied = state
    .with_session(id, |s| f(s).map(|v| (v, to_session_out(s, now))))
    .await
    .ok_or_else(|| session_not_found(id))?;
  Ok(applied?)
}

pub fn list_challenges(state: &AppState) -> Vec<ChallengeCard> {
  state.list_challenges().iter().map(|c| to_card(c)).collect()
}

/// Card only: the brief is revealed through a started session.
pub fn get_challenge(state: &AppState, challenge_id: &str) -> Result<ChallengeCard, ApiError> {
  state
    .challenge(challenge_id)
    .map(|c| to_card(&c))
    .ok_or_else(|| ApiError::NotFound(format!("Unknown challengeId: {challenge_id}")))
}

#[instrument(level = "info", skip(state))]
pub async fn open_session(state: &AppState, challenge_id: &str) -> Result<SessionOut, ApiError> {
  let challenge = state
    .challenge(challenge_id)
    .ok_or_else(|| ApiError::NotFound(format!("Unknown challengeId: {challenge_id}")))?;
  let session = state.insert_session(challenge).await;
  info!(target: "session", id = %session.id, %challenge_id, "Session opened");
  Ok(to_session_out(&session, Instant::now()))
}

pub async fn get_session(state: &AppState, id: Uuid) -> Result<SessionOut, ApiError> {
  let now = Instant::now();
  let sessions = state.sessions.read().await;
  sessions.get(&id).map(|s| to_session_out(s, now)).ok_or_else(|| session_not_found(id))
}

#[instrument(level = "info", skip(state))]
pub async fn close_session(state: &AppState, id: Uuid) -> Result<(), ApiError> {
  if state.remove_session(id).await {
    info!(target: "session", %id, "Session closed");
    Ok(())
  } else {
    Err(session_not_found(id))
  }
}

/// Drop every listed session that still exists. Used when the owning socket goes away.
#[instrument(level = "info", skip_all, fields(count = ids.len()))]
pub async fn release_sessions(state: &AppState, ids: &[Uuid]) {
  for id in ids {
    if state.remove_session(*id).await {
      info!(target: "session", %id, "Session released");
    }
  }
}

#[instrument(level = "info", skip(state))]
pub async fn start_session(state: &AppState, id: Uuid) -> Result<SessionOut, ApiError> {
  let (_, out) = transition(state, id, |s| s.start(Instant::now())).await?;
  info!(target: "session", %id, challenge = %out.challenge.id, "Attempt started; brief revealed");
  Ok(out)
}

#[instrument(level = "debug", skip(state, text), fields(text_len = text.chars().count()))]
pub async fn update_draft(state: &AppState, id: Uuid, text: String) -> Result<SessionOut, ApiError> {
  let (_, out) = transition(state, id, |s| s.update_draft(text)).await?;
  Ok(out)
}

#[instrument(level = "info", skip(state))]
pub async fn begin_recording(state: &AppState, id: Uuid) -> Result<SessionOut, ApiError> {
  let (_, out) = transition(state, id, |s| s.begin_recording()).await?;
  info!(target: "session", %id, "Recording started");
  Ok(out)
}

#[instrument(level = "info", skip(state, audio_base64), fields(b64_len = audio_base64.len()))]
pub async fn finish_recording(state: &AppState, id: Uuid, audio_base64: &str, mime: &str) -> Result<SessionOut, ApiError> {
  let bytes = B64
    .decode(audio_base64.trim())
    .map_err(|e| ApiError::BadRequest(format!("Invalid audioBase64: {e}")))?;
  let mime = if mime.trim().is_empty() { DEFAULT_AUDIO_MIME } else { mime.trim() };
  let clip = AudioClip { mime: mime.to_string(), bytes };
  let size = clip.bytes.len();
  let (_, out) = transition(state, id, |s| s.finish_recording(clip)).await?;
  info!(target: "session", %id, size, "Recording captured");
  Ok(out)
}

/// Submit the draft and run the pipeline in the background.
///
/// Returns the `GeneratingSolution` snapshot immediately. Every later
/// transition is pushed to `progress` when a sender is given (WebSocket).
#[instrument(level = "info", skip(state, progress))]
pub async fn launch_run(
  state: &Arc<AppState>,
  id: Uuid,
  progress: Option<UnboundedSender<SessionOut>>,
) -> Result<SessionOut, ApiError> {
  let ((submission, challenge), out) = transition(state, id, |s| {
    let submission = s.submit(Instant::now())?;
    Ok((submission, s.challenge.clone()))
  })
  .await?;
  info!(
    target: "session",
    %id,
    attempt = submission.attempt,
    payload_len = submission.payload.log_len(),
    elapsed = %out.elapsed,
    "Prompt submitted"
  );

  let state = state.clone();
  tokio::spawn(async move { drive_run(state, id, challenge, submission, progress).await });
  Ok(out)
}

/// Generation strictly before judging. Results for a reset or closed session are dropped.
async fn drive_run(
  state: Arc<AppState>,
  id: Uuid,
  challenge: Arc<Challenge>,
  submission: Submission,
  progress: Option<UnboundedSender<SessionOut>>,
) {
  let Submission { attempt, payload } = submission;

  let code = state.pipeline.generate(&challenge, &payload).await;
  let accepted = advance(&state, id, progress.as_ref(), |s| s.solution_ready(attempt, code.clone())).await;
  if !accepted {
    return;
  }

  let evaluation = state.pipeline.judge(&challenge, &payload, &code).await;
  if evaluation.is_system_failure() {
    warn!(target: "session", %id, attempt, "Attempt completes with the fallback verdict");
  }
  advance(&state, id, progress.as_ref(), |s| s.verdict_ready(attempt, evaluation)).await;
}

async fn advance(
  state: &AppState,
  id: Uuid,
  progress: Option<&UnboundedSender<SessionOut>>,
  f: impl FnOnce(&mut Session) -> Result<(), SessionError>,
) -> bool {
  match transition(state, id, f).await {
    Ok(((), out)) => {
      info!(target: "session", %id, phase = %out.phase, "Phase advanced");
      if let Some(tx) = progress {
        // Receiver gone means the socket closed; the session still advances.
        let _ = tx.send(out);
      }
      true
    }
    Err(e) => {
      warn!(target: "session", %id, error = %e, "Dropping pipeline result");
      false
    }
  }
}

#[instrument(level = "info", skip(state))]
pub async fn reset_session(state: &AppState, id: Uuid) -> Result<SessionOut, ApiError> {
  let (_, out) = transition(state, id, |s| {
    s.reset();
    Ok(())
  })
  .await?;
  info!(target: "session", %id, attempt = out.attempt, "Session reset");
  Ok(out)
}

/// Percentile and projected rank of a completed attempt among prior entries for its challenge.
#[instrument(level = "info", skip(state))]
pub async fn standing(state: &AppState, id: Uuid) -> Result<StandingOut, ApiError> {
  let (challenge_id, evaluation) = state
    .with_session(id, |s| match s.evaluation() {
      Some(e) => Ok((s.challenge.id.clone(), e.clone())),
      None => Err(SessionError::InvalidTransition { action: "report standing", phase: s.kind() }),
    })
    .await
    .ok_or_else(|| session_not_found(id))??;

  let entries = state.pipeline.leaderboard().await?;
  let st = scoring::standing(&entries, &challenge_id, evaluation.final_score);
  info!(
    target: "vibebench",
    %id,
    score = evaluation.final_score,
    percentile = st.percentile,
    projected_rank = st.projected_rank,
    "Standing computed"
  );
  Ok(StandingOut {
    percentile: st.percentile,
    projected_rank: st.projected_rank,
    tier: st.tier,
    final_score: evaluation.final_score,
    score_equation: score_equation(&evaluation),
    share_text: share_text(st.projected_rank, evaluation.final_score, &state.public_origin),
  })
}

/// Look up a GitHub handle and attach the identity to the session.
/// Any failed lookup clears a previously verified identity.
#[instrument(level = "info", skip(state))]
pub async fn verify_identity(state: &AppState, id: Uuid, handle: &str) -> Result<VerifiedIdentity, ApiError> {
  if !state.sessions.read().await.contains_key(&id) {
    return Err(session_not_found(id));
  }
  let looked_up = state.identity.lookup(handle).await;
  let stored = looked_up.as_ref().ok().cloned();
  let replaced = state
    .with_session(id, move |s| std::mem::replace(&mut s.identity, stored))
    .await
    .ok_or_else(|| session_not_found(id))?;
  match looked_up {
    Ok(identity) => Ok(identity),
    Err(e) => {
      if let Some(previous) = replaced {
        warn!(target: "vibebench", %id, previous = %previous.login, error = %e, "Verification failed; identity cleared");
      }
      Err(e.into())
    }
  }
}

/// Persist a completed attempt. On failure the evaluation and the open
/// submission panel are left as they were so the user can retry.
#[instrument(level = "info", skip(state))]
pub async fn submit_score(state: &AppState, id: Uuid, user_name: &str) -> Result<ScoreOut, ApiError> {
  let timestamp = now_epoch_ms();
  let entry = state
    .with_session(id, |s| derive_entry(s, user_name, timestamp))
    .await
    .ok_or_else(|| session_not_found(id))??;

  state.pipeline.save(&entry).await?;
  state.with_session(id, |s| s.submission_open = false).await;
  info!(target: "vibebench", %id, entry = %entry.id, user = %entry.user_name, score = entry.total_score, "Score saved");

  let rank = match state.pipeline.leaderboard().await {
    Ok(entries) => user_rank(&entries, &entry.user_name),
    Err(e) => {
      warn!(target: "vibebench", error = %e, "Leaderboard refresh failed after save");
      None
    }
  };
  let share = rank.map(|r| share_text(r, entry.total_score, &state.public_origin));
  Ok(ScoreOut { entry, user_rank: rank, share_text: share })
}

#[instrument(level = "debug", skip(state))]
pub async fn leaderboard(state: &AppState, q: &LeaderboardQuery) -> Result<LeaderboardOut, ApiError> {
  let entries = state.pipeline.leaderboard().await?;
  let view = leaderboard_view(&entries, q.challenge_id.as_deref(), q.limit);
  let rank = q.user.as_deref().and_then(|u| user_rank(&entries, u));
  Ok(LeaderboardOut { entries: view, user_rank: rank })
}

/// Whether a snapshot is the last one a run produces.
pub fn is_terminal(out: &SessionOut) -> bool {
  out.phase == PhaseKind::Completed
}
