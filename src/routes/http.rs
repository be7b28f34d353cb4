//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Each handler is instrumented with its path parameters and basic body info.

use std::sync::Arc;
use axum::{extract::{Path, Query, State}, http::StatusCode, Json, response::IntoResponse};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::ApiError;
use crate::logic::*;
use crate::protocol::*;
use crate::state::AppState;

#[instrument(level = "info", skip(state))]
pub async fn http_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(HealthOut { ok: true, llm: state.backends.llm, store: state.backends.store })
}

#[instrument(level = "info", skip(state))]
pub async fn http_list_challenges(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(list_challenges(&state))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_challenge(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<Json<ChallengeCard>, ApiError> {
  Ok(Json(get_challenge(&state, &id)?))
}

#[instrument(level = "info", skip(state, body), fields(challenge_id = %body.challenge_id))]
pub async fn http_open_session(
  State(state): State<Arc<AppState>>,
  Json(body): Json<OpenSessionIn>,
) -> Result<Json<SessionOut>, ApiError> {
  Ok(Json(open_session(&state, &body.challenge_id).await?))
}

#[instrument(level = "debug", skip(state))]
pub async fn http_get_session(
  State(state): State<Arc<AppState>>,
  Path(id): Path<Uuid>,
) -> Result<Json<SessionOut>, ApiError> {
  Ok(Json(get_session(&state, id).await?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_close_session(
  State(state): State<Arc<AppState>>,
  Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
  close_session(&state, id).await?;
  Ok(StatusCode::NO_CONTENT)
}

#[instrument(level = "info", skip(state))]
pub async fn http_start(
  State(state): State<Arc<AppState>>,
  Path(id): Path<Uuid>,
) -> Result<Json<SessionOut>, ApiError> {
  Ok(Json(start_session(&state, id).await?))
}

#[instrument(level = "debug", skip(state, body), fields(text_len = body.text.chars().count()))]
pub async fn http_draft(
  State(state): State<Arc<AppState>>,
  Path(id): Path<Uuid>,
  Json(body): Json<DraftIn>,
) -> Result<Json<SessionOut>, ApiError> {
  Ok(Json(update_draft(&state, id, body.text).await?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_recording_start(
  State(state): State<Arc<AppState>>,
  Path(id): Path<Uuid>,
) -> Result<Json<SessionOut>, ApiError> {
  Ok(Json(begin_recording(&state, id).await?))
}

#[instrument(level = "info", skip(state, body), fields(b64_len = body.audio_base64.len(), mime = %body.mime))]
pub async fn http_recording_stop(
  State(state): State<Arc<AppState>>,
  Path(id): Path<Uuid>,
  Json(body): Json<RecordingIn>,
) -> Result<Json<SessionOut>, ApiError> {
  Ok(Json(finish_recording(&state, id, &body.audio_base64, &body.mime).await?))
}

/// Answers with the `GENERATING_SOLUTION` snapshot; poll the session for later phases.
#[instrument(level = "info", skip(state))]
pub async fn http_run(
  State(state): State<Arc<AppState>>,
  Path(id): Path<Uuid>,
) -> Result<Json<SessionOut>, ApiError> {
  let out = launch_run(&state, id, None).await?;
  info!(target: "vibebench", %id, attempt = out.attempt, "HTTP run launched");
  Ok(Json(out))
}

#[instrument(level = "info", skip(state))]
pub async fn http_reset(
  State(state): State<Arc<AppState>>,
  Path(id): Path<Uuid>,
) -> Result<Json<SessionOut>, ApiError> {
  Ok(Json(reset_session(&state, id).await?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_standing(
  State(state): State<Arc<AppState>>,
  Path(id): Path<Uuid>,
) -> Result<Json<StandingOut>, ApiError> {
  Ok(Json(standing(&state, id).await?))
}

#[instrument(level = "info", skip(state, body), fields(handle = %body.handle))]
pub async fn http_identity(
  State(state): State<Arc<AppState>>,
  Path(id): Path<Uuid>,
  Json(body): Json<IdentityIn>,
) -> Result<impl IntoResponse, ApiError> {
  Ok(Json(verify_identity(&state, id, &body.handle).await?))
}

#[instrument(level = "info", skip(state, body), fields(user = %body.user_name))]
pub async fn http_submit_score(
  State(state): State<Arc<AppState>>,
  Path(id): Path<Uuid>,
  Json(body): Json<ScoreIn>,
) -> Result<Json<ScoreOut>, ApiError> {
  let out = submit_score(&state, id, &body.user_name).await?;
  info!(target: "vibebench", %id, rank = ?out.user_rank, "HTTP score submitted");
  Ok(Json(out))
}

#[instrument(level = "info", skip(state))]
pub async fn http_leaderboard(
  State(state): State<Arc<AppState>>,
  Query(q): Query<LeaderboardQuery>,
) -> Result<Json<LeaderboardOut>, ApiError> {
  Ok(Json(leaderboard(&state, &q).await?))
}
