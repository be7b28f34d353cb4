//! WebSocket upgrade + message loop. Each client message is parsed as JSON and
//! forwarded to core logic with one JSON reply per request. A `run` also
//! streams `phase` messages as the background pipeline advances.

use std::sync::Arc;
use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tokio::sync::mpsc;
use uuid::Uuid;
use tracing::{info, error, instrument, debug};

use crate::error::ApiError;
use crate::logic::*;
use crate::protocol::{ClientWsMessage, LeaderboardQuery, ServerWsMessage, SessionOut};
use crate::state::AppState;

#[instrument(level = "info", skip(state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
  info!(target: "vibebench", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state))
}

fn encode(msg: &ServerWsMessage) -> String {
  serde_json::to_string(msg).unwrap_or_else(|e| {
    serde_json::json!({ "type": "error", "message": format!("Serialization error: {}", e) }).to_string()
  })
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
  info!(target: "vibebench", "WebSocket connected");
  // Phase updates from every run launched on this connection.
  let (progress_tx, mut progress_rx) = mpsc::unbounded_channel::<SessionOut>();
  // Sessions opened here do not outlive the socket.
  let mut opened: Vec<Uuid> = Vec::new();

  loop {
    let reply_msg = tokio::select! {
      incoming = socket.recv() => match incoming {
        Some(Ok(Message::Text(txt))) => match serde_json::from_str::<ClientWsMessage>(&txt) {
          Ok(incoming) => {
            debug!(target: "vibebench", len = txt.len(), "WS message received");
            handle_client_ws(incoming, &state, &progress_tx, &mut opened).await
          }
          Err(e) => ServerWsMessage::Error { message: format!("Invalid JSON: {}", e) },
        },
        Some(Ok(Message::Ping(payload))) => {
          let _ = socket.send(Message::Pong(payload)).await;
          continue;
        }
        Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
        Some(Ok(_)) => continue,
      },
      Some(session) = progress_rx.recv() => {
        if is_terminal(&session) {
          info!(target: "vibebench", id = %session.session_id, "WS run completed");
        }
        ServerWsMessage::Phase { session }
      }
    };

    if let Err(e) = socket.send(Message::Text(encode(&reply_msg))).await {
      error!(target: "vibebench", error = %e, "WS send error");
      break;
    }
  }
  release_sessions(&state, &opened).await;
  info!(target: "vibebench", sessions = opened.len(), "WebSocket disconnected");
}

fn error_reply(e: ApiError) -> ServerWsMessage {
  ServerWsMessage::Error { message: e.to_string() }
}

#[instrument(level = "debug", skip_all)]
async fn handle_client_ws(
  msg: ClientWsMessage,
  state: &Arc<AppState>,
  progress: &mpsc::UnboundedSender<SessionOut>,
  opened: &mut Vec<Uuid>,
) -> ServerWsMessage {
  let session_reply = |r: Result<SessionOut, ApiError>| match r {
    Ok(session) => ServerWsMessage::Session { session },
    Err(e) => error_reply(e),
  };

  match msg {
    ClientWsMessage::Ping => ServerWsMessage::Pong,

    ClientWsMessage::ListChallenges => ServerWsMessage::Challenges { challenges: list_challenges(state) },

    ClientWsMessage::OpenSession { challenge_id } => {
      let r = open_session(state, &challenge_id).await;
      if let Ok(session) = &r {
        opened.push(session.session_id);
      }
      session_reply(r)
    }

    ClientWsMessage::GetSession { session_id } => session_reply(get_session(state, session_id).await),

    ClientWsMessage::Start { session_id } => session_reply(start_session(state, session_id).await),

    ClientWsMessage::Draft { session_id, text } => session_reply(update_draft(state, session_id, text).await),

    ClientWsMessage::RecordingStart { session_id } => session_reply(begin_recording(state, session_id).await),

    ClientWsMessage::RecordingStop { session_id, audio_base64, mime } => {
      session_reply(finish_recording(state, session_id, &audio_base64, &mime).await)
    }

    ClientWsMessage::Run { session_id } => {
      let r = launch_run(state, session_id, Some(progress.clone())).await;
      info!(target: "vibebench", id = %session_id, ok = r.is_ok(), "WS run launched");
      session_reply(r)
    }

    ClientWsMessage::Reset { session_id } => session_reply(reset_session(state, session_id).await),

    ClientWsMessage::Standing { session_id } => match standing(state, session_id).await {
      Ok(standing) => ServerWsMessage::Standing { standing },
      Err(e) => error_reply(e),
    },

    ClientWsMessage::VerifyIdentity { session_id, handle } => match verify_identity(state, session_id, &handle).await {
      Ok(identity) => ServerWsMessage::Identity { identity },
      Err(e) => error_reply(e),
    },

    ClientWsMessage::SubmitScore { session_id, user_name } => match submit_score(state, session_id, &user_name).await {
      Ok(result) => ServerWsMessage::ScoreSaved { result },
      Err(e) => error_reply(e),
    },

    ClientWsMessage::Leaderboard { challenge_id, user, limit } => {
      match leaderboard(state, &LeaderboardQuery { challenge_id, user, limit }).await {
        Ok(leaderboard) => ServerWsMessage::Leaderboard { leaderboard },
        Err(e) => error_reply(e),
      }
    }
  }
}
