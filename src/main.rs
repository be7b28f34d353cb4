//! VibeBench · Prompt Arena Backend
//!
//! - Axum HTTP + WebSocket API for timed prompt-engineering attempts
//! - Gemini generation + judging (offline fallback verdicts without a key)
//! - Supabase leaderboard (in-memory without credentials)
//! - Static SPA fallback (./static/index.html)
//!
//! Important env variables:
//!   PORT                  : u16 (default 3000)
//!   GEMINI_API_KEY        : enables Gemini (API_KEY also accepted)
//!   GEMINI_BASE_URL       : default "https://generativelanguage.googleapis.com/v1beta"
//!   GEMINI_SOLVER_MODEL   : default "gemini-3-pro-preview"
//!   GEMINI_JUDGE_MODEL    : default "gemini-2.5-flash"
//!   SUPABASE_URL          : enables the shared leaderboard together with SUPABASE_ANON_KEY
//!   SUPABASE_ANON_KEY     : anon key sent as `apikey` and bearer token
//!   GITHUB_API_BASE_URL   : default "https://api.github.com"
//!   PUBLIC_ORIGIN         : link used in share text; base for relative reference image URLs
//!   SESSION_TTL_SECS      : idle sessions are dropped after this many seconds (default 1800)
//!   VIBEBENCH_CONFIG_PATH : path to TOML config (prompts + optional challenges)
//!   LOG_LEVEL             : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT            : "pretty" (default), "compact" or "json"

mod telemetry;
mod util;
mod domain;
mod config;
mod seeds;
mod session;
mod scoring;
mod error;
mod pipeline;
mod gemini;
mod store;
mod identity;
mod state;
mod protocol;
mod logic;
mod routes;

use std::{
  net::SocketAddr,
  sync::Arc,
  time::{Duration, Instant},
};
use tokio::net::TcpListener;
use tracing::{info, instrument};

use crate::routes::build_router;
use crate::state::AppState;

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Challenge bank, session table, and the injected remote clients.
  let state = Arc::new(AppState::from_env()?);

  let ttl = std::env::var("SESSION_TTL_SECS")
    .ok()
    .and_then(|v| v.parse::<u64>().ok())
    .map(Duration::from_secs)
    .unwrap_or(DEFAULT_SESSION_TTL);
  tokio::spawn(sweep_idle_sessions(state.clone(), ttl));

  let app = build_router(state.clone());

  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "vibebench", %addr, llm = state.backends.llm, store = state.backends.store, "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await?;
  Ok(())
}

const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(30 * 60);
const SWEEP_EVERY: Duration = Duration::from_secs(60);

async fn sweep_idle_sessions(state: Arc<AppState>, ttl: Duration) {
  info!(target: "session", ttl_secs = ttl.as_secs(), "Idle session sweep enabled");
  let mut tick = tokio::time::interval(SWEEP_EVERY);
  loop {
    tick.tick().await;
    state.sweep_idle(ttl, Instant::now()).await;
  }
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!(target: "vibebench", error = %e, "Failed to listen for shutdown signal");
    std::future::pending::<()>().await;
  }
  info!(target: "vibebench", "Shutdown signal received");
}
