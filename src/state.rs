//! Application state: challenge bank, live sessions, and the injected pipeline collaborators.
//!
//! This module owns:
//!   - the challenge bank (built-in seeds, overridden/extended by TOML config)
//!   - the session table (one attempt per session)
//!   - the pipeline (generator, judge, leaderboard store)
//!   - the identity lookup
//!
//! Every external client is built here and passed in explicitly; nothing
//! downstream reaches for a global.

use std::{
  collections::HashMap,
  sync::Arc,
  time::{Duration, Instant},
};

use tokio::sync::RwLock;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::config::{load_arena_config_from_env, ArenaConfig};
use crate::domain::{Challenge, Domain};
use crate::gemini::Gemini;
use crate::identity::GitHubLookup;
use crate::pipeline::{CodeGenerator, IdentityLookup, Judge, OfflineModel, Pipeline, ScoreStore};
use crate::seeds::seed_challenges;
use crate::session::Session;
use crate::store::{MemoryStore, SupabaseStore};

const DEFAULT_PUBLIC_ORIGIN: &str = "http://localhost:3000";

pub struct AppState {
  challenges: HashMap<String, Arc<Challenge>>,
  /// Display order: Frontend then Backend, easy to hard.
  order: Vec<String>,
  pub sessions: RwLock<HashMap<Uuid, Session>>,
  pub pipeline: Pipeline,
  pub identity: Arc<dyn IdentityLookup>,
  /// Short description of the wired backends, for the health endpoint.
  pub backends: Backends,
  /// Link appended to share text.
  pub public_origin: String,
}

#[derive(Clone, Debug, Default)]
pub struct Backends {
  pub llm: &'static str,
  pub store: &'static str,
}

impl AppState {
  pub fn new(challenges: Vec<Challenge>, pipeline: Pipeline, identity: Arc<dyn IdentityLookup>, backends: Backends) -> Self {
    let mut sorted = challenges;
    sorted.sort_by_key(|c| (c.domain != Domain::Frontend, c.difficulty));
    let order = sorted.iter().map(|c| c.id.clone()).collect();
    let challenges = sorted.into_iter().map(|c| (c.id.clone(), Arc::new(c))).collect();
    Self {
      challenges,
      order,
      sessions: RwLock::new(HashMap::new()),
      pipeline,
      identity,
      backends,
      public_origin: DEFAULT_PUBLIC_ORIGIN.into(),
    }
  }

  /// Build state from env: load config, merge the challenge bank, wire the remote clients.
  #[instrument(level = "info", skip_all)]
  pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
    let cfg = load_arena_config_from_env().unwrap_or_default();
    let challenges = merge_bank(seed_challenges(), &cfg);

    let mut by_domain: HashMap<String, usize> = HashMap::new();
    for c in &challenges {
      *by_domain.entry(format!("{:?}", c.domain)).or_default() += 1;
    }
    for (domain, count) in by_domain {
      info!(target: "vibebench", %domain, count, "Startup challenge inventory");
    }

    let (generator, judge, llm): (Arc<dyn CodeGenerator>, Arc<dyn Judge>, &'static str) =
      match Gemini::from_env(cfg.prompts.clone()) {
        Some(g) => {
          info!(target: "vibebench", base_url = %g.base_url, solver_model = %g.solver_model, judge_model = %g.judge_model, "Gemini enabled.");
          let g = Arc::new(g);
          let generator: Arc<dyn CodeGenerator> = g.clone();
          (generator, g, "gemini")
        }
        None => {
          warn!(target: "vibebench", "Gemini disabled (no GEMINI_API_KEY). Every attempt will end in the fallback verdict.");
          (Arc::new(OfflineModel), Arc::new(OfflineModel), "offline")
        }
      };

    let (store, store_kind): (Arc<dyn ScoreStore>, &'static str) = match SupabaseStore::from_env() {
      Some(s) => {
        info!(target: "vibebench", url = %s.base_url, "Supabase leaderboard enabled.");
        (Arc::new(s), "supabase")
      }
      None => {
        warn!(target: "vibebench", "Supabase disabled (no SUPABASE_URL/SUPABASE_ANON_KEY). Using in-memory leaderboard.");
        (Arc::new(MemoryStore::default()), "memory")
      }
    };

    let identity = Arc::new(GitHubLookup::from_env()?);
    let pipeline = Pipeline::new(generator, judge, store);
    let mut state = Self::new(challenges, pipeline, identity, Backends { llm, store: store_kind });
    if let Ok(origin) = std::env::var("PUBLIC_ORIGIN") {
      state.public_origin = origin;
    }
    Ok(state)
  }

  pub fn challenge(&self, id: &str) -> Option<Arc<Challenge>> {
    self.challenges.get(id).cloned()
  }

  pub fn list_challenges(&self) -> Vec<Arc<Challenge>> {
    self.order.iter().filter_map(|id| self.challenges.get(id).cloned()).collect()
  }

  #[instrument(level = "debug", skip_all, fields(challenge = %challenge.id))]
  pub async fn insert_session(&self, challenge: Arc<Challenge>) -> Session {
    let session = Session::new(challenge);
    self.sessions.write().await.insert(session.id, session.clone());
    session
  }

  /// Run `f` against a session under the write lock. Never hold this across a remote call.
  pub async fn with_session<T>(&self, id: Uuid, f: impl FnOnce(&mut Session) -> T) -> Option<T> {
    let mut sessions = self.sessions.write().await;
    sessions.get_mut(&id).map(|s| {
      s.last_active = Instant::now();
      f(s)
    })
  }

  pub async fn remove_session(&self, id: Uuid) -> bool {
    self.sessions.write().await.remove(&id).is_some()
  }

  /// Remove sessions untouched for at least `ttl` as of `now`. Returns how many went.
  pub async fn sweep_idle(&self, ttl: Duration, now: Instant) -> usize {
    let mut sessions = self.sessions.write().await;
    let before = sessions.len();
    sessions.retain(|_, s| now.saturating_duration_since(s.last_active) < ttl);
    let removed = before - sessions.len();
    if removed > 0 {
      info!(target: "session", removed, remaining = sessions.len(), "Idle sessions swept");
    }
    removed
  }
}

/// Seeds first, then config entries (same id replaces the seed). Invalid entries are skipped.
pub fn merge_bank(seeds: Vec<Challenge>, cfg: &ArenaConfig) -> Vec<Challenge> {
  let mut bank: Vec<Challenge> = seeds;
  for cc in &cfg.challenges {
    let id = cc.id.clone();
    match cc.clone().into_challenge() {
      Ok(c) => match bank.iter_mut().find(|b| b.id == c.id) {
        Some(existing) => {
          info!(target: "vibebench", %id, "Config challenge overrides built-in");
          *existing = c;
        }
        None => bank.push(c),
      },
      Err(reason) => error!(target: "vibebench", %id, %reason, "Skipping config challenge"),
    }
  }
  bank
}

/// State wired to in-process fakes: built-in bank, scripted model, fake store.
#[cfg(test)]
pub(crate) fn test_state(
  model: Arc<crate::pipeline::fakes::ScriptedModel>,
  store: Arc<crate::pipeline::fakes::MemoryStoreFake>,
) -> Arc<AppState> {
  let pipeline = Pipeline::new(model.clone(), model, store);
  let identity = Arc::new(crate::pipeline::fakes::StaticIdentity);
  Arc::new(AppState::new(seed_challenges(), pipeline, identity, Backends { llm: "scripted", store: "fake" }))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::Difficulty;

  #[test]
  fn config_overrides_and_extends_the_bank() {
    let cfg = ArenaConfig::from_toml_str(
      r#"
      [[challenges]]
      id = "backend-easy"
      domain = "Backend"
      title = "SQL Minefield v2"
      difficulty = "Easy"
      description = "Same idea, new traps."
      judge_context = "TRAPS: concatenation."

      [[challenges]]
      id = "frontend-extra"
      domain = "Frontend"
      title = "Virtual List"
      difficulty = "Medium"
      description = "Render 100k rows."
      judge_context = "TRAPS: no windowing."

      [[challenges]]
      id = "empty"
      domain = "Frontend"
      title = "Nothing"
      difficulty = "Hard"
      "#,
    )
    .unwrap();

    let bank = merge_bank(seed_challenges(), &cfg);
    assert_eq!(bank.len(), 7);
    assert_eq!(bank.iter().find(|c| c.id == "backend-easy").unwrap().title, "SQL Minefield v2");
    assert!(bank.iter().all(|c| c.id != "empty"));
  }

  #[tokio::test]
  async fn sweep_removes_only_idle_sessions() {
    let pipeline = Pipeline::new(Arc::new(OfflineModel), Arc::new(OfflineModel), Arc::new(MemoryStore::default()));
    let identity = Arc::new(GitHubLookup::new("http://127.0.0.1:9".into()).unwrap());
    let state = AppState::new(seed_challenges(), pipeline, identity, Backends::default());
    let stale = state.insert_session(state.challenge("backend-easy").unwrap()).await.id;
    let fresh = state.insert_session(state.challenge("frontend-easy").unwrap()).await.id;

    let ttl = Duration::from_secs(1800);
    assert_eq!(state.sweep_idle(ttl, Instant::now()).await, 0);

    let later = Instant::now() + ttl;
    state.with_session(fresh, |s| s.last_active = later).await;
    assert_eq!(state.sweep_idle(ttl, later).await, 1);
    assert!(state.with_session(stale, |_| ()).await.is_none());
    assert!(state.with_session(fresh, |_| ()).await.is_some());
  }

  #[test]
  fn listing_is_frontend_first_then_by_difficulty() {
    let pipeline = Pipeline::new(Arc::new(OfflineModel), Arc::new(OfflineModel), Arc::new(MemoryStore::default()));
    let identity = Arc::new(GitHubLookup::new("http://127.0.0.1:9".into()).unwrap());
    let mut seeds = seed_challenges();
    seeds.reverse();
    let state = AppState::new(seeds, pipeline, identity, Backends::default());

    let listed = state.list_challenges();
    assert_eq!(listed.first().unwrap().id, "frontend-easy");
    assert_eq!(listed.last().unwrap().id, "backend-hard");
    assert_eq!(listed[2].difficulty, Difficulty::Hard);
    assert!(state.challenge("backend-medium").is_some());
  }
}
