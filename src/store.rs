//! Leaderboard persistence: a Supabase (PostgREST) table, or an in-memory
//! list when no Supabase credentials are configured.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use crate::domain::{LeaderboardEntry, ScoreBreakdown};
use crate::error::StoreError;
use crate::pipeline::ScoreStore;
use crate::scoring::ranked;

const TABLE: &str = "leaderboard";

/// Process-local store. Entries vanish on restart.
#[derive(Default)]
pub struct MemoryStore {
  entries: RwLock<Vec<LeaderboardEntry>>,
}

#[async_trait]
impl ScoreStore for MemoryStore {
  async fn insert(&self, entry: &LeaderboardEntry) -> Result<(), StoreError> {
    self.entries.write().await.push(entry.clone());
    Ok(())
  }

  async fn list(&self) -> Result<Vec<LeaderboardEntry>, StoreError> {
    Ok(ranked(&self.entries.read().await))
  }
}

#[derive(Clone)]
pub struct SupabaseStore {
  client: reqwest::Client,
  pub base_url: String,
  anon_key: String,
}

impl SupabaseStore {
  pub fn new(base_url: String, anon_key: String) -> Result<Self, StoreError> {
    let client = reqwest::Client::builder().timeout(Duration::from_secs(15)).build()?;
    Ok(Self { client, base_url: base_url.trim_end_matches('/').to_string(), anon_key })
  }

  /// Construct from SUPABASE_URL + SUPABASE_ANON_KEY; None when either is missing.
  pub fn from_env() -> Option<Self> {
    let url = std::env::var("SUPABASE_URL").ok()?;
    let key = std::env::var("SUPABASE_ANON_KEY").ok()?;
    Self::new(url, key).ok()
  }

  fn table_url(&self) -> String {
    format!("{}/rest/v1/{}", self.base_url, TABLE)
  }

  fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
    req
      .header(USER_AGENT, "vibebench-backend/0.1")
      .header("apikey", &self.anon_key)
      .header(AUTHORIZATION, format!("Bearer {}", self.anon_key))
  }
}

async fn check_status(res: reqwest::Response) -> Result<reqwest::Response, StoreError> {
  if res.status().is_success() {
    return Ok(res);
  }
  let status = res.status().as_u16();
  let body = res.text().await.unwrap_or_default();
  let message = extract_postgrest_error(&body).unwrap_or(body);
  Err(StoreError::Status { status, message })
}

#[async_trait]
impl ScoreStore for SupabaseStore {
  #[instrument(level = "info", skip_all, fields(id = %entry.id))]
  async fn insert(&self, entry: &LeaderboardEntry) -> Result<(), StoreError> {
    let res = self
      .authed(self.client.post(self.table_url()))
      .header(CONTENT_TYPE, "application/json")
      .header("Prefer", "return=minimal")
      .json(&RowOut::from(entry))
      .send()
      .await?;
    check_status(res).await?;
    Ok(())
  }

  #[instrument(level = "debug", skip_all)]
  async fn list(&self) -> Result<Vec<LeaderboardEntry>, StoreError> {
    let res = self
      .authed(self.client.get(self.table_url()))
      .query(&[("select", "*"), ("order", "total_score.desc")])
      .send()
      .await?;
    let rows: Vec<RowIn> = check_status(res).await?.json().await?;
    debug!(rows = rows.len(), "Leaderboard fetched");
    Ok(rows.into_iter().map(LeaderboardEntry::from).collect())
  }
}

// --- Table rows (snake_case columns) ---

#[derive(Serialize)]
struct RowOut<'a> {
  id: &'a str,
  problem_id: &'a str,
  user_name: &'a str,
  avatar_url: Option<&'a str>,
  profile_url: Option<&'a str>,
  prompt_length: u32,
  duration_ms: u64,
  total_score: u8,
  completeness_score: u8,
  efficiency_score: u8,
  precision_score: u8,
  engineering_judgment_score: u8,
  timestamp: i64,
}

impl<'a> From<&'a LeaderboardEntry> for RowOut<'a> {
  fn from(e: &'a LeaderboardEntry) -> Self {
    Self {
      id: &e.id,
      problem_id: &e.problem_id,
      user_name: &e.user_name,
      avatar_url: e.avatar_url.as_deref(),
      profile_url: e.profile_url.as_deref(),
      prompt_length: e.prompt_length,
      duration_ms: e.duration_ms,
      total_score: e.total_score,
      completeness_score: e.breakdown.completeness,
      efficiency_score: e.breakdown.efficiency,
      precision_score: e.breakdown.precision,
      engineering_judgment_score: e.breakdown.engineering_judgment,
      timestamp: e.timestamp,
    }
  }
}

/// Read side is lenient: numeric columns may come back as floats and
/// dimension columns may be null on rows written before they existed.
#[derive(Deserialize)]
struct RowIn {
  id: String,
  problem_id: String,
  user_name: String,
  #[serde(default)] avatar_url: Option<String>,
  #[serde(default)] profile_url: Option<String>,
  #[serde(default)] prompt_length: Option<f64>,
  #[serde(default)] duration_ms: Option<f64>,
  #[serde(default)] total_score: Option<f64>,
  #[serde(default)] completeness_score: Option<f64>,
  #[serde(default)] efficiency_score: Option<f64>,
  #[serde(default)] precision_score: Option<f64>,
  #[serde(default)] engineering_judgment_score: Option<f64>,
  #[serde(default)] timestamp: Option<f64>,
}

fn score(v: Option<f64>) -> u8 {
  v.filter(|x| x.is_finite()).map(|x| x.round().clamp(0.0, 100.0) as u8).unwrap_or(0)
}

fn non_negative(v: Option<f64>) -> f64 {
  v.filter(|x| x.is_finite() && *x > 0.0).unwrap_or(0.0)
}

impl From<RowIn> for LeaderboardEntry {
  fn from(r: RowIn) -> Self {
    LeaderboardEntry {
      id: r.id,
      problem_id: r.problem_id,
      user_name: r.user_name,
      avatar_url: r.avatar_url,
      profile_url: r.profile_url,
      prompt_length: non_negative(r.prompt_length) as u32,
      duration_ms: non_negative(r.duration_ms) as u64,
      total_score: score(r.total_score),
      breakdown: ScoreBreakdown {
        completeness: score(r.completeness_score),
        efficiency: score(r.efficiency_score),
        precision: score(r.precision_score),
        engineering_judgment: score(r.engineering_judgment_score),
      },
      timestamp: r.timestamp.filter(|x| x.is_finite()).unwrap_or(0.0) as i64,
    }
  }
}

fn extract_postgrest_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct PgErr {
    message: String,
  }
  serde_json::from_str::<PgErr>(body).ok().map(|e| e.message)
}

#[cfg(test)]
mod tests {
  use super::*;
  use httpmock::prelude::*;
  use serde_json::json;

  fn entry(id: &str, score: u8) -> LeaderboardEntry {
    LeaderboardEntry {
      id: id.into(),
      problem_id: "backend-easy".into(),
      user_name: "octo".into(),
      avatar_url: Some("https://avatars/octo".into()),
      profile_url: None,
      prompt_length: 42,
      duration_ms: 61_000,
      total_score: score,
      breakdown: ScoreBreakdown { completeness: 80, efficiency: 70, precision: 60, engineering_judgment: 50 },
      timestamp: 1_700_000_000_000,
    }
  }

  #[tokio::test]
  async fn memory_store_lists_best_first() {
    let store = MemoryStore::default();
    store.insert(&entry("a", 40)).await.unwrap();
    store.insert(&entry("b", 90)).await.unwrap();
    let ids: Vec<_> = store.list().await.unwrap().into_iter().map(|e| e.id).collect();
    assert_eq!(ids, vec!["b", "a"]);
  }

  #[tokio::test]
  async fn supabase_insert_maps_columns_and_auth_headers() {
    let server = MockServer::start_async().await;
    let mock = server
      .mock_async(|when, then| {
        when
          .method(POST)
          .path("/rest/v1/leaderboard")
          .header("apikey", "anon")
          .header("authorization", "Bearer anon")
          .json_body_partial(r#"{"problem_id":"backend-easy","user_name":"octo","engineering_judgment_score":50}"#);
        then.status(201);
      })
      .await;

    let store = SupabaseStore::new(server.base_url(), "anon".into()).unwrap();
    store.insert(&entry("a", 65)).await.unwrap();
    mock.assert_async().await;
  }

  #[tokio::test]
  async fn supabase_list_tolerates_missing_and_float_columns() {
    let server = MockServer::start_async().await;
    server
      .mock_async(|when, then| {
        when
          .method(GET)
          .path("/rest/v1/leaderboard")
          .query_param("select", "*")
          .query_param("order", "total_score.desc");
        then.status(200).json_body(json!([
          { "id": "1", "problem_id": "backend-easy", "user_name": "max", "prompt_length": 12,
            "duration_ms": 5000, "total_score": 88.0, "completeness_score": 90,
            "efficiency_score": null, "timestamp": 1700000000000i64 },
          { "id": "2", "problem_id": "frontend-easy", "user_name": "ann", "total_score": 40 }
        ]));
      })
      .await;

    let store = SupabaseStore::new(format!("{}/", server.base_url()), "anon".into()).unwrap();
    let rows = store.list().await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].total_score, 88);
    assert_eq!(rows[0].breakdown.completeness, 90);
    assert_eq!(rows[0].breakdown.efficiency, 0);
    assert_eq!(rows[1].duration_ms, 0);
    assert_eq!(rows[1].avatar_url, None);
  }

  #[tokio::test]
  async fn supabase_errors_carry_the_postgrest_message() {
    let server = MockServer::start_async().await;
    server
      .mock_async(|when, then| {
        when.method(POST).path("/rest/v1/leaderboard");
        then.status(401).json_body(json!({ "message": "Invalid API key" }));
      })
      .await;

    let store = SupabaseStore::new(server.base_url(), "bad".into()).unwrap();
    match store.insert(&entry("a", 1)).await.unwrap_err() {
      StoreError::Status { status, message } => {
        assert_eq!(status, 401);
        assert_eq!(message, "Invalid API key");
      }
      other => panic!("unexpected error: {other}"),
    }
  }
}
