//! Minimal Gemini client for our use-cases.
//!
//! We only call `models/{model}:generateContent` and ask for either plain
//! text (solution generation) or a strict JSON object (judging). Parts are
//! text or inline base64 data (audio prompts, reference images).
//! Calls are instrumented and log model names, latencies, and response sizes (not contents).
//!
//! NOTE: We never log the API key, the prompt, or the audio payload.

use std::time::{Duration, Instant};

use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use async_trait::async_trait;

use crate::config::Prompts;
use crate::domain::{Challenge, DimensionScore, EvaluationResult, PromptPayload};
use crate::error::LlmError;
use crate::pipeline::{CodeGenerator, Judge};
use crate::util::{fill_template, trunc_for_log};

const CLIENT_UA: &str = "vibebench-backend/0.1";

#[derive(Clone)]
pub struct Gemini {
  pub client: reqwest::Client,
  pub api_key: String,
  pub base_url: String,
  pub solver_model: String,
  pub judge_model: String,
  pub prompts: Prompts,
  /// Base for relative `image_url`s (PUBLIC_ORIGIN).
  pub asset_origin: Option<String>,
}

impl Gemini {
  /// Construct the client if we find GEMINI_API_KEY (or API_KEY); otherwise return None.
  pub fn from_env(prompts: Prompts) -> Option<Self> {
    let api_key = std::env::var("GEMINI_API_KEY").or_else(|_| std::env::var("API_KEY")).ok()?;
    let base_url = std::env::var("GEMINI_BASE_URL")
      .unwrap_or_else(|_| "https://generativelanguage.googleapis.com/v1beta".into());
    let solver_model = std::env::var("GEMINI_SOLVER_MODEL").unwrap_or_else(|_| "gemini-3-pro-preview".into());
    let judge_model = std::env::var("GEMINI_JUDGE_MODEL").unwrap_or_else(|_| "gemini-2.5-flash".into());
    let timeout = std::env::var("GEMINI_TIMEOUT_SECS")
      .ok()
      .and_then(|s| s.parse::<u64>().ok())
      .unwrap_or(90);

    let client = reqwest::Client::builder().timeout(Duration::from_secs(timeout)).build().ok()?;
    let asset_origin = std::env::var("PUBLIC_ORIGIN").ok();
    Some(Self { client, api_key, base_url, solver_model, judge_model, prompts, asset_origin })
  }

  /// One generateContent round-trip; returns the concatenated text of the first candidate.
  #[instrument(level = "info", skip(self, system, parts, config), fields(parts = parts.len()))]
  async fn generate_content(
    &self,
    model: &str,
    system: &str,
    parts: Vec<Part>,
    config: GenerationConfig,
  ) -> Result<String, LlmError> {
    let url = format!("{}/models/{}:generateContent", self.base_url.trim_end_matches('/'), model);
    let req = GenerateContentRequest {
      system_instruction: Content { role: None, parts: vec![Part::text(system)] },
      contents: vec![Content { role: Some("user".into()), parts }],
      generation_config: config,
    };

    let start = Instant::now();
    let res = self
      .client
      .post(&url)
      .header(USER_AGENT, CLIENT_UA)
      .header(CONTENT_TYPE, "application/json")
      .header("x-goog-api-key", &self.api_key)
      .json(&req)
      .send()
      .await?;

    if !res.status().is_success() {
      let status = res.status().as_u16();
      let body = res.text().await.unwrap_or_default();
      let message = extract_gemini_error(&body).unwrap_or(body);
      return Err(LlmError::Status { status, message });
    }

    let body: GenerateContentResponse = res.json().await?;
    if let Some(usage) = &body.usage_metadata {
      info!(
        elapsed = ?start.elapsed(),
        prompt_tokens = ?usage.prompt_token_count,
        completion_tokens = ?usage.candidates_token_count,
        total_tokens = ?usage.total_token_count,
        "Gemini usage"
      );
    }

    let text: String = body
      .candidates
      .first()
      .and_then(|c| c.content.as_ref())
      .map(|c| c.parts.iter().filter_map(|p| p.text.as_deref()).collect())
      .unwrap_or_default();
    Ok(text)
  }

  /// Reference image as an inline part. Anything that is not a fetchable
  /// `image/*` is skipped; generation proceeds without it.
  #[instrument(level = "debug", skip(self))]
  async fn fetch_image_part(&self, url: &str) -> Option<Part> {
    let Some(url) = resolve_asset_url(url, self.asset_origin.as_deref()) else {
      warn!(%url, "Skipping visual asset: relative URL without PUBLIC_ORIGIN");
      return None;
    };
    let res = match self.client.get(url.clone()).header(USER_AGENT, CLIENT_UA).send().await {
      Ok(r) => r,
      Err(e) => {
        warn!(%url, error = %e, "Skipping visual asset: fetch failed");
        return None;
      }
    };
    if !res.status().is_success() {
      warn!(%url, status = %res.status(), "Skipping visual asset: bad status");
      return None;
    }
    let mime = res
      .headers()
      .get(CONTENT_TYPE)
      .and_then(|v| v.to_str().ok())
      .map(|s| s.split(';').next().unwrap_or(s).trim().to_string())
      .unwrap_or_default();
    if !mime.starts_with("image/") {
      warn!(%url, %mime, "Skipping visual asset: not an image");
      return None;
    }
    match res.bytes().await {
      Ok(bytes) => Some(Part::inline(&mime, &bytes)),
      Err(e) => {
        warn!(%url, error = %e, "Skipping visual asset: body read failed");
        None
      }
    }
  }

  fn solver_system(&self, challenge: &Challenge) -> String {
    let domain = format!("{:?}", challenge.domain);
    fill_template(
      &self.prompts.solver_system_template,
      &[
        ("title", challenge.title.as_str()),
        ("description", challenge.description.as_str()),
        ("constraint", challenge.tactical_constraint.as_str()),
        ("domain", domain.as_str()),
      ],
    )
  }

  fn judge_parts(&self, payload: &PromptPayload, code: &str) -> Vec<Part> {
    let mut parts = match payload {
      PromptPayload::Text(prompt) => {
        vec![Part::text(&fill_template(&self.prompts.judge_text_prompt_template, &[("prompt", prompt.as_str())]))]
      }
      PromptPayload::Audio(clip) => vec![Part::inline(&clip.mime, &clip.bytes), Part::text(&self.prompts.judge_audio_marker)],
    };
    parts.push(Part::text(&fill_template(&self.prompts.judge_code_template, &[("code", code)])));
    parts
  }
}

#[async_trait]
impl CodeGenerator for Gemini {
  #[instrument(level = "info", skip_all, fields(challenge = %challenge.id, model = %self.solver_model))]
  async fn generate(&self, payload: &PromptPayload, challenge: &Challenge) -> Result<String, LlmError> {
    let mut parts = Vec::with_capacity(2);
    if let Some(url) = &challenge.image_url {
      if let Some(image) = self.fetch_image_part(url).await {
        parts.push(image);
      }
    }
    parts.push(match payload {
      PromptPayload::Text(t) => Part::text(t),
      PromptPayload::Audio(clip) => Part::inline(&clip.mime, &clip.bytes),
    });

    let config = GenerationConfig { temperature: Some(0.8), response_mime_type: None };
    self.generate_content(&self.solver_model, &self.solver_system(challenge), parts, config).await
  }
}

#[async_trait]
impl Judge for Gemini {
  #[instrument(level = "info", skip_all, fields(challenge = %challenge.id, model = %self.judge_model))]
  async fn judge(&self, payload: &PromptPayload, code: &str, challenge: &Challenge) -> Result<EvaluationResult, LlmError> {
    let context = judge_context(challenge);
    let system = fill_template(&self.prompts.judge_system_template, &[("judge_context", context.as_str())]);
    let config = GenerationConfig { temperature: None, response_mime_type: Some("application/json".into()) };
    let text = self.generate_content(&self.judge_model, &system, self.judge_parts(payload, code), config).await?;
    if text.trim().is_empty() {
      return Err(LlmError::EmptyResponse);
    }
    parse_judge_reply(&text).map_err(|e| {
      warn!(reply = %trunc_for_log(&text, 160), "Judge reply rejected");
      e
    })
  }
}

/// Absolute URLs pass through; relative ones are joined onto `origin`.
fn resolve_asset_url(url: &str, origin: Option<&str>) -> Option<reqwest::Url> {
  if let Ok(absolute) = reqwest::Url::parse(url) {
    return Some(absolute);
  }
  let base = reqwest::Url::parse(origin?).ok()?;
  base.join(url).ok()
}

/// Hidden rubric for the judge: the challenge's judge context plus any initiative targets.
fn judge_context(challenge: &Challenge) -> String {
  if challenge.initiative_targets.is_empty() {
    return challenge.judge_context.clone();
  }
  let targets: Vec<String> = challenge.initiative_targets.iter().map(|t| format!("- {t}")).collect();
  format!(
    "{}\n\nINITIATIVE TARGETS (award bonuses when addressed without being asked):\n{}",
    challenge.judge_context,
    targets.join("\n")
  )
}

/// Parse the judge's JSON object into a normalised `EvaluationResult`.
/// Tolerates a Markdown code fence around the object.
pub fn parse_judge_reply(text: &str) -> Result<EvaluationResult, LlmError> {
  #[derive(Deserialize)]
  struct Dim {
    score: f64,
    #[serde(default)]
    justification: String,
  }
  #[derive(Deserialize)]
  struct Reply {
    #[serde(default)]
    reasoning: String,
    completeness: Dim,
    efficiency: Dim,
    precision: Dim,
    engineering_judgment: Dim,
    #[serde(default)]
    traps_triggered: Vec<String>,
    #[serde(default)]
    bonuses_awarded: Vec<String>,
    verdict: String,
  }

  let body = strip_code_fence(text);
  let r: Reply = serde_json::from_str(body).map_err(|e| LlmError::Parse(e.to_string()))?;
  let dim = |d: Dim| DimensionScore::clamped(d.score, d.justification);
  Ok(
    EvaluationResult {
      reasoning: r.reasoning,
      completeness: dim(r.completeness),
      efficiency: dim(r.efficiency),
      precision: dim(r.precision),
      engineering_judgment: dim(r.engineering_judgment),
      traps_triggered: r.traps_triggered,
      bonuses_awarded: r.bonuses_awarded,
      final_score: 0,
      verdict: r.verdict,
    }
    .normalized(),
  )
}

fn strip_code_fence(text: &str) -> &str {
  let t = text.trim();
  let Some(rest) = t.strip_prefix("```") else { return t };
  let rest = rest.strip_prefix("json").unwrap_or(rest);
  rest.strip_suffix("```").unwrap_or(rest).trim()
}

// --- generateContent DTOs ---

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
  system_instruction: Content,
  contents: Vec<Content>,
  generation_config: GenerationConfig,
}

#[derive(Serialize, Deserialize)]
struct Content {
  #[serde(skip_serializing_if = "Option::is_none", default)]
  role: Option<String>,
  #[serde(default)]
  parts: Vec<Part>,
}

#[derive(Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct Part {
  #[serde(skip_serializing_if = "Option::is_none", default)]
  text: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none", default)]
  inline_data: Option<InlineData>,
}

impl Part {
  fn text(s: &str) -> Self {
    Self { text: Some(s.to_string()), inline_data: None }
  }
  fn inline(mime: &str, bytes: &[u8]) -> Self {
    Self { text: None, inline_data: Some(InlineData { mime_type: mime.to_string(), data: B64.encode(bytes) }) }
  }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
  mime_type: String,
  data: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
  #[serde(skip_serializing_if = "Option::is_none")]
  temperature: Option<f32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  response_mime_type: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
  #[serde(default)]
  candidates: Vec<Candidate>,
  #[serde(default)]
  usage_metadata: Option<UsageMetadata>,
}

#[derive(Deserialize)]
struct Candidate {
  #[serde(default)]
  content: Option<Content>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
  #[serde(default)]
  prompt_token_count: Option<u32>,
  #[serde(default)]
  candidates_token_count: Option<u32>,
  #[serde(default)]
  total_token_count: Option<u32>,
}

/// Try to extract a clean error message from a Gemini error body.
fn extract_gemini_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap {
    error: EObj,
  }
  #[derive(Deserialize)]
  struct EObj {
    message: String,
  }
  serde_json::from_str::<EWrap>(body).ok().map(|w| w.error.message)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::AudioClip;
  use crate::seeds::seed_challenges;
  use httpmock::prelude::*;
  use serde_json::json;

  fn client(base_url: String) -> Gemini {
    Gemini {
      client: reqwest::Client::new(),
      api_key: "test-key".into(),
      base_url,
      solver_model: "solver".into(),
      judge_model: "judge".into(),
      prompts: Prompts::default(),
      asset_origin: None,
    }
  }

  fn challenge(id: &str) -> Challenge {
    seed_challenges().into_iter().find(|c| c.id == id).unwrap()
  }

  fn candidate(text: &str) -> serde_json::Value {
    json!({
      "candidates": [{ "content": { "role": "model", "parts": [{ "text": text }] } }],
      "usageMetadata": { "promptTokenCount": 10, "candidatesTokenCount": 5, "totalTokenCount": 15 }
    })
  }

  #[test]
  fn initiative_targets_extend_the_judge_context() {
    let mut ch = challenge("backend-easy");
    ch.initiative_targets = vec!["pagination".into(), "audit log".into()];
    let ctx = judge_context(&ch);
    assert!(ctx.starts_with(&ch.judge_context));
    assert!(ctx.ends_with("- pagination\n- audit log"));

    ch.initiative_targets.clear();
    assert_eq!(judge_context(&ch), ch.judge_context);
  }

  #[tokio::test]
  async fn generate_sends_system_instruction_and_prompt() {
    let server = MockServer::start_async().await;
    let mock = server
      .mock_async(|when, then| {
        when
          .method(POST)
          .path("/models/solver:generateContent")
          .header("x-goog-api-key", "test-key")
          .body_contains("SQL Minefield")
          .body_contains("parameterize everything");
        then.status(200).json_body(candidate("app.get('/search', ...)"));
      })
      .await;

    let g = client(server.base_url());
    let code = g
      .generate(&PromptPayload::Text("parameterize everything".into()), &challenge("backend-easy"))
      .await
      .unwrap();
    assert_eq!(code, "app.get('/search', ...)");
    mock.assert_async().await;
  }

  #[tokio::test]
  async fn generate_inlines_reference_image() {
    let server = MockServer::start_async().await;
    let image = server
      .mock_async(|when, then| {
        when.method(GET).path("/intel.png");
        then.status(200).header("content-type", "image/png").body([137u8, 80, 78, 71]);
      })
      .await;
    let gen = server
      .mock_async(|when, then| {
        when.method(POST).path("/models/solver:generateContent").body_contains("\"mimeType\":\"image/png\"");
        then.status(200).json_body(candidate("<SystemAlert />"));
      })
      .await;

    let mut c = challenge("frontend-hard");
    c.image_url = Some(server.url("/intel.png"));
    let code = client(server.base_url()).generate(&PromptPayload::Text("animate it".into()), &c).await.unwrap();
    assert_eq!(code, "<SystemAlert />");
    image.assert_async().await;
    gen.assert_async().await;
  }

  #[test]
  fn relative_asset_urls_resolve_against_the_public_origin() {
    let abs = resolve_asset_url("https://cdn.example/a.png", Some("http://localhost:3000")).unwrap();
    assert_eq!(abs.as_str(), "https://cdn.example/a.png");
    let rel = resolve_asset_url("/assets/timebomb.png", Some("https://vibebench.example/app/")).unwrap();
    assert_eq!(rel.as_str(), "https://vibebench.example/assets/timebomb.png");
    assert!(resolve_asset_url("assets/timebomb.png", None).is_none());
  }

  #[tokio::test]
  async fn relative_reference_image_is_fetched_from_the_origin() {
    let server = MockServer::start_async().await;
    let image = server
      .mock_async(|when, then| {
        when.method(GET).path("/assets/intel.png");
        then.status(200).header("content-type", "image/png").body([137u8, 80, 78, 71]);
      })
      .await;
    let gen = server
      .mock_async(|when, then| {
        when.method(POST).path("/models/solver:generateContent").body_contains("\"mimeType\":\"image/png\"");
        then.status(200).json_body(candidate("<SystemAlert />"));
      })
      .await;

    let mut c = challenge("frontend-hard");
    c.image_url = Some("/assets/intel.png".into());
    let mut g = client(server.base_url());
    g.asset_origin = Some(server.base_url());
    assert_eq!(g.generate(&PromptPayload::Text("animate it".into()), &c).await.unwrap(), "<SystemAlert />");
    image.assert_async().await;
    gen.assert_async().await;
  }

  #[tokio::test]
  async fn non_image_asset_is_skipped() {
    let server = MockServer::start_async().await;
    server
      .mock_async(|when, then| {
        when.method(GET).path("/intel.png");
        then.status(200).header("content-type", "text/html").body("<html/>");
      })
      .await;
    let gen = server
      .mock_async(|when, then| {
        when.method(POST).path("/models/solver:generateContent");
        then.status(200).json_body(candidate("code"));
      })
      .await;

    let mut c = challenge("frontend-hard");
    c.image_url = Some(server.url("/intel.png"));
    let g = client(server.base_url());
    assert_eq!(g.generate(&PromptPayload::Text("x".into()), &c).await.unwrap(), "code");
    gen.assert_async().await;
  }

  #[tokio::test]
  async fn judge_sends_audio_inline_and_parses_verdict() {
    let server = MockServer::start_async().await;
    let verdict = json!({
      "reasoning": "covered the basics",
      "completeness": { "score": 80, "justification": "most items" },
      "efficiency": { "score": 70.4, "justification": "some filler" },
      "precision": { "score": 90, "justification": "clear" },
      "engineering_judgment": { "score": 120, "justification": "redis" },
      "traps_triggered": ["THE FIXED WINDOW TRAP"],
      "final_score": 12,
      "verdict": "Good talk"
    })
    .to_string();
    let mock = server
      .mock_async(|when, then| {
        when
          .method(POST)
          .path("/models/judge:generateContent")
          .body_contains("audio/webm")
          .body_contains("[USER PROVIDED AUDIO PROMPT]")
          .body_contains("GENERATED CODE")
          .body_contains("application/json");
        then.status(200).json_body(candidate(&verdict));
      })
      .await;

    let payload = PromptPayload::Audio(AudioClip { mime: "audio/webm".into(), bytes: vec![1, 2, 3] });
    let result = client(server.base_url()).judge(&payload, "limiter()", &challenge("backend-medium")).await.unwrap();
    mock.assert_async().await;

    assert_eq!(result.engineering_judgment.score, 100);
    assert_eq!(result.efficiency.score, 70);
    // (80 + 70 + 90 + 100) / 4
    assert_eq!(result.final_score, 85);
    assert_eq!(result.traps_triggered, vec!["THE FIXED WINDOW TRAP".to_string()]);
    assert!(result.bonuses_awarded.is_empty());
  }

  #[tokio::test]
  async fn http_errors_surface_the_gemini_message() {
    let server = MockServer::start_async().await;
    server
      .mock_async(|when, then| {
        when.method(POST).path("/models/judge:generateContent");
        then.status(429).json_body(json!({ "error": { "code": 429, "message": "Resource exhausted", "status": "RESOURCE_EXHAUSTED" } }));
      })
      .await;

    let err = client(server.base_url())
      .judge(&PromptPayload::Text("x".into()), "code", &challenge("backend-easy"))
      .await
      .unwrap_err();
    match err {
      LlmError::Status { status, message } => {
        assert_eq!(status, 429);
        assert_eq!(message, "Resource exhausted");
      }
      other => panic!("unexpected error: {other}"),
    }
  }

  #[test]
  fn unparsable_verdicts_are_errors() {
    assert!(matches!(parse_judge_reply("I think it was fine"), Err(LlmError::Parse(_))));
    assert!(matches!(parse_judge_reply(r#"{"verdict": "x"}"#), Err(LlmError::Parse(_))));
  }

  #[test]
  fn fenced_json_is_accepted() {
    let fenced = "```json\n{\"completeness\":{\"score\":50},\"efficiency\":{\"score\":50},\"precision\":{\"score\":50},\"engineering_judgment\":{\"score\":50},\"verdict\":\"meh\"}\n```";
    let r = parse_judge_reply(fenced).unwrap();
    assert_eq!(r.final_score, 50);
    assert_eq!(r.verdict, "meh");
  }
}
