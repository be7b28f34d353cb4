//! Domain models: challenges, prompt payloads, CEPE evaluation results and leaderboard entries.

use serde::{Deserialize, Serialize};

/// Which vertical a challenge belongs to.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Domain {
  Frontend,
  Backend,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Difficulty {
  Easy,
  Medium,
  Hard,
}

/// Input medium required by a challenge.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
  #[default]
  Text,
  /// Typed prompt grounded on a reference image.
  Image,
  /// Spoken prompt, submitted as a captured audio clip.
  Voice,
}

/// A fixed, pre-authored problem. `judge_context` and `initiative_targets`
/// are hidden from players and only travel to the judge.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Challenge {
  pub id: String,
  pub domain: Domain,
  pub title: String,
  pub difficulty: Difficulty,
  pub modality: Modality,
  pub description: String,
  #[serde(default)] pub tactical_constraint: String,
  #[serde(default)] pub example_input: String,
  #[serde(default)] pub example_output: String,
  #[serde(default)] pub image_url: Option<String>,
  pub judge_context: String,
  #[serde(default)] pub initiative_targets: Vec<String>,
}

impl Challenge {
  pub fn is_voice(&self) -> bool {
    self.modality == Modality::Voice
  }
}

/// A captured audio prompt (client-side recording, uploaded as base64).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AudioClip {
  pub mime: String,
  pub bytes: Vec<u8>,
}

/// What the user actually submitted for an attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PromptPayload {
  Text(String),
  Audio(AudioClip),
}

impl PromptPayload {
  /// Character count of a text prompt; voice prompts count as zero.
  pub fn prompt_length(&self) -> usize {
    match self {
      PromptPayload::Text(t) => t.chars().count(),
      PromptPayload::Audio(_) => 0,
    }
  }

  /// Size hint for logs; never log the payload itself.
  pub fn log_len(&self) -> usize {
    match self {
      PromptPayload::Text(t) => t.len(),
      PromptPayload::Audio(clip) => clip.bytes.len(),
    }
  }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DimensionScore {
  pub score: u8,
  pub justification: String,
}

impl DimensionScore {
  /// Build from an untrusted number, rounding and clamping to 0..=100.
  pub fn clamped(raw: f64, justification: String) -> Self {
    let score = if raw.is_finite() { raw.round().clamp(0.0, 100.0) as u8 } else { 0 };
    Self { score, justification }
  }
}

/// Per-dimension scores as stored on the leaderboard.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ScoreBreakdown {
  pub completeness: u8,
  pub efficiency: u8,
  pub precision: u8,
  pub engineering_judgment: u8,
}

impl ScoreBreakdown {
  /// `round(mean(C, E, P, J))`.
  pub fn mean(&self) -> u8 {
    let sum = u32::from(self.completeness)
      + u32::from(self.efficiency)
      + u32::from(self.precision)
      + u32::from(self.engineering_judgment);
    (f64::from(sum) / 4.0).round() as u8
  }
}

/// Output of the judging call, after normalisation.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct EvaluationResult {
  pub reasoning: String,
  pub completeness: DimensionScore,
  pub efficiency: DimensionScore,
  pub precision: DimensionScore,
  pub engineering_judgment: DimensionScore,
  #[serde(default)] pub traps_triggered: Vec<String>,
  #[serde(default)] pub bonuses_awarded: Vec<String>,
  pub final_score: u8,
  pub verdict: String,
}

pub const SYSTEM_FAILURE_VERDICT: &str = "System Failure";

impl EvaluationResult {
  /// Terminal result served whenever judging fails or returns garbage.
  pub fn system_failure() -> Self {
    let dim = || DimensionScore { score: 0, justification: "Error".into() };
    Self {
      reasoning: "Judgement failed due to system error.".into(),
      completeness: dim(),
      efficiency: dim(),
      precision: dim(),
      engineering_judgment: dim(),
      traps_triggered: vec![],
      bonuses_awarded: vec![],
      final_score: 0,
      verdict: SYSTEM_FAILURE_VERDICT.into(),
    }
  }

  pub fn breakdown(&self) -> ScoreBreakdown {
    ScoreBreakdown {
      completeness: self.completeness.score,
      efficiency: self.efficiency.score,
      precision: self.precision.score,
      engineering_judgment: self.engineering_judgment.score,
    }
  }

  /// Recompute `final_score` from the four dimensions; the judge's own number is not trusted.
  pub fn normalized(mut self) -> Self {
    self.final_score = self.breakdown().mean();
    self
  }

  pub fn is_system_failure(&self) -> bool {
    self.verdict == SYSTEM_FAILURE_VERDICT
  }
}

/// A persisted, ranked record of a completed attempt.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
  pub id: String,
  pub problem_id: String,
  pub user_name: String,
  #[serde(default)] pub avatar_url: Option<String>,
  #[serde(default)] pub profile_url: Option<String>,
  pub prompt_length: u32,
  pub duration_ms: u64,
  pub total_score: u8,
  pub breakdown: ScoreBreakdown,
  /// Epoch milliseconds.
  pub timestamp: i64,
}

/// Public profile returned by the identity lookup.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedIdentity {
  pub login: String,
  pub avatar_url: String,
  pub profile_url: String,
}

#[cfg(test)]
mod tests {
  use super::*;

  fn dim(score: u8) -> DimensionScore {
    DimensionScore { score, justification: String::new() }
  }

  #[test]
  fn normalized_recomputes_final_score_from_mean() {
    let eval = EvaluationResult {
      reasoning: String::new(),
      completeness: dim(90),
      efficiency: dim(80),
      precision: dim(71),
      engineering_judgment: dim(60),
      traps_triggered: vec![],
      bonuses_awarded: vec![],
      final_score: 12,
      verdict: "ok".into(),
    }
    .normalized();
    // 301 / 4 = 75.25
    assert_eq!(eval.final_score, 75);
  }

  #[test]
  fn mean_rounds_half_up() {
    let b = ScoreBreakdown { completeness: 1, efficiency: 1, precision: 0, engineering_judgment: 0 };
    assert_eq!(b.mean(), 1);
  }

  #[test]
  fn clamped_scores_stay_in_range() {
    assert_eq!(DimensionScore::clamped(140.0, String::new()).score, 100);
    assert_eq!(DimensionScore::clamped(-3.0, String::new()).score, 0);
    assert_eq!(DimensionScore::clamped(f64::NAN, String::new()).score, 0);
    assert_eq!(DimensionScore::clamped(64.6, String::new()).score, 65);
  }

  #[test]
  fn system_failure_is_all_zero() {
    let f = EvaluationResult::system_failure();
    assert_eq!(f.breakdown(), ScoreBreakdown::default());
    assert_eq!(f.final_score, 0);
    assert!(f.is_system_failure());
  }

  #[test]
  fn voice_prompts_have_zero_length() {
    let audio = PromptPayload::Audio(AudioClip { mime: "audio/webm".into(), bytes: vec![1, 2, 3] });
    assert_eq!(audio.prompt_length(), 0);
    assert_eq!(PromptPayload::Text("héllo".into()).prompt_length(), 5);
  }
}
