//! Loading arena configuration (prompt templates + optional extra challenges) from TOML.
//!
//! See `ArenaConfig` and `Prompts` for the expected schema.

use serde::Deserialize;
use tracing::{error, info};

use crate::domain::{Challenge, Difficulty, Domain, Modality};

#[derive(Clone, Debug, Deserialize, Default)]
pub struct ArenaConfig {
  #[serde(default)]
  pub prompts: Prompts,
  #[serde(default)]
  pub challenges: Vec<ChallengeCfg>,
}

/// Challenge entry accepted in TOML configuration.
#[derive(Clone, Debug, Deserialize)]
pub struct ChallengeCfg {
  pub id: String,
  pub domain: Domain,
  pub title: String,
  pub difficulty: Difficulty,
  #[serde(default)] pub modality: Modality,
  #[serde(default)] pub description: String,
  #[serde(default)] pub tactical_constraint: String,
  #[serde(default)] pub example_input: String,
  #[serde(default)] pub example_output: String,
  #[serde(default)] pub image_url: Option<String>,
  #[serde(default)] pub judge_context: String,
  #[serde(default)] pub initiative_targets: Vec<String>,
}

impl ChallengeCfg {
  /// A playable challenge needs a brief for the player and a context for the judge.
  pub fn into_challenge(self) -> Result<Challenge, String> {
    if self.description.trim().is_empty() {
      return Err("missing description".into());
    }
    if self.judge_context.trim().is_empty() {
      return Err("missing judge_context".into());
    }
    if self.modality == Modality::Image && self.image_url.is_none() {
      return Err("image modality requires image_url".into());
    }
    Ok(Challenge {
      id: self.id,
      domain: self.domain,
      title: self.title,
      difficulty: self.difficulty,
      modality: self.modality,
      description: self.description,
      tactical_constraint: self.tactical_constraint,
      example_input: self.example_input,
      example_output: self.example_output,
      image_url: self.image_url,
      judge_context: self.judge_context,
      initiative_targets: self.initiative_targets,
    })
  }
}

/// Prompt templates used by the LLM client. Placeholders are `{name}`.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  /// Placeholders: {title}, {description}, {constraint}, {domain}
  pub solver_system_template: String,
  /// Placeholder: {judge_context}
  pub judge_system_template: String,
  /// Placeholder: {prompt}
  pub judge_text_prompt_template: String,
  pub judge_audio_marker: String,
  /// Placeholder: {code}
  pub judge_code_template: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      solver_system_template: r#"
You are a competitive coding expert participating in a "VibeBench One Shot" challenge.
Your task is to solve the following coding problem based *strictly* on the user's prompt.

Problem Title: {title}
Problem Description: {description}
Constraint: {constraint}
Domain: {domain}

Constraints:
- Output ONLY valid code (Markdown code blocks are allowed).
- Do not include conversational filler before or after the code unless asked.
- If the user prompt is "Solve it", solve it normally.
- Use JavaScript/TypeScript/Node.js/React as implied by the problem.
- If input is Audio, transcribe and execute the design instructions.
"#
      .trim()
      .into(),
      judge_system_template: r#"
You are the VibeBench Judge, an expert evaluator of AI-augmented development skill.
Evaluate the developer's PROMPT (not just the code it produces) against CEPE:
- C: Completeness (requirements covered?)
- E: Efficiency (minimal tokens/waste?)
- P: Precision (unambiguous?)
- E: Engineering Judgment (senior thinking, trade-offs?)
Each dimension is scored 0-100.

Process: read the challenge context and traps, analyze the prompt (text or audio), reason through CEPE, check traps and bonuses, output JSON.

## Challenge Context (CRITICAL)
{judge_context}

## Output Rules
Return ONLY a JSON object with keys:
  reasoning (string, step-by-step analysis),
  completeness, efficiency, precision, engineering_judgment (each {"score": number, "justification": string}),
  traps_triggered (array of strings), bonuses_awarded (array of strings),
  final_score (number, mean of the four scores), verdict (one-line summary).
"#
      .trim()
      .into(),
      judge_text_prompt_template: "USER PROMPT:\n\"{prompt}\"".into(),
      judge_audio_marker: "[USER PROVIDED AUDIO PROMPT]".into(),
      judge_code_template: "\n\nGENERATED CODE:\n{code}".into(),
    }
  }
}

impl ArenaConfig {
  pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
    toml::from_str::<ArenaConfig>(s)
  }
}

/// Attempt to load `ArenaConfig` from VIBEBENCH_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_arena_config_from_env() -> Option<ArenaConfig> {
  let path = std::env::var("VIBEBENCH_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match ArenaConfig::from_toml_str(&s) {
      Ok(cfg) => {
        info!(target: "vibebench", %path, challenges = cfg.challenges.len(), "Loaded arena config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "vibebench", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "vibebench", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}
