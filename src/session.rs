//! Attempt state machine.
//!
//! `Locked → Active → GeneratingSolution → Judging → Completed`, plus `reset`
//! from anywhere back to `Locked`. Each phase carries exactly the data it
//! owns, so there is no field bag of independent flags to keep consistent.
//!
//! Every run is tagged with the attempt counter taken at submit time. `reset`
//! bumps the counter, so results from a run that was in flight when the user
//! retried are rejected as stale.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use uuid::Uuid;

use crate::domain::{AudioClip, Challenge, EvaluationResult, PromptPayload, VerifiedIdentity};

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PhaseKind {
  Locked,
  Active,
  GeneratingSolution,
  Judging,
  Completed,
}

impl std::fmt::Display for PhaseKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let s = match self {
      PhaseKind::Locked => "LOCKED",
      PhaseKind::Active => "ACTIVE",
      PhaseKind::GeneratingSolution => "GENERATING_SOLUTION",
      PhaseKind::Judging => "JUDGING",
      PhaseKind::Completed => "COMPLETED",
    };
    f.write_str(s)
  }
}

#[derive(Clone, Debug)]
pub enum Phase {
  Locked,
  Active { started_at: Instant, draft: Draft },
  GeneratingSolution { elapsed: Duration, payload: PromptPayload },
  Judging { elapsed: Duration, payload: PromptPayload, code: String },
  Completed { elapsed: Duration, payload: PromptPayload, code: String, evaluation: EvaluationResult },
}

/// Input being composed while `Active`.
#[derive(Clone, Debug, Default)]
pub struct Draft {
  pub text: String,
  pub audio: Option<AudioClip>,
  pub recording: bool,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SessionError {
  #[error("cannot {action} while {phase}")]
  InvalidTransition { action: &'static str, phase: PhaseKind },
  #[error("prompt is empty")]
  EmptyPrompt,
  #[error("no audio captured")]
  MissingAudio,
  #[error("finish the current recording before submitting")]
  StillRecording,
  #[error("a recording is already in progress")]
  AlreadyRecording,
  #[error("no recording in progress")]
  NotRecording,
  #[error("recording is only available for voice challenges")]
  NotVoiceChallenge,
  #[error("captured audio is empty")]
  EmptyAudio,
  #[error("result belongs to attempt {got}, session is on attempt {current}")]
  StaleAttempt { got: u64, current: u64 },
}

/// What `submit` hands to the pipeline.
#[derive(Clone, Debug)]
pub struct Submission {
  pub attempt: u64,
  pub payload: PromptPayload,
}

#[derive(Clone, Debug)]
pub struct Session {
  pub id: Uuid,
  pub challenge: Arc<Challenge>,
  phase: Phase,
  attempt: u64,
  pub identity: Option<VerifiedIdentity>,
  /// UI-only: the "submit to leaderboard" panel.
  pub submission_open: bool,
  /// Last mutation; idle sessions are swept after the TTL.
  pub last_active: Instant,
}

impl Session {
  pub fn new(challenge: Arc<Challenge>) -> Self {
    Self {
      id: Uuid::new_v4(),
      challenge,
      phase: Phase::Locked,
      attempt: 0,
      identity: None,
      submission_open: false,
      last_active: Instant::now(),
    }
  }

  pub fn kind(&self) -> PhaseKind {
    match self.phase {
      Phase::Locked => PhaseKind::Locked,
      Phase::Active { .. } => PhaseKind::Active,
      Phase::GeneratingSolution { .. } => PhaseKind::GeneratingSolution,
      Phase::Judging { .. } => PhaseKind::Judging,
      Phase::Completed { .. } => PhaseKind::Completed,
    }
  }

  pub fn attempt(&self) -> u64 {
    self.attempt
  }

  /// Brief stays obscured until the attempt starts.
  pub fn brief_revealed(&self) -> bool {
    !matches!(self.phase, Phase::Locked)
  }

  /// Running time while `Active`, frozen from submit on.
  pub fn elapsed(&self, now: Instant) -> Duration {
    match &self.phase {
      Phase::Locked => Duration::ZERO,
      Phase::Active { started_at, .. } => now.saturating_duration_since(*started_at),
      Phase::GeneratingSolution { elapsed, .. }
      | Phase::Judging { elapsed, .. }
      | Phase::Completed { elapsed, .. } => *elapsed,
    }
  }

  pub fn draft(&self) -> Option<&Draft> {
    match &self.phase {
      Phase::Active { draft, .. } => Some(draft),
      _ => None,
    }
  }

  pub fn payload(&self) -> Option<&PromptPayload> {
    match &self.phase {
      Phase::GeneratingSolution { payload, .. }
      | Phase::Judging { payload, .. }
      | Phase::Completed { payload, .. } => Some(payload),
      _ => None,
    }
  }

  pub fn generated_code(&self) -> Option<&str> {
    match &self.phase {
      Phase::Judging { code, .. } | Phase::Completed { code, .. } => Some(code),
      _ => None,
    }
  }

  pub fn evaluation(&self) -> Option<&EvaluationResult> {
    match &self.phase {
      Phase::Completed { evaluation, .. } => Some(evaluation),
      _ => None,
    }
  }

  fn invalid(&self, action: &'static str) -> SessionError {
    SessionError::InvalidTransition { action, phase: self.kind() }
  }

  fn draft_mut(&mut self, action: &'static str) -> Result<&mut Draft, SessionError> {
    let kind = self.kind();
    match &mut self.phase {
      Phase::Active { draft, .. } => Ok(draft),
      _ => Err(SessionError::InvalidTransition { action, phase: kind }),
    }
  }

  pub fn start(&mut self, now: Instant) -> Result<(), SessionError> {
    if !matches!(self.phase, Phase::Locked) {
      return Err(self.invalid("start"));
    }
    self.phase = Phase::Active { started_at: now, draft: Draft::default() };
    Ok(())
  }

  pub fn update_draft(&mut self, text: String) -> Result<(), SessionError> {
    self.draft_mut("edit the prompt")?.text = text;
    Ok(())
  }

  /// Only one capture at a time; a new capture replaces the old clip when finished.
  pub fn begin_recording(&mut self) -> Result<(), SessionError> {
    if !self.challenge.is_voice() {
      return Err(SessionError::NotVoiceChallenge);
    }
    let draft = self.draft_mut("record")?;
    if draft.recording {
      return Err(SessionError::AlreadyRecording);
    }
    draft.recording = true;
    Ok(())
  }

  pub fn finish_recording(&mut self, clip: AudioClip) -> Result<(), SessionError> {
    let draft = self.draft_mut("finish recording")?;
    if !draft.recording {
      return Err(SessionError::NotRecording);
    }
    draft.recording = false;
    if clip.bytes.is_empty() {
      return Err(SessionError::EmptyAudio);
    }
    draft.audio = Some(clip);
    Ok(())
  }

  /// `Active → GeneratingSolution`. Rejected (no transition) when the
  /// modality-appropriate input is missing.
  pub fn submit(&mut self, now: Instant) -> Result<Submission, SessionError> {
    let voice = self.challenge.is_voice();
    let (started_at, draft) = match &self.phase {
      Phase::Active { started_at, draft } => (*started_at, draft),
      _ => return Err(self.invalid("submit")),
    };

    let payload = if voice {
      if draft.recording {
        return Err(SessionError::StillRecording);
      }
      match &draft.audio {
        Some(clip) => PromptPayload::Audio(clip.clone()),
        None => return Err(SessionError::MissingAudio),
      }
    } else {
      if draft.text.trim().is_empty() {
        return Err(SessionError::EmptyPrompt);
      }
      PromptPayload::Text(draft.text.clone())
    };

    let elapsed = now.saturating_duration_since(started_at);
    self.phase = Phase::GeneratingSolution { elapsed, payload: payload.clone() };
    Ok(Submission { attempt: self.attempt, payload })
  }

  fn check_attempt(&self, attempt: u64) -> Result<(), SessionError> {
    if attempt != self.attempt {
      return Err(SessionError::StaleAttempt { got: attempt, current: self.attempt });
    }
    Ok(())
  }

  /// `GeneratingSolution → Judging`.
  pub fn solution_ready(&mut self, attempt: u64, code: String) -> Result<(), SessionError> {
    self.check_attempt(attempt)?;
    match std::mem::replace(&mut self.phase, Phase::Locked) {
      Phase::GeneratingSolution { elapsed, payload } => {
        self.phase = Phase::Judging { elapsed, payload, code };
        Ok(())
      }
      other => {
        self.phase = other;
        Err(self.invalid("accept a solution"))
      }
    }
  }

  /// `Judging → Completed`; opens the submission panel.
  pub fn verdict_ready(&mut self, attempt: u64, evaluation: EvaluationResult) -> Result<(), SessionError> {
    self.check_attempt(attempt)?;
    match std::mem::replace(&mut self.phase, Phase::Locked) {
      Phase::Judging { elapsed, payload, code } => {
        self.phase = Phase::Completed { elapsed, payload, code, evaluation };
        self.submission_open = true;
        Ok(())
      }
      other => {
        self.phase = other;
        Err(self.invalid("accept a verdict"))
      }
    }
  }

  /// Back to `Locked` from any phase; clears everything the attempt produced.
  pub fn reset(&mut self) {
    self.phase = Phase::Locked;
    self.attempt += 1;
    self.submission_open = false;
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::{Difficulty, Domain, Modality};

  fn challenge(modality: Modality) -> Arc<Challenge> {
    Arc::new(Challenge {
      id: "c1".into(),
      domain: Domain::Backend,
      title: "T".into(),
      difficulty: Difficulty::Easy,
      modality,
      description: "d".into(),
      tactical_constraint: String::new(),
      example_input: String::new(),
      example_output: String::new(),
      image_url: None,
      judge_context: "ctx".into(),
      initiative_targets: vec![],
    })
  }

  fn clip() -> AudioClip {
    AudioClip { mime: "audio/webm".into(), bytes: vec![7; 16] }
  }

  #[test]
  fn full_cycle_returns_to_locked() {
    let mut s = Session::new(challenge(Modality::Text));
    let t0 = Instant::now();
    assert_eq!(s.kind(), PhaseKind::Locked);
    assert!(!s.brief_revealed());

    s.start(t0).unwrap();
    assert_eq!(s.kind(), PhaseKind::Active);
    s.update_draft("Use INCR".into()).unwrap();

    let sub = s.submit(t0 + Duration::from_secs(42)).unwrap();
    assert_eq!(s.kind(), PhaseKind::GeneratingSolution);
    assert_eq!(sub.payload, PromptPayload::Text("Use INCR".into()));
    assert_eq!(s.elapsed(t0 + Duration::from_secs(500)), Duration::from_secs(42));

    s.solution_ready(sub.attempt, "code".into()).unwrap();
    assert_eq!(s.kind(), PhaseKind::Judging);
    assert_eq!(s.generated_code(), Some("code"));

    s.verdict_ready(sub.attempt, EvaluationResult::system_failure()).unwrap();
    assert_eq!(s.kind(), PhaseKind::Completed);
    assert!(s.submission_open);
    assert!(s.evaluation().is_some());

    s.reset();
    assert_eq!(s.kind(), PhaseKind::Locked);
    assert!(s.evaluation().is_none());
    assert!(s.payload().is_none());
    assert!(!s.submission_open);
    assert_eq!(s.elapsed(Instant::now()), Duration::ZERO);
  }

  #[test]
  fn empty_text_prompt_does_not_transition() {
    let mut s = Session::new(challenge(Modality::Text));
    s.start(Instant::now()).unwrap();
    s.update_draft("   \n".into()).unwrap();
    assert_eq!(s.submit(Instant::now()).unwrap_err(), SessionError::EmptyPrompt);
    assert_eq!(s.kind(), PhaseKind::Active);
  }

  #[test]
  fn voice_without_audio_stays_active() {
    let mut s = Session::new(challenge(Modality::Voice));
    s.start(Instant::now()).unwrap();
    s.update_draft("typed text does not count".into()).unwrap();
    assert_eq!(s.submit(Instant::now()).unwrap_err(), SessionError::MissingAudio);
    assert_eq!(s.kind(), PhaseKind::Active);
  }

  #[test]
  fn one_capture_at_a_time() {
    let mut s = Session::new(challenge(Modality::Voice));
    s.start(Instant::now()).unwrap();
    s.begin_recording().unwrap();
    assert_eq!(s.begin_recording().unwrap_err(), SessionError::AlreadyRecording);
    assert_eq!(s.submit(Instant::now()).unwrap_err(), SessionError::StillRecording);

    s.finish_recording(clip()).unwrap();
    assert_eq!(s.finish_recording(clip()).unwrap_err(), SessionError::NotRecording);

    let sub = s.submit(Instant::now()).unwrap();
    assert!(matches!(sub.payload, PromptPayload::Audio(_)));
  }

  #[test]
  fn empty_clip_is_rejected_and_capture_ends() {
    let mut s = Session::new(challenge(Modality::Voice));
    s.start(Instant::now()).unwrap();
    s.begin_recording().unwrap();
    let empty = AudioClip { mime: "audio/webm".into(), bytes: vec![] };
    assert_eq!(s.finish_recording(empty).unwrap_err(), SessionError::EmptyAudio);
    assert!(!s.draft().unwrap().recording);
    assert!(s.draft().unwrap().audio.is_none());
  }

  #[test]
  fn recording_requires_voice_challenge() {
    let mut s = Session::new(challenge(Modality::Image));
    s.start(Instant::now()).unwrap();
    assert_eq!(s.begin_recording().unwrap_err(), SessionError::NotVoiceChallenge);
  }

  #[test]
  fn out_of_order_transitions_are_rejected() {
    let mut s = Session::new(challenge(Modality::Text));
    assert!(s.submit(Instant::now()).is_err());
    assert!(s.update_draft("x".into()).is_err());
    assert!(s.solution_ready(0, "c".into()).is_err());
    assert_eq!(s.kind(), PhaseKind::Locked);

    s.start(Instant::now()).unwrap();
    assert!(s.start(Instant::now()).is_err());
    assert!(s.verdict_ready(0, EvaluationResult::system_failure()).is_err());
    assert_eq!(s.kind(), PhaseKind::Active);
  }

  #[test]
  fn stale_results_after_reset_are_dropped() {
    let mut s = Session::new(challenge(Modality::Text));
    s.start(Instant::now()).unwrap();
    s.update_draft("first".into()).unwrap();
    let first = s.submit(Instant::now()).unwrap();

    s.reset();
    s.start(Instant::now()).unwrap();
    s.update_draft("second".into()).unwrap();
    let second = s.submit(Instant::now()).unwrap();

    assert!(matches!(
      s.solution_ready(first.attempt, "old".into()),
      Err(SessionError::StaleAttempt { .. })
    ));
    assert_eq!(s.kind(), PhaseKind::GeneratingSolution);
    s.solution_ready(second.attempt, "new".into()).unwrap();
    assert_eq!(s.generated_code(), Some("new"));
  }
}
