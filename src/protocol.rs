//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Judge context and initiative targets never leave the server.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{Challenge, Difficulty, Domain, EvaluationResult, LeaderboardEntry, Modality, VerifiedIdentity};
use crate::scoring::{score_equation, Tier};
use crate::session::{PhaseKind, Session};
use crate::util::format_duration_ms;

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    ListChallenges,
    OpenSession {
        #[serde(rename = "challengeId")]
        challenge_id: String,
    },
    GetSession {
        #[serde(rename = "sessionId")]
        session_id: Uuid,
    },
    Start {
        #[serde(rename = "sessionId")]
        session_id: Uuid,
    },
    Draft {
        #[serde(rename = "sessionId")]
        session_id: Uuid,
        text: String,
    },
    RecordingStart {
        #[serde(rename = "sessionId")]
        session_id: Uuid,
    },
    RecordingStop {
        #[serde(rename = "sessionId")]
        session_id: Uuid,
        #[serde(rename = "audioBase64")]
        audio_base64: String,
        mime: String,
    },
    /// Replies with the session, then streams a `phase` message per transition.
    Run {
        #[serde(rename = "sessionId")]
        session_id: Uuid,
    },
    Reset {
        #[serde(rename = "sessionId")]
        session_id: Uuid,
    },
    Standing {
        #[serde(rename = "sessionId")]
        session_id: Uuid,
    },
    VerifyIdentity {
        #[serde(rename = "sessionId")]
        session_id: Uuid,
        handle: String,
    },
    SubmitScore {
        #[serde(rename = "sessionId")]
        session_id: Uuid,
        #[serde(rename = "userName")]
        user_name: String,
    },
    Leaderboard {
        #[serde(default, rename = "challengeId")]
        challenge_id: Option<String>,
        #[serde(default)]
        user: Option<String>,
        #[serde(default)]
        limit: Option<usize>,
    },
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    Challenges {
        challenges: Vec<ChallengeCard>,
    },
    Session {
        session: SessionOut,
    },
    /// Pushed while a run is in flight.
    Phase {
        session: SessionOut,
    },
    Standing {
        standing: StandingOut,
    },
    Identity {
        identity: VerifiedIdentity,
    },
    ScoreSaved {
        result: ScoreOut,
    },
    Leaderboard {
        leaderboard: LeaderboardOut,
    },
    Error {
        message: String,
    },
}

/// Always-visible challenge card (the locked view).
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeCard {
    pub id: String,
    pub title: String,
    pub domain: Domain,
    pub difficulty: Difficulty,
    pub modality: Modality,
}

/// Full brief, revealed once the attempt starts.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeBrief {
    pub description: String,
    pub tactical_constraint: String,
    pub example_input: String,
    pub example_output: String,
    pub image_url: Option<String>,
}

pub fn to_card(c: &Challenge) -> ChallengeCard {
    ChallengeCard {
        id: c.id.clone(),
        title: c.title.clone(),
        domain: c.domain,
        difficulty: c.difficulty,
        modality: c.modality,
    }
}

pub fn to_brief(c: &Challenge) -> ChallengeBrief {
    ChallengeBrief {
        description: c.description.clone(),
        tactical_constraint: c.tactical_constraint.clone(),
        example_input: c.example_input.clone(),
        example_output: c.example_output.clone(),
        image_url: c.image_url.clone(),
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftOut {
    pub text: String,
    pub recording: bool,
    pub has_audio: bool,
}

/// Snapshot of a session as the UI renders it.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionOut {
    pub session_id: Uuid,
    pub attempt: u64,
    pub phase: PhaseKind,
    pub challenge: ChallengeCard,
    /// `None` while locked.
    pub brief: Option<ChallengeBrief>,
    pub elapsed_ms: u64,
    pub elapsed: String,
    pub draft: Option<DraftOut>,
    pub prompt_length: Option<usize>,
    pub generated_code: Option<String>,
    pub evaluation: Option<EvaluationResult>,
    pub score_equation: Option<String>,
    pub submission_open: bool,
    pub identity: Option<VerifiedIdentity>,
}

pub fn to_session_out(s: &Session, now: Instant) -> SessionOut {
    let elapsed_ms = u64::try_from(s.elapsed(now).as_millis()).unwrap_or(u64::MAX);
    let evaluation = s.evaluation().cloned();
    SessionOut {
        session_id: s.id,
        attempt: s.attempt(),
        phase: s.kind(),
        challenge: to_card(&s.challenge),
        brief: s.brief_revealed().then(|| to_brief(&s.challenge)),
        elapsed_ms,
        elapsed: format_duration_ms(elapsed_ms),
        draft: s.draft().map(|d| DraftOut { text: d.text.clone(), recording: d.recording, has_audio: d.audio.is_some() }),
        prompt_length: s.payload().map(|p| p.prompt_length()),
        generated_code: s.generated_code().map(str::to_string),
        score_equation: evaluation.as_ref().map(score_equation),
        evaluation,
        submission_open: s.submission_open,
        identity: s.identity.clone(),
    }
}

//
// HTTP request/response DTOs
//

#[derive(Debug, Serialize)]
pub struct HealthOut {
    pub ok: bool,
    pub llm: &'static str,
    pub store: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct OpenSessionIn {
    #[serde(rename = "challengeId")]
    pub challenge_id: String,
}

#[derive(Debug, Deserialize)]
pub struct DraftIn {
    pub text: String,
}

#[derive(Deserialize)]
pub struct RecordingIn {
    #[serde(rename = "audioBase64")]
    pub audio_base64: String,
    pub mime: String,
}

#[derive(Debug, Deserialize)]
pub struct IdentityIn {
    pub handle: String,
}

#[derive(Debug, Deserialize)]
pub struct ScoreIn {
    #[serde(rename = "userName")]
    pub user_name: String,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreOut {
    pub entry: LeaderboardEntry,
    /// Global position after the insert, when the leaderboard could be re-read.
    pub user_rank: Option<usize>,
    pub share_text: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StandingOut {
    pub percentile: u8,
    pub projected_rank: usize,
    pub tier: Tier,
    pub final_score: u8,
    pub score_equation: String,
    pub share_text: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct LeaderboardQuery {
    #[serde(default, rename = "challengeId")]
    pub challenge_id: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardOut {
    pub entries: Vec<LeaderboardEntry>,
    pub user_rank: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seeds::seed_challenges;
    use std::sync::Arc;

    #[test]
    fn locked_session_hides_the_brief_and_judge_context() {
        let ch = Arc::new(seed_challenges().into_iter().next().unwrap());
        let mut s = Session::new(ch);
        let now = Instant::now();

        let locked = serde_json::to_value(to_session_out(&s, now)).unwrap();
        assert_eq!(locked["phase"], "LOCKED");
        assert!(locked["brief"].is_null());
        assert_eq!(locked["elapsed"], "00:00");
        assert!(locked["challenge"]["title"].is_string());

        s.start(now).unwrap();
        let active = serde_json::to_string(&to_session_out(&s, now)).unwrap();
        assert!(active.contains("\"description\""));
        assert!(active.contains("\"hasAudio\":false"));
        assert!(!active.contains("judge"));
        assert!(!active.contains("initiative"));
    }

    #[test]
    fn ws_messages_use_type_tags_and_camel_case_fields() {
        let id = Uuid::new_v4();
        let raw = format!(r#"{{"type":"submit_score","sessionId":"{id}","userName":"octo"}}"#);
        match serde_json::from_str::<ClientWsMessage>(&raw).unwrap() {
            ClientWsMessage::SubmitScore { session_id, user_name } => {
                assert_eq!(session_id, id);
                assert_eq!(user_name, "octo");
            }
            other => panic!("unexpected message: {other:?}"),
        }

        let lb: ClientWsMessage = serde_json::from_str(r#"{"type":"leaderboard"}"#).unwrap();
        assert!(matches!(lb, ClientWsMessage::Leaderboard { challenge_id: None, user: None, limit: None }));

        let out = serde_json::to_value(ServerWsMessage::Error { message: "nope".into() }).unwrap();
        assert_eq!(out["type"], "error");
    }
}
