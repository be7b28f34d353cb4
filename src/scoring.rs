//! Score aggregation over the leaderboard: percentile, projected rank, user rank.
//!
//! Everything here is pure and order-independent; callers hand in whatever
//! the store returned.

use serde::Serialize;

use crate::domain::{EvaluationResult, LeaderboardEntry};

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
  Elite,
  Strong,
  Developing,
}

impl Tier {
  pub fn for_percentile(percentile: u8) -> Self {
    if percentile >= 90 {
      Tier::Elite
    } else if percentile >= 70 {
      Tier::Strong
    } else {
      Tier::Developing
    }
  }
}

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Standing {
  pub percentile: u8,
  pub projected_rank: usize,
  pub tier: Tier,
}

/// Where `score` lands among the prior entries of `challenge_id`.
///
/// Ties count in the player's favour (`prior <= score` is "beaten"), and the
/// current attempt is a virtual (n+1)th entrant in the denominator.
pub fn standing(entries: &[LeaderboardEntry], challenge_id: &str, score: u8) -> Standing {
  let prior: Vec<u8> = entries
    .iter()
    .filter(|e| e.problem_id == challenge_id)
    .map(|e| e.total_score)
    .collect();

  if prior.is_empty() {
    return Standing { percentile: 100, projected_rank: 1, tier: Tier::Elite };
  }

  let beaten = prior.iter().filter(|&&p| p <= score).count();
  let above = prior.iter().filter(|&&p| p > score).count();
  let percentile = ((beaten as f64 / (prior.len() + 1) as f64) * 100.0).round() as u8;

  Standing { percentile, projected_rank: above + 1, tier: Tier::for_percentile(percentile) }
}

/// Entries sorted by total score, best first. Stable for equal scores.
pub fn ranked(entries: &[LeaderboardEntry]) -> Vec<LeaderboardEntry> {
  let mut sorted = entries.to_vec();
  sorted.sort_by(|a, b| b.total_score.cmp(&a.total_score));
  sorted
}

/// 1-based global position of the first entry whose name matches exactly, ignoring case.
pub fn user_rank(entries: &[LeaderboardEntry], user_name: &str) -> Option<usize> {
  let wanted = user_name.to_lowercase();
  if wanted.is_empty() {
    return None;
  }
  ranked(entries)
    .iter()
    .position(|e| e.user_name.to_lowercase() == wanted)
    .map(|idx| idx + 1)
}

/// Leaderboard view: optional challenge filter, best first, optional limit.
pub fn leaderboard_view(entries: &[LeaderboardEntry], challenge_id: Option<&str>, limit: Option<usize>) -> Vec<LeaderboardEntry> {
  let filtered: Vec<LeaderboardEntry> = entries
    .iter()
    .filter(|e| challenge_id.map_or(true, |id| e.problem_id == id))
    .cloned()
    .collect();
  let mut sorted = ranked(&filtered);
  if let Some(n) = limit {
    sorted.truncate(n);
  }
  sorted
}

/// `(C + E + P + J) ÷ 4`, shown next to the final score.
pub fn score_equation(eval: &EvaluationResult) -> String {
  format!(
    "({} + {} + {} + {}) ÷ 4",
    eval.completeness.score, eval.efficiency.score, eval.precision.score, eval.engineering_judgment.score
  )
}

pub fn share_text(rank: usize, score: u8, origin: &str) -> String {
  format!(
    "I just hit Rank #{rank} on VibeBench with a rating of {score}. The AI didn't carry me, I flew it. Can you beat my baseline? {origin}"
  )
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::ScoreBreakdown;
  use proptest::prelude::*;

  fn entry(problem: &str, name: &str, score: u8) -> LeaderboardEntry {
    LeaderboardEntry {
      id: format!("{problem}-{name}-{score}"),
      problem_id: problem.into(),
      user_name: name.into(),
      avatar_url: None,
      profile_url: None,
      prompt_length: 10,
      duration_ms: 1000,
      total_score: score,
      breakdown: ScoreBreakdown::default(),
      timestamp: 0,
    }
  }

  #[test]
  fn first_mover_gets_top_placement() {
    let others = vec![entry("other", "a", 99)];
    let s = standing(&others, "backend-easy", 82);
    assert_eq!(s.percentile, 100);
    assert_eq!(s.projected_rank, 1);
  }

  #[test]
  fn ties_count_as_beaten() {
    let prior = vec![entry("c", "a", 90), entry("c", "b", 80), entry("c", "d", 70), entry("x", "e", 10)];
    let s = standing(&prior, "c", 80);
    // beaten = {80, 70} -> round(2 / 4 * 100)
    assert_eq!(s.percentile, 50);
    assert_eq!(s.projected_rank, 2);
    assert_eq!(s.tier, Tier::Developing);
  }

  #[test]
  fn lowest_score_lands_at_zero_percentile() {
    let prior = vec![entry("c", "a", 90)];
    let s = standing(&prior, "c", 10);
    assert_eq!(s.percentile, 0);
    assert_eq!(s.projected_rank, 2);
  }

  #[test]
  fn user_rank_is_global_and_case_insensitive() {
    let entries = vec![entry("a", "zoe", 40), entry("b", "Max", 95), entry("a", "max", 30), entry("b", "ann", 60)];
    assert_eq!(user_rank(&entries, "MAX"), Some(1));
    assert_eq!(user_rank(&entries, "zoe"), Some(3));
    assert_eq!(user_rank(&entries, "nobody"), None);
    assert_eq!(user_rank(&entries, "  "), None);
    assert_eq!(user_rank(&entries, " max "), None);
  }

  #[test]
  fn leaderboard_view_filters_sorts_and_limits() {
    let entries = vec![entry("a", "x", 40), entry("b", "y", 95), entry("a", "z", 70)];
    let view = leaderboard_view(&entries, Some("a"), Some(1));
    assert_eq!(view.len(), 1);
    assert_eq!(view[0].user_name, "z");
    assert_eq!(leaderboard_view(&entries, None, None).len(), 3);
  }

  #[test]
  fn equation_lists_the_four_dimensions() {
    let mut eval = EvaluationResult::system_failure();
    eval.completeness.score = 90;
    eval.efficiency.score = 80;
    eval.precision.score = 70;
    eval.engineering_judgment.score = 60;
    assert_eq!(score_equation(&eval), "(90 + 80 + 70 + 60) ÷ 4");
  }

  #[test]
  fn tiers_follow_gauge_thresholds() {
    assert_eq!(Tier::for_percentile(100), Tier::Elite);
    assert_eq!(Tier::for_percentile(90), Tier::Elite);
    assert_eq!(Tier::for_percentile(89), Tier::Strong);
    assert_eq!(Tier::for_percentile(70), Tier::Strong);
    assert_eq!(Tier::for_percentile(69), Tier::Developing);
  }

  proptest! {
    #[test]
    fn prop_rank_and_percentile_bounds(score in 0u8..=100, prior in proptest::collection::vec(0u8..=100, 0..40)) {
      let entries: Vec<_> = prior.iter().enumerate().map(|(i, &p)| entry("c", &i.to_string(), p)).collect();
      let s = standing(&entries, "c", score);
      let above = prior.iter().filter(|&&p| p > score).count();
      prop_assert_eq!(s.projected_rank, above + 1);
      prop_assert!(s.percentile <= 100);
      if prior.is_empty() {
        prop_assert_eq!(s.percentile, 100);
      }
    }

    #[test]
    fn prop_standing_is_order_independent(score in 0u8..=100, prior in proptest::collection::vec(0u8..=100, 1..20)) {
      let entries: Vec<_> = prior.iter().enumerate().map(|(i, &p)| entry("c", &i.to_string(), p)).collect();
      let mut reversed = entries.clone();
      reversed.reverse();
      prop_assert_eq!(standing(&entries, "c", score), standing(&reversed, "c", score));
    }
  }
}
