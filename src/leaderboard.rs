use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::LeaderboardError;
use crate::models::{Dimension, MemberSummary};

pub const DEFAULT_LIMIT: usize = 5;

/// Numeric member field the leaderboard ranks by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScoreField {
    #[default]
    TotalScore,
    AppreciationPoints,
    Leadership,
    Communication,
    Management,
    ProblemSolving,
}

impl ScoreField {
    pub fn value(self, summary: &MemberSummary) -> f64 {
        match self {
            ScoreField::TotalScore => summary.total_score,
            ScoreField::AppreciationPoints => summary.appreciation_points,
            ScoreField::Leadership => summary.skill(Dimension::Leadership) as f64,
            ScoreField::Communication => summary.skill(Dimension::Communication) as f64,
            ScoreField::Management => summary.skill(Dimension::Management) as f64,
            ScoreField::ProblemSolving => summary.skill(Dimension::ProblemSolving) as f64,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ScoreField::TotalScore => "total score",
            ScoreField::AppreciationPoints => "appreciation points",
            ScoreField::Leadership => "leadership",
            ScoreField::Communication => "communication",
            ScoreField::Management => "management",
            ScoreField::ProblemSolving => "problem solving",
        }
    }
}

/// Highest `field` first; equal scores keep their input order.
pub fn rank(
    summaries: &[MemberSummary],
    field: ScoreField,
    limit: usize,
) -> Result<Vec<MemberSummary>, LeaderboardError> {
    if limit == 0 {
        return Err(LeaderboardError::InvalidLimit);
    }

    let mut ranked = summaries.to_vec();
    ranked.sort_by(|a, b| {
        field
            .value(b)
            .partial_cmp(&field.value(a))
            .unwrap_or(Ordering::Equal)
    });
    ranked.truncate(limit);
    Ok(ranked)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub id: String,
    pub name: String,
    pub title: String,
    pub points: i64,
    pub avatar: String,
    pub appreciation_posts: usize,
    pub summary: String,
    pub last_active: DateTime<Utc>,
}

pub fn leaderboard_entries(ranked: &[MemberSummary], field: ScoreField) -> Vec<LeaderboardEntry> {
    ranked
        .iter()
        .map(|summary| LeaderboardEntry {
            id: summary.member.user_id.clone(),
            name: summary.display_name().to_string(),
            title: "Team Member".to_string(),
            points: field.value(summary).round() as i64,
            avatar: String::new(),
            appreciation_posts: summary.evaluation_count,
            summary: format!("Ranked by {}", field.label()),
            last_active: summary.last_active,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::members::zeroed_summary;
    use crate::models::Member;

    fn scored(id: &str, total_score: f64) -> MemberSummary {
        let member = Member {
            user_id: id.to_string(),
            display_name: None,
            email: None,
            is_active: None,
        };
        let mut summary = zeroed_summary(member, Utc::now());
        summary.total_score = total_score;
        summary
    }

    fn ids(ranked: &[MemberSummary]) -> Vec<&str> {
        ranked.iter().map(|s| s.member.user_id.as_str()).collect()
    }

    #[test]
    fn ties_keep_input_order() {
        let input = vec![scored("a", 5.0), scored("b", 5.0), scored("c", 9.0)];
        let ranked = rank(&input, ScoreField::TotalScore, 2).unwrap();
        assert_eq!(ids(&ranked), vec!["c", "a"]);
    }

    #[test]
    fn short_input_is_not_padded() {
        let input = vec![scored("a", 1.0)];
        let ranked = rank(&input, ScoreField::default(), DEFAULT_LIMIT).unwrap();
        assert_eq!(ranked.len(), 1);
    }

    #[test]
    fn zero_limit_is_rejected() {
        assert!(matches!(
            rank(&[], ScoreField::TotalScore, 0),
            Err(LeaderboardError::InvalidLimit)
        ));
    }

    #[test]
    fn ranks_by_requested_field() {
        let mut a = scored("a", 50.0);
        a.appreciation_points = 3.0;
        let mut b = scored("b", 10.0);
        b.appreciation_points = 7.0;
        let ranked = rank(&[a, b], ScoreField::AppreciationPoints, 5).unwrap();
        assert_eq!(ids(&ranked), vec!["b", "a"]);
    }

    #[test]
    fn entries_round_points_and_default_names() {
        let entries = leaderboard_entries(&[scored("u9", 41.6)], ScoreField::TotalScore);
        assert_eq!(entries[0].points, 42);
        assert_eq!(entries[0].name, "Unknown");
        assert_eq!(entries[0].title, "Team Member");
        assert_eq!(entries[0].id, "u9");
    }
}
