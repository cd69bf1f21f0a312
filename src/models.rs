use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ScopeError;

/// Upper bound of the evaluation scale for every dimension.
pub const MAX_DIMENSION_SCORE: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Quarter {
    Q1,
    Q2,
    Q3,
    Q4,
}

impl Quarter {
    pub const ALL: [Quarter; 4] = [Quarter::Q1, Quarter::Q2, Quarter::Q3, Quarter::Q4];

    pub fn as_str(self) -> &'static str {
        match self {
            Quarter::Q1 => "Q1",
            Quarter::Q2 => "Q2",
            Quarter::Q3 => "Q3",
            Quarter::Q4 => "Q4",
        }
    }
}

impl fmt::Display for Quarter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Quarter {
    type Err = ScopeError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "Q1" => Ok(Quarter::Q1),
            "Q2" => Ok(Quarter::Q2),
            "Q3" => Ok(Quarter::Q3),
            "Q4" => Ok(Quarter::Q4),
            _ => Err(ScopeError::InvalidQuarter(raw.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub user_id: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppreciationPost {
    pub message_id: String,
    pub posted_by_user_id: Option<String>,
    pub message: Option<String>,
    pub quarter: Option<Quarter>,
    pub year: Option<i32>,
    pub created_time: Option<DateTime<Utc>>,
}

/// One evaluation of a member's contribution to an appreciation post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub message_id: String,
    pub user_id: String,
    pub leadership: Option<f64>,
    pub communication: Option<f64>,
    pub management: Option<f64>,
    pub problem_solving: Option<f64>,
    pub final_score: Option<f64>,
}

impl Evaluation {
    pub fn raw(&self, dimension: Dimension) -> Option<f64> {
        match dimension {
            Dimension::Leadership => self.leadership,
            Dimension::Communication => self.communication,
            Dimension::Management => self.management,
            Dimension::ProblemSolving => self.problem_solving,
        }
    }

    /// Dimension value with missing treated as zero and clamped to the
    /// `0..=10` evaluation scale.
    pub fn score(&self, dimension: Dimension) -> f64 {
        let Some(value) = self.raw(dimension) else {
            return 0.0;
        };

        let clamped = clamp_dimension(value);
        if clamped != value {
            warn!(
                message_id = %self.message_id,
                user_id = %self.user_id,
                dimension = dimension.label(),
                value,
                "evaluation score outside 0-10 scale, clamping"
            );
        }
        clamped
    }

    /// All four clamped scores in `Dimension::ALL` order.
    pub fn scores(&self) -> [f64; 4] {
        Dimension::ALL.map(|dimension| self.score(dimension))
    }

    pub fn final_points(&self) -> f64 {
        match self.final_score {
            Some(value) if value.is_finite() => value,
            _ => 0.0,
        }
    }
}

/// Clamp a recorded dimension value into `0..=10`. NaN counts as zero.
pub fn clamp_dimension(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, MAX_DIMENSION_SCORE)
}

/// The fixed evaluation axes, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dimension {
    Leadership,
    Communication,
    Management,
    ProblemSolving,
}

impl Dimension {
    pub const ALL: [Dimension; 4] = [
        Dimension::Leadership,
        Dimension::Communication,
        Dimension::Management,
        Dimension::ProblemSolving,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Dimension::Leadership => "Leadership",
            Dimension::Communication => "Communication",
            Dimension::Management => "Management",
            Dimension::ProblemSolving => "Problem Solving",
        }
    }

    pub fn color(self) -> &'static str {
        match self {
            Dimension::Leadership => "#3b82f6",
            Dimension::Communication => "#8b5cf6",
            Dimension::Management => "#10b981",
            Dimension::ProblemSolving => "#f97316",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|dimension| dimension.label().eq_ignore_ascii_case(label.trim()))
    }
}

/// Chart color for a category name; unknown names share the Leadership color.
pub fn color_for_category(category: &str) -> &'static str {
    Dimension::from_label(category)
        .unwrap_or(Dimension::Leadership)
        .color()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricResult {
    pub name: String,
    pub score: f64,
    pub color: String,
}

impl MetricResult {
    pub fn new(dimension: Dimension, score: f64) -> Self {
        Self {
            name: dimension.label().to_string(),
            score,
            color: dimension.color().to_string(),
        }
    }
}

/// Always the four dimensions in `Dimension::ALL` order.
pub type TeamMetrics = [MetricResult; 4];

/// Wire shape of the aggregation service response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryPercentage {
    pub category: String,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberSummary {
    #[serde(flatten)]
    pub member: Member,
    pub appreciation_points: f64,
    pub leadership: i64,
    pub communication: i64,
    pub management: i64,
    pub problem_solving: i64,
    pub total_score: f64,
    pub evaluation_count: usize,
    pub last_active: DateTime<Utc>,
}

impl MemberSummary {
    pub fn display_name(&self) -> &str {
        self.member.display_name.as_deref().unwrap_or("Unknown")
    }

    pub fn skill(&self, dimension: Dimension) -> i64 {
        match dimension {
            Dimension::Leadership => self.leadership,
            Dimension::Communication => self.communication,
            Dimension::Management => self.management,
            Dimension::ProblemSolving => self.problem_solving,
        }
    }
}

/// An appreciation post as shown in the kudos feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KudosPost {
    pub message_id: String,
    pub message: Option<String>,
    pub posted_by: Option<String>,
    pub quarter: Option<Quarter>,
    pub year: Option<i32>,
    pub created_time: Option<DateTime<Utc>>,
}
