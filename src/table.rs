use std::cmp::Ordering;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::models::MemberSummary;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortField {
    Name,
    #[default]
    AppreciationPoints,
    Leadership,
    Communication,
    Management,
    ProblemSolving,
    TotalScore,
    LastActive,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

/// Search and sort state of the members table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MembersTable {
    pub search: Option<String>,
    pub sort: SortField,
    pub direction: SortDirection,
}

impl MembersTable {
    pub fn apply(&self, members: &[MemberSummary]) -> Vec<MemberSummary> {
        let needle = self
            .search
            .as_deref()
            .map(str::trim)
            .filter(|term| !term.is_empty())
            .map(str::to_lowercase);

        let mut rows: Vec<MemberSummary> = members
            .iter()
            .filter(|summary| match &needle {
                Some(term) => matches_search(summary, term),
                None => true,
            })
            .cloned()
            .collect();

        rows.sort_by(|a, b| {
            let ordering = compare(self.sort, a, b);
            match self.direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            }
        });
        rows
    }
}

fn matches_search(summary: &MemberSummary, term: &str) -> bool {
    let name = summary.member.display_name.as_deref().unwrap_or_default();
    let email = summary.member.email.as_deref().unwrap_or_default();
    name.to_lowercase().contains(term) || email.to_lowercase().contains(term)
}

fn compare(field: SortField, a: &MemberSummary, b: &MemberSummary) -> Ordering {
    let by_number = |x: f64, y: f64| x.partial_cmp(&y).unwrap_or(Ordering::Equal);
    match field {
        SortField::Name => {
            let left = a.member.display_name.as_deref().unwrap_or_default().to_lowercase();
            let right = b.member.display_name.as_deref().unwrap_or_default().to_lowercase();
            left.cmp(&right)
        }
        SortField::AppreciationPoints => by_number(a.appreciation_points, b.appreciation_points),
        SortField::Leadership => a.leadership.cmp(&b.leadership),
        SortField::Communication => a.communication.cmp(&b.communication),
        SortField::Management => a.management.cmp(&b.management),
        SortField::ProblemSolving => a.problem_solving.cmp(&b.problem_solving),
        SortField::TotalScore => by_number(a.total_score, b.total_score),
        SortField::LastActive => a.last_active.cmp(&b.last_active),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::members::zeroed_summary;
    use crate::models::Member;
    use chrono::Utc;

    fn row(name: &str, email: &str, points: f64) -> MemberSummary {
        let member = Member {
            user_id: name.to_lowercase(),
            display_name: Some(name.to_string()),
            email: Some(email.to_string()),
            is_active: Some(true),
        };
        let mut summary = zeroed_summary(member, Utc::now());
        summary.appreciation_points = points;
        summary
    }

    fn names(rows: &[MemberSummary]) -> Vec<&str> {
        rows.iter().map(|row| row.display_name()).collect()
    }

    fn sample() -> Vec<MemberSummary> {
        vec![
            row("Avery", "avery@team.dev", 12.0),
            row("jules", "jules@team.dev", 30.0),
            row("Kiara", "kiara@elsewhere.io", 21.0),
        ]
    }

    #[test]
    fn defaults_to_points_descending() {
        let rows = MembersTable::default().apply(&sample());
        assert_eq!(names(&rows), vec!["jules", "Kiara", "Avery"]);
    }

    #[test]
    fn search_matches_name_or_email_case_insensitively() {
        let table = MembersTable {
            search: Some("TEAM.dev".to_string()),
            ..MembersTable::default()
        };
        assert_eq!(names(&table.apply(&sample())), vec!["jules", "Avery"]);

        let table = MembersTable {
            search: Some("kIa".to_string()),
            ..MembersTable::default()
        };
        assert_eq!(names(&table.apply(&sample())), vec!["Kiara"]);
    }

    #[test]
    fn name_sort_ignores_case() {
        let table = MembersTable {
            search: None,
            sort: SortField::Name,
            direction: SortDirection::Asc,
        };
        assert_eq!(names(&table.apply(&sample())), vec!["Avery", "jules", "Kiara"]);
    }
}
