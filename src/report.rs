use std::fmt::Write;

use crate::dashboard::{DashboardSnapshot, Panel};
use crate::models::KudosPost;

fn unavailable(output: &mut String, error: &str) {
    let _ = writeln!(output, "_Unavailable: {error}_");
}

pub fn build_report(snapshot: &DashboardSnapshot, kudos: &[KudosPost]) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Kudos Corner Report");
    let _ = writeln!(output, "Generated for {}", snapshot.filter.label());
    let _ = writeln!(output);

    let _ = writeln!(output, "## Summary");
    match &snapshot.summary_cards {
        Panel::Ready { data } => {
            for card in data {
                let _ = writeln!(output, "- {}: {} ({})", card.title, card.value, card.description);
            }
        }
        Panel::Unavailable { error } => unavailable(&mut output, error),
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Team Metrics");
    match &snapshot.team_metrics {
        Panel::Ready { data } => {
            for metric in data {
                let _ = writeln!(output, "- {}: {:.1}%", metric.name, metric.score);
            }
        }
        Panel::Unavailable { error } => unavailable(&mut output, error),
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Top Contributors");
    match &snapshot.leaderboard {
        Panel::Ready { data } if data.is_empty() => {
            let _ = writeln!(output, "No team members recorded.");
        }
        Panel::Ready { data } => {
            for (position, entry) in data.iter().enumerate() {
                let _ = writeln!(
                    output,
                    "{}. {} with {} points across {} evaluated posts",
                    position + 1,
                    entry.name,
                    entry.points,
                    entry.appreciation_posts
                );
            }
        }
        Panel::Unavailable { error } => unavailable(&mut output, error),
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Members");
    match &snapshot.members {
        Panel::Ready { data } if data.is_empty() => {
            let _ = writeln!(output, "No team members recorded.");
        }
        Panel::Ready { data } => {
            let _ = writeln!(
                output,
                "| Member | Points | Leadership | Communication | Management | Problem Solving |"
            );
            let _ = writeln!(output, "|---|---|---|---|---|---|");
            for summary in data {
                let _ = writeln!(
                    output,
                    "| {} | {:.0} | {}/10 | {}/10 | {}/10 | {}/10 |",
                    summary.display_name(),
                    summary.appreciation_points,
                    summary.leadership,
                    summary.communication,
                    summary.management,
                    summary.problem_solving
                );
            }
        }
        Panel::Unavailable { error } => unavailable(&mut output, error),
    }
    if !snapshot.member_failures.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(
            output,
            "Evaluations could not be read for: {}",
            snapshot
                .member_failures
                .iter()
                .map(|failure| failure.user_id.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Recent Appreciation Posts");
    if kudos.is_empty() {
        let _ = writeln!(output, "No appreciation posts for this window.");
    } else {
        for post in kudos {
            let when = post
                .created_time
                .map(|time| time.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| "undated".to_string());
            let _ = writeln!(
                output,
                "- {} on {}: {}",
                post.posted_by.as_deref().unwrap_or("Unknown"),
                when,
                post.message.as_deref().unwrap_or("")
            );
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leaderboard::LeaderboardEntry;
    use crate::members::{zeroed_summary, MemberReadFailure};
    use crate::metrics;
    use crate::models::Member;
    use crate::scope::ScopeFilter;
    use chrono::Utc;

    fn snapshot() -> DashboardSnapshot {
        let member = Member {
            user_id: "U1".to_string(),
            display_name: Some("Avery Lee".to_string()),
            email: None,
            is_active: Some(true),
        };
        DashboardSnapshot {
            filter: ScopeFilter::unrestricted(),
            current: true,
            summary_cards: Panel::Unavailable {
                error: "record store unavailable".to_string(),
            },
            team_metrics: Panel::Ready {
                data: metrics::zeroed(),
            },
            leaderboard: Panel::Ready {
                data: vec![LeaderboardEntry {
                    id: "U1".to_string(),
                    name: "Avery Lee".to_string(),
                    title: "Team Member".to_string(),
                    points: 58,
                    avatar: String::new(),
                    appreciation_posts: 2,
                    summary: "Ranked by total score".to_string(),
                    last_active: Utc::now(),
                }],
            },
            members: Panel::Ready {
                data: vec![zeroed_summary(member, Utc::now())],
            },
            member_failures: vec![MemberReadFailure {
                user_id: "U2".to_string(),
                error: "timeout".to_string(),
            }],
        }
    }

    #[test]
    fn report_lists_every_section() {
        let report = build_report(&snapshot(), &[]);
        assert!(report.contains("Generated for all time"));
        assert!(report.contains("_Unavailable: record store unavailable_"));
        assert!(report.contains("- Problem Solving: 0.0%"));
        assert!(report.contains("1. Avery Lee with 58 points across 2 evaluated posts"));
        assert!(report.contains("| Avery Lee | 0 | 0/10 | 0/10 | 0/10 | 0/10 |"));
        assert!(report.contains("Evaluations could not be read for: U2"));
        assert!(report.contains("No appreciation posts for this window."));
    }
}
