use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::models::{Dimension, Evaluation, Member, MemberSummary};
use crate::scope::ResolvedScope;
use crate::store::{EvaluationQuery, RecordStore};

/// Summaries in input member order plus the members whose reads failed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemberAggregation {
    pub summaries: Vec<MemberSummary>,
    pub failures: Vec<MemberReadFailure>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemberReadFailure {
    pub user_id: String,
    pub error: String,
}

pub fn zeroed_summary(member: Member, last_active: DateTime<Utc>) -> MemberSummary {
    summarize(member, &[], last_active)
}

pub fn summarize(member: Member, rows: &[Evaluation], last_active: DateTime<Utc>) -> MemberSummary {
    let count = rows.len();
    let scores: Vec<[f64; 4]> = rows.iter().map(Evaluation::scores).collect();
    let average = |dimension: Dimension| -> i64 {
        if count == 0 {
            return 0;
        }
        let total: f64 = scores.iter().map(|row| row[dimension as usize]).sum();
        (total / count as f64).round() as i64
    };

    let appreciation_points: f64 = rows.iter().map(Evaluation::final_points).sum();
    let total_score: f64 = scores.iter().flatten().sum();

    MemberSummary {
        leadership: average(Dimension::Leadership),
        communication: average(Dimension::Communication),
        management: average(Dimension::Management),
        problem_solving: average(Dimension::ProblemSolving),
        member,
        appreciation_points,
        total_score,
        evaluation_count: count,
        last_active,
    }
}

/// Summarise every member over `scope`. Reads run concurrently, at most
/// `max_concurrent` at a time; a failed read degrades that member to zeros.
pub async fn aggregate_members(
    store: Arc<dyn RecordStore>,
    members: Vec<Member>,
    scope: &ResolvedScope,
    max_concurrent: usize,
) -> MemberAggregation {
    // No activity source exists yet, so every summary is stamped with the batch time.
    let last_active = Utc::now();

    if scope.is_empty() {
        debug!(members = members.len(), "empty scope, zeroing member summaries");
        return MemberAggregation {
            summaries: members
                .into_iter()
                .map(|member| zeroed_summary(member, last_active))
                .collect(),
            failures: Vec::new(),
        };
    }

    let permits = Arc::new(Semaphore::new(max_concurrent.max(1)));
    let mut reads = JoinSet::new();

    for (index, member) in members.iter().enumerate() {
        let store = Arc::clone(&store);
        let permits = Arc::clone(&permits);
        let query = EvaluationQuery::for_member(&member.user_id, scope);
        reads.spawn(async move {
            let _permit = permits.acquire_owned().await.ok();
            (index, store.evaluations(&query).await)
        });
    }

    let mut slots: Vec<Option<MemberSummary>> = vec![None; members.len()];
    let mut failures = Vec::new();

    while let Some(joined) = reads.join_next().await {
        let (index, result) = match joined {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(error = %err, "member evaluation read task aborted");
                continue;
            }
        };
        let member = members[index].clone();
        match result {
            Ok(rows) => slots[index] = Some(summarize(member, &rows, last_active)),
            Err(err) => {
                warn!(
                    user_id = %member.user_id,
                    error = %err,
                    "evaluations read failed, reporting zeroed summary"
                );
                failures.push(MemberReadFailure {
                    user_id: member.user_id.clone(),
                    error: err.to_string(),
                });
                slots[index] = Some(zeroed_summary(member, last_active));
            }
        }
    }

    let summaries = slots
        .into_iter()
        .zip(members)
        .map(|(slot, member)| match slot {
            Some(summary) => summary,
            None => {
                failures.push(MemberReadFailure {
                    user_id: member.user_id.clone(),
                    error: "evaluation read did not complete".to_string(),
                });
                zeroed_summary(member, last_active)
            }
        })
        .collect();

    failures.sort_by(|a, b| a.user_id.cmp(&b.user_id));
    MemberAggregation {
        summaries,
        failures,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::store::{Dataset, InMemoryRecordStore};

    fn member(user_id: &str) -> Member {
        Member {
            user_id: user_id.to_string(),
            display_name: Some(format!("Member {user_id}")),
            email: None,
            is_active: Some(true),
        }
    }

    fn scenario_store() -> InMemoryRecordStore {
        InMemoryRecordStore::new(Dataset {
            members: vec![member("u1")],
            posts: Vec::new(),
            evaluations: vec![Evaluation {
                message_id: "m1".to_string(),
                user_id: "u1".to_string(),
                leadership: Some(8.0),
                communication: Some(6.0),
                management: Some(4.0),
                problem_solving: Some(2.0),
                final_score: Some(20.0),
            }],
        })
    }

    fn numbers(summary: &MemberSummary) -> (f64, i64, i64, i64, i64, f64) {
        (
            summary.appreciation_points,
            summary.leadership,
            summary.communication,
            summary.management,
            summary.problem_solving,
            summary.total_score,
        )
    }

    #[tokio::test]
    async fn unrestricted_scope_scenario() {
        let store: Arc<dyn RecordStore> = Arc::new(scenario_store());
        let aggregation =
            aggregate_members(store, vec![member("u1")], &ResolvedScope::Unrestricted, 4).await;

        assert_eq!(aggregation.summaries.len(), 1);
        assert_eq!(numbers(&aggregation.summaries[0]), (20.0, 8, 6, 4, 2, 20.0));
        assert_eq!(aggregation.summaries[0].evaluation_count, 1);
        assert!(aggregation.failures.is_empty());
    }

    #[tokio::test]
    async fn empty_scope_zeroes_without_reading() {
        let store = Arc::new(scenario_store());
        let handle: Arc<dyn RecordStore> = store.clone();
        let aggregation =
            aggregate_members(handle, vec![member("u1")], &ResolvedScope::Empty, 4).await;

        assert_eq!(numbers(&aggregation.summaries[0]), (0.0, 0, 0, 0, 0, 0.0));
        assert_eq!(store.evaluation_reads(), 0);
    }

    #[tokio::test]
    async fn output_order_follows_input_not_completion() {
        let store = InMemoryRecordStore::sample()
            .with_read_delay("U01AVERY", Duration::from_millis(40))
            .with_read_delay("U02JULES", Duration::from_millis(20));
        let store: Arc<dyn RecordStore> = Arc::new(store);
        let members = store.members().await.unwrap();
        let expected: Vec<String> = members.iter().map(|m| m.user_id.clone()).collect();

        let aggregation =
            aggregate_members(store, members, &ResolvedScope::Unrestricted, 8).await;
        let actual: Vec<String> = aggregation
            .summaries
            .iter()
            .map(|summary| summary.member.user_id.clone())
            .collect();
        assert_eq!(actual, expected);
    }

    #[tokio::test]
    async fn one_failed_read_degrades_only_that_member() {
        let store: Arc<dyn RecordStore> =
            Arc::new(InMemoryRecordStore::sample().failing_for("U01AVERY"));
        let members = store.members().await.unwrap();

        let aggregation =
            aggregate_members(store, members, &ResolvedScope::Unrestricted, 2).await;

        let avery = &aggregation.summaries[0];
        assert_eq!(avery.member.user_id, "U01AVERY");
        assert_eq!(numbers(avery), (0.0, 0, 0, 0, 0, 0.0));
        assert_eq!(aggregation.failures.len(), 1);
        assert_eq!(aggregation.failures[0].user_id, "U01AVERY");

        let kiara = &aggregation.summaries[2];
        assert_eq!(kiara.appreciation_points, 30.0);
        assert_eq!(kiara.problem_solving, 10);
    }

    #[test]
    fn averages_round_to_nearest_integer() {
        let rows = vec![
            Evaluation {
                message_id: "m1".to_string(),
                user_id: "u1".to_string(),
                leadership: Some(7.0),
                communication: Some(9.0),
                management: None,
                problem_solving: Some(3.0),
                final_score: None,
            },
            Evaluation {
                message_id: "m2".to_string(),
                user_id: "u1".to_string(),
                leadership: Some(8.0),
                communication: Some(9.0),
                management: Some(5.0),
                problem_solving: Some(4.0),
                final_score: Some(12.5),
            },
        ];
        let summary = summarize(member("u1"), &rows, Utc::now());
        assert_eq!(summary.leadership, 8);
        assert_eq!(summary.communication, 9);
        assert_eq!(summary.management, 3);
        assert_eq!(summary.problem_solving, 4);
        assert_eq!(summary.appreciation_points, 12.5);
        assert_eq!(summary.total_score, 45.0);
    }

    #[test]
    fn out_of_range_scores_are_clamped_once_for_averages_and_total() {
        let rows = vec![Evaluation {
            message_id: "m1".to_string(),
            user_id: "u1".to_string(),
            leadership: Some(14.0),
            communication: Some(-3.0),
            management: Some(6.0),
            problem_solving: None,
            final_score: Some(17.0),
        }];
        let summary = summarize(member("u1"), &rows, Utc::now());
        assert_eq!(summary.leadership, 10);
        assert_eq!(summary.communication, 0);
        assert_eq!(summary.total_score, 16.0);
        assert_eq!(summary.appreciation_points, 17.0);
    }
}
