use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use crate::error::StoreError;
use crate::models::{
    clamp_dimension, AppreciationPost, CategoryPercentage, Dimension, Evaluation, KudosPost, Member,
    Quarter,
};
use crate::scope::{ResolvedScope, ScopeFilter};

/// Restriction applied to an `evaluations` read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvaluationQuery {
    pub user_id: Option<String>,
    /// `Some(vec![])` matches no rows.
    pub message_ids: Option<Vec<String>>,
}

impl EvaluationQuery {
    pub fn for_scope(scope: &ResolvedScope) -> Self {
        Self {
            user_id: None,
            message_ids: scope.message_ids(),
        }
    }

    pub fn for_member(user_id: &str, scope: &ResolvedScope) -> Self {
        Self {
            user_id: Some(user_id.to_string()),
            message_ids: scope.message_ids(),
        }
    }

    pub fn matches(&self, evaluation: &Evaluation) -> bool {
        let user_ok = self
            .user_id
            .as_deref()
            .map_or(true, |user_id| evaluation.user_id == user_id);
        let message_ok = self
            .message_ids
            .as_ref()
            .map_or(true, |ids| ids.iter().any(|id| *id == evaluation.message_id));
        user_ok && message_ok
    }
}

/// Read-only access to the hosted tables backing the dashboard.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn members(&self) -> Result<Vec<Member>, StoreError>;

    async fn count_members(&self) -> Result<u64, StoreError>;

    async fn count_appreciations(&self, filter: &ScopeFilter) -> Result<u64, StoreError>;

    /// `message_id`s of appreciation posts matching the filter.
    async fn appreciation_ids(&self, filter: &ScopeFilter) -> Result<Vec<String>, StoreError>;

    async fn evaluations(&self, query: &EvaluationQuery) -> Result<Vec<Evaluation>, StoreError>;

    /// Per-dimension percentages computed next to the data.
    async fn team_metrics(&self, filter: &ScopeFilter)
        -> Result<Vec<CategoryPercentage>, StoreError>;

    /// Distinct years present on appreciation posts, newest first.
    async fn available_years(&self) -> Result<Vec<i32>, StoreError>;

    async fn recent_kudos(
        &self,
        filter: &ScopeFilter,
        limit: usize,
    ) -> Result<Vec<KudosPost>, StoreError>;

    /// Backend name for logging
    fn name(&self) -> &'static str;
}

/// Rows used to seed a database or back the in-memory store.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub members: Vec<Member>,
    pub posts: Vec<AppreciationPost>,
    pub evaluations: Vec<Evaluation>,
}

/// In-process store used for demos and tests. Failures and latency can be
/// injected per member.
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    data: Dataset,
    unavailable: bool,
    failing_users: HashSet<String>,
    read_delays: HashMap<String, Duration>,
    team_metrics_failure: Option<String>,
    team_metrics_response: Option<Vec<CategoryPercentage>>,
    appreciation_reads: AtomicUsize,
    evaluation_reads: AtomicUsize,
    team_metrics_calls: AtomicUsize,
}

impl InMemoryRecordStore {
    pub fn new(data: Dataset) -> Self {
        Self {
            data,
            ..Self::default()
        }
    }

    pub fn sample() -> Self {
        Self::new(sample_dataset())
    }

    /// Every read fails.
    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    pub fn failing_for(mut self, user_id: &str) -> Self {
        self.failing_users.insert(user_id.to_string());
        self
    }

    pub fn with_read_delay(mut self, user_id: &str, delay: Duration) -> Self {
        self.read_delays.insert(user_id.to_string(), delay);
        self
    }

    pub fn with_team_metrics_failure(mut self, message: &str) -> Self {
        self.team_metrics_failure = Some(message.to_string());
        self
    }

    pub fn with_team_metrics_response(mut self, response: Vec<CategoryPercentage>) -> Self {
        self.team_metrics_response = Some(response);
        self
    }

    pub fn posts(&self) -> &[AppreciationPost] {
        &self.data.posts
    }

    pub fn appreciation_reads(&self) -> usize {
        self.appreciation_reads.load(Ordering::Relaxed)
    }

    pub fn evaluation_reads(&self) -> usize {
        self.evaluation_reads.load(Ordering::Relaxed)
    }

    pub fn team_metrics_calls(&self) -> usize {
        self.team_metrics_calls.load(Ordering::Relaxed)
    }

    fn check_available(&self, table: &str) -> Result<(), StoreError> {
        if self.unavailable {
            return Err(StoreError::Unavailable(format!("{table} read refused")));
        }
        Ok(())
    }

    fn matching_posts<'a>(
        &'a self,
        filter: &'a ScopeFilter,
    ) -> impl Iterator<Item = &'a AppreciationPost> + 'a {
        self.data.posts.iter().filter(move |post| filter.matches(post))
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn members(&self) -> Result<Vec<Member>, StoreError> {
        self.check_available("team_members")?;
        Ok(self.data.members.clone())
    }

    async fn count_members(&self) -> Result<u64, StoreError> {
        self.check_available("team_members")?;
        Ok(self.data.members.len() as u64)
    }

    async fn count_appreciations(&self, filter: &ScopeFilter) -> Result<u64, StoreError> {
        self.check_available("appreciations")?;
        Ok(self.matching_posts(filter).count() as u64)
    }

    async fn appreciation_ids(&self, filter: &ScopeFilter) -> Result<Vec<String>, StoreError> {
        self.appreciation_reads.fetch_add(1, Ordering::Relaxed);
        self.check_available("appreciations")?;
        Ok(self
            .matching_posts(filter)
            .map(|post| post.message_id.clone())
            .collect())
    }

    async fn evaluations(&self, query: &EvaluationQuery) -> Result<Vec<Evaluation>, StoreError> {
        self.evaluation_reads.fetch_add(1, Ordering::Relaxed);

        if let Some(user_id) = query.user_id.as_deref() {
            if let Some(delay) = self.read_delays.get(user_id) {
                tokio::time::sleep(*delay).await;
            }
            if self.failing_users.contains(user_id) {
                return Err(StoreError::Unavailable(format!(
                    "evaluations read failed for {user_id}"
                )));
            }
        }
        self.check_available("evaluations")?;

        Ok(self
            .data
            .evaluations
            .iter()
            .filter(|evaluation| query.matches(evaluation))
            .cloned()
            .collect())
    }

    async fn team_metrics(
        &self,
        filter: &ScopeFilter,
    ) -> Result<Vec<CategoryPercentage>, StoreError> {
        self.team_metrics_calls.fetch_add(1, Ordering::Relaxed);
        self.check_available("get_team_metrics")?;
        if let Some(message) = &self.team_metrics_failure {
            return Err(StoreError::Unavailable(message.clone()));
        }
        if let Some(response) = &self.team_metrics_response {
            return Ok(response.clone());
        }

        let scope = if filter.is_unrestricted() {
            ResolvedScope::Unrestricted
        } else {
            ResolvedScope::from_ids(self.matching_posts(filter).map(|post| post.message_id.clone()))
        };
        // Mirrors the `get_team_metrics` SQL function row for row.
        let mut rows = 0usize;
        let mut totals = [0.0f64; 4];
        for evaluation in &self.data.evaluations {
            if !scope.contains(&evaluation.message_id) {
                continue;
            }
            rows += 1;
            for (total, dimension) in totals.iter_mut().zip(Dimension::ALL) {
                *total += evaluation.raw(dimension).map_or(0.0, clamp_dimension);
            }
        }

        Ok(Dimension::ALL
            .into_iter()
            .zip(totals)
            .map(|(dimension, total)| CategoryPercentage {
                category: dimension.label().to_string(),
                percentage: if rows == 0 {
                    0.0
                } else {
                    (total / rows as f64 * 10.0 * 100.0).round() / 100.0
                },
            })
            .collect())
    }

    async fn available_years(&self) -> Result<Vec<i32>, StoreError> {
        self.check_available("appreciations")?;
        let years: BTreeSet<i32> = self.data.posts.iter().filter_map(|post| post.year).collect();
        Ok(years.into_iter().rev().collect())
    }

    async fn recent_kudos(
        &self,
        filter: &ScopeFilter,
        limit: usize,
    ) -> Result<Vec<KudosPost>, StoreError> {
        self.check_available("appreciations")?;
        let names: HashMap<&str, &str> = self
            .data
            .members
            .iter()
            .filter_map(|member| {
                member
                    .display_name
                    .as_deref()
                    .map(|name| (member.user_id.as_str(), name))
            })
            .collect();

        let mut posts: Vec<&AppreciationPost> = self.matching_posts(filter).collect();
        posts.sort_by(|a, b| b.created_time.cmp(&a.created_time));

        Ok(posts
            .into_iter()
            .take(limit)
            .map(|post| KudosPost {
                message_id: post.message_id.clone(),
                message: post.message.clone(),
                posted_by: post
                    .posted_by_user_id
                    .as_deref()
                    .and_then(|user_id| names.get(user_id))
                    .map(|name| name.to_string()),
                quarter: post.quarter,
                year: post.year,
                created_time: post.created_time,
            })
            .collect())
    }

    fn name(&self) -> &'static str {
        "in-memory"
    }
}

fn member(user_id: &str, name: &str, email: &str, active: bool) -> Member {
    Member {
        user_id: user_id.to_string(),
        display_name: Some(name.to_string()),
        email: Some(email.to_string()),
        is_active: Some(active),
    }
}

fn post(
    message_id: &str,
    posted_by: &str,
    message: &str,
    quarter: Quarter,
    year: i32,
    (month, day): (u32, u32),
) -> AppreciationPost {
    AppreciationPost {
        message_id: message_id.to_string(),
        posted_by_user_id: Some(posted_by.to_string()),
        message: Some(message.to_string()),
        quarter: Some(quarter),
        year: Some(year),
        created_time: Utc.with_ymd_and_hms(year, month, day, 15, 30, 0).single(),
    }
}

fn evaluation(
    message_id: &str,
    user_id: &str,
    scores: [Option<f64>; 4],
    final_score: f64,
) -> Evaluation {
    let [leadership, communication, management, problem_solving] = scores;
    Evaluation {
        message_id: message_id.to_string(),
        user_id: user_id.to_string(),
        leadership,
        communication,
        management,
        problem_solving,
        final_score: Some(final_score),
    }
}

/// A small team with recognition posts spread over three quarters.
pub fn sample_dataset() -> Dataset {
    let members = vec![
        member("U01AVERY", "Avery Lee", "avery.lee@kudoscorner.dev", true),
        member("U02JULES", "Jules Moreno", "jules.moreno@kudoscorner.dev", true),
        member("U03KIARA", "Kiara Patel", "kiara.patel@kudoscorner.dev", true),
        member("U04NOOR", "Noor Haddad", "noor.haddad@kudoscorner.dev", true),
        member("U05SAM", "Sam Okafor", "sam.okafor@kudoscorner.dev", false),
    ];

    let posts = vec![
        post(
            "1733160000.000100",
            "U02JULES",
            "Huge thanks to Avery for leading the incident review end to end",
            Quarter::Q4,
            2024,
            (12, 2),
        ),
        post(
            "1736950000.000200",
            "U01AVERY",
            "Kiara untangled the billing migration and kept everyone informed",
            Quarter::Q1,
            2025,
            (1, 15),
        ),
        post(
            "1739800000.000300",
            "U03KIARA",
            "Shout-out to Noor and Jules for the onboarding revamp",
            Quarter::Q1,
            2025,
            (2, 17),
        ),
        post(
            "1746100000.000400",
            "U04NOOR",
            "Avery mentored two new hires through their first release",
            Quarter::Q2,
            2025,
            (5, 1),
        ),
    ];

    let evaluations = vec![
        evaluation(
            "1733160000.000100",
            "U01AVERY",
            [Some(9.0), Some(8.0), Some(7.0), Some(8.0)],
            32.0,
        ),
        evaluation(
            "1736950000.000200",
            "U03KIARA",
            [Some(6.0), Some(9.0), Some(5.0), Some(10.0)],
            30.0,
        ),
        evaluation(
            "1739800000.000300",
            "U04NOOR",
            [Some(7.0), Some(8.0), Some(8.0), None],
            23.0,
        ),
        evaluation(
            "1739800000.000300",
            "U02JULES",
            [Some(5.0), Some(7.0), Some(6.0), Some(6.0)],
            24.0,
        ),
        evaluation(
            "1746100000.000400",
            "U01AVERY",
            [Some(10.0), Some(9.0), None, Some(7.0)],
            26.0,
        ),
    ];

    Dataset {
        members,
        posts,
        evaluations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_membership_list_matches_no_rows() {
        let store = InMemoryRecordStore::sample();
        let query = EvaluationQuery {
            user_id: None,
            message_ids: Some(Vec::new()),
        };
        assert!(store.evaluations(&query).await.unwrap().is_empty());

        let unrestricted = EvaluationQuery::default();
        assert_eq!(store.evaluations(&unrestricted).await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn years_are_distinct_and_newest_first() {
        let store = InMemoryRecordStore::sample();
        assert_eq!(store.available_years().await.unwrap(), vec![2025, 2024]);
    }

    #[tokio::test]
    async fn kudos_feed_is_newest_first_with_poster_names() {
        let store = InMemoryRecordStore::sample();
        let kudos = store
            .recent_kudos(&ScopeFilter::unrestricted(), 2)
            .await
            .unwrap();
        assert_eq!(kudos.len(), 2);
        assert_eq!(kudos[0].message_id, "1746100000.000400");
        assert_eq!(kudos[0].posted_by.as_deref(), Some("Noor Haddad"));
        assert_eq!(kudos[1].message_id, "1739800000.000300");
    }

    #[tokio::test]
    async fn injected_failures_are_scoped_to_the_member() {
        let store = InMemoryRecordStore::sample().failing_for("U02JULES");
        let scope = ResolvedScope::Unrestricted;
        assert!(store
            .evaluations(&EvaluationQuery::for_member("U02JULES", &scope))
            .await
            .is_err());
        assert!(store
            .evaluations(&EvaluationQuery::for_member("U01AVERY", &scope))
            .await
            .is_ok());
    }
}
