//! Team-wide metrics per evaluation dimension.
//!
//! Scores are the per-row average of a dimension scaled from the 0-10
//! evaluation range to 0-100. A missing dimension value contributes zero but
//! the row still counts toward the divisor.
//!
//! The aggregate is produced by an ordered list of strategies: the
//! server-side `get_team_metrics` function first, then a local recomputation
//! from raw reads. The first strategy to succeed wins.

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::{MetricsError, StoreError};
use crate::models::{CategoryPercentage, Dimension, Evaluation, MetricResult, TeamMetrics};
use crate::scope::{self, ResolvedScope, ScopeFilter};
use crate::store::{EvaluationQuery, RecordStore};

/// Scales a 0-10 average to a 0-100 percentage.
pub const PERCENTAGE_SCALE: f64 = 10.0;

pub fn zeroed() -> TeamMetrics {
    Dimension::ALL.map(|dimension| MetricResult::new(dimension, 0.0))
}

pub fn aggregate_rows(rows: &[Evaluation]) -> TeamMetrics {
    let count = rows.len();
    Dimension::ALL.map(|dimension| {
        let total: f64 = rows.iter().map(|row| row.score(dimension)).sum();
        MetricResult::new(dimension, to_percentage(total, count))
    })
}

fn to_percentage(total: f64, count: usize) -> f64 {
    if count == 0 {
        return 0.0;
    }
    round_to_cents(total / count as f64 * PERCENTAGE_SCALE)
}

fn round_to_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Aggregate the evaluations inside an already resolved scope. An empty scope
/// yields zeroed output without reading.
pub async fn aggregate_scope(
    store: &dyn RecordStore,
    scope: &ResolvedScope,
) -> Result<TeamMetrics, StoreError> {
    if scope.is_empty() {
        debug!("empty scope, skipping evaluations read");
        return Ok(zeroed());
    }

    let rows = store.evaluations(&EvaluationQuery::for_scope(scope)).await?;
    Ok(aggregate_rows(&rows))
}

pub fn to_category_percentages(metrics: &TeamMetrics) -> Vec<CategoryPercentage> {
    metrics
        .iter()
        .map(|metric| CategoryPercentage {
            category: metric.name.clone(),
            percentage: metric.score,
        })
        .collect()
}

/// Map a service response onto the fixed dimension order. Every dimension must
/// be present exactly once.
pub fn from_category_percentages(
    rows: Vec<CategoryPercentage>,
) -> Result<TeamMetrics, MetricsError> {
    let mut scores: [Option<f64>; 4] = [None; 4];

    for row in rows {
        let dimension = Dimension::from_label(&row.category).ok_or_else(|| {
            MetricsError::InvalidResponse(format!("unknown category '{}'", row.category))
        })?;
        if !row.percentage.is_finite() {
            return Err(MetricsError::InvalidResponse(format!(
                "non-finite percentage for {}",
                dimension.label()
            )));
        }
        let slot = &mut scores[dimension as usize];
        if slot.is_some() {
            return Err(MetricsError::InvalidResponse(format!(
                "duplicate category '{}'",
                dimension.label()
            )));
        }
        *slot = Some(row.percentage);
    }

    let mut missing = Vec::new();
    for dimension in Dimension::ALL {
        if scores[dimension as usize].is_none() {
            missing.push(dimension.label());
        }
    }
    if !missing.is_empty() {
        return Err(MetricsError::InvalidResponse(format!(
            "missing categories: {}",
            missing.join(", ")
        )));
    }

    Ok(Dimension::ALL.map(|dimension| {
        MetricResult::new(dimension, scores[dimension as usize].unwrap_or_default())
    }))
}

/// One way of producing team metrics for a filter.
#[async_trait]
pub trait MetricsStrategy: Send + Sync {
    async fn compute(
        &self,
        store: &dyn RecordStore,
        filter: &ScopeFilter,
    ) -> Result<TeamMetrics, MetricsError>;

    /// Strategy name for logging
    fn name(&self) -> &'static str;
}

/// Calls the `get_team_metrics` aggregate next to the data.
#[derive(Debug, Default, Clone, Copy)]
pub struct ServerAggregate;

#[async_trait]
impl MetricsStrategy for ServerAggregate {
    async fn compute(
        &self,
        store: &dyn RecordStore,
        filter: &ScopeFilter,
    ) -> Result<TeamMetrics, MetricsError> {
        let rows = store.team_metrics(filter).await?;
        from_category_percentages(rows)
    }

    fn name(&self) -> &'static str {
        "server-aggregate"
    }
}

/// Resolves the scope and aggregates raw evaluation rows in process.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalRecompute;

#[async_trait]
impl MetricsStrategy for LocalRecompute {
    async fn compute(
        &self,
        store: &dyn RecordStore,
        filter: &ScopeFilter,
    ) -> Result<TeamMetrics, MetricsError> {
        let scope = scope::resolve(store, filter).await?;
        Ok(aggregate_scope(store, &scope).await?)
    }

    fn name(&self) -> &'static str {
        "local-recompute"
    }
}

pub struct MetricsAggregator {
    strategies: Vec<Box<dyn MetricsStrategy>>,
}

impl Default for MetricsAggregator {
    fn default() -> Self {
        Self::new(vec![Box::new(ServerAggregate), Box::new(LocalRecompute)])
    }
}

impl MetricsAggregator {
    pub fn new(strategies: Vec<Box<dyn MetricsStrategy>>) -> Self {
        Self { strategies }
    }

    pub fn local_only() -> Self {
        Self::new(vec![Box::new(LocalRecompute)])
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|strategy| strategy.name()).collect()
    }

    /// Try each strategy in order. Fails with `DataUnavailable` only when all
    /// of them fail.
    pub async fn aggregate(
        &self,
        store: &dyn RecordStore,
        filter: &ScopeFilter,
    ) -> Result<TeamMetrics, MetricsError> {
        let mut last = String::from("no metrics strategy configured");

        for strategy in &self.strategies {
            match strategy.compute(store, filter).await {
                Ok(metrics) => {
                    debug!(
                        strategy = strategy.name(),
                        filter = %filter.label(),
                        "team metrics computed"
                    );
                    return Ok(metrics);
                }
                Err(err) => {
                    warn!(
                        strategy = strategy.name(),
                        filter = %filter.label(),
                        error = %err,
                        "team metrics strategy failed"
                    );
                    last = format!("{}: {err}", strategy.name());
                }
            }
        }

        Err(MetricsError::DataUnavailable {
            attempts: self.strategies.len(),
            last,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Quarter;
    use crate::store::InMemoryRecordStore;

    fn row(message_id: &str, leadership: Option<f64>) -> Evaluation {
        Evaluation {
            message_id: message_id.to_string(),
            user_id: "u1".to_string(),
            leadership,
            communication: None,
            management: None,
            problem_solving: None,
            final_score: None,
        }
    }

    fn names(metrics: &TeamMetrics) -> Vec<&str> {
        metrics.iter().map(|metric| metric.name.as_str()).collect()
    }

    #[test]
    fn dimensions_keep_fixed_order() {
        let expected = vec!["Leadership", "Communication", "Management", "Problem Solving"];
        assert_eq!(names(&aggregate_rows(&[])), expected);
        assert_eq!(names(&aggregate_rows(&[row("m1", Some(3.0))])), expected);
        assert_eq!(names(&zeroed()), expected);
        assert_eq!(aggregate_rows(&[])[3].color, "#f97316");
    }

    #[test]
    fn missing_values_still_count_toward_divisor() {
        let metrics = aggregate_rows(&[row("m1", Some(10.0)), row("m2", None)]);
        assert_eq!(metrics[0].score, 50.0);
        assert_eq!(metrics[1].score, 0.0);
    }

    #[test]
    fn percentages_round_to_two_places() {
        let rows = vec![row("m1", Some(7.0)), row("m2", Some(7.0)), row("m3", Some(6.0))];
        assert_eq!(aggregate_rows(&rows)[0].score, 66.67);
    }

    #[test]
    fn service_response_is_reordered() {
        let response = vec![
            CategoryPercentage {
                category: "Problem Solving".to_string(),
                percentage: 40.0,
            },
            CategoryPercentage {
                category: "Leadership".to_string(),
                percentage: 10.0,
            },
            CategoryPercentage {
                category: "Management".to_string(),
                percentage: 30.0,
            },
            CategoryPercentage {
                category: "Communication".to_string(),
                percentage: 20.0,
            },
        ];
        let metrics = from_category_percentages(response).unwrap();
        let scores: Vec<f64> = metrics.iter().map(|metric| metric.score).collect();
        assert_eq!(scores, vec![10.0, 20.0, 30.0, 40.0]);
        assert_eq!(metrics[1].color, "#8b5cf6");
    }

    #[test]
    fn incomplete_service_response_is_rejected() {
        let response = vec![CategoryPercentage {
            category: "Leadership".to_string(),
            percentage: 10.0,
        }];
        assert!(matches!(
            from_category_percentages(response),
            Err(MetricsError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn empty_scope_skips_the_read() {
        let store = InMemoryRecordStore::sample();
        let metrics = aggregate_scope(&store, &ResolvedScope::Empty).await.unwrap();
        assert!(metrics.iter().all(|metric| metric.score == 0.0));
        assert_eq!(store.evaluation_reads(), 0);
    }

    #[tokio::test]
    async fn unrestricted_equals_scope_of_every_post() {
        let store = InMemoryRecordStore::sample();
        let every = ResolvedScope::from_ids(
            store.posts().iter().map(|post| post.message_id.clone()),
        );
        let unrestricted = aggregate_scope(&store, &ResolvedScope::Unrestricted)
            .await
            .unwrap();
        let all = aggregate_scope(&store, &every).await.unwrap();
        assert_eq!(unrestricted, all);
    }

    #[tokio::test]
    async fn falls_back_to_local_recompute() {
        let store = InMemoryRecordStore::sample().with_team_metrics_failure("function offline");
        let filter = ScopeFilter::new(Some(Quarter::Q1), Some(2025));

        let metrics = MetricsAggregator::default()
            .aggregate(&store, &filter)
            .await
            .unwrap();

        assert_eq!(store.team_metrics_calls(), 1);
        assert_eq!(store.evaluation_reads(), 1);
        // Q1 2025 rows: leadership 6, 7, 5 over three rows.
        assert_eq!(metrics[0].score, 60.0);
    }

    #[tokio::test]
    async fn server_aggregate_short_circuits() {
        let store = InMemoryRecordStore::sample();
        let metrics = MetricsAggregator::default()
            .aggregate(&store, &ScopeFilter::unrestricted())
            .await
            .unwrap();

        assert_eq!(store.team_metrics_calls(), 1);
        assert_eq!(store.evaluation_reads(), 0);
        assert_eq!(metrics[0].score, 74.0);
    }

    #[tokio::test]
    async fn all_strategies_failing_is_data_unavailable() {
        let store = InMemoryRecordStore::sample().unavailable();
        let err = MetricsAggregator::default()
            .aggregate(&store, &ScopeFilter::unrestricted())
            .await
            .unwrap_err();
        assert!(matches!(err, MetricsError::DataUnavailable { attempts: 2, .. }));
    }
}
