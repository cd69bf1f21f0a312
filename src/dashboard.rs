use std::fmt::Display;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crate::cache::{CacheKey, Operation, QueryCache};
use crate::error::{DashboardError, MetricsError, StoreError};
use crate::leaderboard::{self, LeaderboardEntry, ScoreField, DEFAULT_LIMIT};
use crate::members::{self, MemberAggregation, MemberReadFailure};
use crate::metrics::MetricsAggregator;
use crate::models::{MemberSummary, TeamMetrics};
use crate::scope::{self, ScopeFilter};
use crate::store::RecordStore;
use crate::summary::{self, SummaryCard};

pub const DEFAULT_MAX_CONCURRENT_READS: usize = 8;

#[derive(Debug, Clone)]
enum CachedPanel {
    Metrics(TeamMetrics),
    Members(MemberAggregation),
    Cards(Vec<SummaryCard>),
}

/// A dashboard panel renders on its own; one failing panel does not blank the others.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Panel<T> {
    Ready { data: T },
    Unavailable { error: String },
}

impl<T> Panel<T> {
    fn from_result<E: Display>(result: Result<T, E>) -> Self {
        match result {
            Ok(data) => Panel::Ready { data },
            Err(err) => Panel::Unavailable {
                error: err.to_string(),
            },
        }
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            Panel::Ready { data } => Some(data),
            Panel::Unavailable { .. } => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Panel::Ready { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardSnapshot {
    pub filter: ScopeFilter,
    /// `false` when another filter was selected while this snapshot was loading.
    pub current: bool,
    pub summary_cards: Panel<Vec<SummaryCard>>,
    pub team_metrics: Panel<TeamMetrics>,
    pub leaderboard: Panel<Vec<LeaderboardEntry>>,
    pub members: Panel<Vec<MemberSummary>>,
    pub member_failures: Vec<MemberReadFailure>,
}

pub struct DashboardService {
    store: Arc<dyn RecordStore>,
    metrics: MetricsAggregator,
    max_concurrent_reads: usize,
    leaderboard_limit: usize,
    cache: Mutex<QueryCache<CachedPanel>>,
}

impl DashboardService {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            metrics: MetricsAggregator::default(),
            max_concurrent_reads: DEFAULT_MAX_CONCURRENT_READS,
            leaderboard_limit: DEFAULT_LIMIT,
            cache: Mutex::new(QueryCache::new()),
        }
    }

    pub fn with_metrics(mut self, metrics: MetricsAggregator) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_max_concurrent_reads(mut self, max_concurrent_reads: usize) -> Self {
        self.max_concurrent_reads = max_concurrent_reads.max(1);
        self
    }

    pub fn with_leaderboard_limit(mut self, limit: usize) -> Self {
        self.leaderboard_limit = limit.max(1);
        self
    }

    /// How long a panel result is reused. `Duration::ZERO` turns caching off.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .set_ttl(ttl);
        self
    }

    pub fn with_cache_capacity(mut self, max_entries: usize) -> Self {
        self.cache
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .set_max_entries(max_entries);
        self
    }

    pub fn store(&self) -> &dyn RecordStore {
        self.store.as_ref()
    }

    fn cache(&self) -> MutexGuard<'_, QueryCache<CachedPanel>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark `filter` as the one a single interactive caller is displaying.
    /// Results still in flight for a previous filter will not be cached and
    /// their snapshots are not current. Shared callers such as the HTTP
    /// service never select, so every filter stays current for them.
    pub fn select_filter(&self, filter: ScopeFilter) {
        self.cache().select(filter);
    }

    pub fn invalidate(&self, filter: &ScopeFilter) -> usize {
        self.cache().invalidate(filter)
    }

    /// Drop every cached panel, returning how many were held.
    pub fn clear_cache(&self) -> usize {
        self.cache().clear()
    }

    pub fn is_current(&self, filter: &ScopeFilter) -> bool {
        self.cache().is_current(filter)
    }

    fn cached(&self, operation: Operation, filter: &ScopeFilter) -> Option<CachedPanel> {
        self.cache().get(&CacheKey::new(operation, filter))
    }

    fn remember(&self, operation: Operation, filter: &ScopeFilter, value: CachedPanel) {
        self.cache().store(CacheKey::new(operation, filter), value);
    }

    pub async fn team_metrics(&self, filter: &ScopeFilter) -> Result<TeamMetrics, MetricsError> {
        if let Some(CachedPanel::Metrics(metrics)) = self.cached(Operation::TeamMetrics, filter) {
            return Ok(metrics);
        }

        let metrics = self.metrics.aggregate(self.store.as_ref(), filter).await?;
        self.remember(
            Operation::TeamMetrics,
            filter,
            CachedPanel::Metrics(metrics.clone()),
        );
        Ok(metrics)
    }

    pub async fn member_summaries(
        &self,
        filter: &ScopeFilter,
    ) -> Result<MemberAggregation, StoreError> {
        if let Some(CachedPanel::Members(aggregation)) =
            self.cached(Operation::MemberSummaries, filter)
        {
            return Ok(aggregation);
        }

        let team = self.store.members().await?;
        let scope = scope::resolve(self.store.as_ref(), filter).await?;
        let aggregation = members::aggregate_members(
            Arc::clone(&self.store),
            team,
            &scope,
            self.max_concurrent_reads,
        )
        .await;

        if !aggregation.failures.is_empty() {
            warn!(
                failed = aggregation.failures.len(),
                filter = %filter.label(),
                "member summaries degraded"
            );
        }

        self.remember(
            Operation::MemberSummaries,
            filter,
            CachedPanel::Members(aggregation.clone()),
        );
        Ok(aggregation)
    }

    pub async fn summary_cards(&self, filter: &ScopeFilter) -> Result<Vec<SummaryCard>, StoreError> {
        if let Some(CachedPanel::Cards(cards)) = self.cached(Operation::SummaryCards, filter) {
            return Ok(cards);
        }

        let (members, appreciations) = tokio::try_join!(
            self.store.count_members(),
            self.store.count_appreciations(filter)
        )?;
        let cards = summary::summary_cards(members, appreciations, filter);
        self.remember(
            Operation::SummaryCards,
            filter,
            CachedPanel::Cards(cards.clone()),
        );
        Ok(cards)
    }

    pub async fn leaderboard(
        &self,
        filter: &ScopeFilter,
        field: ScoreField,
        limit: Option<usize>,
    ) -> Result<Vec<LeaderboardEntry>, DashboardError> {
        let aggregation = self.member_summaries(filter).await?;
        let ranked = leaderboard::rank(
            &aggregation.summaries,
            field,
            limit.unwrap_or(self.leaderboard_limit),
        )?;
        Ok(leaderboard::leaderboard_entries(&ranked, field))
    }

    /// Load every panel for `filter` concurrently.
    pub async fn snapshot(&self, filter: &ScopeFilter) -> DashboardSnapshot {
        let (cards, metrics, members) = tokio::join!(
            self.summary_cards(filter),
            self.team_metrics(filter),
            self.member_summaries(filter),
        );

        let (leaderboard, members, member_failures) = match members {
            Ok(aggregation) => {
                let leaderboard = leaderboard::rank(
                    &aggregation.summaries,
                    ScoreField::default(),
                    self.leaderboard_limit,
                )
                .map(|ranked| leaderboard::leaderboard_entries(&ranked, ScoreField::default()));
                (
                    Panel::from_result(leaderboard),
                    Panel::Ready {
                        data: aggregation.summaries,
                    },
                    aggregation.failures,
                )
            }
            Err(err) => {
                let error = err.to_string();
                (
                    Panel::Unavailable {
                        error: error.clone(),
                    },
                    Panel::Unavailable { error },
                    Vec::new(),
                )
            }
        };

        let snapshot = DashboardSnapshot {
            filter: *filter,
            current: self.is_current(filter),
            summary_cards: Panel::from_result(cards),
            team_metrics: Panel::from_result(metrics),
            leaderboard,
            members,
            member_failures,
        };

        info!(
            filter = %filter.label(),
            current = snapshot.current,
            metrics_ready = snapshot.team_metrics.is_ready(),
            members_ready = snapshot.members.is_ready(),
            "dashboard snapshot loaded"
        );
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Quarter;
    use crate::store::InMemoryRecordStore;

    fn service(store: InMemoryRecordStore) -> (Arc<InMemoryRecordStore>, DashboardService) {
        let store = Arc::new(store);
        let handle: Arc<dyn RecordStore> = store.clone();
        (store, DashboardService::new(handle))
    }

    #[tokio::test]
    async fn repeated_requests_hit_the_cache() {
        let (store, dashboard) = service(InMemoryRecordStore::sample());
        let filter = ScopeFilter::unrestricted();

        dashboard.team_metrics(&filter).await.unwrap();
        dashboard.team_metrics(&filter).await.unwrap();
        assert_eq!(store.team_metrics_calls(), 1);

        dashboard.invalidate(&filter);
        dashboard.team_metrics(&filter).await.unwrap();
        assert_eq!(store.team_metrics_calls(), 2);
    }

    #[tokio::test]
    async fn results_for_a_deselected_filter_are_not_cached() {
        let (store, dashboard) = service(InMemoryRecordStore::sample());
        let q1 = ScopeFilter::new(Some(Quarter::Q1), Some(2025));
        dashboard.select_filter(q1);

        let stale = dashboard.snapshot(&ScopeFilter::unrestricted()).await;
        assert!(!stale.current);

        dashboard.team_metrics(&ScopeFilter::unrestricted()).await.unwrap();
        assert_eq!(store.team_metrics_calls(), 2);

        let fresh = dashboard.snapshot(&q1).await;
        assert!(fresh.current);
    }

    #[tokio::test]
    async fn panels_fail_independently() {
        let store = InMemoryRecordStore::sample().failing_for("U03KIARA");
        let (_, dashboard) = service(store);
        let snapshot = dashboard.snapshot(&ScopeFilter::unrestricted()).await;

        assert!(snapshot.summary_cards.is_ready());
        assert!(snapshot.team_metrics.is_ready());
        assert!(snapshot.members.is_ready());
        assert_eq!(snapshot.member_failures.len(), 1);
        assert_eq!(snapshot.member_failures[0].user_id, "U03KIARA");
    }

    #[tokio::test]
    async fn unavailable_store_marks_every_panel() {
        let (_, dashboard) = service(InMemoryRecordStore::sample().unavailable());
        let snapshot = dashboard.snapshot(&ScopeFilter::unrestricted()).await;

        assert!(!snapshot.summary_cards.is_ready());
        assert!(!snapshot.team_metrics.is_ready());
        assert!(!snapshot.leaderboard.is_ready());
        assert!(!snapshot.members.is_ready());
    }

    #[tokio::test]
    async fn leaderboard_ranks_total_score() {
        let (_, dashboard) = service(InMemoryRecordStore::sample());
        let entries = dashboard
            .leaderboard(&ScopeFilter::unrestricted(), ScoreField::TotalScore, Some(2))
            .await
            .unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id, "U01AVERY");
        assert_eq!(entries[0].points, 58);
        assert_eq!(entries[0].appreciation_posts, 2);
        assert_eq!(entries[1].id, "U03KIARA");
    }

    #[tokio::test]
    async fn without_a_selection_every_filter_is_current_and_cached() {
        let (store, dashboard) = service(InMemoryRecordStore::sample());
        let q1 = ScopeFilter::new(Some(Quarter::Q1), Some(2025));
        let year_2024 = ScopeFilter::new(None, Some(2024));

        assert!(dashboard.snapshot(&q1).await.current);
        assert!(dashboard.snapshot(&year_2024).await.current);
        assert!(dashboard.snapshot(&q1).await.current);
        assert_eq!(store.team_metrics_calls(), 2);
    }

    #[tokio::test]
    async fn zero_ttl_reads_through_on_every_call() {
        let (store, dashboard) = service(InMemoryRecordStore::sample());
        let dashboard = dashboard.with_cache_ttl(Duration::ZERO);
        let filter = ScopeFilter::unrestricted();

        dashboard.team_metrics(&filter).await.unwrap();
        dashboard.team_metrics(&filter).await.unwrap();
        assert_eq!(store.team_metrics_calls(), 2);
        assert_eq!(dashboard.clear_cache(), 0);
    }
}
