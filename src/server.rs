use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::dashboard::{DashboardService, DashboardSnapshot};
use crate::error::{AppError, ScopeError};
use crate::leaderboard::{LeaderboardEntry, ScoreField};
use crate::metrics;
use crate::models::CategoryPercentage;
use crate::scope::ScopeFilter;

type SharedDashboard = Arc<DashboardService>;

/// Body of the team-metrics function call. Absent fields are unconstrained.
#[derive(Debug, Default, Deserialize)]
pub struct TeamMetricsRequest {
    #[serde(default)]
    pub filter_quarter: Option<String>,
    #[serde(default)]
    pub filter_year: Option<YearValue>,
}

/// Callers send the year either as a number or as a numeric string.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum YearValue {
    Number(i64),
    Text(String),
}

impl YearValue {
    fn year(&self) -> Result<Option<i64>, ScopeError> {
        match self {
            YearValue::Number(value) => Ok(Some(*value)),
            YearValue::Text(raw) => ScopeFilter::parse_year(raw),
        }
    }
}

impl TeamMetricsRequest {
    /// An empty body means "no filter"; anything else must be a valid request.
    pub fn from_body(body: &[u8]) -> Result<Self, AppError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(body)
            .map_err(|err| AppError::BadRequest(format!("malformed team metrics body: {err}")))
    }

    fn filter(&self) -> Result<ScopeFilter, AppError> {
        let year = match &self.filter_year {
            Some(value) => value.year()?,
            None => None,
        };
        Ok(ScopeFilter::parse(self.filter_quarter.as_deref(), year)?)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct FilterParams {
    #[serde(default)]
    pub quarter: Option<String>,
    #[serde(default)]
    pub year: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LeaderboardParams {
    #[serde(default)]
    pub quarter: Option<String>,
    #[serde(default)]
    pub year: Option<i64>,
    #[serde(default)]
    pub by: Option<ScoreField>,
    #[serde(default)]
    pub limit: Option<usize>,
}

fn query_params<T>(query: Result<Query<T>, QueryRejection>) -> Result<T, AppError> {
    query
        .map(|Query(params)| params)
        .map_err(|rejection| AppError::BadRequest(rejection.body_text()))
}

pub fn router(dashboard: SharedDashboard) -> Router {
    Router::new()
        .route("/health", get(healthcheck))
        .route("/functions/v1/get_team_metrics", post(team_metrics_endpoint))
        .route("/api/dashboard", get(dashboard_endpoint))
        .route("/api/leaderboard", get(leaderboard_endpoint))
        .route("/api/years", get(years_endpoint))
        .route("/api/cache", delete(clear_cache_endpoint))
        .with_state(dashboard)
}

pub async fn serve(dashboard: SharedDashboard, addr: SocketAddr) -> Result<(), AppError> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, store = dashboard.store().name(), "kudos dashboard service ready");
    axum::serve(listener, router(dashboard)).await?;
    Ok(())
}

async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn team_metrics_endpoint(
    State(dashboard): State<SharedDashboard>,
    body: Bytes,
) -> Result<Json<Vec<CategoryPercentage>>, AppError> {
    let filter = TeamMetricsRequest::from_body(&body)?.filter()?;
    let team = dashboard.team_metrics(&filter).await?;
    Ok(Json(metrics::to_category_percentages(&team)))
}

// Requests from many clients share this service, so none of them selects a
// filter; every snapshot served here is current for its own request.
async fn dashboard_endpoint(
    State(dashboard): State<SharedDashboard>,
    query: Result<Query<FilterParams>, QueryRejection>,
) -> Result<Json<DashboardSnapshot>, AppError> {
    let params = query_params(query)?;
    let filter = ScopeFilter::parse(params.quarter.as_deref(), params.year)?;
    Ok(Json(dashboard.snapshot(&filter).await))
}

async fn leaderboard_endpoint(
    State(dashboard): State<SharedDashboard>,
    query: Result<Query<LeaderboardParams>, QueryRejection>,
) -> Result<Json<Vec<LeaderboardEntry>>, AppError> {
    let params = query_params(query)?;
    let filter = ScopeFilter::parse(params.quarter.as_deref(), params.year)?;
    let entries = dashboard
        .leaderboard(&filter, params.by.unwrap_or_default(), params.limit)
        .await
        .map_err(AppError::Dashboard)?;
    Ok(Json(entries))
}

async fn years_endpoint(
    State(dashboard): State<SharedDashboard>,
) -> Result<Json<Vec<i32>>, AppError> {
    let years = dashboard.store().available_years().await?;
    Ok(Json(years))
}

/// Without a quarter or year every cached panel is dropped.
async fn clear_cache_endpoint(
    State(dashboard): State<SharedDashboard>,
    query: Result<Query<FilterParams>, QueryRejection>,
) -> Result<Json<serde_json::Value>, AppError> {
    let params = query_params(query)?;
    let cleared = if params.quarter.is_none() && params.year.is_none() {
        dashboard.clear_cache()
    } else {
        let filter = ScopeFilter::parse(params.quarter.as_deref(), params.year)?;
        dashboard.invalidate(&filter)
    };
    info!(cleared, "dashboard cache cleared on request");
    Ok(Json(json!({ "cleared": cleared })))
}
