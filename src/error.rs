use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::config::ConfigError;
use crate::telemetry::TelemetryError;

/// A read against the record store did not complete.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read {table}: {source}")]
    ReadFailed {
        table: &'static str,
        #[source]
        source: sqlx::Error,
    },
    #[error("record store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum ScopeError {
    #[error("quarter must be one of Q1, Q2, Q3, Q4 or All (got '{0}')")]
    InvalidQuarter(String),
    #[error("year must be a non-negative integer (got {0})")]
    InvalidYear(i64),
    #[error("year must be a whole number (got '{0}')")]
    UnparsableYear(String),
}

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error(transparent)]
    Read(#[from] StoreError),
    #[error("unusable aggregate response: {0}")]
    InvalidResponse(String),
    #[error("team metrics unavailable after {attempts} attempt(s): {last}")]
    DataUnavailable { attempts: usize, last: String },
}

#[derive(Debug, Error)]
pub enum LeaderboardError {
    #[error("leaderboard limit must be a positive integer")]
    InvalidLimit,
}

#[derive(Debug, Error)]
pub enum DashboardError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Metrics(#[from] MetricsError),
    #[error(transparent)]
    Leaderboard(#[from] LeaderboardError),
}

/// Errors surfaced by the binary and the HTTP boundary.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("invalid filter: {0}")]
    Filter(#[from] ScopeError),
    #[error("{0}")]
    Dashboard(#[from] DashboardError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid request: {0}")]
    BadRequest(String),
}

impl From<MetricsError> for AppError {
    fn from(value: MetricsError) -> Self {
        Self::Dashboard(DashboardError::Metrics(value))
    }
}

impl From<StoreError> for AppError {
    fn from(value: StoreError) -> Self {
        Self::Dashboard(DashboardError::Store(value))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::Filter(_)
            | AppError::BadRequest(_)
            | AppError::Dashboard(DashboardError::Leaderboard(_)) => StatusCode::BAD_REQUEST,
            AppError::Config(_)
            | AppError::Telemetry(_)
            | AppError::Dashboard(_)
            | AppError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}
