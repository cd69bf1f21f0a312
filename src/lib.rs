//! Recognition analytics for the Kudos Corner dashboard.
//!
//! Appreciation posts are tagged with a quarter and year; every evaluation of
//! a member's contribution to a post scores four fixed dimensions. This crate
//! resolves a quarter/year filter to the matching posts, aggregates the
//! evaluations inside that scope into team metrics, per-member summaries and
//! a leaderboard, and serves the results as view models.

pub mod cache;
pub mod config;
pub mod dashboard;
pub mod db;
pub mod error;
pub mod leaderboard;
pub mod members;
pub mod metrics;
pub mod models;
pub mod report;
pub mod scope;
pub mod server;
pub mod store;
pub mod summary;
pub mod table;
pub mod telemetry;

pub use dashboard::{DashboardService, DashboardSnapshot, Panel};
pub use error::{AppError, DashboardError, MetricsError, StoreError};
pub use scope::{ResolvedScope, ScopeFilter};
pub use store::{InMemoryRecordStore, RecordStore};
