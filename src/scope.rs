use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ScopeError, StoreError};
use crate::models::{AppreciationPost, Quarter};
use crate::store::RecordStore;

/// Quarter sentinel meaning "no constraint on quarter".
pub const ALL_QUARTERS: &str = "All";

/// Quarter/year filter selected on the dashboard. `None` leaves a dimension
/// unconstrained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopeFilter {
    pub quarter: Option<Quarter>,
    pub year: Option<i32>,
}

impl ScopeFilter {
    pub fn unrestricted() -> Self {
        Self::default()
    }

    pub fn new(quarter: Option<Quarter>, year: Option<i32>) -> Self {
        Self {
            quarter,
            year: year.filter(|value| *value > 0),
        }
    }

    /// Accepts the raw dashboard inputs: `"All"`/absent quarter and `0`/absent
    /// year are unconstrained.
    pub fn parse(quarter: Option<&str>, year: Option<i64>) -> Result<Self, ScopeError> {
        let quarter = match quarter.map(str::trim) {
            None | Some("") => None,
            Some(raw) if raw.eq_ignore_ascii_case(ALL_QUARTERS) => None,
            Some(raw) => Some(raw.parse::<Quarter>()?),
        };

        let year = match year {
            None | Some(0) => None,
            Some(value) if value < 0 => return Err(ScopeError::InvalidYear(value)),
            Some(value) => Some(i32::try_from(value).map_err(|_| ScopeError::InvalidYear(value))?),
        };

        Ok(Self::new(quarter, year))
    }

    /// Year as sent in text form, e.g. `"2025"`. Blank is unconstrained.
    pub fn parse_year(raw: &str) -> Result<Option<i64>, ScopeError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(None);
        }
        raw.parse::<i64>()
            .map(Some)
            .map_err(|_| ScopeError::UnparsableYear(raw.to_string()))
    }

    pub fn is_unrestricted(&self) -> bool {
        self.quarter.is_none() && self.year.is_none()
    }

    pub fn matches(&self, post: &AppreciationPost) -> bool {
        let quarter_ok = self.quarter.map_or(true, |quarter| post.quarter == Some(quarter));
        let year_ok = self.year.map_or(true, |year| post.year == Some(year));
        quarter_ok && year_ok
    }

    pub fn label(&self) -> String {
        match (self.quarter, self.year) {
            (None, None) => "all time".to_string(),
            (Some(quarter), None) => format!("{quarter} of every year"),
            (None, Some(year)) => format!("all of {year}"),
            (Some(quarter), Some(year)) => format!("{quarter} {year}"),
        }
    }
}

/// The appreciation posts a filter maps to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedScope {
    Unrestricted,
    /// A constrained filter matched no posts.
    Empty,
    /// Never empty; an empty match is `Empty`.
    Messages(BTreeSet<String>),
}

impl ResolvedScope {
    pub fn from_ids<I>(ids: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let ids: BTreeSet<String> = ids.into_iter().collect();
        if ids.is_empty() {
            Self::Empty
        } else {
            Self::Messages(ids)
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    pub fn contains(&self, message_id: &str) -> bool {
        match self {
            Self::Unrestricted => true,
            Self::Empty => false,
            Self::Messages(ids) => ids.contains(message_id),
        }
    }

    /// Membership list for an `IN (...)` restriction; `None` when unrestricted.
    pub fn message_ids(&self) -> Option<Vec<String>> {
        match self {
            Self::Unrestricted => None,
            Self::Empty => Some(Vec::new()),
            Self::Messages(ids) => Some(ids.iter().cloned().collect()),
        }
    }
}

/// Narrow a filter to the appreciation posts it matches. Unrestricted filters
/// never touch the store.
pub async fn resolve(
    store: &dyn RecordStore,
    filter: &ScopeFilter,
) -> Result<ResolvedScope, StoreError> {
    if filter.is_unrestricted() {
        return Ok(ResolvedScope::Unrestricted);
    }

    let ids = store.appreciation_ids(filter).await?;
    let scope = ResolvedScope::from_ids(ids);
    debug!(
        filter = %filter.label(),
        empty = scope.is_empty(),
        "resolved appreciation scope"
    );
    Ok(scope)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryRecordStore;

    #[test]
    fn sentinels_mean_unconstrained() {
        assert!(ScopeFilter::parse(Some("All"), Some(0)).unwrap().is_unrestricted());
        assert!(ScopeFilter::parse(None, None).unwrap().is_unrestricted());
        assert!(ScopeFilter::parse(Some("all"), None).unwrap().is_unrestricted());
        assert!(ScopeFilter::new(None, Some(0)).is_unrestricted());
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert!(ScopeFilter::parse(Some("Q7"), None).is_err());
        assert!(ScopeFilter::parse(None, Some(-1)).is_err());
        assert!(ScopeFilter::parse(None, Some(i64::MAX)).is_err());
    }

    #[test]
    fn textual_years_parse_like_numbers() {
        assert_eq!(ScopeFilter::parse_year(" 2025 ").unwrap(), Some(2025));
        assert_eq!(ScopeFilter::parse_year("").unwrap(), None);
        assert!(matches!(
            ScopeFilter::parse_year("twenty"),
            Err(ScopeError::UnparsableYear(_))
        ));
    }

    #[test]
    fn empty_scope_contains_nothing() {
        let scope = ResolvedScope::from_ids(Vec::new());
        assert_eq!(scope, ResolvedScope::Empty);
        assert!(!scope.contains("m1"));
        assert_eq!(scope.message_ids(), Some(Vec::new()));
        assert!(ResolvedScope::Unrestricted.contains("m1"));
        assert_eq!(ResolvedScope::Unrestricted.message_ids(), None);
    }

    #[tokio::test]
    async fn unrestricted_filter_skips_the_store() {
        let store = InMemoryRecordStore::sample();
        let scope = resolve(&store, &ScopeFilter::unrestricted()).await.unwrap();
        assert_eq!(scope, ResolvedScope::Unrestricted);
        assert_eq!(store.appreciation_reads(), 0);
    }

    #[tokio::test]
    async fn quarter_and_year_are_anded() {
        let store = InMemoryRecordStore::sample();
        let filter = ScopeFilter::new(Some(Quarter::Q1), Some(2025));
        let scope = resolve(&store, &filter).await.unwrap();

        let ResolvedScope::Messages(ids) = scope else {
            panic!("expected matching messages");
        };
        let posts = store.posts();
        for id in &ids {
            let post = posts.iter().find(|post| &post.message_id == id).unwrap();
            assert_eq!(post.quarter, Some(Quarter::Q1));
            assert_eq!(post.year, Some(2025));
        }
        assert_eq!(store.appreciation_reads(), 1);
    }

    #[tokio::test]
    async fn unmatched_filter_resolves_empty() {
        let store = InMemoryRecordStore::sample();
        let filter = ScopeFilter::new(Some(Quarter::Q4), Some(1999));
        let scope = resolve(&store, &filter).await.unwrap();
        assert!(scope.is_empty());
    }
}
