use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::models::Quarter;
use crate::scope::ScopeFilter;

pub const DEFAULT_TTL: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_ENTRIES: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    TeamMetrics,
    MemberSummaries,
    SummaryCards,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub operation: Operation,
    pub quarter: Option<Quarter>,
    pub year: Option<i32>,
}

impl CacheKey {
    pub fn new(operation: Operation, filter: &ScopeFilter) -> Self {
        Self {
            operation,
            quarter: filter.quarter,
            year: filter.year,
        }
    }

    pub fn filter(&self) -> ScopeFilter {
        ScopeFilter::new(self.quarter, self.year)
    }
}

#[derive(Debug)]
struct Entry<V> {
    stored_at: Instant,
    value: V,
}

/// Results keyed by `(operation, quarter, year)`, each kept for at most
/// `ttl` and never more than `max_entries` at once.
///
/// A single caller may `select` the filter it is displaying. From then on
/// only that filter's results are stored, so the last request wins no matter
/// which response arrives last, and entries for the previous filter are
/// dropped. Without a selection every filter is current.
#[derive(Debug)]
pub struct QueryCache<V> {
    entries: HashMap<CacheKey, Entry<V>>,
    selected: Option<ScopeFilter>,
    ttl: Duration,
    max_entries: usize,
}

impl<V> Default for QueryCache<V> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            selected: None,
            ttl: DEFAULT_TTL,
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }
}

impl<V: Clone> QueryCache<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// A zero `ttl` disables caching.
    pub fn set_ttl(&mut self, ttl: Duration) {
        self.ttl = ttl;
        self.entries.clear();
    }

    pub fn set_max_entries(&mut self, max_entries: usize) {
        self.max_entries = max_entries.max(1);
        while self.entries.len() > self.max_entries {
            self.evict_oldest();
        }
    }

    /// Switch the displayed filter and drop entries cached for any other.
    pub fn select(&mut self, filter: ScopeFilter) {
        self.selected = Some(filter);
        self.entries.retain(|key, _| key.filter() == filter);
    }

    pub fn is_current(&self, filter: &ScopeFilter) -> bool {
        self.selected.map_or(true, |selected| selected == *filter)
    }

    pub fn get(&mut self, key: &CacheKey) -> Option<V> {
        let entry = self.entries.get(key)?;
        if entry.stored_at.elapsed() < self.ttl {
            return Some(entry.value.clone());
        }
        debug!(?key, "cached result expired");
        self.entries.remove(key);
        None
    }

    /// Returns `false` when the value was not kept: caching is disabled or
    /// `key` belongs to a filter other than the selected one.
    pub fn store(&mut self, key: CacheKey, value: V) -> bool {
        if self.ttl.is_zero() {
            return false;
        }
        if !self.is_current(&key.filter()) {
            debug!(?key, selected = ?self.selected, "discarding stale result");
            return false;
        }

        let ttl = self.ttl;
        self.entries.retain(|_, entry| entry.stored_at.elapsed() < ttl);
        if !self.entries.contains_key(&key) && self.entries.len() >= self.max_entries {
            self.evict_oldest();
        }
        self.entries.insert(
            key,
            Entry {
                stored_at: Instant::now(),
                value,
            },
        );
        true
    }

    /// Drop the entries for `filter`, returning how many were held.
    pub fn invalidate(&mut self, filter: &ScopeFilter) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| key.filter() != *filter);
        before - self.entries.len()
    }

    /// Drop every entry, returning how many were held.
    pub fn clear(&mut self) -> usize {
        let cleared = self.entries.len();
        self.entries.clear();
        cleared
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.stored_at)
            .map(|(key, _)| *key);
        if let Some(key) = oldest {
            debug!(?key, "cache full, evicting oldest result");
            self.entries.remove(&key);
        }
    }
}
