use std::collections::BTreeMap;
use std::sync::Arc;

use foundation::time::Millis;

use crate::key::QueryKey;
use crate::options::QueryOptions;
use crate::state::{QueryResult, QueryState, QueryStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    UnknownKey(QueryKey),
}

impl std::fmt::Display for CacheError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheError::UnknownKey(key) => write!(f, "unknown query key: {key}"),
        }
    }
}

impl std::error::Error for CacheError {}

#[derive(Debug)]
struct CacheEntry<T, E> {
    state: QueryState<T, E>,
    options: QueryOptions,
    observers: u32,
    unobserved_since: Option<Millis>,
    invalidated: bool,
}

/// Deterministic query cache: freshness, observers and garbage collection.
///
/// This type never fetches and never reads the clock; callers pass `now`.
/// Entries live in a `BTreeMap` so GC and refetch listings come out in key
/// order.
#[derive(Debug)]
pub struct QueryCache<T, E> {
    entries: BTreeMap<QueryKey, CacheEntry<T, E>>,
}

impl<T, E> Default for QueryCache<T, E> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<T, E: Clone> QueryCache<T, E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &QueryKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn state(&self, key: &QueryKey) -> Option<&QueryState<T, E>> {
        self.entries.get(key).map(|e| &e.state)
    }

    pub fn options(&self, key: &QueryKey) -> Option<QueryOptions> {
        self.entries.get(key).map(|e| e.options)
    }

    /// Snapshot for rendering; an unknown key reads as idle.
    pub fn result(&self, key: &QueryKey) -> QueryResult<T, E> {
        self.entries
            .get(key)
            .map(|e| e.state.result())
            .unwrap_or_else(QueryResult::idle)
    }

    /// Creates the entry on first use and records the latest options.
    pub fn ensure(&mut self, key: &QueryKey, options: QueryOptions, now: Millis) {
        let entry = self
            .entries
            .entry(key.clone())
            .or_insert_with(|| CacheEntry {
                state: QueryState::default(),
                options,
                observers: 0,
                unobserved_since: Some(now),
                invalidated: false,
            });
        entry.options = options;
    }

    pub fn is_fresh(&self, key: &QueryKey, now: Millis) -> bool {
        let Some(e) = self.entries.get(key) else {
            return false;
        };
        if e.invalidated || e.state.data.is_none() {
            return false;
        }
        match e.state.updated_at {
            Some(at) => now.saturating_since(at) < e.options.stale_time,
            None => false,
        }
    }

    /// Marks the entry stale so the next query refetches.
    pub fn invalidate(&mut self, key: &QueryKey) -> Result<(), CacheError> {
        let e = self.entry_mut(key)?;
        e.invalidated = true;
        Ok(())
    }

    pub fn begin_fetch(&mut self, key: &QueryKey) -> Result<(), CacheError> {
        let e = self.entry_mut(key)?;
        e.state.is_fetching = true;
        e.state.fetch_count = e.state.fetch_count.saturating_add(1);
        if e.state.data.is_none() {
            e.state.status = QueryStatus::Loading;
        }
        Ok(())
    }

    /// Records the outcome of a fetch. Errors keep the previous data.
    pub fn complete(
        &mut self,
        key: &QueryKey,
        outcome: Result<Arc<T>, E>,
        now: Millis,
    ) -> Result<(), CacheError> {
        let e = self.entry_mut(key)?;
        e.state.is_fetching = false;
        match outcome {
            Ok(data) => {
                e.state.data = Some(data);
                e.state.error = None;
                e.state.status = QueryStatus::Success;
                e.state.updated_at = Some(now);
                e.invalidated = false;
            }
            Err(err) => {
                e.state.error = Some(err);
                e.state.status = QueryStatus::Error;
            }
        }
        Ok(())
    }

    pub fn observe(&mut self, key: &QueryKey) -> Result<u32, CacheError> {
        let e = self.entry_mut(key)?;
        e.observers = e.observers.saturating_add(1);
        e.unobserved_since = None;
        Ok(e.observers)
    }

    pub fn release(&mut self, key: &QueryKey, now: Millis) -> Result<u32, CacheError> {
        let e = self.entry_mut(key)?;
        e.observers = e.observers.saturating_sub(1);
        if e.observers == 0 {
            e.unobserved_since = Some(now);
        }
        Ok(e.observers)
    }

    pub fn observer_count(&self, key: &QueryKey) -> u32 {
        self.entries.get(key).map(|e| e.observers).unwrap_or(0)
    }

    /// Evicts entries that have had no observers for their `cache_time`.
    /// In-flight entries are kept until they settle.
    pub fn gc(&mut self, now: Millis) -> Vec<QueryKey> {
        let expired: Vec<QueryKey> = self
            .entries
            .iter()
            .filter(|(_, e)| {
                e.observers == 0
                    && !e.state.is_fetching
                    && e.unobserved_since
                        .is_some_and(|since| now.saturating_since(since) >= e.options.cache_time)
            })
            .map(|(k, _)| k.clone())
            .collect();
        for k in &expired {
            self.entries.remove(k);
        }
        expired
    }

    /// Observed, enabled, stale entries that opted into focus refetching.
    pub fn keys_to_refetch_on_focus(&self, now: Millis) -> Vec<QueryKey> {
        self.entries
            .iter()
            .filter(|(k, e)| {
                e.observers > 0
                    && e.options.enabled
                    && e.options.refetch_on_focus
                    && !e.state.is_fetching
                    && !self.is_fresh(k, now)
            })
            .map(|(k, _)| k.clone())
            .collect()
    }

    fn entry_mut(&mut self, key: &QueryKey) -> Result<&mut CacheEntry<T, E>, CacheError> {
        self.entries
            .get_mut(key)
            .ok_or_else(|| CacheError::UnknownKey(key.clone()))
    }
}
