use std::sync::Arc;

use foundation::time::Millis;

/// Lifecycle of a cached dataset.
///
/// Idle → Loading → Success | Error. A refetch moves back through Loading
/// while keeping the previous data.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum QueryStatus {
    Idle,
    Loading,
    Success,
    Error,
}

/// Envelope around one dataset's fetch lifecycle.
#[derive(Debug)]
pub struct QueryState<T, E> {
    pub status: QueryStatus,
    pub data: Option<Arc<T>>,
    pub error: Option<E>,
    /// When `data` was last replaced. Drives staleness.
    pub updated_at: Option<Millis>,
    pub is_fetching: bool,
    pub fetch_count: u32,
}

impl<T, E> Default for QueryState<T, E> {
    fn default() -> Self {
        Self {
            status: QueryStatus::Idle,
            data: None,
            error: None,
            updated_at: None,
            is_fetching: false,
            fetch_count: 0,
        }
    }
}

impl<T, E: Clone> QueryState<T, E> {
    pub fn result(&self) -> QueryResult<T, E> {
        QueryResult {
            data: self.data.clone(),
            status: self.status,
            is_loading: self.is_fetching && self.data.is_none(),
            is_fetching: self.is_fetching,
            is_error: self.status == QueryStatus::Error,
            error: self.error.clone(),
            updated_at: self.updated_at,
        }
    }
}

/// What a consuming component sees.
///
/// On error the last good `data` is still present; the consumer chooses
/// between rendering stale data and an error message.
#[derive(Debug)]
pub struct QueryResult<T, E> {
    pub data: Option<Arc<T>>,
    pub status: QueryStatus,
    pub is_loading: bool,
    pub is_fetching: bool,
    pub is_error: bool,
    pub error: Option<E>,
    pub updated_at: Option<Millis>,
}

impl<T, E: Clone> Clone for QueryResult<T, E> {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            status: self.status,
            is_loading: self.is_loading,
            is_fetching: self.is_fetching,
            is_error: self.is_error,
            error: self.error.clone(),
            updated_at: self.updated_at,
        }
    }
}

impl<T, E> QueryResult<T, E> {
    pub fn idle() -> Self {
        Self {
            data: None,
            status: QueryStatus::Idle,
            is_loading: false,
            is_fetching: false,
            is_error: false,
            error: None,
            updated_at: None,
        }
    }

    pub fn data(&self) -> Option<&T> {
        self.data.as_deref()
    }
}
