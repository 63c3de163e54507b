use std::time::Duration;

/// Per-query caching policy.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct QueryOptions {
    /// Data younger than this is served from cache without a fetch.
    pub stale_time: Duration,
    /// Unobserved entries are evicted after this long.
    pub cache_time: Duration,
    /// Disabled queries never fetch; they only report cached state.
    pub enabled: bool,
    pub refetch_on_focus: bool,
    pub refetch_interval: Option<Duration>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            stale_time: Duration::ZERO,
            cache_time: Duration::from_secs(5 * 60),
            enabled: true,
            refetch_on_focus: true,
            refetch_interval: None,
        }
    }
}

impl QueryOptions {
    pub fn stale_time(mut self, d: Duration) -> Self {
        self.stale_time = d;
        self
    }

    pub fn cache_time(mut self, d: Duration) -> Self {
        self.cache_time = d;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn refetch_on_focus(mut self, on: bool) -> Self {
        self.refetch_on_focus = on;
        self
    }

    pub fn refetch_interval(mut self, every: Option<Duration>) -> Self {
        self.refetch_interval = every.filter(|d| !d.is_zero());
        self
    }
}
