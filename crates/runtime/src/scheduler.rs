use std::collections::BTreeMap;
use std::time::Duration;

use foundation::time::Millis;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
struct Interval {
    period: Duration,
    next_due: Millis,
}

/// Deterministic interval timers keyed by `K`.
///
/// Used for auto-refresh polling. The scheduler never sleeps; the owner asks
/// which keys are due at a given instant and the scheduler advances them.
///
/// Ordering contract: `due` yields keys ordered by `(next_due, key)`.
#[derive(Debug)]
pub struct IntervalScheduler<K: Ord + Clone> {
    intervals: BTreeMap<K, Interval>,
}

impl<K: Ord + Clone> Default for IntervalScheduler<K> {
    fn default() -> Self {
        Self {
            intervals: BTreeMap::new(),
        }
    }
}

impl<K: Ord + Clone> IntervalScheduler<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers or re-arms `key`. A zero period is ignored.
    pub fn schedule(&mut self, key: K, period: Duration, now: Millis) {
        if period.is_zero() {
            return;
        }
        self.intervals.insert(
            key,
            Interval {
                period,
                next_due: now.plus(period),
            },
        );
    }

    /// Returns `true` if a timer was registered for `key`.
    pub fn cancel(&mut self, key: &K) -> bool {
        self.intervals.remove(key).is_some()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.intervals.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    pub fn next_due(&self) -> Option<Millis> {
        self.intervals.values().map(|i| i.next_due).min()
    }

    /// Returns every key due at `now` and re-arms it one period after `now`.
    ///
    /// Missed ticks collapse into one: a timer that is several periods late
    /// fires once.
    pub fn due(&mut self, now: Millis) -> Vec<K> {
        let mut fired: Vec<(Millis, K)> = self
            .intervals
            .iter()
            .filter(|(_, i)| i.next_due <= now)
            .map(|(k, i)| (i.next_due, k.clone()))
            .collect();
        fired.sort();

        for (_, key) in &fired {
            if let Some(i) = self.intervals.get_mut(key) {
                i.next_due = now.plus(i.period);
            }
        }
        fired.into_iter().map(|(_, k)| k).collect()
    }
}
