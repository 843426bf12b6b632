//! Measurement staleness tracking.

use core::time::Duration;

/// Monotonic time source.
///
/// The returned value only has to increase, its epoch is arbitrary.
pub trait Clock {
    /// Time elapsed since an arbitrary, fixed epoch.
    fn now(&mut self) -> Duration;
}

/// Monotonic clock backed by [`std::time::Instant`].
#[cfg(feature = "std")]
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    epoch: std::time::Instant,
}

#[cfg(feature = "std")]
impl MonotonicClock {
    /// Create a new clock with the current instant as the epoch.
    pub fn new() -> Self {
        Self {
            epoch: std::time::Instant::now(),
        }
    }
}

#[cfg(feature = "std")]
impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "std")]
impl Clock for MonotonicClock {
    fn now(&mut self) -> Duration {
        self.epoch.elapsed()
    }
}

/// Staleness flag with a one-shot refresh timer.
///
/// Values start out stale.
/// A successful read marks them fresh and arms the timer if it is not already
/// running; once the refresh interval has elapsed the values turn stale and the
/// timer disarms itself until the next successful read.
///
/// # Example
///
/// ```
/// use bme280_mux::cache::Staleness;
/// use core::time::Duration;
///
/// let mut cache = Staleness::new(Duration::from_secs(10));
/// assert!(cache.is_stale(Duration::ZERO));
///
/// cache.mark_fresh(Duration::ZERO);
/// assert!(!cache.is_stale(Duration::from_secs(9)));
/// assert!(cache.is_stale(Duration::from_secs(10)));
/// assert!(!cache.is_armed());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Staleness {
    refresh: Duration,
    deadline: Option<Duration>,
    stale: bool,
}

impl Staleness {
    /// Create a new, stale cache with the given refresh interval.
    pub const fn new(refresh: Duration) -> Self {
        Self {
            refresh,
            deadline: None,
            stale: true,
        }
    }

    /// Refresh interval.
    pub const fn refresh(&self) -> Duration {
        self.refresh
    }

    /// Returns `true` when the refresh timer is running.
    pub const fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Returns `true` if the cached values must be re-read at `now`.
    ///
    /// Fires the refresh timer when its deadline has passed.
    pub fn is_stale(&mut self, now: Duration) -> bool {
        if let Some(deadline) = self.deadline {
            if now >= deadline {
                self.stale = true;
                self.deadline = None;
            }
        }
        self.stale
    }

    /// Mark the values fresh after a successful read at `now`.
    ///
    /// A timer that is already running keeps its original deadline.
    pub fn mark_fresh(&mut self, now: Duration) {
        self.stale = false;
        if self.deadline.is_none() {
            self.deadline = Some(now.saturating_add(self.refresh));
        }
    }

    /// Force the values stale and disarm the timer.
    pub fn invalidate(&mut self) {
        self.stale = true;
        self.deadline = None;
    }
}
