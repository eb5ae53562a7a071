//! Per-channel sliding-window rate limiting.
//!
//! A bucket holds the millisecond timestamps of admitted invocations within
//! the trailing minute. Denied attempts are never recorded.

/// Length of the sliding window in milliseconds.
pub const WINDOW_MS: i64 = 60_000;

/// The outcome of a rate-limit check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    /// Timestamps to keep for the next check
    pub next_times: Vec<i64>,
}

/// Apply the sliding window to `times` at `now`.
///
/// Timestamps older than `now - WINDOW_MS` are dropped. If what remains is
/// already at `max_per_minute` the attempt is denied without being recorded;
/// otherwise `now` is appended and the attempt admitted.
pub fn apply_window(times: &[i64], max_per_minute: u32, now: i64) -> RateDecision {
    let cutoff = now - WINDOW_MS;
    let mut next_times: Vec<i64> = times.iter().copied().filter(|t| *t >= cutoff).collect();

    if next_times.len() >= max_per_minute as usize {
        return RateDecision {
            allowed: false,
            next_times,
        };
    }

    next_times.push(now);
    RateDecision {
        allowed: true,
        next_times,
    }
}

/// Ordered admitted timestamps for one channel.
#[derive(Debug, Clone, Default)]
pub struct RateBucket {
    times: Vec<i64>,
}

impl RateBucket {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check and record an attempt at `now` (milliseconds).
    pub fn try_acquire(&mut self, max_per_minute: u32, now: i64) -> bool {
        let decision = apply_window(&self.times, max_per_minute, now);
        self.times = decision.next_times;
        decision.allowed
    }

    pub fn times(&self) -> &[i64] {
        &self.times
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }
}
