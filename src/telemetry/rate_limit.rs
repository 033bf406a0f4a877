// src/telemetry/rate_limit.rs
// Per-vendor hourly token bucket (design doc §4.4, §5). A `governor`-based
// limiter does not expose remaining-token introspection, and
// `PollerHealth.requests_this_hour` needs exactly that, so this bucket is
// hand-rolled with the mutex-protected, sleep-releases-the-lock shape
// described in §5.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use std::time::Duration;

struct BucketState {
    remaining: u32,
    hour_start: DateTime<Utc>,
    requests_this_hour: u32,
}

pub struct HourlyBucket {
    capacity: u32,
    state: Mutex<BucketState>,
}

impl HourlyBucket {
    pub fn new(capacity: u32) -> Self {
        Self {
            capacity,
            state: Mutex::new(BucketState {
                remaining: capacity,
                hour_start: Utc::now(),
                requests_this_hour: 0,
            }),
        }
    }

    fn roll_if_needed(state: &mut BucketState, capacity: u32) {
        if Utc::now() - state.hour_start >= ChronoDuration::hours(1) {
            state.remaining = capacity;
            state.requests_this_hour = 0;
            state.hour_start = Utc::now();
        }
    }

    /// Attempt to consume one token. Returns false if the hourly budget is
    /// exhausted.
    pub fn try_consume(&self) -> bool {
        let mut state = self.state.lock();
        Self::roll_if_needed(&mut state, self.capacity);
        if state.remaining == 0 {
            return false;
        }
        state.remaining -= 1;
        state.requests_this_hour += 1;
        true
    }

    /// Called on an upstream 429: zero out the remaining budget so the
    /// poller sleeps to the hour boundary (design doc §4.4).
    pub fn force_exhausted(&self) {
        let mut state = self.state.lock();
        Self::roll_if_needed(&mut state, self.capacity);
        state.remaining = 0;
    }

    pub fn tokens_remaining(&self) -> u32 {
        let mut state = self.state.lock();
        Self::roll_if_needed(&mut state, self.capacity);
        state.remaining
    }

    pub fn requests_this_hour(&self) -> u32 {
        let mut state = self.state.lock();
        Self::roll_if_needed(&mut state, self.capacity);
        state.requests_this_hour
    }

    /// Duration until the bucket refills. Caller releases the lock while
    /// sleeping (it only ever holds it inside the short methods above).
    pub fn time_until_refill(&self) -> Duration {
        let state = self.state.lock();
        let elapsed = Utc::now() - state.hour_start;
        let remaining = ChronoDuration::hours(1) - elapsed;
        remaining.to_std().unwrap_or(Duration::from_secs(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consumes_down_to_zero_then_refuses() {
        let bucket = HourlyBucket::new(2);
        assert!(bucket.try_consume());
        assert!(bucket.try_consume());
        assert!(!bucket.try_consume());
        assert_eq!(bucket.requests_this_hour(), 2);
    }

    #[test]
    fn force_exhausted_blocks_further_consumption() {
        let bucket = HourlyBucket::new(10);
        bucket.force_exhausted();
        assert!(!bucket.try_consume());
        assert_eq!(bucket.tokens_remaining(), 0);
    }
}
