use std::thread;
use std::time::{Duration, Instant};

/// Fixed-period tick for consumers that poll snapshots.
///
/// Deadlines advance by whole periods; a consumer that falls behind skips the
/// missed ticks instead of firing them back to back.
#[derive(Debug)]
pub struct Ticker {
    period: Duration,
    next: Instant,
    count: u64,
}

impl Ticker {
    pub fn new(period: Duration) -> Self {
        Self::starting_at(period, Instant::now())
    }

    /// First tick fires one period after `start`.
    pub fn starting_at(period: Duration, start: Instant) -> Self {
        Ticker {
            period,
            next: start + period,
            count: 0,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Ticks delivered so far
    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn time_until_next(&self, now: Instant) -> Duration {
        self.next.saturating_duration_since(now)
    }

    /// Non-blocking: consume the tick if its deadline has passed.
    pub fn poll(&mut self, now: Instant) -> bool {
        if now < self.next {
            return false;
        }
        self.advance(now);
        true
    }

    /// Sleep until the next tick; returns its sequence number (starting at 1).
    pub fn wait(&mut self) -> u64 {
        let now = Instant::now();
        let remaining = self.time_until_next(now);
        if !remaining.is_zero() {
            thread::sleep(remaining);
        }
        self.advance(Instant::now());
        self.count
    }

    fn advance(&mut self, now: Instant) {
        self.count += 1;
        self.next += self.period;
        if self.next <= now {
            self.next = now + self.period;
        }
    }
}
