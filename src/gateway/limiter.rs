//! Sliding-window rate limiting for inbound chat requests.
//!
//! Per-client request timestamps within the trailing window, pruned lazily
//! on every check. This is a courtesy control, not a security boundary: a
//! caller who varies its client identifier bypasses it trivially, and all
//! state is lost on process restart.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::config::RateLimitConfig;

/// Time source for the limiter, injected so tests can step through the
/// window deterministically.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Production clock backed by [`Instant::now`].
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Per-client sliding-window request counter.
///
/// Owned by the gateway instance, never a module-level global; callers
/// serialize access (the HTTP layer wraps it in a mutex because axum
/// handlers run on a multi-threaded runtime).
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    clock: Box<dyn Clock>,
    windows: HashMap<String, VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self::with_clock(config, Box::new(SystemClock))
    }

    pub fn with_clock(config: RateLimitConfig, clock: Box<dyn Clock>) -> Self {
        Self {
            max_requests: config.max_requests,
            window: config.window,
            clock,
            windows: HashMap::new(),
        }
    }

    /// Decide whether a request from `client_id` is admitted.
    ///
    /// Expired timestamps are pruned first. A rejection does not mutate the
    /// window further; an admission appends the current timestamp.
    pub fn admit(&mut self, client_id: &str) -> bool {
        let now = self.clock.now();
        let window = self.windows.entry(client_id.to_string()).or_default();

        while let Some(&oldest) = window.front() {
            if now.duration_since(oldest) >= self.window {
                window.pop_front();
            } else {
                break;
            }
        }

        if window.len() >= self.max_requests {
            debug!(client_id, "rate limit exceeded");
            return false;
        }

        window.push_back(now);
        true
    }

    /// Number of clients currently tracked
    pub fn tracked_clients(&self) -> usize {
        self.windows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Test clock advanced manually.
    #[derive(Clone)]
    struct ManualClock {
        now: Arc<Mutex<Instant>>,
    }

    impl ManualClock {
        fn new() -> Self {
            Self {
                now: Arc::new(Mutex::new(Instant::now())),
            }
        }

        fn advance(&self, by: Duration) {
            let mut now = self.now.lock();
            *now += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            *self.now.lock()
        }
    }

    fn limiter(max_requests: usize, window_secs: u64) -> (RateLimiter, ManualClock) {
        let clock = ManualClock::new();
        let limiter = RateLimiter::with_clock(
            RateLimitConfig {
                max_requests,
                window: Duration::from_secs(window_secs),
            },
            Box::new(clock.clone()),
        );
        (limiter, clock)
    }

    #[test]
    fn test_rejects_above_threshold() {
        let (mut limiter, _clock) = limiter(20, 60);

        for _ in 0..20 {
            assert!(limiter.admit("10.0.0.1"));
        }
        assert!(!limiter.admit("10.0.0.1"));
    }

    #[test]
    fn test_admission_resumes_after_window() {
        let (mut limiter, clock) = limiter(3, 60);

        for _ in 0..3 {
            assert!(limiter.admit("10.0.0.1"));
        }
        assert!(!limiter.admit("10.0.0.1"));

        clock.advance(Duration::from_secs(61));
        assert!(limiter.admit("10.0.0.1"));
    }

    #[test]
    fn test_window_slides_per_timestamp() {
        let (mut limiter, clock) = limiter(2, 60);

        assert!(limiter.admit("c"));
        clock.advance(Duration::from_secs(40));
        assert!(limiter.admit("c"));
        assert!(!limiter.admit("c"));

        // First timestamp ages out, second is still inside the window
        clock.advance(Duration::from_secs(30));
        assert!(limiter.admit("c"));
        assert!(!limiter.admit("c"));
    }

    #[test]
    fn test_rejection_does_not_consume_quota() {
        let (mut limiter, clock) = limiter(2, 60);

        assert!(limiter.admit("c"));
        assert!(limiter.admit("c"));
        for _ in 0..10 {
            assert!(!limiter.admit("c"));
        }

        // Had the rejections been recorded, admission would not resume here
        clock.advance(Duration::from_secs(61));
        assert!(limiter.admit("c"));
    }

    #[test]
    fn test_clients_are_independent() {
        let (mut limiter, _clock) = limiter(1, 60);

        assert!(limiter.admit("a"));
        assert!(!limiter.admit("a"));
        assert!(limiter.admit("b"));
        assert_eq!(limiter.tracked_clients(), 2);
    }
}
