use crate::domain::model::{RateLimitDecision, RateLimitState};
use crate::domain::ports::{Clock, RateLimiter};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to. Used to pin window boundaries in tests.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += ChronoDuration::from_std(by).unwrap_or_else(|_| ChronoDuration::zero());
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = at;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Fixed-window request counter keyed by client identity.
///
/// Each client gets its own window, opened by its first request. The whole
/// check-rollover-increment sequence for a key runs under one lock, so
/// concurrent requests from the same client can never both take the last slot.
pub struct FixedWindowRateLimiter {
    window: ChronoDuration,
    max_requests: u32,
    clock: Arc<dyn Clock>,
    clients: Mutex<HashMap<String, RateLimitState>>,
}

impl FixedWindowRateLimiter {
    pub fn new(window: Duration, max_requests: u32, clock: Arc<dyn Clock>) -> Self {
        Self {
            window: ChronoDuration::from_std(window).unwrap_or_else(|_| ChronoDuration::MAX),
            max_requests,
            clock,
            clients: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_system_clock(window: Duration, max_requests: u32) -> Self {
        Self::new(window, max_requests, Arc::new(SystemClock))
    }

    fn window_end(&self, start: DateTime<Utc>) -> DateTime<Utc> {
        start
            .checked_add_signed(self.window)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Drops every client whose window has elapsed. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        let before = clients.len();
        clients.retain(|_, state| now < self.window_end(state.window_start));
        before - clients.len()
    }

    pub fn tracked_clients(&self) -> usize {
        self.clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn state_of(&self, client: &str) -> Option<RateLimitState> {
        self.clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(client)
            .copied()
    }
}

impl RateLimiter for FixedWindowRateLimiter {
    fn check(&self, client: &str) -> RateLimitDecision {
        let now = self.clock.now();
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);

        let state = clients
            .entry(client.to_string())
            .or_insert(RateLimitState {
                count: 0,
                window_start: now,
            });

        // Rollover happens before counting: a request landing exactly on the
        // boundary belongs to the new window.
        if now >= self.window_end(state.window_start) {
            *state = RateLimitState {
                count: 0,
                window_start: now,
            };
        }

        let reset_at = self.window_end(state.window_start);

        if state.count >= self.max_requests {
            return RateLimitDecision {
                allowed: false,
                limit: self.max_requests,
                remaining: 0,
                reset_at,
            };
        }

        state.count += 1;
        RateLimitDecision {
            allowed: true,
            limit: self.max_requests,
            remaining: self.max_requests - state.count,
            reset_at,
        }
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

/// Periodically removes expired client entries until the process exits.
pub async fn run_purge_task(limiter: Arc<FixedWindowRateLimiter>, every: Duration) {
    let mut interval_timer = tokio::time::interval(every);
    tracing::info!("Starting rate limit purge task with {:?} interval", every);

    loop {
        interval_timer.tick().await;
        let removed = limiter.purge_expired();
        if removed > 0 {
            tracing::debug!("Purged {} expired rate limit entries", removed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const HOUR: Duration = Duration::from_secs(3600);

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap()
    }

    fn limiter(max: u32) -> (FixedWindowRateLimiter, ManualClock) {
        let clock = ManualClock::new(start());
        let limiter = FixedWindowRateLimiter::new(HOUR, max, Arc::new(clock.clone()));
        (limiter, clock)
    }

    #[test]
    fn test_allows_up_to_ceiling_then_rejects() {
        let (limiter, _clock) = limiter(3);

        for expected_remaining in [2, 1, 0] {
            let decision = limiter.check("1.2.3.4");
            assert!(decision.allowed);
            assert_eq!(decision.remaining, expected_remaining);
        }

        let decision = limiter.check("1.2.3.4");
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);
        assert_eq!(decision.limit, 3);
        assert_eq!(decision.reset_at, start() + ChronoDuration::hours(1));
    }

    #[test]
    fn test_rejected_requests_do_not_extend_the_count() {
        let (limiter, _clock) = limiter(1);
        assert!(limiter.check("a").allowed);
        for _ in 0..5 {
            assert!(!limiter.check("a").allowed);
        }
        assert_eq!(limiter.state_of("a").unwrap().count, 1);
    }

    #[test]
    fn test_clients_are_counted_independently() {
        let (limiter, _clock) = limiter(1);
        assert!(limiter.check("10.0.0.1").allowed);
        assert!(!limiter.check("10.0.0.1").allowed);
        assert!(limiter.check("10.0.0.2").allowed);
        assert_eq!(limiter.tracked_clients(), 2);
    }

    #[test]
    fn test_window_resets_after_elapsing() {
        let (limiter, clock) = limiter(2);
        assert!(limiter.check("a").allowed);
        assert!(limiter.check("a").allowed);
        assert!(!limiter.check("a").allowed);

        clock.advance(HOUR + Duration::from_secs(1));

        let decision = limiter.check("a");
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 1);
        assert_eq!(limiter.state_of("a").unwrap().count, 1);
    }

    #[test]
    fn test_request_one_instant_before_boundary_uses_old_window() {
        let (limiter, clock) = limiter(1);
        assert!(limiter.check("a").allowed);

        clock.set(start() + ChronoDuration::hours(1) - ChronoDuration::milliseconds(1));
        assert!(!limiter.check("a").allowed);
    }

    #[test]
    fn test_request_exactly_at_boundary_uses_new_window() {
        let (limiter, clock) = limiter(1);
        assert!(limiter.check("a").allowed);

        clock.set(start() + ChronoDuration::hours(1));
        let decision = limiter.check("a");

        assert!(decision.allowed);
        assert_eq!(
            limiter.state_of("a").unwrap().window_start,
            start() + ChronoDuration::hours(1)
        );
        assert_eq!(decision.reset_at, start() + ChronoDuration::hours(2));
    }

    #[test]
    fn test_window_starts_at_first_request_per_client() {
        let (limiter, clock) = limiter(1);
        assert!(limiter.check("early").allowed);

        clock.advance(Duration::from_secs(1800));
        assert!(limiter.check("late").allowed);

        clock.advance(Duration::from_secs(1800));
        assert!(limiter.check("early").allowed);
        assert!(!limiter.check("late").allowed);
    }

    #[test]
    fn test_purge_expired_removes_only_elapsed_windows() {
        let (limiter, clock) = limiter(5);
        limiter.check("old");
        clock.advance(Duration::from_secs(3000));
        limiter.check("recent");
        clock.advance(Duration::from_secs(600));

        assert_eq!(limiter.purge_expired(), 1);
        assert!(limiter.state_of("old").is_none());
        assert!(limiter.state_of("recent").is_some());
    }

    #[test]
    fn test_retry_after_counts_down_to_reset() {
        let (limiter, clock) = limiter(1);
        limiter.check("a");
        clock.advance(Duration::from_secs(600));
        let decision = limiter.check("a");
        assert_eq!(decision.retry_after_secs(limiter.now()), 3000);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_checks_never_exceed_ceiling() {
        let (limiter, _clock) = limiter(10);
        let limiter = Arc::new(limiter);

        let handles: Vec<_> = (0..25)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move { limiter.check("203.0.113.7").allowed })
            })
            .collect();

        let mut allowed = 0;
        for handle in handles {
            if handle.await.unwrap() {
                allowed += 1;
            }
        }

        assert_eq!(allowed, 10);
        assert_eq!(limiter.state_of("203.0.113.7").unwrap().count, 10);
    }
}
