//! Pluggable gate deciding whether a line may be handed to the consumer.

use std::num::NonZeroU32;
use std::sync::PoisonError;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Controls the rate of emitted lines.
///
/// The poll loop calls [`allow`](RateLimiter::allow) once per line from a
/// single task. A `false` answer drops the line. [`close`](RateLimiter::close)
/// is called once when a run ends.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Says whether the next line should be sent to the consumer. May wait.
    async fn allow(&self) -> bool;

    /// Ends the current run. A pending `allow` returns `false`.
    fn close(&self);
}

/// Allows every line. Equivalent to configuring no limiter at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unlimited;

#[async_trait]
impl RateLimiter for Unlimited {
    async fn allow(&self) -> bool {
        true
    }

    fn close(&self) {}
}

/// Paces lines to a fixed number per second by waiting for a ticker.
///
/// The ticker is created on the first `allow` so the limiter can be built
/// outside of a runtime. A consumer slower than the tick rate does not earn a
/// burst of stored ticks.
///
/// `close` stops the ticker and releases a pending `allow`. The limiter is
/// re-armed by the next `allow`, so one limiter serves every run of a
/// [`Tailer`](crate::Tailer).
#[derive(Debug)]
pub struct TickRateLimiter {
    period: Duration,
    ticker: Mutex<Option<Interval>>,
    closed: std::sync::Mutex<CancellationToken>,
}

impl TickRateLimiter {
    /// Creates a limiter that lets `lines_per_second` lines through each second.
    pub fn new(lines_per_second: NonZeroU32) -> Self {
        Self::with_period(Duration::from_secs(1) / lines_per_second.get())
    }

    /// Creates a limiter that lets one line through per `period`.
    pub fn with_period(period: Duration) -> Self {
        Self {
            period: period.max(Duration::from_nanos(1)),
            ticker: Mutex::new(None),
            closed: std::sync::Mutex::new(CancellationToken::new()),
        }
    }

    /// Returns the wait between two allowed lines.
    pub fn period(&self) -> Duration {
        self.period
    }

    fn close_signal(&self) -> CancellationToken {
        self.closed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl RateLimiter for TickRateLimiter {
    /// Waits until the next tick.
    async fn allow(&self) -> bool {
        let closed = self.close_signal();

        let mut guard = self.ticker.lock().await;
        let ticker = guard.get_or_insert_with(|| {
            let mut ticker = tokio::time::interval_at(Instant::now() + self.period, self.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker
        });

        let allowed = tokio::select! {
            biased;
            _ = closed.cancelled() => false,
            _ = ticker.tick() => true,
        };
        if !allowed {
            *guard = None;
        }
        allowed
    }

    fn close(&self) {
        let stale = std::mem::replace(
            &mut *self.closed.lock().unwrap_or_else(PoisonError::into_inner),
            CancellationToken::new(),
        );
        stale.cancel();

        // A pending `allow` holds the ticker and drops it on its way out
        if let Ok(mut ticker) = self.ticker.try_lock() {
            *ticker = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_unlimited_always_allows() {
        let limiter = Unlimited;
        for _ in 0..100 {
            assert!(limiter.allow().await);
        }
        limiter.close();
        assert!(limiter.allow().await);
    }

    #[test]
    fn test_period_from_lines_per_second() {
        let limiter = TickRateLimiter::new(NonZeroU32::new(4).unwrap());
        assert_eq!(limiter.period(), Duration::from_millis(250));
    }

    #[test]
    fn test_zero_period_is_clamped() {
        let limiter = TickRateLimiter::with_period(Duration::ZERO);
        assert_eq!(limiter.period(), Duration::from_nanos(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_limiter_paces_lines() {
        let limiter = TickRateLimiter::new(NonZeroU32::new(30).unwrap());

        let start = Instant::now();
        for _ in 0..100 {
            assert!(limiter.allow().await);
        }
        let elapsed = start.elapsed();

        assert!(
            elapsed >= Duration::from_millis(3333) && elapsed <= Duration::from_millis(3500),
            "expected duration: ~3.33s, actual: {:?}",
            elapsed
        );
        limiter.close();
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_consumer_gets_no_burst() {
        let limiter = TickRateLimiter::with_period(Duration::from_millis(100));
        assert!(limiter.allow().await);

        // Stall for ten periods; at most one stored tick may be consumed at once.
        tokio::time::sleep(Duration::from_secs(1)).await;
        let start = Instant::now();
        for _ in 0..3 {
            assert!(limiter.allow().await);
        }
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_stops_ticker_and_next_allow_rearms() {
        let limiter = TickRateLimiter::with_period(Duration::from_millis(100));
        assert!(limiter.allow().await);
        limiter.close();
        assert!(limiter.ticker.lock().await.is_none());

        // A fresh ticker starts one period after re-arming
        let start = Instant::now();
        assert!(limiter.allow().await);
        assert!(limiter.allow().await);
        let elapsed = start.elapsed();
        assert!(
            elapsed >= Duration::from_millis(200) && elapsed < Duration::from_millis(210),
            "expected duration: ~200ms, actual: {:?}",
            elapsed
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_releases_pending_allow() {
        let limiter = Arc::new(TickRateLimiter::with_period(Duration::from_secs(3600)));

        let waiter = {
            let limiter = Arc::clone(&limiter);
            tokio::spawn(async move { limiter.allow().await })
        };

        tokio::task::yield_now().await;
        limiter.close();

        assert!(!waiter.await.unwrap());
        assert!(limiter.ticker.lock().await.is_none());
    }
}
