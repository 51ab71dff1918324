//! Tailer configuration.

use std::fmt;
use std::io::SeekFrom;
use std::sync::Arc;
use std::time::Duration;

use crate::rate_limiter::RateLimiter;

/// Default poll timeout used when the file is fully read.
const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(10);

/// Default initial capacity of the line reader buffer.
const DEFAULT_BUFFER_SIZE: usize = 4096;

/// Default interval between lag updates.
const DEFAULT_LAG_INTERVAL: Duration = Duration::from_secs(5);

/// Options consumed once when a [`Tailer`](crate::Tailer) is built.
///
/// Start from [`Options::default`] and override what you need; a later call
/// of the same `with_*` method replaces the earlier value.
///
/// ```
/// use std::io::SeekFrom;
/// use std::time::Duration;
/// use log_tailer::Options;
///
/// let options = Options::default()
///     .with_seek_on_startup(SeekFrom::Start(0))
///     .with_poll_timeout(Duration::from_millis(20));
/// ```
#[derive(Clone)]
pub struct Options {
    pub(crate) startup_seek: SeekFrom,
    pub(crate) reopen_seek: SeekFrom,
    pub(crate) buffer_size: usize,
    pub(crate) poll_timeout: Duration,
    pub(crate) lag_interval: Duration,
    pub(crate) rate_limiter: Option<Arc<dyn RateLimiter>>,
    pub(crate) leaky_bucket: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            startup_seek: SeekFrom::End(0),
            reopen_seek: SeekFrom::Start(0),
            buffer_size: DEFAULT_BUFFER_SIZE,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            lag_interval: DEFAULT_LAG_INTERVAL,
            rate_limiter: None,
            leaky_bucket: false,
        }
    }
}

impl Options {
    /// Where to put the cursor when the file is opened by `run`.
    /// The cursor is then moved back to the start of that line.
    pub fn with_seek_on_startup(mut self, pos: SeekFrom) -> Self {
        self.startup_seek = pos;
        self
    }

    /// Where to put the cursor when the file is reopened after logrotate.
    pub fn with_seek_on_reopen(mut self, pos: SeekFrom) -> Self {
        self.reopen_seek = pos;
        self
    }

    /// Initial capacity of the line reader buffer.
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size.max(1);
        self
    }

    /// Base wait used when the file is fully read. Waits double from here.
    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    /// How often the lag is updated. Frequent updates cost more syscalls.
    pub fn with_lag_interval(mut self, interval: Duration) -> Self {
        self.lag_interval = interval;
        self
    }

    /// Gate every line through `limiter` before it is sent.
    pub fn with_rate_limiter(mut self, limiter: impl RateLimiter + 'static) -> Self {
        self.rate_limiter = Some(Arc::new(limiter));
        self
    }

    /// Drop lines instead of waiting when the consumer is not ready.
    pub fn with_leaky_bucket(mut self) -> Self {
        self.leaky_bucket = true;
        self
    }

    /// Returns the position requested on startup.
    pub fn startup_seek(&self) -> SeekFrom {
        self.startup_seek
    }

    /// Returns the position requested after logrotate.
    pub fn reopen_seek(&self) -> SeekFrom {
        self.reopen_seek
    }

    /// Returns the initial reader buffer capacity.
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Returns the base wait used when the file is fully read.
    pub fn poll_timeout(&self) -> Duration {
        self.poll_timeout
    }

    /// Returns how often the lag is updated.
    pub fn lag_interval(&self) -> Duration {
        self.lag_interval
    }

    /// Returns `true` if lines go through a rate limiter.
    pub fn has_rate_limiter(&self) -> bool {
        self.rate_limiter.is_some()
    }

    /// Returns `true` if lines are dropped for a busy consumer.
    pub fn is_leaky_bucket(&self) -> bool {
        self.leaky_bucket
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("startup_seek", &self.startup_seek)
            .field("reopen_seek", &self.reopen_seek)
            .field("buffer_size", &self.buffer_size)
            .field("poll_timeout", &self.poll_timeout)
            .field("lag_interval", &self.lag_interval)
            .field("rate_limiter", &self.rate_limiter.as_ref().map(|_| "<dyn RateLimiter>"))
            .field("leaky_bucket", &self.leaky_bucket)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limiter::Unlimited;

    #[test]
    fn test_defaults() {
        let options = Options::default();

        assert_eq!(options.startup_seek(), SeekFrom::End(0));
        assert_eq!(options.reopen_seek(), SeekFrom::Start(0));
        assert_eq!(options.buffer_size(), 4096);
        assert_eq!(options.poll_timeout(), Duration::from_millis(10));
        assert_eq!(options.lag_interval(), Duration::from_secs(5));
        assert!(!options.has_rate_limiter());
        assert!(!options.is_leaky_bucket());
    }

    #[test]
    fn test_later_options_override_earlier() {
        let options = Options::default()
            .with_seek_on_startup(SeekFrom::Start(10))
            .with_poll_timeout(Duration::from_millis(1))
            .with_seek_on_startup(SeekFrom::Current(-2))
            .with_poll_timeout(Duration::from_millis(50));

        assert_eq!(options.startup_seek(), SeekFrom::Current(-2));
        assert_eq!(options.poll_timeout(), Duration::from_millis(50));
        assert_eq!(options.reopen_seek(), SeekFrom::Start(0));
    }

    #[test]
    fn test_zero_buffer_size_is_clamped() {
        let options = Options::default().with_buffer_size(0);
        assert_eq!(options.buffer_size(), 1);
    }

    #[test]
    fn test_rate_limiter_and_leaky_bucket() {
        let options = Options::default()
            .with_rate_limiter(Unlimited)
            .with_leaky_bucket();

        assert!(options.has_rate_limiter());
        assert!(options.is_leaky_bucket());

        let debug_str = format!("{:?}", options);
        assert!(debug_str.contains("<dyn RateLimiter>"));
        assert!(debug_str.contains("leaky_bucket: true"));
    }
}
