//! The tailing engine: owns the file handle and drives the poll loop.

use std::io::{self, ErrorKind, SeekFrom};
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::line::Line;
use crate::options::Options;
use crate::rotation;
use crate::seeker::seek_to_line_start;
use crate::stream::{self, Tail, TailSender};

/// A line is read at most this many times while it is still being written.
const READ_ATTEMPTS: usize = 5;

/// Upper bound of the wait between attempts to finish a partial line.
const PARTIAL_LINE_MAX_WAIT: Duration = Duration::from_secs(1);

/// Upper bound of the wait while the file has no new data.
const IDLE_MAX_WAIT: Duration = Duration::from_secs(5);

/// Smallest step a zero poll timeout grows by, so an idle loop never spins.
const MIN_BACKOFF_STEP: Duration = Duration::from_millis(1);

/// Follows one file by polling, surviving logrotate.
///
/// `run` opens the file, lands on a line boundary and spawns one task that
/// reads line by line. When the file is fully read the task checks whether
/// logrotate replaced it; if so the old file is read to its end first, then
/// the new file is opened. Waits grow exponentially to limit stat syscalls.
///
/// Cancellation is cooperative. The token is checked before every read and
/// interrupts idle waits, but a blocked send to a slow consumer, a pending
/// rate limiter and an in-flight read all finish first.
pub struct Tailer {
    source: Arc<Path>,
    options: Options,
    status: Arc<FileStatus>,
    running: Arc<AtomicBool>,
}

/// Last observed read position and file size.
#[derive(Debug, Default)]
struct FileStatus {
    position: AtomicU64,
    size: AtomicU64,
    lag: AtomicI64,
}

impl FileStatus {
    fn store(&self, position: u64, size: u64) {
        self.position.store(position, Ordering::Relaxed);
        self.size.store(size, Ordering::Relaxed);
        self.lag.store(size as i64 - position as i64, Ordering::Relaxed);
    }
}

impl Tailer {
    /// Prepares a tailer for `path`. Nothing is opened until [`run`](Self::run).
    pub fn new(path: impl Into<PathBuf>, options: Options) -> Self {
        let path: PathBuf = path.into();
        Self {
            source: Arc::from(path),
            options,
            status: Arc::new(FileStatus::default()),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns the path of the tailed file.
    pub fn file_name(&self) -> &Path {
        &self.source
    }

    /// Returns the approximate lag in bytes, updated per lag interval and
    /// after every (re)open.
    pub fn lag(&self) -> i64 {
        self.status.lag.load(Ordering::Relaxed)
    }

    /// Returns the read position recorded with the last lag update.
    pub fn position(&self) -> u64 {
        self.status.position.load(Ordering::Relaxed)
    }

    /// Returns the file size recorded with the last lag update.
    pub fn size(&self) -> u64 {
        self.status.size.load(Ordering::Relaxed)
    }

    /// Returns `true` while a poll loop is active.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Starts tailing.
    ///
    /// Opens the file read-only and seeks to the configured startup position,
    /// then spawns the poll loop and returns its output streams. Errors while
    /// opening are returned here, never on the error stream. Calling `run`
    /// while a previous run is still active fails with
    /// [`Error::AlreadyRunning`] and leaves that run untouched.
    pub async fn run(&self, cancel: CancellationToken) -> Result<Tail> {
        let running = RunningGuard::acquire(&self.running)?;

        let reader = open_file(
            &self.source,
            self.options.startup_seek,
            &self.options,
            &self.status,
        )
        .await?;

        let (sender, tail) = stream::channel();
        let poll_loop = PollLoop {
            source: Arc::clone(&self.source),
            options: self.options.clone(),
            status: Arc::clone(&self.status),
            running,
            reader,
            sender,
            cancel,
            partial_backoff: Backoff::new(self.options.poll_timeout, PARTIAL_LINE_MAX_WAIT),
            idle_backoff: Backoff::new(self.options.poll_timeout, IDLE_MAX_WAIT),
            next_status_refresh: Instant::now() + self.options.lag_interval,
        };

        tracing::info!(
            path = %self.source.display(),
            position = self.position(),
            lag = self.lag(),
            "tailing started"
        );

        tokio::spawn(poll_loop.run());

        Ok(tail)
    }
}

/// Opens `path`, positions the cursor on the line containing `pos` and
/// records the resulting status.
async fn open_file(
    path: &Path,
    pos: SeekFrom,
    options: &Options,
    status: &FileStatus,
) -> Result<BufReader<File>> {
    let mut file = File::open(path).await.map_err(|source| Error::Open {
        path: path.display().to_string(),
        source,
    })?;

    seek_to_line_start(&mut file, pos)
        .await
        .map_err(Error::Seek)?;

    let mut reader = BufReader::with_capacity(options.buffer_size, file);
    refresh_status(&mut reader, status)
        .await
        .map_err(Error::Stat)?;

    Ok(reader)
}

/// Returns the logical read position and the current file size.
///
/// Bytes sitting in the reader buffer have not been handed out yet, so they
/// are not counted as read.
async fn read_status(reader: &mut BufReader<File>) -> io::Result<(u64, u64)> {
    let buffered = reader.buffer().len() as u64;
    let file = reader.get_mut();

    let size = file.metadata().await?.len();
    let position = file.stream_position().await?.saturating_sub(buffered);

    Ok((position, size))
}

async fn refresh_status(reader: &mut BufReader<File>, status: &FileStatus) -> io::Result<()> {
    let (position, size) = read_status(reader).await?;
    status.store(position, size);
    Ok(())
}

/// Closes the handle behind `reader`.
///
/// Errors from operations still in flight on the handle surface here. The
/// descriptor itself is released when the std handle drops.
async fn close_file(reader: BufReader<File>) -> io::Result<()> {
    let mut file = reader.into_inner();
    file.flush().await?;
    drop(file.into_std().await);
    Ok(())
}

/// Detect if the file was truncated by comparing current size with last position
fn detect_file_truncation(current_size: u64, last_position: u64) -> bool {
    current_size < last_position
}

/// Exponentially growing wait, capped at `max`.
#[derive(Debug, Clone)]
struct Backoff {
    base: Duration,
    current: Duration,
    max: Duration,
}

impl Backoff {
    fn new(base: Duration, max: Duration) -> Self {
        let base = base.min(max);
        Self {
            base,
            current: base,
            max,
        }
    }

    /// Returns the wait to use now and doubles the next one.
    fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        let grown = if delay.is_zero() {
            MIN_BACKOFF_STEP
        } else {
            delay.saturating_mul(2)
        };
        self.current = grown.min(self.max);
        delay
    }

    fn reset(&mut self) {
        self.current = self.base;
    }
}

/// State owned by the background task of one run.
struct PollLoop {
    running: RunningGuard,
    source: Arc<Path>,
    options: Options,
    status: Arc<FileStatus>,
    reader: BufReader<File>,
    sender: TailSender,
    cancel: CancellationToken,
    partial_backoff: Backoff,
    idle_backoff: Backoff,
    next_status_refresh: Instant,
}

impl PollLoop {
    async fn run(mut self) {
        if let Err(err) = self.poll().await {
            self.report(err).await;
        }
        self.shutdown().await;
    }

    async fn poll(&mut self) -> Result<()> {
        loop {
            if self.cancel.is_cancelled() {
                tracing::debug!(path = %self.source.display(), "tailing cancelled");
                return Ok(());
            }

            self.refresh_status_if_due().await;

            let line = self.read_line().await?;
            if line.is_empty() {
                self.on_end_of_file().await?;
                continue;
            }

            self.partial_backoff.reset();
            self.idle_backoff.reset();

            if self.deliver(line).await.is_break() {
                tracing::debug!(path = %self.source.display(), "line consumer dropped");
                return Ok(());
            }
        }
    }

    async fn refresh_status_if_due(&mut self) {
        let now = Instant::now();
        if now < self.next_status_refresh {
            return;
        }
        self.next_status_refresh = now + self.options.lag_interval;

        if let Err(e) = refresh_status(&mut self.reader, &self.status).await {
            self.report(Error::Stat(e)).await;
        }
    }

    /// Reads one line. A line without terminator is retried while the writer
    /// may still be finishing it, then returned as it is.
    /// An empty result means there was nothing to read at all.
    async fn read_line(&mut self) -> Result<Vec<u8>> {
        let mut line = Vec::new();

        for attempt in 1..=READ_ATTEMPTS {
            self.reader
                .read_until(b'\n', &mut line)
                .await
                .map_err(Error::Read)?;

            if line.is_empty() || line.ends_with(b"\n") {
                break;
            }

            if attempt < READ_ATTEMPTS {
                let delay = self.partial_backoff.next_delay();
                tracing::debug!(
                    path = %self.source.display(),
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "partial line, waiting for the rest"
                );
                tokio::time::sleep(delay).await;
            }
        }

        Ok(line)
    }

    /// Handles a fully read file: either it is quiet or logrotate swapped it.
    async fn on_end_of_file(&mut self) -> Result<()> {
        if !rotation::is_same_file(&self.source, self.reader.get_ref()).await? {
            if self.has_unread_data().await {
                tracing::debug!(
                    path = %self.source.display(),
                    "rotated file still growing, draining it first"
                );
                return Ok(());
            }
            return self.reopen().await;
        }

        self.recover_truncation().await?;

        let delay = self.idle_backoff.next_delay();
        tracing::trace!(
            path = %self.source.display(),
            delay_ms = delay.as_millis() as u64,
            "no new data"
        );
        tokio::select! {
            _ = self.cancel.cancelled() => {}
            _ = tokio::time::sleep(delay) => {}
        }

        Ok(())
    }

    /// Checks whether data landed in the open file after EOF was seen.
    async fn has_unread_data(&mut self) -> bool {
        match read_status(&mut self.reader).await {
            Ok((position, size)) => size > position,
            Err(e) => {
                self.report(Error::Stat(e)).await;
                false
            }
        }
    }

    /// Repositions the cursor if the file shrank below the read position.
    async fn recover_truncation(&mut self) -> Result<()> {
        let (position, size) = match read_status(&mut self.reader).await {
            Ok(status) => status,
            Err(e) => {
                self.report(Error::Stat(e)).await;
                return Ok(());
            }
        };

        if !detect_file_truncation(size, position) {
            return Ok(());
        }

        tracing::warn!(
            path = %self.source.display(),
            position,
            size,
            "file truncated, seeking to line start"
        );

        seek_to_line_start(&mut self.reader, self.options.reopen_seek)
            .await
            .map_err(Error::Seek)?;
        if let Err(e) = refresh_status(&mut self.reader, &self.status).await {
            self.report(Error::Stat(e)).await;
        }

        self.partial_backoff.reset();
        self.idle_backoff.reset();
        Ok(())
    }

    /// Switches to the file that now lives at the tailed path.
    async fn reopen(&mut self) -> Result<()> {
        let reopened = open_file(
            &self.source,
            self.options.reopen_seek,
            &self.options,
            &self.status,
        )
        .await;
        let reader = match reopened {
            Ok(reader) => reader,
            Err(Error::Open { source, .. }) if source.kind() == ErrorKind::NotFound => {
                return Err(Error::FileNotFound {
                    path: self.source.display().to_string(),
                });
            }
            Err(err) => return Err(Error::Reopen(Box::new(err))),
        };

        let stale = std::mem::replace(&mut self.reader, reader);
        if let Err(e) = close_file(stale).await {
            self.report(Error::Close(e)).await;
        }

        self.partial_backoff.reset();
        self.idle_backoff.reset();

        tracing::info!(
            path = %self.source.display(),
            position = self.status.position.load(Ordering::Relaxed),
            "file rotated, reopened"
        );
        Ok(())
    }

    /// Hands a line to the consumer through the rate limiter.
    /// Breaks when the consumer is gone.
    async fn deliver(&mut self, content: Vec<u8>) -> ControlFlow<()> {
        if let Some(limiter) = &self.options.rate_limiter {
            if !limiter.allow().await {
                tracing::trace!(path = %self.source.display(), "line dropped by rate limiter");
                return ControlFlow::Continue(());
            }
        }

        let line = Line::new(Arc::clone(&self.source), content);

        if self.options.leaky_bucket {
            return match self.sender.lines.try_send(line) {
                Ok(()) => ControlFlow::Continue(()),
                Err(TrySendError::Full(_)) => {
                    tracing::trace!(path = %self.source.display(), "consumer busy, line dropped");
                    ControlFlow::Continue(())
                }
                Err(TrySendError::Closed(_)) => ControlFlow::Break(()),
            };
        }

        match self.sender.lines.send(line).await {
            Ok(()) => ControlFlow::Continue(()),
            Err(_) => ControlFlow::Break(()),
        }
    }

    async fn report(&self, err: Error) {
        report(&self.source, &self.sender, err).await;
    }

    async fn shutdown(self) {
        let PollLoop {
            running,
            source,
            options,
            reader,
            sender,
            ..
        } = self;

        if let Err(e) = close_file(reader).await {
            report(&source, &sender, Error::Close(e)).await;
        }

        if let Some(limiter) = &options.rate_limiter {
            limiter.close();
        }

        tracing::info!(path = %source.display(), "tailing stopped");

        // Idle before the streams end
        drop(running);
        drop(sender);
    }
}

async fn report(source: &Path, sender: &TailSender, err: Error) {
    tracing::warn!(path = %source.display(), error = %err, "tailing error");
    // A consumer that dropped the error stream has opted out of errors
    let _ = sender.errors.send(err).await;
}

/// Holds the running flag of one run and clears it when dropped, whether
/// the run ends or `run` is abandoned before the loop starts.
struct RunningGuard(Arc<AtomicBool>);

impl RunningGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Result<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| Error::AlreadyRunning)?;
        Ok(Self(Arc::clone(flag)))
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
