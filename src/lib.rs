//! A log tailer library that follows a growing file line by line.
//!
//! The file is polled instead of watched with OS notifications, so it works
//! the same on every platform. When logrotate renames the file away and
//! creates a new one, the old file is read to its end and the new one is
//! opened, without losing or repeating lines.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::io::SeekFrom;
//! use log_tailer::{CancellationToken, Options, Tailer};
//! use tokio_stream::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let tailer = Tailer::new(
//!         "access.log",
//!         Options::default().with_seek_on_startup(SeekFrom::Start(0)),
//!     );
//!
//!     let mut tail = tailer.run(CancellationToken::new()).await?;
//!
//!     while let Some(line) = tail.next().await {
//!         match line {
//!             Ok(line) => println!("{}", line.text_trimmed()),
//!             Err(e) => eprintln!("Error: {}", e),
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

// Internal modules - not part of public API
mod error;
mod line;
mod options;
mod rate_limiter;
mod rotation;
mod seeker;
mod stream;
mod tailer;

#[cfg(test)]
mod test_helpers;

// Public API exports
pub use error::{Error, Result};
pub use line::Line;
pub use options::Options;
pub use rate_limiter::{RateLimiter, TickRateLimiter, Unlimited};
pub use stream::{ErrorStream, LineStream, Tail};
pub use tailer::Tailer;
pub use tokio_util::sync::CancellationToken;

use std::path::PathBuf;

/// Starts tailing `path` and returns the output streams.
///
/// Shorthand for [`Tailer::new`] followed by [`Tailer::run`] when the lag
/// accessors are not needed.
///
/// # Example
///
/// ```rust,no_run
/// use log_tailer::{tail_log, CancellationToken, Options};
/// use tokio_stream::StreamExt;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let mut tail = tail_log("app.log", Options::default(), CancellationToken::new()).await?;
///
///     while let Some(line) = tail.next().await {
///         println!("New line: {}", line?.text_trimmed());
///     }
///
///     Ok(())
/// }
/// ```
pub async fn tail_log<P: Into<PathBuf>>(
    path: P,
    options: Options,
    cancel: CancellationToken,
) -> Result<Tail> {
    Tailer::new(path, options).run(cancel).await
}
