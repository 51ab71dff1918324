use clap::Parser;
use log_tailer::{CancellationToken, Options, Tailer, TickRateLimiter};
use std::io::{SeekFrom, Write};
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::process;
use std::time::Duration;
use tokio_stream::StreamExt;
use tracing_subscriber::EnvFilter;

/// Follow a log file across logrotate, printing every new line.
#[derive(Debug, Parser)]
#[command(name = "log-tailer", version)]
struct Args {
    /// File to follow
    path: PathBuf,

    /// Print the existing content first instead of only new lines
    #[arg(long)]
    from_start: bool,

    /// Base wait in milliseconds when the file is fully read
    #[arg(long, default_value_t = 10)]
    poll_timeout_ms: u64,

    /// Initial read buffer size in bytes
    #[arg(long, default_value_t = 4096)]
    buffer_size: usize,

    /// How often the lag is recomputed, in milliseconds
    #[arg(long, default_value_t = 5000)]
    lag_interval_ms: u64,

    /// Emit at most this many lines per second
    #[arg(long)]
    lines_per_second: Option<NonZeroU32>,

    /// Drop lines instead of waiting when stdout is slow
    #[arg(long)]
    leaky_bucket: bool,

    /// Strip trailing \r, \n and spaces before printing
    #[arg(long)]
    trim: bool,

    /// Stop after this many seconds
    #[arg(long)]
    timeout_secs: Option<u64>,
}

impl Args {
    fn options(&self) -> Options {
        let mut options = Options::default()
            .with_poll_timeout(Duration::from_millis(self.poll_timeout_ms))
            .with_buffer_size(self.buffer_size)
            .with_lag_interval(Duration::from_millis(self.lag_interval_ms));

        if self.from_start {
            options = options.with_seek_on_startup(SeekFrom::Start(0));
        }
        if let Some(lps) = self.lines_per_second {
            options = options.with_rate_limiter(TickRateLimiter::new(lps));
        }
        if self.leaky_bucket {
            options = options.with_leaky_bucket();
        }
        options
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .ok();
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_tracing();

    let tailer = Tailer::new(&args.path, args.options());
    let cancel = CancellationToken::new();

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }
    if let Some(secs) = args.timeout_secs {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            cancel.cancel();
        });
    }

    let mut tail = match tailer.run(cancel.clone()).await {
        Ok(tail) => tail,
        Err(e) => {
            eprintln!("Error starting to tail {}: {}", args.path.display(), e);
            process::exit(1);
        }
    };

    tracing::info!(path = %tailer.file_name().display(), "tailing file");

    let stdout = std::io::stdout();
    // A fatal error is always the last item before the streams end
    let mut ended_on_error = false;
    while let Some(item) = tail.next().await {
        match item {
            Ok(line) => {
                ended_on_error = false;
                let bytes = if args.trim {
                    line.bytes_trimmed()
                } else {
                    line.bytes()
                };
                if write_line(&mut stdout.lock(), bytes, args.trim).is_err() {
                    // stdout closed, e.g. piped into head
                    break;
                }
            }
            Err(e) => {
                ended_on_error = true;
                eprintln!("Error tailing file: {}", e);
            }
        }
    }

    tracing::info!(lag = tailer.lag(), "done");
    if ended_on_error && !cancel.is_cancelled() {
        process::exit(1);
    }
}

fn write_line(out: &mut impl Write, bytes: &[u8], add_newline: bool) -> std::io::Result<()> {
    out.write_all(bytes)?;
    if add_newline {
        out.write_all(b"\n")?;
    }
    out.flush()
}
