//! Output streams of a running tailer.

use crate::error::{Error, Result};
use crate::line::Line;
use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

/// Capacity of the line channel. One slot keeps the hand-off close to
/// unbuffered so a slow consumer slows down reading.
pub(crate) const LINES_CAPACITY: usize = 1;

/// Capacity of the error channel.
pub(crate) const ERRORS_CAPACITY: usize = 16;

/// Stream of lines read from the file, in file order.
#[derive(Debug)]
pub struct LineStream {
    receiver: mpsc::Receiver<Line>,
}

/// Stream of errors raised while tailing.
///
/// Non-fatal errors arrive while lines keep flowing. A fatal error is the
/// last item before both streams end.
#[derive(Debug)]
pub struct ErrorStream {
    receiver: mpsc::Receiver<Error>,
}

/// Both output streams of one run.
///
/// `Tail` itself is a stream yielding lines as `Ok` and errors as `Err` in
/// arrival order. It ends once both underlying streams are closed, which is
/// the single end-of-life signal for the run.
#[derive(Debug)]
pub struct Tail {
    lines: LineStream,
    errors: ErrorStream,
}

/// Sending halves owned by the poll task.
pub(crate) struct TailSender {
    pub(crate) lines: mpsc::Sender<Line>,
    pub(crate) errors: mpsc::Sender<Error>,
}

pub(crate) fn channel() -> (TailSender, Tail) {
    let (lines_tx, lines_rx) = mpsc::channel(LINES_CAPACITY);
    let (errors_tx, errors_rx) = mpsc::channel(ERRORS_CAPACITY);

    (
        TailSender {
            lines: lines_tx,
            errors: errors_tx,
        },
        Tail {
            lines: LineStream { receiver: lines_rx },
            errors: ErrorStream {
                receiver: errors_rx,
            },
        },
    )
}

impl Tail {
    /// Splits into the line stream and the error stream.
    pub fn into_streams(self) -> (LineStream, ErrorStream) {
        (self.lines, self.errors)
    }

    /// Mutable access to the line stream, e.g. for `tokio::select!`.
    pub fn lines(&mut self) -> &mut LineStream {
        &mut self.lines
    }

    /// Mutable access to the error stream.
    pub fn errors(&mut self) -> &mut ErrorStream {
        &mut self.errors
    }
}

impl LineStream {
    /// Receives the next line, or `None` once the run has ended.
    pub async fn recv(&mut self) -> Option<Line> {
        self.receiver.recv().await
    }

    /// Check if the stream has been closed by the poll task
    #[cfg(test)]
    pub fn is_closed(&self) -> bool {
        self.receiver.is_closed()
    }
}

impl ErrorStream {
    /// Receives the next error, or `None` once the run has ended.
    pub async fn recv(&mut self) -> Option<Error> {
        self.receiver.recv().await
    }
}

impl Stream for LineStream {
    type Item = Line;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

impl Stream for ErrorStream {
    type Item = Error;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

impl Stream for Tail {
    type Item = Result<Line>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let lines_closed = match self.lines.receiver.poll_recv(cx) {
            Poll::Ready(Some(line)) => return Poll::Ready(Some(Ok(line))),
            Poll::Ready(None) => true,
            Poll::Pending => false,
        };

        match self.errors.receiver.poll_recv(cx) {
            Poll::Ready(Some(err)) => Poll::Ready(Some(Err(err))),
            Poll::Ready(None) if lines_closed => Poll::Ready(None),
            _ => Poll::Pending,
        }
    }
}
