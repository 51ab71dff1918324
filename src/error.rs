//! Error types for the log tailer library.

use thiserror::Error;

/// The main error type for tailing operations.
///
/// Every variant names the phase that failed so a message on the error
/// stream can be traced back to opening, seeking, reading, stating or
/// reopening the file.
#[derive(Error, Debug)]
pub enum Error {
    /// `run` was called while a poll loop for the same tailer is active.
    #[error("tailer is already running")]
    AlreadyRunning,

    /// The file could not be opened for reading.
    #[error("can't open file {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Positioning the cursor at the start of a line failed.
    #[error("error seeking to line start: {0}")]
    Seek(#[source] std::io::Error),

    /// Stating the file or querying the cursor position failed.
    #[error("error getting file status: {0}")]
    Stat(#[source] std::io::Error),

    /// A read failed with something other than "no more data yet".
    #[error("error reading line: {0}")]
    Read(#[source] std::io::Error),

    /// Stating the path while checking for logrotate failed.
    #[error("error checking that file is the same: {0}")]
    Rotation(#[source] std::io::Error),

    /// The file was rotated but the new one could not be set up.
    #[error("error reopening file: {0}")]
    Reopen(#[source] Box<Error>),

    /// File has been removed and did not reappear.
    #[error("File no longer exists: {path}")]
    FileNotFound { path: String },

    /// An operation still in flight on a handle failed while it was closed.
    ///
    /// Releasing the descriptor itself reports nothing, so this only carries
    /// errors that were pending on the handle.
    #[error("error closing file: {0}")]
    Close(#[source] std::io::Error),
}

impl Error {
    /// Returns `true` for the terminal "file does not exist" condition.
    ///
    /// Callers supervising a tailer usually restart it on other fatal errors
    /// but give up on this one.
    pub fn is_file_not_found(&self) -> bool {
        match self {
            Error::FileNotFound { .. } => true,
            Error::Reopen(inner) => inner.is_file_not_found(),
            _ => false,
        }
    }
}

/// A convenient Result type for tailing operations.
pub type Result<T> = std::result::Result<T, Error>;
