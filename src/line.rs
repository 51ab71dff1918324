//! A single line read from the tailed file.

use std::borrow::Cow;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// One line emitted by the tailer, including its terminator if it had one.
///
/// A line without a trailing `\n` is emitted when a writer leaves a partial
/// line at the end of the file for longer than the retry budget allows.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Line {
    file_name: Arc<Path>,
    content: Vec<u8>,
}

impl Line {
    pub(crate) fn new(file_name: Arc<Path>, content: Vec<u8>) -> Self {
        Self { file_name, content }
    }

    /// Returns the path of the file the line was read from.
    pub fn file_name(&self) -> &Path {
        &self.file_name
    }

    /// Returns the raw line, untrimmed.
    pub fn bytes(&self) -> &[u8] {
        &self.content
    }

    /// Returns the line without its trailing run of `\r`, `\n` and spaces.
    ///
    /// Only those three bytes are stripped, so this is not unicode whitespace
    /// aware. Leading bytes and anything inside the line are kept.
    pub fn bytes_trimmed(&self) -> &[u8] {
        trim_line_end(&self.content)
    }

    /// Returns the line as text, replacing invalid UTF-8.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.content)
    }

    /// Returns the trimmed line as text, replacing invalid UTF-8.
    pub fn text_trimmed(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.bytes_trimmed())
    }

    /// Consumes the line, returning the raw bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.content
    }

    /// Length in bytes, terminator included.
    pub fn len(&self) -> usize {
        self.content.len()
    }

    /// Returns `true` if the line holds no bytes at all.
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text())
    }
}

fn trim_line_end(mut bytes: &[u8]) -> &[u8] {
    while let [rest @ .., b'\r' | b'\n' | b' '] = bytes {
        bytes = rest;
    }
    bytes
}
