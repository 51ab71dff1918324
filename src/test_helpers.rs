//! Test utilities for creating temporary log files and rotating them.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub struct TempLogFile {
    pub path: PathBuf,
    _temp_dir: tempfile::TempDir,
}

impl TempLogFile {
    /// Create a new empty temporary log file for testing
    pub fn new() -> std::io::Result<Self> {
        let temp_dir = tempfile::tempdir()?;
        let path = temp_dir.path().join("test.log");

        File::create(&path)?;

        Ok(Self {
            path,
            _temp_dir: temp_dir,
        })
    }

    /// Create a temporary log file holding exactly `content`
    pub fn with_content(content: &str) -> std::io::Result<Self> {
        let temp_file = Self::new()?;
        temp_file.append_raw(content)?;
        Ok(temp_file)
    }

    /// Append one line, terminated with `\n`
    pub fn append_content(&self, content: &str) -> std::io::Result<()> {
        self.append_raw(&format!("{}\n", content))
    }

    /// Append bytes as-is, without adding a terminator
    pub fn append_raw(&self, content: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        file.write_all(content.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    /// Rename the file away and create a fresh one with `content`, the way
    /// logrotate does. Returns the rotated path.
    pub fn rotate(&self, content: &str) -> std::io::Result<PathBuf> {
        let rotated = self.rotated_path();
        std::fs::rename(&self.path, &rotated)?;

        let mut file = File::create(&self.path)?;
        file.write_all(content.as_bytes())?;
        file.flush()?;
        Ok(rotated)
    }

    /// Truncate the file in place (copytruncate style rotation)
    pub fn truncate(&self) -> std::io::Result<()> {
        OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&self.path)?;
        Ok(())
    }

    /// Get the path to the temporary file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn rotated_path(&self) -> PathBuf {
        self.path.with_extension("log.1")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_log_file_creation() {
        let temp_file = TempLogFile::new().unwrap();
        assert!(temp_file.path().exists());
    }

    #[test]
    fn test_temp_log_file_with_content() {
        let temp_file = TempLogFile::with_content("a\nb").unwrap();

        let file_content = std::fs::read_to_string(temp_file.path()).unwrap();
        assert_eq!(file_content, "a\nb");
    }

    #[test]
    fn test_append_content() {
        let temp_file = TempLogFile::new().unwrap();
        temp_file.append_content("line 1").unwrap();
        temp_file.append_raw("line").unwrap();
        temp_file.append_raw(" 2\n").unwrap();

        let content = std::fs::read_to_string(temp_file.path()).unwrap();
        assert_eq!(content, "line 1\nline 2\n");
    }

    #[test]
    fn test_rotate_keeps_old_content_aside() {
        let temp_file = TempLogFile::with_content("old\n").unwrap();
        let rotated = temp_file.rotate("new\n").unwrap();

        assert_eq!(std::fs::read_to_string(rotated).unwrap(), "old\n");
        assert_eq!(std::fs::read_to_string(temp_file.path()).unwrap(), "new\n");
    }

    #[test]
    fn test_truncate() {
        let temp_file = TempLogFile::with_content("initial content").unwrap();
        temp_file.truncate().unwrap();

        let content = std::fs::read_to_string(temp_file.path()).unwrap();
        assert!(content.is_empty());
    }
}
