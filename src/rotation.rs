//! Detecting that the tailed path now points at a different file.

use std::fs::Metadata;
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

use tokio::fs::File;

use crate::error::{Error, Result};

/// How many times the path is stated before it is considered gone.
const STAT_ATTEMPTS: usize = 2;

/// Pause between stat attempts while logrotate is between rename and create.
const STAT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Identity of a file independent of its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FileId {
    #[cfg(unix)]
    dev: u64,
    #[cfg(unix)]
    ino: u64,
    #[cfg(not(unix))]
    created: Option<std::time::SystemTime>,
}

impl FileId {
    #[cfg(unix)]
    pub(crate) fn from_metadata(metadata: &Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;

        Self {
            dev: metadata.dev(),
            ino: metadata.ino(),
        }
    }

    #[cfg(not(unix))]
    pub(crate) fn from_metadata(metadata: &Metadata) -> Self {
        Self {
            created: metadata.created().ok(),
        }
    }
}

/// Checks that the open `file` is still the file reachable at `path`.
///
/// Returns `Ok(false)` when logrotate swapped the file and
/// [`Error::FileNotFound`] when nothing reappears at `path` in time.
pub(crate) async fn is_same_file(path: &Path, file: &File) -> Result<bool> {
    is_same_file_with_retry(path, file, STAT_RETRY_DELAY).await
}

async fn is_same_file_with_retry(path: &Path, file: &File, retry_delay: Duration) -> Result<bool> {
    let mut by_name = None;

    for attempt in 1..=STAT_ATTEMPTS {
        match tokio::fs::metadata(path).await {
            Ok(metadata) => {
                by_name = Some(metadata);
                break;
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(
                    path = %path.display(),
                    attempt,
                    "tailed path missing, waiting for it to reappear"
                );
                if attempt < STAT_ATTEMPTS {
                    tokio::time::sleep(retry_delay).await;
                }
            }
            Err(e) => return Err(Error::Rotation(e)),
        }
    }

    let by_name = by_name.ok_or_else(|| Error::FileNotFound {
        path: path.display().to_string(),
    })?;
    let current = file.metadata().await.map_err(Error::Rotation)?;

    Ok(FileId::from_metadata(&by_name) == FileId::from_metadata(&current))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::TempLogFile;

    const FAST_RETRY: Duration = Duration::from_millis(10);

    #[tokio::test]
    async fn test_growing_file_is_the_same() {
        let log = TempLogFile::with_content("1\n").unwrap();
        let file = File::open(log.path()).await.unwrap();

        log.append_content("2").unwrap();

        assert!(is_same_file(log.path(), &file).await.unwrap());
    }

    #[tokio::test]
    async fn test_rotated_file_is_different() {
        let log = TempLogFile::with_content("1\n").unwrap();
        let file = File::open(log.path()).await.unwrap();

        log.rotate("2\n").unwrap();

        assert!(!is_same_file(log.path(), &file).await.unwrap());
    }

    #[tokio::test]
    async fn test_truncated_file_is_the_same() {
        let log = TempLogFile::with_content("1\n2\n").unwrap();
        let file = File::open(log.path()).await.unwrap();

        log.truncate().unwrap();

        assert!(is_same_file(log.path(), &file).await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_path_is_file_not_found() {
        let log = TempLogFile::with_content("1\n").unwrap();
        let file = File::open(log.path()).await.unwrap();

        std::fs::remove_file(log.path()).unwrap();

        let err = is_same_file_with_retry(log.path(), &file, FAST_RETRY)
            .await
            .unwrap_err();
        assert!(err.is_file_not_found(), "unexpected error: {err}");
    }

    #[tokio::test]
    async fn test_path_reappearing_between_attempts() {
        let log = TempLogFile::with_content("1\n").unwrap();
        let file = File::open(log.path()).await.unwrap();
        let rotated = log.path().with_extension("log.1");
        std::fs::rename(log.path(), &rotated).unwrap();

        let path = log.path().to_path_buf();
        let creator = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            std::fs::write(&path, "2\n").unwrap();
        });

        let same = is_same_file_with_retry(log.path(), &file, Duration::from_millis(300))
            .await
            .unwrap();
        creator.await.unwrap();

        assert!(!same);
    }

    #[test]
    fn test_file_id_of_same_metadata_is_equal() {
        let log = TempLogFile::with_content("1\n").unwrap();
        let a = std::fs::metadata(log.path()).unwrap();
        let b = std::fs::File::open(log.path()).unwrap().metadata().unwrap();

        assert_eq!(FileId::from_metadata(&a), FileId::from_metadata(&b));
    }
}
