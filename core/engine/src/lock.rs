//! Cross-process advisory lock over the toolchain store.
//!
//! Every mutating operation holds a [`StoreLock`] for its whole duration. The
//! guard releases the lock when dropped, on every exit path.

use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use fs4::FileExt;

use crate::error::{EngineError, Result};

/// Interval between lock attempts while another process holds the lock.
const POLL_INTERVAL_MS: u64 = 100;

/// RAII guard for the exclusive store lock.
#[derive(Debug)]
pub struct StoreLock {
    file: File,
    path: PathBuf,
}

impl StoreLock {
    /// Acquires the lock at `path`, polling until `timeout` elapses.
    ///
    /// # Errors
    ///
    /// Returns `LockContention` if another process still holds the lock after
    /// `timeout`, or `Io` if the lock file cannot be opened.
    pub async fn acquire(path: &Path, timeout: Duration) -> Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                EngineError::io(
                    format!("Failed to create directory: {}", parent.display()),
                    e,
                )
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)
            .map_err(|e| {
                EngineError::io(format!("Failed to open lock file: {}", path.display()), e)
            })?;

        let started = Instant::now();
        let mut announced = false;
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    tracing::debug!(path = %path.display(), "acquired store lock");
                    return Ok(Self {
                        file,
                        path: path.to_path_buf(),
                    });
                }
                Err(e) if is_contended(&e) => {
                    let waited = started.elapsed();
                    if waited >= timeout {
                        return Err(EngineError::LockContention {
                            path: path.to_path_buf(),
                            waited,
                        });
                    }
                    if !announced {
                        tracing::info!(
                            path = %path.display(),
                            "waiting for another swup process to release the store lock"
                        );
                        announced = true;
                    }
                    tokio::time::sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
                }
                Err(e) => {
                    return Err(EngineError::io(
                        format!("Failed to lock {}", path.display()),
                        e,
                    ));
                }
            }
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn is_contended(error: &std::io::Error) -> bool {
    error.kind() == ErrorKind::WouldBlock
        || error.raw_os_error() == fs4::lock_contended_error().raw_os_error()
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!(path = %self.path.display(), "failed to release store lock: {e}");
        } else {
            tracing::debug!(path = %self.path.display(), "released store lock");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_creates_lock_file() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("nested").join(".swup.lock");
        let lock = StoreLock::acquire(&path, Duration::from_secs(1))
            .await
            .unwrap();
        assert!(path.exists());
        assert_eq!(lock.path(), path);
    }

    #[tokio::test]
    async fn second_acquire_times_out_while_held() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join(".swup.lock");
        let _held = StoreLock::acquire(&path, Duration::from_secs(1))
            .await
            .unwrap();

        let err = StoreLock::acquire(&path, Duration::from_millis(250))
            .await
            .unwrap_err();
        match err {
            EngineError::LockContention { path: p, waited } => {
                assert_eq!(p, path);
                assert!(waited >= Duration::from_millis(250));
            }
            other => panic!("expected LockContention, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn lock_is_released_on_drop() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join(".swup.lock");
        {
            let _lock = StoreLock::acquire(&path, Duration::from_secs(1))
                .await
                .unwrap();
        }
        StoreLock::acquire(&path, Duration::from_millis(100))
            .await
            .unwrap();
    }
}
