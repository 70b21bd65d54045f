use crate::errors::{PatchQueueError, Result};
use serde::Serialize;
use std::fs;
use std::path::Path;

/// Platform-specific utilities for cross-platform compatibility
pub mod platform;

/// Atomic file operations to prevent corruption during writes
pub mod atomic_file {
    use super::*;

    /// Write JSON data to a file atomically using a temporary file + rename strategy with file locking
    pub fn write_json<T: Serialize>(path: &Path, data: &T) -> Result<()> {
        with_concurrent_file_lock(path, || {
            let content = serde_json::to_string_pretty(data)
                .map_err(|e| PatchQueueError::config(format!("Failed to serialize data: {e}")))?;

            write_string_unlocked(path, &content)
        })
    }

    /// Write string content to a file atomically using a temporary file + rename strategy with file locking
    pub fn write_string(path: &Path, content: &str) -> Result<()> {
        with_concurrent_file_lock(path, || write_string_unlocked(path, content))
    }

    fn with_concurrent_file_lock<F, R>(file_path: &Path, operation: F) -> Result<R>
    where
        F: FnOnce() -> Result<R>,
    {
        let _lock = crate::utils::file_locking::FileLock::acquire(file_path)?;
        operation()
    }

    fn write_string_unlocked(path: &Path, content: &str) -> Result<()> {
        // Temp file lives next to the target so the rename stays on one filesystem
        let temp_path = path.with_extension("tmp");

        fs::write(&temp_path, content).map_err(|e| {
            PatchQueueError::config(format!("Failed to write temporary file: {e}"))
        })?;

        atomic_rename(&temp_path, path)
    }

    #[cfg(windows)]
    fn atomic_rename(temp_path: &Path, final_path: &Path) -> Result<()> {
        const MAX_RETRIES: u32 = 3;
        const RETRY_DELAY: std::time::Duration = std::time::Duration::from_millis(100);

        let mut attempt = 1;
        loop {
            match fs::rename(temp_path, final_path) {
                Ok(()) => return Ok(()),
                Err(e) if attempt >= MAX_RETRIES => {
                    let _ = fs::remove_file(temp_path);
                    return Err(PatchQueueError::config(format!(
                        "Failed to finalize file write after {MAX_RETRIES} attempts on Windows: {e}"
                    )));
                }
                Err(_) => {
                    attempt += 1;
                    std::thread::sleep(RETRY_DELAY);
                }
            }
        }
    }

    #[cfg(not(windows))]
    fn atomic_rename(temp_path: &Path, final_path: &Path) -> Result<()> {
        fs::rename(temp_path, final_path)
            .map_err(|e| PatchQueueError::config(format!("Failed to finalize file write: {e}")))?;
        Ok(())
    }
}

/// Path helpers for files derived from user-controlled names
pub mod path_validation {
    /// Sanitize a filename to prevent issues with special characters
    pub fn sanitize_filename(name: &str) -> String {
        name.chars()
            .map(|c| match c {
                'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' => c,
                _ => '_',
            })
            .collect()
    }
}

/// File locking utilities for concurrent access protection
pub mod file_locking {
    use super::*;
    use std::fs::{File, OpenOptions};
    use std::path::PathBuf;
    use std::time::{Duration, Instant};

    /// A lock file that prevents concurrent access to critical files.
    ///
    /// The lock is the existence of the file itself (create-new semantics);
    /// dropping the guard removes it.
    #[derive(Debug)]
    pub struct FileLock {
        _file: File,
        lock_path: PathBuf,
    }

    impl FileLock {
        #[cfg(windows)]
        const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
        #[cfg(windows)]
        const RETRY_INTERVAL: Duration = Duration::from_millis(100);

        #[cfg(not(windows))]
        const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
        #[cfg(not(windows))]
        const RETRY_INTERVAL: Duration = Duration::from_millis(50);

        /// Attempt to acquire a lock on a file with timeout
        pub fn acquire_with_timeout(file_path: &Path, timeout: Duration) -> Result<Self> {
            let lock_path = file_path.with_extension("lock");
            let start_time = Instant::now();

            loop {
                match Self::try_acquire(&lock_path) {
                    Ok(lock) => return Ok(lock),
                    Err(e) => {
                        if start_time.elapsed() >= timeout {
                            return Err(PatchQueueError::Locked(format!(
                                "timeout waiting for lock on {file_path:?} after {}ms: {e}",
                                timeout.as_millis()
                            )));
                        }
                        std::thread::sleep(Self::RETRY_INTERVAL);
                    }
                }
            }
        }

        /// Try to acquire a lock immediately (non-blocking)
        pub fn try_acquire(lock_path: &Path) -> Result<Self> {
            let file = OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(lock_path)
                .map_err(|e| match e.kind() {
                    std::io::ErrorKind::AlreadyExists => PatchQueueError::Locked(format!(
                        "{} exists; another pq process may be running (remove it if stale)",
                        lock_path.display()
                    )),
                    _ => PatchQueueError::config(format!(
                        "Failed to acquire lock {lock_path:?}: {e}"
                    )),
                })?;

            Ok(Self {
                _file: file,
                lock_path: lock_path.to_path_buf(),
            })
        }

        /// Acquire a lock with platform-appropriate default timeout
        pub fn acquire(file_path: &Path) -> Result<Self> {
            Self::acquire_with_timeout(file_path, Self::DEFAULT_TIMEOUT)
        }

        pub fn path(&self) -> &Path {
            &self.lock_path
        }
    }

    impl Drop for FileLock {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.lock_path);
        }
    }
}
