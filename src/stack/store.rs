use super::Stack;
use crate::config::{ensure_config_dir, get_repo_config_dir};
use crate::errors::{PatchQueueError, Result};
use crate::utils::atomic_file;
use crate::utils::file_locking::FileLock;
use crate::utils::path_validation::sanitize_filename;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// One recorded stack state, appended after every committed replacement
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StackLogEntry {
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub base: String,
    pub head: String,
    pub applied: Vec<String>,
    pub unapplied: Vec<String>,
}

impl StackLogEntry {
    fn from_stack(stack: &Stack, message: &str) -> Self {
        Self {
            timestamp: Utc::now(),
            message: message.to_string(),
            base: stack.base.clone(),
            head: stack.head().to_string(),
            applied: stack.applied().iter().map(|p| p.name.clone()).collect(),
            unapplied: stack.unapplied().iter().map(|p| p.name.clone()).collect(),
        }
    }
}

/// Exclusive hold on a branch's stack, released on drop.
///
/// Writers must present it to [`StackStore::replace`], so the state read
/// under the lock is the state replaced under it.
#[derive(Debug)]
pub struct StackLock {
    _lock: FileLock,
    branch: String,
}

impl StackLock {
    pub fn branch(&self) -> &str {
        &self.branch
    }
}

/// Persisted patch stacks, one JSON file per branch under `.pq/stacks/`
pub struct StackStore {
    branch: String,
    /// Path to the state directory
    config_dir: PathBuf,
    /// Path to this branch's stack file
    stack_file: PathBuf,
    /// Path to this branch's stack log
    log_file: PathBuf,
    /// Path to the advisory lock held for whole operations
    lock_file: PathBuf,
}

impl StackStore {
    /// Create a store handle for `branch` in the repository at `repo_path`
    pub fn new(repo_path: &Path, branch: &str) -> Result<Self> {
        let config_dir = get_repo_config_dir(repo_path)?;
        let stacks_dir = config_dir.join("stacks");
        let file_stem = sanitize_filename(branch);

        Ok(Self {
            branch: branch.to_string(),
            stack_file: stacks_dir.join(format!("{file_stem}.json")),
            log_file: stacks_dir.join(format!("{file_stem}.log.jsonl")),
            lock_file: stacks_dir.join(format!("{file_stem}.rebase-lock")),
            config_dir,
        })
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    /// Directory holding the store's files and transient rebase files
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn stack_file(&self) -> &Path {
        &self.stack_file
    }

    /// Whether a stack has been initialised for this branch
    pub fn exists(&self) -> bool {
        self.stack_file.exists()
    }

    /// Take the exclusive stack lock without waiting
    pub fn lock(&self) -> Result<StackLock> {
        ensure_config_dir(&self.config_dir)?;
        let lock = FileLock::try_acquire(&self.lock_file)?;
        debug!("Acquired stack lock {}", lock.path().display());

        Ok(StackLock {
            _lock: lock,
            branch: self.branch.clone(),
        })
    }

    /// Create an empty stack for the branch on top of `base`
    pub fn initialize(&self, lock: &StackLock, base: &str) -> Result<Stack> {
        if self.exists() {
            return Err(PatchQueueError::config(format!(
                "Branch '{}' is already initialized",
                self.branch
            )));
        }

        let stack = Stack::new(self.branch.clone(), base.to_string());
        self.replace(lock, &stack, "initialise")?;
        Ok(stack)
    }

    /// Load and validate the branch's stack
    pub fn load(&self) -> Result<Stack> {
        if !self.exists() {
            return Err(PatchQueueError::not_initialized(&self.branch));
        }

        let content = fs::read_to_string(&self.stack_file)
            .map_err(|e| PatchQueueError::config(format!("Failed to read stack file: {e}")))?;

        let stack: Stack = serde_json::from_str(&content)
            .map_err(|e| PatchQueueError::corruption(format!("Failed to parse stack file: {e}")))?;

        if stack.branch != self.branch {
            return Err(PatchQueueError::corruption(format!(
                "Stack file {} belongs to branch '{}', expected '{}'",
                self.stack_file.display(),
                stack.branch,
                self.branch
            )));
        }

        stack.validate().map_err(|e| {
            PatchQueueError::corruption(format!("Stack for '{}': {e}", self.branch))
        })?;

        Ok(stack)
    }

    /// Atomically replace the persisted stack, then record it in the stack log
    pub fn replace(&self, lock: &StackLock, stack: &Stack, message: &str) -> Result<()> {
        if lock.branch() != self.branch {
            return Err(PatchQueueError::validation(format!(
                "Lock for branch '{}' cannot write stack '{}'",
                lock.branch(),
                self.branch
            )));
        }

        stack.validate().map_err(PatchQueueError::validation)?;
        ensure_config_dir(&self.config_dir)?;
        atomic_file::write_json(&self.stack_file, stack)?;

        info!(
            "Stack '{}' replaced ({}): {} applied, {} unapplied",
            self.branch,
            message,
            stack.applied().len(),
            stack.unapplied().len()
        );

        if let Err(e) = self.append_log(StackLogEntry::from_stack(stack, message)) {
            warn!("Failed to append to stack log for '{}': {}", self.branch, e);
        }

        Ok(())
    }

    /// Stack log entries, oldest first
    pub fn log(&self) -> Result<Vec<StackLogEntry>> {
        if !self.log_file.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&self.log_file)
            .map_err(|e| PatchQueueError::config(format!("Failed to read stack log: {e}")))?;

        content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(index, line)| {
                serde_json::from_str(line).map_err(|e| {
                    PatchQueueError::corruption(format!(
                        "Failed to parse stack log line {}: {e}",
                        index + 1
                    ))
                })
            })
            .collect()
    }

    /// Append one entry as a single JSON line
    fn append_log(&self, entry: StackLogEntry) -> Result<()> {
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_file)?;
        file.write_all(line.as_bytes())?;
        debug!("Appended '{}' to {}", entry.message, self.log_file.display());
        Ok(())
    }
}
