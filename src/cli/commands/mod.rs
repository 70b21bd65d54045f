pub mod completions;
pub mod config;
pub mod init;
pub mod log;
pub mod new;
pub mod rebase;
pub mod series;

use crate::config::{is_repo_initialized, Settings};
use crate::errors::{PatchQueueError, Result};
use crate::git::{get_current_repository, GitRepository};
use crate::stack::StackStore;

/// Repository, settings and stack store of the checked-out branch
pub(crate) struct Workspace {
    pub repo: GitRepository,
    pub branch: String,
    pub settings: Settings,
    pub store: StackStore,
}

impl Workspace {
    /// Open the current repository; fails unless `pq init` has run on this branch
    pub fn open() -> Result<Self> {
        let repo = get_current_repository()?;
        let branch = repo.get_current_branch()?;

        if !is_repo_initialized(repo.path()) {
            return Err(PatchQueueError::not_initialized(&branch));
        }

        let settings = Settings::load(repo.path())?;
        let store = StackStore::new(repo.path(), &branch)?;
        if !store.exists() {
            return Err(PatchQueueError::not_initialized(&branch));
        }

        Ok(Self {
            repo,
            branch,
            settings,
            store,
        })
    }
}
