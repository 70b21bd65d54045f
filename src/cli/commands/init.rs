use crate::cli::output::Output;
use crate::config::{initialize_repo, REPO_DIR_NAME};
use crate::errors::Result;
use crate::git::{ensure_excluded, get_current_repository};
use crate::stack::StackStore;
use console::style;
use tracing::debug;

/// Start a stack on the current branch with its head as the base
pub fn run() -> Result<()> {
    let repo = get_current_repository()?;
    let branch = repo.get_current_branch()?;
    debug!("Found Git repository at: {}", repo.path().display());

    initialize_repo(repo.path())?;
    ensure_excluded(repo.path(), &format!("/{REPO_DIR_NAME}/"))?;

    let store = StackStore::new(repo.path(), &branch)?;
    let lock = store.lock()?;
    let base = repo.get_head_commit_hash()?;
    store.initialize(&lock, &base)?;

    Output::success(format!("Initialized patch stack on '{}'", style(&branch).cyan()));
    Output::sub_item(format!("Base: {}", style(&base[..base.len().min(8)]).dim()));
    Output::tip("Stage changes and run 'pq new <name>' to create the first patch");
    Ok(())
}
