use super::Workspace;
use crate::cli::output::Output;
use crate::errors::{PatchQueueError, Result};
use crate::git::GitCommitMutator;
use crate::rebase::CommitMutator;
use crate::stack::validate_patch_name;
use console::style;

/// Commit the staged changes as a new patch directly above the top applied one
pub fn run(name: &str, message: Option<String>) -> Result<()> {
    validate_patch_name(name).map_err(PatchQueueError::validation)?;

    let ws = Workspace::open()?;
    let lock = ws.store.lock()?;
    let mut stack = ws.store.load()?;

    if stack.contains(name) {
        return Err(PatchQueueError::validation(format!(
            "Patch '{name}' already exists"
        )));
    }

    let head = ws.repo.get_head_commit_hash()?;
    if head != stack.head() {
        return Err(PatchQueueError::validation(format!(
            "Branch head {} is not the top of the stack ({}); was the branch changed outside pq?",
            head,
            stack.head()
        )));
    }

    let message = message.unwrap_or_else(|| name.to_string());
    let commit = ws.repo.commit_staged(&message)?;
    let summary = ws.repo.commit_summary(&commit)?;

    let commits = GitCommitMutator::new(&ws.repo, &ws.branch, &ws.settings.patches.ref_prefix);
    commits.record(name, &commit)?;

    stack.push_applied(name.to_string(), commit, summary);
    ws.store.replace(&lock, &stack, &format!("new {name}"))?;

    Output::success(format!("Created patch '{}'", style(name).cyan()));
    Ok(())
}
