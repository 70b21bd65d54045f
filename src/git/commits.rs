use super::repository::GitRepository;
use crate::errors::{PatchQueueError, Result};
use crate::rebase::CommitMutator;

/// [`CommitMutator`] backed by a git repository.
///
/// Each patch is kept reachable by a ref `<prefix>/<branch>/<patch>`, so
/// unapplied patches survive garbage collection.
pub struct GitCommitMutator<'r> {
    repo: &'r GitRepository,
    branch: String,
    ref_prefix: String,
}

impl<'r> GitCommitMutator<'r> {
    pub fn new(repo: &'r GitRepository, branch: &str, ref_prefix: &str) -> Self {
        Self {
            repo,
            branch: branch.to_string(),
            ref_prefix: ref_prefix.trim_end_matches('/').to_string(),
        }
    }

    /// Full ref name for a patch
    pub fn patch_ref(&self, patch: &str) -> String {
        format!("{}/{}/{}", self.ref_prefix, self.branch, patch)
    }
}

impl CommitMutator for GitCommitMutator<'_> {
    fn parent(&self, commit: &str) -> Result<String> {
        self.repo.parent_of(commit)
    }

    fn squash(&self, target: &str, source: &str) -> Result<String> {
        self.repo.squash_commits(target, source)
    }

    fn rebase_onto(&self, commit: &str, parent: &str) -> Result<String> {
        self.repo.rebase_commit(commit, parent)
    }

    fn is_empty_change(&self, commit: &str) -> Result<bool> {
        self.repo.is_empty_commit(commit)
    }

    fn recorded(&self, patch: &str) -> Result<Option<String>> {
        self.repo.ref_target(&self.patch_ref(patch))
    }

    fn record(&self, patch: &str, commit: &str) -> Result<()> {
        self.repo
            .set_ref(&self.patch_ref(patch), commit, &format!("pq: record {patch}"))
    }

    fn discard(&self, patch: &str, _commit: &str) -> Result<()> {
        self.repo.delete_ref(&self.patch_ref(patch))
    }

    fn checkout(&self, head: &str) -> Result<()> {
        self.repo.checkout_commit(head)
    }

    fn check_checkout(&self, head: &str) -> Result<()> {
        self.repo.check_checkout(head)
    }

    fn head(&self) -> Result<String> {
        let branch = self.repo.get_current_branch()?;
        if branch != self.branch {
            return Err(PatchQueueError::validation(format!(
                "Checked-out branch '{}' is not '{}'",
                branch, self.branch
            )));
        }
        self.repo.get_head_commit_hash()
    }

    fn ensure_clean(&self) -> Result<()> {
        if self.repo.is_dirty()? {
            return Err(PatchQueueError::DirtyWorkingTree);
        }
        Ok(())
    }
}
