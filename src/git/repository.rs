use crate::errors::{PatchQueueError, Result};
use git2::build::CheckoutBuilder;
use git2::{CheckoutNotificationType, Commit, Oid, Repository, Signature, StatusOptions, Tree};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Wrapper around git2::Repository with the operations patch stacks need
pub struct GitRepository {
    repo: Repository,
    path: PathBuf,
}

impl GitRepository {
    /// Open a Git repository at the given path
    pub fn open(path: &Path) -> Result<Self> {
        let repo = Repository::discover(path)
            .map_err(|e| PatchQueueError::config(format!("Not a git repository: {e}")))?;

        let workdir = repo
            .workdir()
            .ok_or_else(|| PatchQueueError::config("Repository has no working directory"))?
            .to_path_buf();

        Ok(Self {
            repo,
            path: workdir,
        })
    }

    /// Get repository path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the current branch name
    pub fn get_current_branch(&self) -> Result<String> {
        let head = self
            .repo
            .head()
            .map_err(|e| PatchQueueError::validation(format!("Could not get HEAD: {e}")))?;

        if !head.is_branch() {
            return Err(PatchQueueError::validation(
                "HEAD is detached; check out a branch first",
            ));
        }

        head.shorthand()
            .map(str::to_string)
            .ok_or_else(|| PatchQueueError::validation("Branch name is not valid UTF-8"))
    }

    /// Get the HEAD commit hash
    pub fn get_head_commit_hash(&self) -> Result<String> {
        Ok(self.get_head_commit()?.id().to_string())
    }

    /// Get the HEAD commit object
    pub fn get_head_commit(&self) -> Result<Commit<'_>> {
        let head = self
            .repo
            .head()
            .map_err(|e| PatchQueueError::validation(format!("Could not get HEAD: {e}")))?;
        head.peel_to_commit()
            .map_err(|e| PatchQueueError::validation(format!("Could not get HEAD commit: {e}")))
    }

    /// Check for staged or unstaged changes to tracked files
    pub fn is_dirty(&self) -> Result<bool> {
        let mut options = StatusOptions::new();
        options.include_untracked(false).include_ignored(false);
        let statuses = self
            .repo
            .statuses(Some(&mut options))
            .map_err(PatchQueueError::Git)?;

        Ok(statuses.iter().any(|status| {
            status.status().intersects(
                git2::Status::INDEX_MODIFIED
                    | git2::Status::INDEX_NEW
                    | git2::Status::INDEX_DELETED
                    | git2::Status::INDEX_RENAMED
                    | git2::Status::WT_MODIFIED
                    | git2::Status::WT_DELETED
                    | git2::Status::WT_RENAMED
                    | git2::Status::CONFLICTED,
            )
        }))
    }

    /// Get a commit object by hash
    pub fn get_commit(&self, commit_hash: &str) -> Result<Commit<'_>> {
        let oid = Oid::from_str(commit_hash).map_err(PatchQueueError::Git)?;
        self.repo.find_commit(oid).map_err(PatchQueueError::Git)
    }

    /// Resolve a reference (branch name, tag, or commit hash) to a commit
    pub fn resolve_reference(&self, reference: &str) -> Result<Commit<'_>> {
        if let Ok(oid) = Oid::from_str(reference) {
            if let Ok(commit) = self.repo.find_commit(oid) {
                return Ok(commit);
            }
        }

        let obj = self.repo.revparse_single(reference).map_err(|e| {
            PatchQueueError::validation(format!("Could not resolve reference '{reference}': {e}"))
        })?;

        obj.peel_to_commit().map_err(|e| {
            PatchQueueError::validation(format!(
                "Reference '{reference}' does not point to a commit: {e}"
            ))
        })
    }

    /// First line of a commit's message
    pub fn commit_summary(&self, commit_hash: &str) -> Result<String> {
        let commit = self.get_commit(commit_hash)?;
        Ok(commit.summary().unwrap_or_default().to_string())
    }

    /// First parent of a commit
    pub fn parent_of(&self, commit_hash: &str) -> Result<String> {
        let commit = self.get_commit(commit_hash)?;
        let parent = commit.parent_id(0).map_err(|_| {
            PatchQueueError::validation(format!("Commit {commit_hash} has no parent"))
        })?;
        Ok(parent.to_string())
    }

    /// Commit the staged changes on top of HEAD and advance the current branch
    pub fn commit_staged(&self, message: &str) -> Result<String> {
        let signature = self.get_signature()?;
        let mut index = self.repo.index().map_err(PatchQueueError::Git)?;
        let tree_id = index.write_tree().map_err(PatchQueueError::Git)?;
        let tree = self.repo.find_tree(tree_id).map_err(PatchQueueError::Git)?;
        let parent_commit = self.get_head_commit()?;

        let commit_id = self
            .repo
            .commit(
                Some("HEAD"),
                &signature,
                &signature,
                message,
                &tree,
                &[&parent_commit],
            )
            .map_err(PatchQueueError::Git)?;

        info!("Created commit: {} - {}", commit_id, message.lines().next().unwrap_or(""));
        Ok(commit_id.to_string())
    }

    /// Fold `source`'s change into `target`.
    ///
    /// The result has `target`'s parent, author and message followed by
    /// `source`'s message. No ref is updated.
    pub fn squash_commits(&self, target: &str, source: &str) -> Result<String> {
        let target_commit = self.get_commit(target)?;
        let source_commit = self.get_commit(source)?;
        let target_parent = target_commit.parent(0).map_err(PatchQueueError::Git)?;

        let tree = self.merge_change(&source_commit, &target_commit).map_err(|e| match e {
            PatchQueueError::MergeConflict(files) => PatchQueueError::merge_conflict(format!(
                "{} does not apply on top of {}: {files}",
                short(source),
                short(target)
            )),
            other => other,
        })?;

        let message = format!(
            "{}\n\n{}\n",
            target_commit.message().unwrap_or_default().trim_end(),
            source_commit.message().unwrap_or_default().trim_end()
        );
        let committer = self.get_signature()?;
        let oid = self
            .repo
            .commit(
                None,
                &target_commit.author(),
                &committer,
                &message,
                &tree,
                &[&target_parent],
            )
            .map_err(PatchQueueError::Git)?;

        debug!("Squashed {} into {} -> {}", short(source), short(target), oid);
        Ok(oid.to_string())
    }

    /// Re-create `commit`'s change on top of `onto`, keeping author and message.
    /// No ref is updated.
    pub fn rebase_commit(&self, commit: &str, onto: &str) -> Result<String> {
        let commit_obj = self.get_commit(commit)?;
        let onto_commit = self.get_commit(onto)?;

        let tree = self.merge_change(&commit_obj, &onto_commit).map_err(|e| match e {
            PatchQueueError::MergeConflict(files) => PatchQueueError::merge_conflict(format!(
                "{} does not apply on top of {}: {files}",
                short(commit),
                short(onto)
            )),
            other => other,
        })?;

        let committer = self.get_signature()?;
        let oid = self
            .repo
            .commit(
                None,
                &commit_obj.author(),
                &committer,
                commit_obj.message().unwrap_or_default(),
                &tree,
                &[&onto_commit],
            )
            .map_err(PatchQueueError::Git)?;

        debug!("Rebased {} onto {} -> {}", short(commit), short(onto), oid);
        Ok(oid.to_string())
    }

    /// Three-way merge of `change` (against its own parent) into `onto`'s tree
    fn merge_change(&self, change: &Commit<'_>, onto: &Commit<'_>) -> Result<Tree<'_>> {
        let ancestor_tree = if change.parent_count() > 0 {
            change
                .parent(0)
                .and_then(|parent| parent.tree())
                .map_err(PatchQueueError::Git)?
        } else {
            let empty_tree_oid = self.repo.treebuilder(None)?.write()?;
            self.repo.find_tree(empty_tree_oid)?
        };
        let onto_tree = onto.tree().map_err(PatchQueueError::Git)?;
        let change_tree = change.tree().map_err(PatchQueueError::Git)?;

        let mut index = self
            .repo
            .merge_trees(&ancestor_tree, &onto_tree, &change_tree, None)
            .map_err(PatchQueueError::Git)?;

        if index.has_conflicts() {
            let files: Vec<String> = index
                .conflicts()
                .map_err(PatchQueueError::Git)?
                .filter_map(|conflict| conflict.ok())
                .filter_map(|conflict| conflict.our.or(conflict.their).or(conflict.ancestor))
                .map(|entry| String::from_utf8_lossy(&entry.path).into_owned())
                .collect();
            return Err(PatchQueueError::merge_conflict(files.join(", ")));
        }

        let tree_oid = index.write_tree_to(&self.repo).map_err(PatchQueueError::Git)?;
        self.repo.find_tree(tree_oid).map_err(PatchQueueError::Git)
    }

    /// Create or move a ref to point at `commit_hash`
    pub fn set_ref(&self, name: &str, commit_hash: &str, log_message: &str) -> Result<()> {
        let oid = Oid::from_str(commit_hash).map_err(PatchQueueError::Git)?;
        self.repo
            .reference(name, oid, true, log_message)
            .map_err(PatchQueueError::Git)?;
        debug!("Set {} -> {}", name, short(commit_hash));
        Ok(())
    }

    /// Delete a ref; a missing ref is not an error
    pub fn delete_ref(&self, name: &str) -> Result<()> {
        match self.repo.find_reference(name) {
            Ok(mut reference) => {
                reference.delete().map_err(PatchQueueError::Git)?;
                debug!("Deleted {}", name);
                Ok(())
            }
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(()),
            Err(e) => Err(PatchQueueError::Git(e)),
        }
    }

    /// Target of a ref, if it exists
    pub fn ref_target(&self, name: &str) -> Result<Option<String>> {
        match self.repo.find_reference(name) {
            Ok(reference) => Ok(reference.target().map(|oid| oid.to_string())),
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
            Err(e) => Err(PatchQueueError::Git(e)),
        }
    }

    /// Whether a commit's tree equals its first parent's tree
    pub fn is_empty_commit(&self, commit_hash: &str) -> Result<bool> {
        let commit = self.get_commit(commit_hash)?;
        if commit.parent_count() == 0 {
            return Ok(false);
        }
        let parent = commit.parent(0).map_err(PatchQueueError::Git)?;
        Ok(commit.tree_id() == parent.tree_id())
    }

    /// Check that a safe checkout of `commit_hash` would succeed, without
    /// touching the index or working tree.
    ///
    /// Fails with [`PatchQueueError::DirtyWorkingTree`] when local files,
    /// untracked ones included, would be overwritten.
    pub fn check_checkout(&self, commit_hash: &str) -> Result<()> {
        let target = self.get_commit(commit_hash)?;
        let mut blocked = Vec::new();

        let result = {
            let mut builder = CheckoutBuilder::new();
            builder
                .safe()
                .dry_run()
                .notify_on(CheckoutNotificationType::CONFLICT)
                .notify(|_, path, _, _, _| {
                    if let Some(path) = path {
                        blocked.push(path.display().to_string());
                    }
                    true
                });
            self.repo.checkout_tree(target.as_object(), Some(&mut builder))
        };

        match result {
            Ok(()) => Ok(()),
            Err(e) if e.code() == git2::ErrorCode::Conflict => {
                warn!(
                    "Checking out {} would overwrite local files: {}",
                    short(commit_hash),
                    blocked.join(", ")
                );
                Err(PatchQueueError::DirtyWorkingTree)
            }
            Err(e) => Err(PatchQueueError::Git(e)),
        }
    }

    /// Move the index and working tree to `commit_hash` with a safe
    /// checkout, then point the current branch at it
    pub fn checkout_commit(&self, commit_hash: &str) -> Result<()> {
        let target = self.get_commit(commit_hash)?;
        let branch_ref = self
            .repo
            .head()
            .map_err(PatchQueueError::Git)?
            .name()
            .map(str::to_string)
            .ok_or_else(|| PatchQueueError::validation("HEAD is not valid UTF-8"))?;

        let mut builder = CheckoutBuilder::new();
        builder.safe();
        self.repo
            .checkout_tree(target.as_object(), Some(&mut builder))
            .map_err(|e| match e.code() {
                git2::ErrorCode::Conflict => PatchQueueError::DirtyWorkingTree,
                _ => PatchQueueError::Git(e),
            })?;

        self.repo
            .reference(&branch_ref, target.id(), true, "pq: checkout")
            .map_err(PatchQueueError::Git)?;

        debug!("Checked out {} on {}", short(commit_hash), branch_ref);
        Ok(())
    }

    /// Get a signature for commits
    fn get_signature(&self) -> Result<Signature<'static>> {
        if let Ok(signature) = self.repo.signature() {
            return Ok(signature);
        }

        Signature::now("pq", "pq@localhost").map_err(PatchQueueError::Git)
    }
}

fn short(commit_hash: &str) -> &str {
    commit_hash.get(..8).unwrap_or(commit_hash)
}
