pub mod commits;
pub mod repository;

pub use commits::GitCommitMutator;
pub use repository::GitRepository;

use crate::errors::{PatchQueueError, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Resolve the per-worktree git directory from a workdir path.
/// Handles both normal repos (.git is a directory) and worktrees (.git is a file
/// containing `gitdir: <path>`).
pub fn resolve_git_dir(workdir: &Path) -> Result<PathBuf> {
    let git_path = workdir.join(".git");
    if git_path.is_dir() {
        Ok(git_path)
    } else if git_path.is_file() {
        let content = fs::read_to_string(&git_path)
            .map_err(|e| PatchQueueError::config(format!("Failed to read .git file: {e}")))?;
        let gitdir = content
            .strip_prefix("gitdir: ")
            .map(|s| s.trim())
            .ok_or_else(|| PatchQueueError::config("Invalid .git file format"))?;
        let resolved = if Path::new(gitdir).is_absolute() {
            PathBuf::from(gitdir)
        } else {
            workdir.join(gitdir)
        };
        Ok(resolved)
    } else {
        Err(PatchQueueError::config(format!(
            "Not a git repository: {}",
            git_path.display()
        )))
    }
}

/// Add `pattern` to the repository's `info/exclude` unless it is already listed
pub fn ensure_excluded(workdir: &Path, pattern: &str) -> Result<()> {
    let info_dir = resolve_git_dir(workdir)?.join("info");
    fs::create_dir_all(&info_dir)?;
    let exclude_file = info_dir.join("exclude");

    let existing = match fs::read_to_string(&exclude_file) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e.into()),
    };
    if existing.lines().any(|line| line.trim() == pattern) {
        return Ok(());
    }

    let mut updated = existing;
    if !updated.is_empty() && !updated.ends_with('\n') {
        updated.push('\n');
    }
    updated.push_str(pattern);
    updated.push('\n');
    fs::write(&exclude_file, updated)?;
    Ok(())
}

/// Find the root of the Git repository
pub fn find_repository_root(start_path: &Path) -> Result<PathBuf> {
    let repo = git2::Repository::discover(start_path).map_err(PatchQueueError::Git)?;

    let workdir = repo.workdir().ok_or_else(|| {
        PatchQueueError::config("Repository has no working directory (bare repo?)")
    })?;

    Ok(workdir.to_path_buf())
}

/// Get the current working directory as a Git repository
pub fn get_current_repository() -> Result<GitRepository> {
    let current_dir = std::env::current_dir()
        .map_err(|e| PatchQueueError::config(format!("Could not get current directory: {e}")))?;

    let repo_root = find_repository_root(&current_dir)?;
    GitRepository::open(&repo_root)
}
