/// Patch queue error types
#[derive(Debug, thiserror::Error)]
pub enum PatchQueueError {
    /// Git-related errors
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Persisted stack state that violates the stack invariants
    #[error("Stack corruption: {0}")]
    Corruption(String),

    /// Another operation holds the stack lock
    #[error("Stack is locked: {0}")]
    Locked(String),

    /// Local changes or untracked files would be clobbered by a working-tree sync
    #[error("Working tree has local changes that would be overwritten; commit, stash or move them first")]
    DirtyWorkingTree,

    /// The todo editor exited unsuccessfully or left no readable file
    #[error("Editor cancelled: {0}")]
    EditorCancelled(String),

    /// Marker line malformed or repeated
    #[error("Bad APPLY_LINE: '{0}'")]
    BadApplyLine(String),

    /// Todo line that is not `<instruction> <patch>`, or a squash with nothing to squash into
    #[error("Bad todo line: '{0}'")]
    BadTodoLine(String),

    /// Patch name unknown, duplicated, or left out of the plan
    #[error("Bad patch name '{name}': {reason}")]
    BadPatchName { name: String, reason: &'static str },

    /// Instruction keyword not recognized
    #[error("Unknown instruction '{0}'")]
    UnknownInstruction(String),

    /// A squash could not be merged cleanly
    #[error("Merge conflict: {0}")]
    MergeConflict(String),
}

impl PatchQueueError {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        PatchQueueError::Config(msg.into())
    }

    pub fn validation<S: Into<String>>(msg: S) -> Self {
        PatchQueueError::Validation(msg.into())
    }

    pub fn corruption<S: Into<String>>(msg: S) -> Self {
        PatchQueueError::Corruption(msg.into())
    }

    pub fn not_initialized<S: Into<String>>(branch: S) -> Self {
        PatchQueueError::config(format!(
            "Branch '{}' is not initialized; run 'pq init' first",
            branch.into()
        ))
    }

    pub fn bad_patch_name<S: Into<String>>(name: S, reason: &'static str) -> Self {
        PatchQueueError::BadPatchName {
            name: name.into(),
            reason,
        }
    }

    pub fn merge_conflict<S: Into<String>>(msg: S) -> Self {
        PatchQueueError::MergeConflict(msg.into())
    }

    /// Whether this error came from reading or checking the todo list
    pub fn is_todo_error(&self) -> bool {
        matches!(
            self,
            PatchQueueError::BadApplyLine(_)
                | PatchQueueError::BadTodoLine(_)
                | PatchQueueError::BadPatchName { .. }
                | PatchQueueError::UnknownInstruction(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, PatchQueueError>;
