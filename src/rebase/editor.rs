use crate::errors::{PatchQueueError, Result};
use crate::utils::platform::shell_command_with_file;
use std::path::Path;
use tracing::debug;

/// Lets the user rewrite a todo file in place
pub trait TodoEditor {
    /// Edit the file at `path`; an error means the edit was abandoned
    fn edit(&self, path: &Path) -> Result<()>;
}

impl<T: TodoEditor + ?Sized> TodoEditor for &T {
    fn edit(&self, path: &Path) -> Result<()> {
        (**self).edit(path)
    }
}

/// Runs an editor command line through the shell and waits for it
#[derive(Debug, Clone)]
pub struct ExternalEditor {
    command: String,
}

impl ExternalEditor {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }
}

impl TodoEditor for ExternalEditor {
    fn edit(&self, path: &Path) -> Result<()> {
        debug!("Running editor '{}' on {}", self.command, path.display());

        let status = shell_command_with_file(&self.command, path)
            .status()
            .map_err(|e| {
                PatchQueueError::EditorCancelled(format!(
                    "failed to start editor '{}': {e}",
                    self.command
                ))
            })?;

        if !status.success() {
            return Err(PatchQueueError::EditorCancelled(format!(
                "editor '{}' exited with {}",
                self.command, status
            )));
        }

        Ok(())
    }
}
