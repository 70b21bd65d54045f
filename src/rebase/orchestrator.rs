use super::editor::TodoEditor;
use super::todo::{render_todo, RenderOptions, TodoList};
use super::transform::{CommitMutator, StackTransformer, TransformOptions, TransformOutcome};
use super::validate::validate;
use crate::errors::{PatchQueueError, Result};
use crate::stack::{Stack, StackStore};
use crate::utils::atomic_file;
use crate::utils::platform::normalize_line_endings;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// How a rebase should run
#[derive(Debug, Clone)]
pub struct RebaseOptions {
    /// Let the user edit the todo list
    pub interactive: bool,
    /// Leave every patch unapplied afterwards (non-interactive only)
    pub nopush: bool,
    /// Commit to move the stack base to
    pub new_base: Option<String>,
    /// Report patches whose change is already upstream
    pub merged: bool,
    pub render: RenderOptions,
    /// File name of the todo list inside the state directory
    pub todo_file: String,
}

impl Default for RebaseOptions {
    fn default() -> Self {
        Self {
            interactive: false,
            nopush: false,
            new_base: None,
            merged: false,
            render: RenderOptions::default(),
            todo_file: "REBASE_TODO".to_string(),
        }
    }
}

#[derive(Debug)]
pub enum RebaseOutcome {
    /// Nothing to rearrange; the store was not touched
    NoOp,
    Rebased(TransformOutcome),
}

/// Todo file on disk for the duration of one edit, removed on drop
struct TodoFile {
    path: PathBuf,
}

impl TodoFile {
    fn create(path: PathBuf, content: &str) -> Result<Self> {
        atomic_file::write_string(&path, content)?;
        Ok(Self { path })
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<String> {
        fs::read_to_string(&self.path).map_err(|e| {
            PatchQueueError::EditorCancelled(format!(
                "could not read {}: {e}",
                self.path.display()
            ))
        })
    }
}

impl Drop for TodoFile {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove todo file {}: {}", self.path.display(), e);
            }
        }
    }
}

/// Runs render → edit → parse → validate → transform for one branch,
/// holding the stack lock from the first read to the commit.
pub struct RebaseOrchestrator<'a, E: TodoEditor, C: CommitMutator> {
    store: &'a StackStore,
    editor: E,
    commits: C,
}

impl<'a, E: TodoEditor, C: CommitMutator> RebaseOrchestrator<'a, E, C> {
    pub fn new(store: &'a StackStore, editor: E, commits: C) -> Self {
        Self {
            store,
            editor,
            commits,
        }
    }

    pub fn run(&self, options: &RebaseOptions) -> Result<RebaseOutcome> {
        let lock = self.store.lock()?;
        let stack = self.store.load()?;

        let moves_base = options
            .new_base
            .as_deref()
            .is_some_and(|base| base != stack.base);
        if stack.is_empty() && !moves_base {
            info!("Stack '{}' is empty; nothing to rebase", stack.branch);
            return Ok(RebaseOutcome::NoOp);
        }

        self.commits.ensure_clean()?;
        let head = self.commits.head()?;
        if head != stack.head() {
            return Err(PatchQueueError::validation(format!(
                "Branch head {} is not the top of the stack ({}); was the branch changed outside pq?",
                head,
                stack.head()
            )));
        }

        let todo = if options.interactive {
            self.edit_todo(&stack, options)?
        } else {
            let applied = if options.nopush { 0 } else { stack.boundary() };
            TodoList::keep_all(&stack, applied)
        };

        let plan = validate(todo, &stack)?;
        debug!(
            "Plan for '{}' has {} instructions, marker at {:?}",
            stack.branch,
            plan.instructions().len(),
            plan.apply_line()
        );

        let transform_options = TransformOptions {
            new_base: options.new_base.clone(),
            message: Self::log_message(options),
            merged: options.merged,
        };
        let mut transformer = StackTransformer::new(&self.commits);
        let outcome = transformer.transform(self.store, &lock, &stack, plan, &transform_options)?;

        Ok(RebaseOutcome::Rebased(outcome))
    }

    fn edit_todo(&self, stack: &Stack, options: &RebaseOptions) -> Result<TodoList> {
        let text = render_todo(stack, options.render);
        let file = TodoFile::create(self.store.config_dir().join(&options.todo_file), &text)?;

        self.editor.edit(file.path())?;
        let edited = file.read()?;
        TodoList::parse(&normalize_line_endings(&edited))
    }

    fn log_message(options: &RebaseOptions) -> String {
        let mut message = String::from("rebase");
        if options.interactive {
            message.push_str(" --interactive");
        }
        if options.nopush {
            message.push_str(" --nopush");
        }
        if options.merged {
            message.push_str(" --merged");
        }
        if let Some(base) = &options.new_base {
            message.push(' ');
            message.push_str(base);
        }
        message
    }
}
