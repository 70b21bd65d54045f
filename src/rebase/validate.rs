use super::todo::{Instruction, InstructionKind, TodoList};
use crate::errors::{PatchQueueError, Result};
use crate::stack::Stack;
use std::collections::HashSet;
use tracing::debug;

pub(crate) const NOT_IN_STACK: &str = "not in the stack";
const LISTED_TWICE: &str = "listed more than once";
const MISSING: &str = "missing from the todo list";

/// A todo list checked against the stack it will be applied to.
///
/// Only [`validate`] constructs one, so holding a `ValidatedPlan` means the
/// instructions name every patch of that stack exactly once and every
/// squash has something to fold into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedPlan {
    todo: TodoList,
}

impl ValidatedPlan {
    pub fn instructions(&self) -> &[Instruction] {
        self.todo.instructions()
    }

    pub fn apply_line(&self) -> Option<usize> {
        self.todo.apply_line()
    }

    pub fn is_empty(&self) -> bool {
        self.todo.is_empty()
    }
}

/// Check a parsed todo list against the current stack before anything is mutated.
///
/// Checks run in order: every named patch exists and is named once
/// ([`PatchQueueError::BadPatchName`]); no squash precedes the first kept
/// patch ([`PatchQueueError::BadTodoLine`]); no patch of the stack is left
/// out ([`PatchQueueError::BadPatchName`]).
pub fn validate(todo: TodoList, stack: &Stack) -> Result<ValidatedPlan> {
    let mut seen = HashSet::new();
    for instruction in todo.instructions() {
        if !stack.contains(&instruction.patch) {
            debug!("Todo names unknown patch '{}'", instruction.patch);
            return Err(PatchQueueError::bad_patch_name(&instruction.patch, NOT_IN_STACK));
        }
        if !seen.insert(instruction.patch.as_str()) {
            debug!("Todo names patch '{}' more than once", instruction.patch);
            return Err(PatchQueueError::bad_patch_name(&instruction.patch, LISTED_TWICE));
        }
    }

    let mut has_target = false;
    for instruction in todo.instructions() {
        match instruction.kind {
            InstructionKind::Keep => has_target = true,
            InstructionKind::Squash if !has_target => {
                return Err(PatchQueueError::BadTodoLine(format!(
                    "{instruction} (nothing above it to squash into)"
                )));
            }
            InstructionKind::Squash | InstructionKind::Delete => {}
        }
    }

    if let Some(missing) = stack
        .patches()
        .iter()
        .find(|patch| !seen.contains(patch.name.as_str()))
    {
        debug!("Todo leaves out patch '{}'", missing.name);
        return Err(PatchQueueError::bad_patch_name(&missing.name, MISSING));
    }

    Ok(ValidatedPlan { todo })
}
