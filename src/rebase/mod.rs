//! Interactive rebase of a patch stack
//!
//! - `todo`: rendering a stack as an editable todo list and parsing it back
//! - `validate`: checking a parsed list against the stack before anything moves
//! - `transform`: replaying a checked plan and committing the new stack
//! - `editor`: the external editing step
//! - `orchestrator`: sequencing all of the above under the stack lock

pub mod editor;
pub mod orchestrator;
pub mod todo;
pub mod transform;
pub mod validate;

pub use editor::{ExternalEditor, TodoEditor};
pub use orchestrator::{RebaseOptions, RebaseOrchestrator, RebaseOutcome};
pub use todo::{render_todo, Instruction, InstructionKind, RenderOptions, TodoList, APPLY_LINE};
pub use transform::{
    CommitMutator, StackTransformer, TransformOptions, TransformOutcome, TransformState,
    Transaction,
};
pub use validate::{validate, ValidatedPlan};
