use super::Workspace;
use crate::cli::output::Output;
use crate::errors::Result;
use crate::git::GitCommitMutator;
use crate::rebase::{
    ExternalEditor, RebaseOptions, RebaseOrchestrator, RebaseOutcome, RenderOptions,
};
use console::style;
use tracing::debug;

/// Rearrange the current branch's stack, interactively or keeping every patch
pub fn run(
    new_base: Option<String>,
    interactive: bool,
    nopush: bool,
    merged: bool,
) -> Result<()> {
    let ws = Workspace::open()?;

    let new_base = match new_base {
        Some(reference) => {
            let id = ws.repo.resolve_reference(&reference)?.id().to_string();
            debug!("Resolved new base '{}' to {}", reference, id);
            Some(id)
        }
        None => None,
    };

    let options = RebaseOptions {
        interactive,
        nopush,
        new_base,
        merged,
        render: RenderOptions::from(&ws.settings.rebase),
        todo_file: ws.settings.rebase.todo_file.clone(),
    };
    let editor = ExternalEditor::new(ws.settings.editor_command());
    let commits = GitCommitMutator::new(&ws.repo, &ws.branch, &ws.settings.patches.ref_prefix);

    let outcome = RebaseOrchestrator::new(&ws.store, editor, commits)
        .run(&options)
        .inspect_err(|e| {
            if e.is_todo_error() {
                Output::tip("The todo list was rejected; the stack is unchanged");
            }
        })?;

    match outcome {
        RebaseOutcome::NoOp => Output::info("No patches to rebase"),
        RebaseOutcome::Rebased(outcome) => {
            Output::success(format!(
                "Rebased '{}': {} applied, {} unapplied",
                style(&ws.branch).cyan(),
                outcome.stack.applied().len(),
                outcome.stack.unapplied().len()
            ));
            for (patch, into) in &outcome.squashed {
                Output::sub_item(format!("Squashed '{patch}' into '{into}'"));
            }
            for patch in &outcome.deleted {
                Output::sub_item(format!("Deleted '{patch}'"));
            }
            for patch in &outcome.merged {
                Output::sub_item(format!("Patch '{patch}' is merged upstream and now empty"));
            }
        }
    }

    Ok(())
}
