use super::Workspace;
use crate::cli::output::Output;
use crate::errors::Result;
use crate::stack::{Patch, PatchStatus, Stack};
use console::style;

/// List the stack: `+` applied, `>` top applied, `-` unapplied
pub fn run(description: bool) -> Result<()> {
    let ws = Workspace::open()?;
    let stack = ws.store.load()?;

    if stack.is_empty() {
        Output::info(format!("No patches on '{}'", ws.branch));
        return Ok(());
    }

    for line in series_lines(&stack, description) {
        let styled = match line.chars().next() {
            Some('>') => style(line).green().bold(),
            Some('+') => style(line).green(),
            _ => style(line).dim(),
        };
        println!("{styled}");
    }
    Ok(())
}

fn marker(stack: &Stack, patch: &Patch) -> char {
    match patch.status {
        PatchStatus::Applied if stack.top().is_some_and(|top| top.name == patch.name) => '>',
        PatchStatus::Applied => '+',
        PatchStatus::Unapplied => '-',
    }
}

fn series_lines(stack: &Stack, description: bool) -> Vec<String> {
    let width = stack
        .patches()
        .iter()
        .map(|patch| patch.name.len())
        .max()
        .unwrap_or(0);

    stack
        .patches()
        .iter()
        .map(|patch| {
            let mark = marker(stack, patch);
            if description && !patch.summary.is_empty() {
                format!("{mark} {:<width$} # {}", patch.name, patch.summary)
            } else {
                format!("{mark} {}", patch.name)
            }
        })
        .collect()
}
