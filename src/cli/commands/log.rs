use super::Workspace;
use crate::cli::output::Output;
use crate::errors::Result;
use console::style;

/// Print the stack log, newest first
pub fn run(number: Option<usize>) -> Result<()> {
    let ws = Workspace::open()?;
    let entries = ws.store.log()?;

    if entries.is_empty() {
        Output::info(format!("No stack log for '{}'", ws.branch));
        return Ok(());
    }

    let limit = number.unwrap_or(entries.len());
    for entry in entries.iter().rev().take(limit) {
        println!(
            "{} {}",
            style(entry.timestamp.format("%Y-%m-%d %H:%M:%S")).dim(),
            style(&entry.message).bold()
        );
        println!(
            "    head {}  applied [{}]  unapplied [{}]",
            style(&entry.head[..entry.head.len().min(8)]).yellow(),
            entry.applied.join(", "),
            entry.unapplied.join(", ")
        );
    }

    Ok(())
}
