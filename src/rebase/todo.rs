//! The editable todo list: rendering a stack as text and parsing it back.
//!
//! A rendered list looks like
//!
//! ```text
//! keep add-parser   # Add the parser
//! keep fix-lexer    # Fix lexer offsets
//! # --- APPLY_LINE ---
//! keep docs         # Document the grammar
//! ```
//!
//! Lines run top to bottom. Patches above the marker end up applied.

use crate::errors::{PatchQueueError, Result};
use crate::stack::Stack;
use std::fmt;
use std::str::FromStr;

/// Marker separating patches to apply from patches to leave unapplied
pub const APPLY_LINE: &str = "# --- APPLY_LINE ---";

const HELP_TEXT: &str = "\
# Commands:
#  k, keep <patch>    = leave the patch as it is
#  s, squash <patch>  = fold the patch into the patch above it
#  d, delete <patch>  = drop the patch and its commit
#
# Lines run from top to bottom and may be reordered.
# Every patch must be listed exactly once.
# Patches above the APPLY_LINE end up applied; the rest stay unapplied.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstructionKind {
    Keep,
    Squash,
    Delete,
}

impl InstructionKind {
    pub fn keyword(&self) -> &'static str {
        match self {
            InstructionKind::Keep => "keep",
            InstructionKind::Squash => "squash",
            InstructionKind::Delete => "delete",
        }
    }
}

impl FromStr for InstructionKind {
    type Err = PatchQueueError;

    fn from_str(token: &str) -> Result<Self> {
        match token {
            "k" | "keep" => Ok(InstructionKind::Keep),
            "s" | "squash" => Ok(InstructionKind::Squash),
            "d" | "delete" => Ok(InstructionKind::Delete),
            other => Err(PatchQueueError::UnknownInstruction(other.to_string())),
        }
    }
}

impl fmt::Display for InstructionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub kind: InstructionKind,
    pub patch: String,
}

impl Instruction {
    pub fn new(kind: InstructionKind, patch: impl Into<String>) -> Self {
        Self {
            kind,
            patch: patch.into(),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.patch)
    }
}

/// Options controlling how a stack is rendered for editing
#[derive(Debug, Clone, Copy)]
pub struct RenderOptions {
    pub show_help: bool,
    pub show_summaries: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            show_help: true,
            show_summaries: true,
        }
    }
}

impl From<&crate::config::RebaseSettings> for RenderOptions {
    fn from(settings: &crate::config::RebaseSettings) -> Self {
        Self {
            show_help: settings.show_help,
            show_summaries: settings.show_summaries,
        }
    }
}

/// Render the stack as a todo list: one `keep` line per patch in stack
/// order, with the marker after the last applied patch.
///
/// An empty stack renders as an empty string.
pub fn render_todo(stack: &Stack, options: RenderOptions) -> String {
    if stack.is_empty() {
        return String::new();
    }

    let width = stack
        .patches()
        .iter()
        .map(|patch| patch.name.len())
        .max()
        .unwrap_or(0);
    let boundary = stack.boundary();

    let mut lines = Vec::with_capacity(stack.len() + 2);
    for (index, patch) in stack.patches().iter().enumerate() {
        if index == boundary {
            lines.push(APPLY_LINE.to_string());
        }
        if options.show_summaries && !patch.summary.is_empty() {
            lines.push(format!(
                "keep {:<width$}  # {}",
                patch.name,
                patch.summary,
                width = width
            ));
        } else {
            lines.push(format!("keep {}", patch.name));
        }
    }
    if boundary == stack.len() {
        lines.push(APPLY_LINE.to_string());
    }

    let mut text = lines.join("\n");
    text.push('\n');
    if options.show_help {
        text.push('\n');
        text.push_str(HELP_TEXT);
        text.push('\n');
    }
    text
}

/// What a single line of the todo text turned out to be
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawLineKind<'a> {
    Blank,
    Comment,
    ApplyLine,
    Instruction { keyword: &'a str, patch: &'a str },
}

/// One classified line of the todo text; `number` is 1-based
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawLine<'a> {
    pub number: usize,
    pub text: &'a str,
    pub kind: RawLineKind<'a>,
}

/// Lazily classifies the lines of a todo text.
///
/// Yields at most one error and then stops.
pub struct TodoLines<'a> {
    lines: std::iter::Enumerate<std::str::Lines<'a>>,
    failed: bool,
}

impl<'a> TodoLines<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            lines: text.lines().enumerate(),
            failed: false,
        }
    }

    fn classify(number: usize, line: &'a str) -> Result<RawLine<'a>> {
        let text = line.trim();

        let kind = if text.contains(APPLY_LINE) {
            if text != APPLY_LINE {
                return Err(PatchQueueError::BadApplyLine(text.to_string()));
            }
            RawLineKind::ApplyLine
        } else if text.is_empty() {
            RawLineKind::Blank
        } else if text.starts_with('#') {
            RawLineKind::Comment
        } else {
            // A trailing `# ...` annotation is not part of the instruction
            let tokens: Vec<&str> = text
                .split_whitespace()
                .take_while(|token| !token.starts_with('#'))
                .collect();
            match tokens.as_slice() {
                [keyword, patch] => RawLineKind::Instruction {
                    keyword: *keyword,
                    patch: *patch,
                },
                _ => return Err(PatchQueueError::BadTodoLine(text.to_string())),
            }
        };

        Ok(RawLine { number, text, kind })
    }
}

impl<'a> Iterator for TodoLines<'a> {
    type Item = Result<RawLine<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        let (index, line) = self.lines.next()?;
        let result = Self::classify(index + 1, line);
        if result.is_err() {
            self.failed = true;
        }
        Some(result)
    }
}

/// Parsed todo list: instructions in order plus the marker position.
///
/// `apply_line` is the number of instructions that precede the marker, or
/// `None` when the marker was removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TodoList {
    instructions: Vec<Instruction>,
    apply_line: Option<usize>,
}

impl TodoList {
    pub fn new(instructions: Vec<Instruction>, apply_line: Option<usize>) -> Self {
        Self {
            instructions,
            apply_line,
        }
    }

    /// Parse edited todo text. Patch names are not checked here.
    pub fn parse(text: &str) -> Result<Self> {
        let mut todo = TodoList::default();

        for line in TodoLines::new(text) {
            let line = line?;
            match line.kind {
                RawLineKind::Blank | RawLineKind::Comment => {}
                RawLineKind::ApplyLine => {
                    if todo.apply_line.is_some() {
                        return Err(PatchQueueError::BadApplyLine(format!(
                            "{} (line {}: marker appears more than once)",
                            line.text, line.number
                        )));
                    }
                    todo.apply_line = Some(todo.instructions.len());
                }
                RawLineKind::Instruction { keyword, patch } => {
                    let kind: InstructionKind = keyword.parse()?;
                    todo.instructions.push(Instruction::new(kind, patch));
                }
            }
        }

        Ok(todo)
    }

    /// Keep every patch in its current order, with the marker after `applied` patches
    pub fn keep_all(stack: &Stack, applied: usize) -> Self {
        let instructions: Vec<Instruction> = stack
            .patches()
            .iter()
            .map(|patch| Instruction::new(InstructionKind::Keep, patch.name.clone()))
            .collect();
        let apply_line = applied.min(instructions.len());
        Self::new(instructions, Some(apply_line))
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn apply_line(&self) -> Option<usize> {
        self.apply_line
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::{Patch, PatchStatus};

    fn stack(names: &[&str], applied: usize) -> Stack {
        let patches = names
            .iter()
            .map(|name| Patch {
                name: name.to_string(),
                commit: format!("{name}-commit"),
                status: PatchStatus::Unapplied,
                summary: format!("Summary of {name}"),
            })
            .collect();
        Stack::with_patches("main".to_string(), "base".to_string(), patches, applied)
    }

    fn plain() -> RenderOptions {
        RenderOptions {
            show_help: false,
            show_summaries: false,
        }
    }

    #[test]
    fn test_render_marks_boundary() {
        let text = render_todo(&stack(&["p0", "p1", "p2"], 2), plain());
        assert_eq!(text, "keep p0\nkeep p1\n# --- APPLY_LINE ---\nkeep p2\n");
    }

    #[test]
    fn test_render_marker_at_edges() {
        let none_applied = render_todo(&stack(&["p0", "p1"], 0), plain());
        assert_eq!(none_applied, "# --- APPLY_LINE ---\nkeep p0\nkeep p1\n");

        let all_applied = render_todo(&stack(&["p0", "p1"], 2), plain());
        assert_eq!(all_applied, "keep p0\nkeep p1\n# --- APPLY_LINE ---\n");
    }

    #[test]
    fn test_render_empty_stack() {
        assert_eq!(render_todo(&stack(&[], 0), RenderOptions::default()), "");
    }

    #[test]
    fn test_render_summaries_and_help_parse_back() {
        let original = stack(&["p0", "longer-name", "p2"], 1);
        let text = render_todo(&original, RenderOptions::default());

        assert!(text.contains("keep p0           # Summary of p0"));
        assert!(text.contains("# Commands:"));

        let todo = TodoList::parse(&text).unwrap();
        assert_eq!(todo, TodoList::keep_all(&original, 1));
    }

    #[test]
    fn test_parse_instructions_and_marker() {
        let todo = TodoList::parse(
            "keep p0\n\n# a comment\ns p1\n   # --- APPLY_LINE ---   \nd p2\nkeep p3\n",
        )
        .unwrap();

        assert_eq!(
            todo.instructions(),
            &[
                Instruction::new(InstructionKind::Keep, "p0"),
                Instruction::new(InstructionKind::Squash, "p1"),
                Instruction::new(InstructionKind::Delete, "p2"),
                Instruction::new(InstructionKind::Keep, "p3"),
            ]
        );
        assert_eq!(todo.apply_line(), Some(2));
    }

    #[test]
    fn test_parse_without_marker() {
        let todo = TodoList::parse("delete p0\ndelete p2\n").unwrap();
        assert_eq!(todo.len(), 2);
        assert_eq!(todo.apply_line(), None);
    }

    #[test]
    fn test_parse_empty_text() {
        let todo = TodoList::parse("").unwrap();
        assert!(todo.is_empty());
        assert_eq!(todo.apply_line(), None);
    }

    #[test]
    fn test_marker_with_trailing_garbage() {
        let err = TodoList::parse("keep p0\n# --- APPLY_LINE --- oops\nkeep p1\n").unwrap_err();
        assert!(matches!(err, PatchQueueError::BadApplyLine(ref line) if line.ends_with("oops")));
    }

    #[test]
    fn test_marker_with_leading_content() {
        let err = TodoList::parse("keep p0 # --- APPLY_LINE ---\n").unwrap_err();
        assert!(matches!(err, PatchQueueError::BadApplyLine(_)));
    }

    #[test]
    fn test_duplicate_marker() {
        let err =
            TodoList::parse("# --- APPLY_LINE ---\nkeep p0\n# --- APPLY_LINE ---\n").unwrap_err();
        assert!(matches!(err, PatchQueueError::BadApplyLine(_)));
    }

    #[test]
    fn test_missing_patch_name() {
        let err = TodoList::parse("keep\n").unwrap_err();
        assert!(matches!(err, PatchQueueError::BadTodoLine(ref line) if line == "keep"));
    }

    #[test]
    fn test_extra_tokens() {
        let err = TodoList::parse("keep p0 p1\n").unwrap_err();
        assert!(matches!(err, PatchQueueError::BadTodoLine(_)));
    }

    #[test]
    fn test_unknown_instruction() {
        let err = TodoList::parse("keep p0\ninvalid_instruction p1\n").unwrap_err();
        assert!(
            matches!(err, PatchQueueError::UnknownInstruction(ref token) if token == "invalid_instruction")
        );
    }

    #[test]
    fn test_unknown_patch_names_are_accepted_by_parser() {
        let todo = TodoList::parse("keep invalid_patch_name\n").unwrap();
        assert_eq!(todo.instructions()[0].patch, "invalid_patch_name");
    }

    #[test]
    fn test_todo_lines_stop_after_first_error() {
        let mut lines = TodoLines::new("keep p0\nbogus\nkeep p1\n");

        let first = lines.next().unwrap().unwrap();
        assert_eq!(first.number, 1);
        assert_eq!(
            first.kind,
            RawLineKind::Instruction {
                keyword: "keep",
                patch: "p0"
            }
        );
        assert!(lines.next().unwrap().is_err());
        assert!(lines.next().is_none());
    }

    #[test]
    fn test_keep_all_clamps_marker() {
        let todo = TodoList::keep_all(&stack(&["p0"], 1), 5);
        assert_eq!(todo.apply_line(), Some(1));
    }
}
