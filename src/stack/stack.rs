use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Whether a patch's changes are currently part of the branch head
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PatchStatus {
    Applied,
    Unapplied,
}

/// A named unit of change backed by one commit
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Patch {
    /// Unique name within the stack
    pub name: String,
    /// Commit hash holding the patch's change
    pub commit: String,
    pub status: PatchStatus,
    /// First line of the commit message, shown in todo lists and listings
    #[serde(default)]
    pub summary: String,
}

/// The ordered patches of one branch plus the applied/unapplied boundary.
///
/// Every patch before the boundary is `Applied`, every patch at or after it
/// is `Unapplied`. Applied patches form a linear commit chain starting at
/// `base`; the branch head is the top applied patch, or `base` when nothing
/// is applied.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Stack {
    /// Branch this stack belongs to
    pub branch: String,
    /// Commit the first applied patch sits on
    pub base: String,
    patches: Vec<Patch>,
    pub updated_at: DateTime<Utc>,
}

impl Stack {
    /// Create a new empty stack
    pub fn new(branch: String, base: String) -> Self {
        Self {
            branch,
            base,
            patches: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    /// Build a stack from an ordered list of patches and an applied count.
    ///
    /// Statuses are rewritten from the boundary, so callers only need to get
    /// the order right.
    pub fn with_patches(branch: String, base: String, patches: Vec<Patch>, applied: usize) -> Self {
        let mut stack = Self::new(branch, base);
        stack.patches = patches;
        stack.set_boundary(applied);
        stack
    }

    pub fn patches(&self) -> &[Patch] {
        &self.patches
    }

    /// Number of applied patches; the index of the first unapplied one
    pub fn boundary(&self) -> usize {
        self.patches
            .iter()
            .take_while(|patch| patch.status == PatchStatus::Applied)
            .count()
    }

    /// Move the boundary, clamped to the stack length
    pub fn set_boundary(&mut self, applied: usize) {
        let applied = applied.min(self.patches.len());
        for (index, patch) in self.patches.iter_mut().enumerate() {
            patch.status = if index < applied {
                PatchStatus::Applied
            } else {
                PatchStatus::Unapplied
            };
        }
        self.updated_at = Utc::now();
    }

    pub fn applied(&self) -> &[Patch] {
        &self.patches[..self.boundary()]
    }

    pub fn unapplied(&self) -> &[Patch] {
        &self.patches[self.boundary()..]
    }

    /// Top applied patch
    pub fn top(&self) -> Option<&Patch> {
        self.applied().last()
    }

    /// Commit the branch head should point at
    pub fn head(&self) -> &str {
        self.top().map(|patch| patch.commit.as_str()).unwrap_or(&self.base)
    }

    pub fn get_patch(&self, name: &str) -> Option<&Patch> {
        self.patches.iter().find(|patch| patch.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get_patch(name).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    pub fn len(&self) -> usize {
        self.patches.len()
    }

    pub fn patch_names(&self) -> Vec<String> {
        self.patches.iter().map(|patch| patch.name.clone()).collect()
    }

    /// Insert a new applied patch directly above the current top
    pub fn push_applied(&mut self, name: String, commit: String, summary: String) {
        let index = self.boundary();
        self.patches.insert(
            index,
            Patch {
                name,
                commit,
                status: PatchStatus::Applied,
                summary,
            },
        );
        self.updated_at = Utc::now();
    }

    /// Validate the stack structure
    pub fn validate(&self) -> Result<(), String> {
        let boundary = self.boundary();
        if let Some(stray) = self.patches[boundary..]
            .iter()
            .find(|patch| patch.status == PatchStatus::Applied)
        {
            return Err(format!(
                "Applied patch '{}' sits above unapplied patch '{}'",
                stray.name, self.patches[boundary].name
            ));
        }

        let mut seen = HashSet::new();
        for patch in &self.patches {
            if !seen.insert(patch.name.as_str()) {
                return Err(format!("Patch '{}' appears more than once", patch.name));
            }
            validate_patch_name(&patch.name)?;
        }

        Ok(())
    }
}

/// Check that a name can appear as a single token in a todo line and as a ref component
pub fn validate_patch_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("Patch name cannot be empty".to_string());
    }
    if name.starts_with('#') || name.starts_with('-') {
        return Err(format!("Patch name '{name}' cannot start with '#' or '-'"));
    }
    if name.chars().any(|c| c.is_whitespace() || c == '/') {
        return Err(format!(
            "Patch name '{name}' cannot contain whitespace or '/'"
        ));
    }
    if !git2::Reference::is_valid_name(&format!("refs/patches/branch/{name}")) {
        return Err(format!("Patch name '{name}' is not a valid ref component"));
    }
    Ok(())
}
