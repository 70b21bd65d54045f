//! Replaying a validated plan against a stack and committing the result.
//!
//! The transformer moves through `Pending → Validated → Applying → Committed`
//! and drops to `Rejected` on the first error. During `Applying` new commit
//! objects are built, the working-tree sync is checked for local files it
//! would overwrite, and patch refs are moved to the new commits so git keeps
//! them reachable. The stack store is replaced once, at `Committed`. A
//! failure before that restores the patch refs and leaves the store as it
//! was; a failed working-tree sync after it puts the original stack back.
//! Only refs of patches that left the stack are deleted after the commit.

use super::todo::InstructionKind;
use super::validate::{ValidatedPlan, NOT_IN_STACK};
use crate::errors::{PatchQueueError, Result};
use crate::stack::{Patch, Stack, StackLock, StackStore};
use std::fmt;
use tracing::{debug, warn};

/// Commit operations the transformer needs from the repository.
///
/// `parent`, `squash` and `rebase_onto` may only create objects; they must
/// leave refs, index and working tree alone. A failed call leaves the
/// targeted commits unchanged.
pub trait CommitMutator {
    /// First parent of `commit`
    fn parent(&self, commit: &str) -> Result<String>;

    /// Fold `source`'s changes into `target`, giving a commit with
    /// `target`'s parent. Fails with [`PatchQueueError::MergeConflict`] when
    /// the changes do not combine cleanly.
    fn squash(&self, target: &str, source: &str) -> Result<String>;

    /// Re-create `commit`'s change on top of `parent`
    fn rebase_onto(&self, commit: &str, parent: &str) -> Result<String>;

    /// Whether `commit` changes nothing relative to its parent
    fn is_empty_change(&self, commit: &str) -> Result<bool>;

    /// Commit the patch's ref points at, if it has one
    fn recorded(&self, patch: &str) -> Result<Option<String>>;

    /// Point the patch's ref at `commit`
    fn record(&self, patch: &str, commit: &str) -> Result<()>;

    /// Drop a patch that left the stack
    fn discard(&self, patch: &str, commit: &str) -> Result<()>;

    /// Move the branch head and working tree to `head`
    fn checkout(&self, head: &str) -> Result<()>;

    /// Fail with [`PatchQueueError::DirtyWorkingTree`] if moving the working
    /// tree to `head` would overwrite local files. Changes nothing.
    fn check_checkout(&self, _head: &str) -> Result<()> {
        Ok(())
    }

    /// Current branch head
    fn head(&self) -> Result<String>;

    /// Refuse to continue when a checkout would clobber local changes
    fn ensure_clean(&self) -> Result<()> {
        Ok(())
    }
}

impl<T: CommitMutator + ?Sized> CommitMutator for &T {
    fn parent(&self, commit: &str) -> Result<String> {
        (**self).parent(commit)
    }

    fn squash(&self, target: &str, source: &str) -> Result<String> {
        (**self).squash(target, source)
    }

    fn rebase_onto(&self, commit: &str, parent: &str) -> Result<String> {
        (**self).rebase_onto(commit, parent)
    }

    fn is_empty_change(&self, commit: &str) -> Result<bool> {
        (**self).is_empty_change(commit)
    }

    fn recorded(&self, patch: &str) -> Result<Option<String>> {
        (**self).recorded(patch)
    }

    fn record(&self, patch: &str, commit: &str) -> Result<()> {
        (**self).record(patch, commit)
    }

    fn discard(&self, patch: &str, commit: &str) -> Result<()> {
        (**self).discard(patch, commit)
    }

    fn checkout(&self, head: &str) -> Result<()> {
        (**self).checkout(head)
    }

    fn check_checkout(&self, head: &str) -> Result<()> {
        (**self).check_checkout(head)
    }

    fn head(&self) -> Result<String> {
        (**self).head()
    }

    fn ensure_clean(&self) -> Result<()> {
        (**self).ensure_clean()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformState {
    Pending,
    Validated,
    Applying,
    Committed,
    Rejected,
}

impl fmt::Display for TransformState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransformState::Pending => "pending",
            TransformState::Validated => "validated",
            TransformState::Applying => "applying",
            TransformState::Committed => "committed",
            TransformState::Rejected => "rejected",
        };
        f.write_str(name)
    }
}

/// A patch of the new arrangement together with the patches squashed into it
#[derive(Debug, Clone)]
struct Slot {
    patch: Patch,
    absorbed: Vec<Patch>,
    /// Re-created on a new parent by `build_commits`
    moved: bool,
}

/// Working copy of a stack being rearranged.
///
/// Holds the original stack by reference; nothing here touches the store.
#[derive(Debug)]
pub struct Transaction<'s> {
    original: &'s Stack,
    base: String,
    slots: Vec<Slot>,
    deleted: Vec<Patch>,
    applied: usize,
}

impl<'s> Transaction<'s> {
    /// Replay the plan's instructions in order without touching any commit
    pub fn replay(original: &'s Stack, plan: &ValidatedPlan, new_base: Option<&str>) -> Result<Self> {
        let mut slots: Vec<Slot> = Vec::new();
        let mut deleted = Vec::new();
        let mut applied_by_marker = 0;

        for (index, instruction) in plan.instructions().iter().enumerate() {
            let patch = original
                .get_patch(&instruction.patch)
                .ok_or_else(|| {
                    PatchQueueError::bad_patch_name(&instruction.patch, NOT_IN_STACK)
                })?
                .clone();
            let before_marker = plan.apply_line().is_some_and(|line| index < line);

            match instruction.kind {
                InstructionKind::Keep => {
                    if before_marker {
                        applied_by_marker += 1;
                    }
                    slots.push(Slot {
                        patch,
                        absorbed: Vec::new(),
                        moved: false,
                    });
                }
                InstructionKind::Squash => {
                    let slot = slots.last_mut().ok_or_else(|| {
                        PatchQueueError::BadTodoLine(format!(
                            "{instruction} (nothing above it to squash into)"
                        ))
                    })?;
                    slot.absorbed.push(patch);
                }
                InstructionKind::Delete => deleted.push(patch),
            }
            debug!("Replayed '{}'", instruction);
        }

        let applied = match plan.apply_line() {
            Some(_) => applied_by_marker,
            None => original.boundary().min(slots.len()),
        };

        Ok(Self {
            original,
            base: new_base.unwrap_or(&original.base).to_string(),
            slots,
            deleted,
            applied,
        })
    }

    pub fn original(&self) -> &Stack {
        self.original
    }

    /// Names of the new arrangement, in order
    pub fn patch_names(&self) -> Vec<String> {
        self.slots.iter().map(|slot| slot.patch.name.clone()).collect()
    }

    /// Number of patches that will be applied
    pub fn applied(&self) -> usize {
        self.applied
    }

    /// Build the commits the new arrangement needs.
    ///
    /// Slots are chained from the base in their new order: a slot whose
    /// commit does not sit on the slot below is re-created there, then the
    /// patches squashed into it are folded in one by one.
    pub fn build_commits<C: CommitMutator>(&mut self, commits: &C) -> Result<()> {
        let mut parent = self.base.clone();
        for slot in &mut self.slots {
            if commits.parent(&slot.patch.commit)? != parent {
                let moved = commits
                    .rebase_onto(&slot.patch.commit, &parent)
                    .map_err(|e| in_context(e, format!("applying '{}'", slot.patch.name)))?;
                debug!("Moved '{}' onto {} -> {}", slot.patch.name, parent, moved);
                slot.patch.commit = moved;
                slot.moved = true;
            }

            for source in &slot.absorbed {
                let combined = commits
                    .squash(&slot.patch.commit, &source.commit)
                    .map_err(|e| {
                        in_context(
                            e,
                            format!("squashing '{}' into '{}'", source.name, slot.patch.name),
                        )
                    })?;
                debug!(
                    "Squashed '{}' into '{}' -> {}",
                    source.name, slot.patch.name, combined
                );
                slot.patch.commit = combined;
            }

            parent = slot.patch.commit.clone();
        }

        Ok(())
    }

    /// Patches whose change vanished when they were re-created on a new
    /// parent, meaning the change is already upstream. Call after
    /// [`Transaction::build_commits`].
    pub fn merged_patches<C: CommitMutator>(&self, commits: &C) -> Result<Vec<String>> {
        let mut merged = Vec::new();
        for slot in self.slots.iter().filter(|slot| slot.moved) {
            if commits.is_empty_change(&slot.patch.commit)? {
                debug!("Patch '{}' is empty on its new parent", slot.patch.name);
                merged.push(slot.patch.name.clone());
            }
        }
        Ok(merged)
    }

    /// The stack this transaction would commit
    pub fn to_stack(&self) -> Stack {
        Stack::with_patches(
            self.original.branch.clone(),
            self.base.clone(),
            self.slots.iter().map(|slot| slot.patch.clone()).collect(),
            self.applied,
        )
    }

    /// Patches leaving the stack: deleted ones, then squashed ones paired with their new home
    fn departures(&self) -> impl Iterator<Item = (&Patch, Option<&str>)> {
        self.deleted.iter().map(|patch| (patch, None)).chain(
            self.slots.iter().flat_map(|slot| {
                slot.absorbed
                    .iter()
                    .map(move |patch| (patch, Some(slot.patch.name.as_str())))
            }),
        )
    }
}

fn in_context(error: PatchQueueError, context: String) -> PatchQueueError {
    match error {
        PatchQueueError::MergeConflict(detail) => {
            PatchQueueError::merge_conflict(format!("{context}: {detail}"))
        }
        other => other,
    }
}

/// Options for one transformation
#[derive(Debug, Clone, Default)]
pub struct TransformOptions {
    /// Commit to re-base the applied patches onto; the current base when `None`
    pub new_base: Option<String>,
    /// Stack log message for the committed state
    pub message: String,
    /// Report patches whose change turned out to be upstream already
    pub merged: bool,
}

/// What a committed transformation did
#[derive(Debug, Clone)]
pub struct TransformOutcome {
    pub stack: Stack,
    pub deleted: Vec<String>,
    /// `(squashed patch, patch it was folded into)`
    pub squashed: Vec<(String, String)>,
    /// Patches left empty because their change is already upstream
    pub merged: Vec<String>,
}

/// A patch ref moved during `Applying`, with where it pointed before
#[derive(Debug, Clone)]
struct RefMove {
    patch: String,
    commit: String,
    previous: Option<String>,
}

/// Drives one plan through the transformation state machine
pub struct StackTransformer<'c, C: CommitMutator> {
    commits: &'c C,
    state: TransformState,
}

impl<'c, C: CommitMutator> StackTransformer<'c, C> {
    pub fn new(commits: &'c C) -> Self {
        Self {
            commits,
            state: TransformState::Pending,
        }
    }

    pub fn state(&self) -> TransformState {
        self.state
    }

    fn enter(&mut self, next: TransformState) -> Result<()> {
        let allowed = matches!(
            (self.state, next),
            (TransformState::Pending, TransformState::Validated)
                | (TransformState::Validated, TransformState::Applying)
                | (TransformState::Applying, TransformState::Committed)
        ) || (next == TransformState::Rejected && self.state != TransformState::Rejected);

        if !allowed {
            return Err(PatchQueueError::validation(format!(
                "Stack transformation cannot move from {} to {}",
                self.state, next
            )));
        }

        debug!("Stack transformation {} -> {}", self.state, next);
        self.state = next;
        Ok(())
    }

    /// Apply `plan` to `stack` and commit the result to `store`.
    ///
    /// Any failure leaves the store holding `stack`, the patch refs where
    /// they were, and the transformer `Rejected`. Calling it again on a
    /// finished transformer fails without changing its state.
    pub fn transform(
        &mut self,
        store: &StackStore,
        lock: &StackLock,
        stack: &Stack,
        plan: ValidatedPlan,
        options: &TransformOptions,
    ) -> Result<TransformOutcome> {
        match self.apply(store, lock, stack, &plan, options) {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                if self.state != TransformState::Committed {
                    let _ = self.enter(TransformState::Rejected);
                }
                Err(e)
            }
        }
    }

    fn apply(
        &mut self,
        store: &StackStore,
        lock: &StackLock,
        stack: &Stack,
        plan: &ValidatedPlan,
        options: &TransformOptions,
    ) -> Result<TransformOutcome> {
        self.enter(TransformState::Validated)?;

        let mut transaction = Transaction::replay(stack, plan, options.new_base.as_deref())?;
        self.enter(TransformState::Applying)?;
        transaction.build_commits(self.commits)?;
        let merged = if options.merged {
            transaction.merged_patches(self.commits)?
        } else {
            Vec::new()
        };

        let new_stack = transaction.to_stack();
        self.commits.check_checkout(new_stack.head())?;

        let moved = self.record_patches(&new_stack)?;
        if let Err(e) = store.replace(lock, &new_stack, &options.message) {
            self.restore_refs(&moved);
            return Err(e);
        }
        self.enter(TransformState::Committed)?;

        if let Err(e) = self.commits.checkout(new_stack.head()) {
            warn!(
                "Working tree could not be moved to {}; restoring the previous stack",
                new_stack.head()
            );
            self.revert(store, lock, stack, &moved, &options.message);
            self.enter(TransformState::Rejected)?;
            return Err(e);
        }

        let mut deleted = Vec::new();
        let mut squashed = Vec::new();
        for (patch, into) in transaction.departures() {
            if let Err(e) = self.commits.discard(&patch.name, &patch.commit) {
                warn!("Failed to discard patch '{}': {}", patch.name, e);
            }
            match into {
                Some(target) => squashed.push((patch.name.clone(), target.to_string())),
                None => deleted.push(patch.name.clone()),
            }
        }

        Ok(TransformOutcome {
            stack: new_stack,
            deleted,
            squashed,
            merged,
        })
    }

    /// Point every patch ref at its new commit. On failure the refs moved
    /// so far are put back before the error is returned.
    fn record_patches(&self, stack: &Stack) -> Result<Vec<RefMove>> {
        let mut moved = Vec::new();
        for patch in stack.patches() {
            let result = self.commits.recorded(&patch.name).and_then(|previous| {
                if previous.as_deref() == Some(patch.commit.as_str()) {
                    return Ok(None);
                }
                self.commits.record(&patch.name, &patch.commit)?;
                Ok(Some(previous))
            });

            match result {
                Ok(Some(previous)) => moved.push(RefMove {
                    patch: patch.name.clone(),
                    commit: patch.commit.clone(),
                    previous,
                }),
                Ok(None) => {}
                Err(e) => {
                    self.restore_refs(&moved);
                    return Err(e);
                }
            }
        }
        Ok(moved)
    }

    fn restore_refs(&self, moved: &[RefMove]) {
        for entry in moved.iter().rev() {
            let result = match &entry.previous {
                Some(previous) => self.commits.record(&entry.patch, previous),
                None => self.commits.discard(&entry.patch, &entry.commit),
            };
            if let Err(e) = result {
                warn!("Failed to restore ref of patch '{}': {}", entry.patch, e);
            }
        }
    }

    /// Put the original stack and patch refs back after a committed
    /// replacement whose working-tree sync failed
    fn revert(
        &self,
        store: &StackStore,
        lock: &StackLock,
        original: &Stack,
        moved: &[RefMove],
        message: &str,
    ) {
        if let Err(e) = store.replace(lock, original, &format!("revert {message}")) {
            warn!("Failed to restore stack '{}': {}", original.branch, e);
        }
        self.restore_refs(moved);
    }
}
