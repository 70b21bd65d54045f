//! Stack management module
//!
//! - `stack`: the value-typed stack of patches and its applied/unapplied boundary
//! - `store`: per-branch persistence with atomic replacement, locking and the stack log

pub mod stack;
pub mod store;

pub use stack::{validate_patch_name, Patch, PatchStatus, Stack};
pub use store::{StackLock, StackLogEntry, StackStore};
