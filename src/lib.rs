pub mod cli;
pub mod config;
pub mod errors;
pub mod git;
pub mod rebase;
pub mod stack;
pub mod utils;

pub use errors::PatchQueueError;
