pub mod settings;

pub use settings::{PatchSettings, RebaseSettings, Settings};

use crate::errors::{PatchQueueError, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the per-repository state directory
pub const REPO_DIR_NAME: &str = ".pq";

/// Get the global configuration directory (~/.pq/)
pub fn get_config_dir() -> Result<PathBuf> {
    let home_dir = dirs::home_dir()
        .ok_or_else(|| PatchQueueError::config("Could not find home directory"))?;
    Ok(home_dir.join(REPO_DIR_NAME))
}

/// Get the patch queue state directory for a specific repository
pub fn get_repo_config_dir(repo_path: &Path) -> Result<PathBuf> {
    Ok(repo_path.join(REPO_DIR_NAME))
}

/// Ensure the state directory and its `stacks/` subdirectory exist
pub fn ensure_config_dir(config_dir: &Path) -> Result<()> {
    let stacks_dir = config_dir.join("stacks");
    if !stacks_dir.exists() {
        fs::create_dir_all(&stacks_dir).map_err(|e| {
            PatchQueueError::config(format!("Failed to create stacks directory: {e}"))
        })?;
    }

    Ok(())
}

/// Check if a repository has a patch queue state directory with settings
pub fn is_repo_initialized(repo_path: &Path) -> bool {
    let config_dir = repo_path.join(REPO_DIR_NAME);
    config_dir.exists() && config_dir.join("config.json").exists()
}

/// Create the state directory and write default settings if none exist yet
pub fn initialize_repo(repo_path: &Path) -> Result<()> {
    let config_dir = get_repo_config_dir(repo_path)?;
    ensure_config_dir(&config_dir)?;

    let config_file = config_dir.join("config.json");
    if !config_file.exists() {
        Settings::default().save_to_file(&config_file)?;
    }

    tracing::debug!("Initialized patch queue state at {}", config_dir.display());
    Ok(())
}
