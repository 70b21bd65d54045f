use crate::cli::output::Output;
use crate::cli::ConfigAction;
use crate::config::{get_repo_config_dir, is_repo_initialized, Settings};
use crate::errors::{PatchQueueError, Result};
use crate::git::find_repository_root;
use std::env;
use std::path::Path;

/// Handle configuration commands
pub fn run(action: ConfigAction) -> Result<()> {
    let current_dir = env::current_dir()
        .map_err(|e| PatchQueueError::config(format!("Could not get current directory: {e}")))?;

    let repo_root = find_repository_root(&current_dir)?;

    if !is_repo_initialized(&repo_root) {
        return Err(PatchQueueError::config(
            "Repository is not initialized; run 'pq init' first",
        ));
    }

    let config_file = get_repo_config_dir(&repo_root)?.join("config.json");

    match action {
        ConfigAction::Set { key, value } => set_config_value(&config_file, &key, &value),
        ConfigAction::Get { key } => get_config_value(&config_file, &key),
        ConfigAction::List => list_config_values(&config_file),
    }
}

fn set_config_value(config_file: &Path, key: &str, value: &str) -> Result<()> {
    let mut settings = Settings::load_from_file(config_file)?;
    settings.set_value(key, value)?;
    settings.save_to_file(config_file)?;

    Output::success(format!("Configuration updated: {key} = {value}"));
    if key == "patches.ref_prefix" {
        Output::tip("Existing patch refs stay under the old prefix until the patches are rewritten");
    }
    Ok(())
}

fn get_config_value(config_file: &Path, key: &str) -> Result<()> {
    let settings = Settings::load_from_file(config_file)?;
    println!("{}", settings.get_value(key)?);
    Ok(())
}

fn list_config_values(config_file: &Path) -> Result<()> {
    let settings = Settings::load_from_file(config_file)?;

    Output::section("Configuration");
    for key in Settings::keys() {
        let value = settings.get_value(key)?;
        let shown = if value.is_empty() { "<unset>" } else { value.as_str() };
        println!("  {key} = {shown}");
    }
    Ok(())
}
