use crate::errors::{PatchQueueError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Editor command for the rebase todo list; falls back to $EDITOR/$VISUAL
    #[serde(default)]
    pub editor: Option<String>,
    #[serde(default)]
    pub rebase: RebaseSettings,
    #[serde(default)]
    pub patches: PatchSettings,
}

/// Settings specific to interactive rebase
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebaseSettings {
    /// Append the commented command reference to the todo list
    pub show_help: bool,
    /// Annotate each todo line with the patch's one-line summary
    pub show_summaries: bool,
    /// File name (inside the state directory) the todo list is edited in
    pub todo_file: String,
}

/// Settings for how patches are recorded in the repository
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchSettings {
    /// Ref namespace keeping patch commits reachable
    pub ref_prefix: String,
}

impl Default for RebaseSettings {
    fn default() -> Self {
        Self {
            show_help: true,
            show_summaries: true,
            todo_file: "REBASE_TODO".to_string(),
        }
    }
}

impl Default for PatchSettings {
    fn default() -> Self {
        Self {
            ref_prefix: "refs/patches".to_string(),
        }
    }
}

impl Settings {
    /// Load settings for a repository: repository file, then global file, then defaults
    pub fn load(repo_path: &Path) -> Result<Self> {
        let repo_file = super::get_repo_config_dir(repo_path)?.join("config.json");
        if repo_file.exists() {
            return Self::load_from_file(&repo_file);
        }

        if let Ok(global_dir) = super::get_config_dir() {
            let global_file = global_dir.join("config.json");
            if global_file.exists() {
                return Self::load_from_file(&global_file);
            }
        }

        Ok(Self::default())
    }

    /// Load settings from a file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .map_err(|e| PatchQueueError::config(format!("Failed to read config file: {e}")))?;

        let settings: Settings = serde_json::from_str(&content)
            .map_err(|e| PatchQueueError::config(format!("Failed to parse config file: {e}")))?;

        settings.validate()?;
        Ok(settings)
    }

    /// Save settings to a file
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        crate::utils::atomic_file::write_json(path, self)
    }

    /// Resolve the editor command to run for the todo list
    pub fn editor_command(&self) -> String {
        match &self.editor {
            Some(editor) if !editor.trim().is_empty() => editor.clone(),
            _ => crate::utils::platform::default_editor(),
        }
    }

    /// All keys accepted by [`Settings::get_value`] and [`Settings::set_value`]
    pub fn keys() -> &'static [&'static str] {
        &[
            "editor",
            "rebase.show_help",
            "rebase.show_summaries",
            "rebase.todo_file",
            "patches.ref_prefix",
        ]
    }

    /// Update a configuration value by key
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "editor" => {
                self.editor = if value.trim().is_empty() {
                    None
                } else {
                    Some(value.to_string())
                };
            }
            "rebase.show_help" => self.rebase.show_help = parse_bool(value)?,
            "rebase.show_summaries" => self.rebase.show_summaries = parse_bool(value)?,
            "rebase.todo_file" => self.rebase.todo_file = value.to_string(),
            "patches.ref_prefix" => self.patches.ref_prefix = value.to_string(),
            _ => return Err(PatchQueueError::config(format!("Unknown config key: {key}"))),
        }

        self.validate()
    }

    /// Get a configuration value by key
    pub fn get_value(&self, key: &str) -> Result<String> {
        let value = match key {
            "editor" => self.editor.clone().unwrap_or_default(),
            "rebase.show_help" => self.rebase.show_help.to_string(),
            "rebase.show_summaries" => self.rebase.show_summaries.to_string(),
            "rebase.todo_file" => self.rebase.todo_file.clone(),
            "patches.ref_prefix" => self.patches.ref_prefix.clone(),
            _ => return Err(PatchQueueError::config(format!("Unknown config key: {key}"))),
        };

        Ok(value)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let todo_file = &self.rebase.todo_file;
        if todo_file.is_empty()
            || crate::utils::path_validation::sanitize_filename(todo_file) != *todo_file
        {
            return Err(PatchQueueError::config(format!(
                "Invalid todo file name '{todo_file}': use letters, digits, '-', '_' and '.'"
            )));
        }

        let prefix = self.patches.ref_prefix.trim_end_matches('/');
        if !prefix.starts_with("refs/") || !git2::Reference::is_valid_name(&format!("{prefix}/x"))
        {
            return Err(PatchQueueError::config(format!(
                "Invalid patch ref prefix '{}': must be a ref namespace under refs/",
                self.patches.ref_prefix
            )));
        }

        Ok(())
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    value
        .parse()
        .map_err(|_| PatchQueueError::config(format!("Invalid boolean value: {value}")))
}
