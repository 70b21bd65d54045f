use std::path::{Path, PathBuf};
use std::process::Command;

/// Platform-specific utilities for handling cross-platform differences
///
/// Editor discovery and shell invocation differ between Windows and Unix;
/// everything platform-dependent the patch queue needs lives here.
///
/// Get the appropriate PATH environment variable separator for the current platform
pub fn path_separator() -> &'static str {
    if cfg!(windows) {
        ";"
    } else {
        ":"
    }
}

/// Get the executable file extension for the current platform
pub fn executable_extension() -> &'static str {
    if cfg!(windows) {
        ".exe"
    } else {
        ""
    }
}

/// Add the appropriate executable extension to a binary name
pub fn executable_name(name: &str) -> String {
    format!("{}{}", name, executable_extension())
}

/// Check if a file is executable on the current platform
pub fn is_executable(path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Ok(metadata) = std::fs::metadata(path) {
            metadata.is_file() && metadata.permissions().mode() & 0o111 != 0
        } else {
            false
        }
    }

    #[cfg(windows)]
    {
        if !path.exists() {
            return false;
        }

        if let Some(extension) = path.extension() {
            let ext = extension.to_string_lossy().to_lowercase();
            matches!(ext.as_str(), "exe" | "bat" | "cmd" | "com")
        } else {
            false
        }
    }
}

/// Find an executable in PATH
pub fn which(program: &str) -> Option<PathBuf> {
    let path_var = std::env::var("PATH").ok()?;
    let executable_name = executable_name(program);

    for path_dir in path_var.split(path_separator()) {
        let candidate = PathBuf::from(path_dir).join(&executable_name);
        if is_executable(&candidate) {
            return Some(candidate);
        }
    }
    None
}

/// Platform-specific line ending normalization
pub fn normalize_line_endings(content: &str) -> String {
    content.replace("\r\n", "\n").replace('\r', "\n")
}

/// Get the editor from the environment, falling back to a platform default
pub fn default_editor() -> String {
    for var in &["EDITOR", "VISUAL"] {
        if let Ok(editor) = std::env::var(var) {
            if !editor.trim().is_empty() {
                return editor;
            }
        }
    }

    #[cfg(windows)]
    {
        "notepad".to_string()
    }

    #[cfg(not(windows))]
    {
        for editor in &["vim", "nano"] {
            if which(editor).is_some() {
                return editor.to_string();
            }
        }
        "vi".to_string()
    }
}

/// Build a command that runs `command_line` through the platform shell with
/// `file` appended as its last argument.
///
/// Editor settings routinely carry their own flags (`code --wait`), so the
/// command line is handed to the shell rather than split here.
pub fn shell_command_with_file(command_line: &str, file: &Path) -> Command {
    #[cfg(windows)]
    {
        let mut command = Command::new("cmd");
        command
            .arg("/C")
            .arg(format!("{} \"{}\"", command_line, file.display()));
        command
    }

    #[cfg(not(windows))]
    {
        let mut command = Command::new("sh");
        command
            .arg("-c")
            .arg(format!("{command_line} \"$1\""))
            .arg("pq-editor")
            .arg(file);
        command
    }
}
