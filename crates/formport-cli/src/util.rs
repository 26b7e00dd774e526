use std::path::{Path, PathBuf};

use crate::error::{CliError, ExitStatus};

#[derive(Clone, Copy, Debug, Default)]
pub struct Verbosity {
    pub json: bool,
    pub verbose: bool,
}

/// Resolves the PROJECT argument, which must name an existing directory.
pub fn project_dir(value: &str) -> Result<PathBuf, CliError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(CliError::new(
            "project path must not be empty",
            ExitStatus::Usage,
        ));
    }
    let path = PathBuf::from(trimmed);
    if !path.is_dir() {
        return Err(CliError::new(
            format!("project '{trimmed}' is not a directory"),
            ExitStatus::Usage,
        ));
    }
    Ok(path)
}

pub fn display_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
