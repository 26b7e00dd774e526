//! Discovery of project inputs and application of pending writes/deletions.

use std::fs;
use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use tracing::{debug, error, warn};

use crate::config::MigrationConfig;
use crate::error::MigrationError;
use crate::file_converter::{FileKind, SourceFile};
use crate::pending::{GeneratedFile, PendingDeletion};

/// Outcome counters of one apply phase.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ApplySummary {
    pub succeeded: usize,
    pub failed: usize,
}

pub struct ProjectFilesystem {
    project_root: PathBuf,
    output_root: PathBuf,
}

impl ProjectFilesystem {
    pub fn new(project_root: impl Into<PathBuf>, output_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            output_root: output_root.into(),
        }
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// Every non-ignored file under the project root, sorted by relative
    /// path. Output written into the project tree is skipped unless the run
    /// is in place.
    pub fn discover(&self, config: &MigrationConfig) -> Result<Vec<SourceFile>, MigrationError> {
        if !self.project_root.is_dir() {
            return Err(MigrationError::Project(format!(
                "{} is not a directory",
                self.project_root.display()
            )));
        }
        let nested_output = self.output_root != self.project_root
            && self.output_root.starts_with(&self.project_root);

        let walker = WalkBuilder::new(&self.project_root)
            .hidden(true)
            .ignore(true)
            .git_ignore(true)
            .require_git(false)
            .build();

        let mut files = Vec::new();
        for result in walker {
            let entry = match result {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(error = %err, "skipping unreadable entry");
                    continue;
                }
            };
            let path = entry.path();
            if !entry.file_type().is_some_and(|ty| ty.is_file()) {
                continue;
            }
            if nested_output && path.starts_with(&self.output_root) {
                continue;
            }
            let Ok(relative) = path.strip_prefix(&self.project_root) else {
                continue;
            };
            if config.ignore.is_ignored(relative) {
                debug!(path = %relative.display(), "ignored");
                continue;
            }
            files.push(SourceFile {
                path: path.to_path_buf(),
                relative: relative.to_path_buf(),
                kind: FileKind::classify(relative, config),
            });
        }
        files.sort_by(|a, b| a.relative.cmp(&b.relative));
        debug!(count = files.len(), "discovered project files");
        Ok(files)
    }

    /// Writes every file under the output root. Failures are logged per file.
    pub fn write_all(&self, files: &[GeneratedFile]) -> ApplySummary {
        let mut summary = ApplySummary::default();
        for file in files {
            match self.write(file) {
                Ok(()) => summary.succeeded += 1,
                Err(err) => {
                    error!(path = %file.path.display(), error = %err, "failed to write generated file");
                    summary.failed += 1;
                }
            }
        }
        summary
    }

    pub fn write(&self, file: &GeneratedFile) -> Result<(), MigrationError> {
        let target = self.output_root.join(&file.path);
        if let Some(dir) = target.parent() {
            fs::create_dir_all(dir).map_err(|err| {
                MigrationError::Project(format!("failed to create {}: {err}", dir.display()))
            })?;
        }
        if target.exists() {
            warn!(path = %target.display(), "overwriting existing file");
        }
        write_replacing(&target, &file.content)
    }

    /// Removes sources, then prunes directories emptied by the removal up to
    /// (excluding) each deletion's limit.
    pub fn delete_all(&self, deletions: &[PendingDeletion]) -> ApplySummary {
        let mut summary = ApplySummary::default();
        for deletion in deletions {
            match delete_and_prune(deletion) {
                Ok(()) => summary.succeeded += 1,
                Err(err) => {
                    error!(path = %deletion.path.display(), error = %err, "failed to delete source");
                    summary.failed += 1;
                }
            }
        }
        summary
    }
}

/// Writes through a temporary sibling so a failed write never leaves a
/// truncated target behind.
fn write_replacing(path: &Path, content: &[u8]) -> Result<(), MigrationError> {
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".formport-tmp");
    let tmp_path = path.with_file_name(tmp_name);

    fs::write(&tmp_path, content).map_err(|err| {
        let _ = fs::remove_file(&tmp_path);
        MigrationError::Project(format!("failed to write {}: {err}", tmp_path.display()))
    })?;
    if path.is_file() {
        fs::remove_file(path).map_err(|err| {
            let _ = fs::remove_file(&tmp_path);
            MigrationError::Project(format!("failed to replace {}: {err}", path.display()))
        })?;
    }
    fs::rename(&tmp_path, path).map_err(|err| {
        let _ = fs::remove_file(&tmp_path);
        MigrationError::Project(format!("failed to publish {}: {err}", path.display()))
    })
}

fn delete_and_prune(deletion: &PendingDeletion) -> Result<(), MigrationError> {
    if !deletion.path.starts_with(&deletion.limit) {
        return Err(MigrationError::Project(format!(
            "{} is outside {}",
            deletion.path.display(),
            deletion.limit.display()
        )));
    }
    match fs::remove_file(&deletion.path) {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %deletion.path.display(), "already removed");
        }
        Err(err) => return Err(MigrationError::from(err).context(deletion.path.display())),
    }

    let mut dir = deletion.path.parent();
    while let Some(current) = dir {
        if current == deletion.limit || !current.starts_with(&deletion.limit) {
            break;
        }
        let is_empty = fs::read_dir(current)
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(false);
        if !is_empty {
            break;
        }
        fs::remove_dir(current).map_err(|err| MigrationError::from(err).context(current.display()))?;
        debug!(dir = %current.display(), "pruned empty directory");
        dir = current.parent();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn touch(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn discovery_filters_and_sorts() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        touch(root, "Default.aspx", "");
        touch(root, "Default.aspx.designer.cs", "");
        touch(root, "Default.aspx.cs", "");
        touch(root, "bin/Shop.dll", "");
        touch(root, "Content/site.css", "");
        touch(root, "Shop.csproj", "");
        touch(root, "out/Pages/Old.razor", "");

        let fs_adapter = ProjectFilesystem::new(root, root.join("out"));
        let files = fs_adapter.discover(&MigrationConfig::default()).unwrap();
        let relative: Vec<_> = files
            .iter()
            .map(|file| file.relative.to_string_lossy().replace('\\', "/"))
            .collect();
        assert_eq!(
            relative,
            vec!["Content/site.css", "Default.aspx", "Default.aspx.cs"]
        );
        assert_eq!(files[0].kind, FileKind::Static);
    }

    #[test]
    fn missing_project_root_is_an_error() {
        let dir = tempdir().unwrap();
        let fs_adapter = ProjectFilesystem::new(dir.path().join("nope"), dir.path());
        assert!(matches!(
            fs_adapter.discover(&MigrationConfig::default()),
            Err(MigrationError::Project(_))
        ));
    }

    #[test]
    fn writes_create_directories_and_overwrite() {
        let dir = tempdir().unwrap();
        let fs_adapter = ProjectFilesystem::new(dir.path(), dir.path());
        let first = GeneratedFile::text("Pages/Admin/Users.razor", "one");
        let second = GeneratedFile::text("Pages/Admin/Users.razor", "two");

        let summary = fs_adapter.write_all(&[first, second]);
        assert_eq!(summary, ApplySummary { succeeded: 2, failed: 0 });
        assert_eq!(
            fs::read_to_string(dir.path().join("Pages/Admin/Users.razor")).unwrap(),
            "two"
        );
        assert!(!dir.path().join("Pages/Admin/Users.razor.formport-tmp").exists());
    }

    #[test]
    fn deletion_prunes_empty_parents_up_to_the_limit() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        touch(root, "Admin/Reports/Daily.aspx", "");
        touch(root, "Admin/Users.aspx", "");

        let fs_adapter = ProjectFilesystem::new(root, root);
        let summary = fs_adapter.delete_all(&[
            PendingDeletion {
                path: root.join("Admin/Reports/Daily.aspx"),
                limit: root.to_path_buf(),
            },
            PendingDeletion {
                path: root.join("Elsewhere.aspx"),
                limit: root.join("Admin"),
            },
        ]);
        assert_eq!(summary, ApplySummary { succeeded: 1, failed: 1 });
        assert!(!root.join("Admin/Reports").exists());
        assert!(root.join("Admin/Users.aspx").exists());
        assert!(root.exists());
    }
}
