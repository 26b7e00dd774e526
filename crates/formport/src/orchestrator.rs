//! Concurrent per-file migration with a join barrier before any output is
//! written.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio::task::{Id, JoinError, JoinSet};
use tracing::{debug, error, info, warn};

use crate::aggregate::MigrationServices;
use crate::analysis::{CSharpAnalysis, SourceAnalysis, SourceText};
use crate::assembly::AggregateAssembler;
use crate::class::{ClassConverter, ClassifiedType};
use crate::config::MigrationConfig;
use crate::error::MigrationError;
use crate::file_converter::{ConversionContext, FileKind, SourceFile, converter_for};
use crate::pending::{GeneratedFile, PendingDeletion, PendingWork};
use crate::project::ProjectFilesystem;
use crate::registry::ControlConverter;
use crate::template_catalog::TemplateCatalog;
use crate::watchdog::{ProgressTracker, Watchdog};

pub const REPORT_FILE: &str = "migration-report.json";

/// Where converted files go.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutputMode {
    Directory(PathBuf),
    /// Write into the project and remove every migrated source.
    InPlace,
}

#[derive(Clone, Debug)]
pub struct MigrationOptions {
    pub project_root: PathBuf,
    pub output: OutputMode,
    pub config: MigrationConfig,
}

impl MigrationOptions {
    /// Output defaults to a `<name>.Migrated` sibling of the project.
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        let project_root = project_root.into();
        let output = OutputMode::Directory(default_output_for(&project_root));
        Self {
            project_root,
            output,
            config: MigrationConfig::default(),
        }
    }

    pub fn output_root(&self) -> PathBuf {
        match &self.output {
            OutputMode::Directory(dir) => dir.clone(),
            OutputMode::InPlace => self.project_root.clone(),
        }
    }
}

pub fn default_output_for(project_root: &Path) -> PathBuf {
    let name = project_root
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "project".to_string());
    project_root.with_file_name(format!("{name}.Migrated"))
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct FileFailure {
    pub path: PathBuf,
    pub message: String,
}

#[derive(Clone, Debug, Default, Serialize, PartialEq, Eq)]
pub struct MigrationReport {
    pub discovered: usize,
    pub converted: usize,
    pub failed: Vec<FileFailure>,
    pub stalled: Vec<PathBuf>,
    pub written: usize,
    pub write_failures: usize,
    pub deleted: usize,
    pub packages: Vec<String>,
    pub imports: Vec<String>,
    pub registry: BTreeMap<String, ControlConverter>,
}

impl MigrationReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.write_failures == 0
    }
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct ScannedFile {
    pub path: PathBuf,
    #[serde(flatten)]
    pub kind: FileKind,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub classes: Vec<ClassifiedType>,
}

/// Outcome of one file task, reported back through the join.
struct TaskOutcome {
    relative: PathBuf,
    result: Result<usize, MigrationError>,
}

pub struct Migrator {
    options: MigrationOptions,
    analysis: Arc<dyn SourceAnalysis>,
    catalog: Arc<TemplateCatalog>,
}

impl Migrator {
    pub fn new(options: MigrationOptions) -> Result<Self, MigrationError> {
        let catalog = TemplateCatalog::load(options.config.templates.as_deref())?;
        Ok(Self {
            options,
            analysis: Arc::new(CSharpAnalysis::new()),
            catalog: Arc::new(catalog),
        })
    }

    /// Replaces the source analysis collaborator.
    pub fn with_analysis(mut self, analysis: Arc<dyn SourceAnalysis>) -> Self {
        self.analysis = analysis;
        self
    }

    pub fn options(&self) -> &MigrationOptions {
        &self.options
    }

    fn filesystem(&self) -> ProjectFilesystem {
        ProjectFilesystem::new(&self.options.project_root, self.options.output_root())
    }

    fn root_namespace(&self) -> String {
        self.options.config.root_namespace(&self.options.project_root)
    }

    /// Discovery and classification only; nothing is written.
    pub fn scan(&self) -> Result<Vec<ScannedFile>, MigrationError> {
        let files = self.filesystem().discover(&self.options.config)?;
        self.analysis.prepare(&code_sources(&files))?;
        let root_namespace = self.root_namespace();
        let services = MigrationServices::new();
        let classes = ClassConverter::new(self.analysis.as_ref(), &root_namespace, &services);

        let mut scanned = Vec::with_capacity(files.len());
        for file in files {
            let classified = if file.kind == FileKind::Code {
                match fs::read(&file.path) {
                    Ok(bytes) => classes
                        .scan(&file.relative, &String::from_utf8_lossy(&bytes))
                        .unwrap_or_else(|err| {
                            warn!(path = %file.relative.display(), error = %err, "classification failed");
                            Vec::new()
                        }),
                    Err(err) => {
                        warn!(path = %file.relative.display(), error = %err, "unreadable source");
                        Vec::new()
                    }
                }
            } else {
                Vec::new()
            };
            scanned.push(ScannedFile {
                path: file.relative,
                kind: file.kind,
                classes: classified,
            });
        }
        Ok(scanned)
    }

    /// Converts every discovered file concurrently, then deletes, writes and
    /// assembles aggregate files. Per-file faults are recorded, never
    /// propagated.
    pub async fn run(&self) -> Result<MigrationReport, MigrationError> {
        let filesystem = self.filesystem();
        let config = &self.options.config;
        let files = filesystem.discover(config)?;
        info!(
            project = %self.options.project_root.display(),
            output = %filesystem.output_root().display(),
            files = files.len(),
            "starting migration"
        );

        let analysis = Arc::clone(&self.analysis);
        let sources = code_sources(&files);
        let indexer = Arc::clone(&analysis);
        tokio::task::spawn_blocking(move || indexer.prepare(&sources))
            .await
            .map_err(|err| MigrationError::Analysis(format!("analysis task failed: {err}")))??;

        let services = MigrationServices::new();
        let context = Arc::new(ConversionContext {
            root_namespace: self.root_namespace(),
            catalog: Arc::clone(&self.catalog),
            analysis,
            services: services.clone(),
        });
        let pending = Arc::new(PendingWork::new());
        let tracker = ProgressTracker::new();
        let in_place = self.options.output == OutputMode::InPlace;
        let project_root = self.options.project_root.clone();

        let watchdog = Watchdog::arm(Arc::clone(&tracker), config.watchdog);
        let mut tasks = JoinSet::new();
        let mut task_paths = HashMap::new();
        let discovered = files.len();
        for file in files {
            let relative = file.relative.clone();
            let context = Arc::clone(&context);
            let pending = Arc::clone(&pending);
            let progress = tracker.start(&file.relative);
            let limit = project_root.clone();
            let handle = tasks.spawn_blocking(move || {
                let converter = converter_for(file.kind);
                debug!(path = %file.relative.display(), converter = converter.name(), "converting");
                let converted = catch_unwind(AssertUnwindSafe(|| {
                    converter.convert(&context, &file, &progress)
                }))
                .unwrap_or_else(|_| {
                    Err(MigrationError::Conversion("converter panicked".into()))
                });
                drop(progress);

                let result = converted.map(|outcome| {
                    let count = outcome.writes.len();
                    pending.push_writes(&file.relative, outcome.writes);
                    if in_place && outcome.consumed {
                        pending.push_deletion(PendingDeletion {
                            path: file.path.clone(),
                            limit,
                        });
                    }
                    count
                });
                TaskOutcome {
                    relative: file.relative,
                    result,
                }
            });
            task_paths.insert(handle.id(), relative);
        }

        let mut report = MigrationReport {
            discovered,
            ..MigrationReport::default()
        };
        while let Some(joined) = tasks.join_next().await {
            record_outcome(&mut report, &task_paths, joined);
        }
        report.stalled = watchdog.disarm().await;
        report.failed.sort_by(|a, b| a.path.cmp(&b.path));
        info!(
            converted = report.converted,
            failed = report.failed.len(),
            stalled = report.stalled.len(),
            "all file tasks joined"
        );

        let (deletions, writes) = pending.drain();
        let deleted = filesystem.delete_all(&deletions);
        let written = filesystem.write_all(&writes);
        report.deleted = deleted.succeeded;
        report.written = written.succeeded;
        report.write_failures = written.failed + deleted.failed;

        let snapshot = services.snapshot();
        let aggregates = AggregateAssembler::new()?.assemble(&context.root_namespace, &snapshot)?;
        let written = filesystem.write_all(&aggregates);
        report.written += written.succeeded;
        report.write_failures += written.failed;

        report.packages = snapshot.packages;
        report.imports = snapshot.imports;
        report.registry = snapshot.registry;

        let payload = serde_json::to_vec_pretty(&report)?;
        if let Err(err) = filesystem.write(&GeneratedFile::new(REPORT_FILE, payload)) {
            error!(error = %err, "failed to write migration report");
        }
        info!(
            written = report.written,
            deleted = report.deleted,
            "migration finished"
        );
        Ok(report)
    }
}

/// Text of every code file, for indexing before conversion starts.
fn code_sources(files: &[SourceFile]) -> Vec<SourceText> {
    files
        .iter()
        .filter(|file| file.kind == FileKind::Code)
        .filter_map(|file| match fs::read(&file.path) {
            Ok(bytes) => Some(SourceText {
                path: file.relative.clone(),
                text: String::from_utf8_lossy(&bytes).into_owned(),
            }),
            Err(err) => {
                warn!(path = %file.relative.display(), error = %err, "unreadable source skipped from analysis");
                None
            }
        })
        .collect()
}

/// Folds one joined file task into the report. A task that never produced an
/// outcome is attributed to its source through the task id.
fn record_outcome(
    report: &mut MigrationReport,
    task_paths: &HashMap<Id, PathBuf>,
    joined: Result<TaskOutcome, JoinError>,
) {
    match joined {
        Ok(TaskOutcome {
            relative,
            result: Ok(count),
        }) => {
            debug!(path = %relative.display(), outputs = count, "converted");
            report.converted += 1;
        }
        Ok(TaskOutcome {
            relative,
            result: Err(err),
        }) => {
            error!(path = %relative.display(), error = %err, "file conversion failed");
            report.failed.push(FileFailure {
                path: relative,
                message: err.to_string(),
            });
        }
        Err(err) => {
            let path = task_paths.get(&err.id()).cloned().unwrap_or_default();
            error!(path = %path.display(), error = %err, "file task did not complete");
            report.failed.push(FileFailure {
                path,
                message: format!("file task did not complete: {err}"),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_output_is_a_sibling() {
        assert_eq!(
            default_output_for(Path::new("/src/Shop")),
            PathBuf::from("/src/Shop.Migrated")
        );
        let options = MigrationOptions {
            output: OutputMode::InPlace,
            ..MigrationOptions::new("/src/Shop")
        };
        assert_eq!(options.output_root(), PathBuf::from("/src/Shop"));
    }

    #[tokio::test]
    async fn unfinished_task_is_reported_against_its_source() {
        let mut tasks: JoinSet<TaskOutcome> = JoinSet::new();
        let handle = tasks.spawn_blocking(|| panic!("task lost"));
        let task_paths = HashMap::from([(handle.id(), PathBuf::from("Lost.cs"))]);

        let mut report = MigrationReport::default();
        while let Some(joined) = tasks.join_next().await {
            record_outcome(&mut report, &task_paths, joined);
        }

        assert_eq!(report.converted, 0);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].path, PathBuf::from("Lost.cs"));
        assert!(report.failed[0].message.starts_with("file task did not complete"));
    }
}
