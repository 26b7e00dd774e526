//! Per-input-kind adapters producing generated files.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::aggregate::MigrationServices;
use crate::analysis::SourceAnalysis;
use crate::class::ClassConverter;
use crate::config::MigrationConfig;
use crate::directive::{DirectiveConverter, ViewKind};
use crate::error::MigrationError;
use crate::markup::{Node, parse};
use crate::naming::{area_path, component_name, view_area};
use crate::pending::GeneratedFile;
use crate::tag::TagConverter;
use crate::template_catalog::TemplateCatalog;
use crate::watchdog::ProgressHandle;

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case", tag = "kind", content = "view")]
pub enum FileKind {
    Code,
    View(ViewKind),
    Static,
    /// Project files with no counterpart in the target project.
    Ignorable,
}

impl FileKind {
    pub fn classify(relative: &Path, config: &MigrationConfig) -> Self {
        let extension = relative
            .extension()
            .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        if extension == "cs" {
            return FileKind::Code;
        }
        if let Some(view) = ViewKind::from_extension(&extension) {
            return FileKind::View(view);
        }
        if config.is_static(relative) {
            return FileKind::Static;
        }
        FileKind::Ignorable
    }
}

/// A discovered input file.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    pub relative: PathBuf,
    pub kind: FileKind,
}

/// Shared, read-only inputs of every converter.
pub struct ConversionContext {
    pub root_namespace: String,
    pub catalog: Arc<TemplateCatalog>,
    pub analysis: Arc<dyn SourceAnalysis>,
    pub services: MigrationServices,
}

#[derive(Clone, Debug, Default)]
pub struct FileOutcome {
    pub writes: Vec<GeneratedFile>,
    /// The source was migrated and may be removed in in-place runs.
    pub consumed: bool,
}

impl FileOutcome {
    fn consumed(writes: Vec<GeneratedFile>) -> Self {
        Self {
            writes,
            consumed: true,
        }
    }
}

pub trait FileConverter: Send + Sync {
    fn name(&self) -> &'static str;

    fn convert(
        &self,
        context: &ConversionContext,
        file: &SourceFile,
        progress: &ProgressHandle,
    ) -> Result<FileOutcome, MigrationError>;
}

/// Picks the converter for a file kind.
pub fn converter_for(kind: FileKind) -> &'static dyn FileConverter {
    match kind {
        FileKind::Code => &CodeFileConverter,
        FileKind::View(_) => &ViewFileConverter,
        FileKind::Static => &StaticFileConverter,
        FileKind::Ignorable => &IgnorableFileConverter,
    }
}

/// Reads a legacy text file, tolerating a BOM and stray non-UTF-8 bytes.
fn read_text(path: &Path) -> Result<String, MigrationError> {
    let bytes = fs::read(path).map_err(|err| MigrationError::from(err).context(path.display()))?;
    let text = String::from_utf8_lossy(&bytes);
    Ok(text.strip_prefix('\u{feff}').unwrap_or(&text).to_string())
}

fn directive_bodies(nodes: &[Node], out: &mut Vec<String>) {
    for node in nodes {
        match node {
            Node::Directive(body) => out.push(body.clone()),
            Node::Element(element) => directive_bodies(&element.children, out),
            _ => {}
        }
    }
}

/// Directive block, a blank line, then the converted body.
fn compose_view(block: &str, body: &str) -> String {
    let body = body.trim();
    let mut out = block.trim_end().to_string();
    if !body.is_empty() {
        if !out.is_empty() {
            out.push_str("\n\n");
        }
        out.push_str(body);
    }
    out.push('\n');
    out
}

pub struct ViewFileConverter;

impl FileConverter for ViewFileConverter {
    fn name(&self) -> &'static str {
        "view"
    }

    fn convert(
        &self,
        context: &ConversionContext,
        file: &SourceFile,
        progress: &ProgressHandle,
    ) -> Result<FileOutcome, MigrationError> {
        let FileKind::View(view_kind) = file.kind else {
            return Err(MigrationError::Conversion(format!(
                "{} is not a view file",
                file.relative.display()
            )));
        };
        let text = read_text(&file.path)?;

        progress.report("parsing markup");
        let mut document = parse(&text);

        progress.report("converting directives");
        let mut bodies = Vec::new();
        directive_bodies(&document.nodes, &mut bodies);
        let block = DirectiveConverter::new(
            &file.relative,
            &context.root_namespace,
            view_kind,
            &context.services,
        )
        .convert_all(&bodies);

        progress.report("converting tags");
        let mut tags = TagConverter::new(&context.catalog, &context.services, &file.relative);
        document
            .rewrite(&mut tags)
            .map_err(|err| err.context(file.relative.display()))?;
        let stats = tags.stats();
        debug!(
            path = %file.relative.display(),
            templated = stats.templated,
            registered = stats.registered,
            unconverted = stats.unconverted,
            unsupported = stats.unsupported,
            "converted view tags"
        );

        let name = component_name(&file.relative);
        if view_kind == ViewKind::Master {
            context.services.startup.add_layout(&name);
        }
        let extension = file
            .relative
            .extension()
            .map(|ext| ext.to_string_lossy().into_owned())
            .unwrap_or_default();
        let area = view_area(&extension).unwrap_or("Pages");
        let output = area_path(area, &file.relative, &format!("{name}.razor"));
        let content = compose_view(&block, &document.serialize());
        Ok(FileOutcome::consumed(vec![GeneratedFile::text(output, content)]))
    }
}

pub struct CodeFileConverter;

impl FileConverter for CodeFileConverter {
    fn name(&self) -> &'static str {
        "code"
    }

    fn convert(
        &self,
        context: &ConversionContext,
        file: &SourceFile,
        progress: &ProgressHandle,
    ) -> Result<FileOutcome, MigrationError> {
        let text = read_text(&file.path)?;
        progress.report("converting classes");
        let writes = ClassConverter::new(
            context.analysis.as_ref(),
            &context.root_namespace,
            &context.services,
        )
        .convert_file(&file.relative, &text)?;
        Ok(FileOutcome::consumed(writes))
    }
}

/// Copies assets under `wwwroot/`, keeping their relative layout.
pub struct StaticFileConverter;

impl FileConverter for StaticFileConverter {
    fn name(&self) -> &'static str {
        "static"
    }

    fn convert(
        &self,
        _context: &ConversionContext,
        file: &SourceFile,
        progress: &ProgressHandle,
    ) -> Result<FileOutcome, MigrationError> {
        progress.report("copying asset");
        let bytes =
            fs::read(&file.path).map_err(|err| MigrationError::from(err).context(file.path.display()))?;
        let output = Path::new("wwwroot").join(&file.relative);
        Ok(FileOutcome::consumed(vec![GeneratedFile::new(output, bytes)]))
    }
}

pub struct IgnorableFileConverter;

impl FileConverter for IgnorableFileConverter {
    fn name(&self) -> &'static str {
        "ignorable"
    }

    fn convert(
        &self,
        _context: &ConversionContext,
        file: &SourceFile,
        _progress: &ProgressHandle,
    ) -> Result<FileOutcome, MigrationError> {
        debug!(path = %file.relative.display(), "no counterpart in target project");
        Ok(FileOutcome::default())
    }
}
