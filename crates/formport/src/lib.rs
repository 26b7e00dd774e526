pub mod aggregate;
pub mod analysis;
pub mod assembly;
pub mod class;
pub mod condition;
pub mod config;
pub mod conversion;
pub mod directive;
pub mod embedded_code;
pub mod error;
pub mod file_converter;
pub mod markup;
pub mod naming;
pub mod orchestrator;
pub mod pending;
pub mod project;
pub mod registry;
pub mod tag;
pub mod template;
pub mod template_catalog;
pub mod watchdog;

pub use aggregate::{
    AggregateSnapshot, ImportAggregator, MigrationServices, PackageAggregator, StartupAggregator,
    StartupHooks,
};
pub use analysis::{
    CSharpAnalysis, CodeUnit, Member, MemberKind, MethodDecl, Parameter, SourceAnalysis,
    SourceText, TypeDecl, TypeKind, UsingDirective,
};
pub use assembly::AggregateAssembler;
pub use class::{ClassConverter, ClassVariant, ClassifiedType, classify, output_path};
pub use condition::{NodeContext, TemplateCondition};
pub use config::{IgnoreRules, MigrationConfig, WatchdogConfig};
pub use conversion::{ConversionKind, ConversionResult};
pub use directive::{DirectiveConverter, DirectiveKind, ViewKind};
pub use error::MigrationError;
pub use file_converter::{
    ConversionContext, FileConverter, FileKind, FileOutcome, SourceFile, converter_for,
};
pub use markup::{Attribute, Document, Element, Node, NodeRewriter};
pub use orchestrator::{
    FileFailure, MigrationOptions, MigrationReport, Migrator, OutputMode, REPORT_FILE,
    ScannedFile, default_output_for,
};
pub use pending::{GeneratedFile, PendingDeletion, PendingWork};
pub use project::{ApplySummary, ProjectFilesystem};
pub use registry::{ControlConverter, ControlRegistry};
pub use tag::{TagConverter, TagStats};
pub use template::{ControlTemplates, NamedTemplate, TemplateInvokable};
pub use template_catalog::{CatalogDocument, TemplateCatalog};
pub use watchdog::{ProgressHandle, ProgressTracker, Watchdog};
