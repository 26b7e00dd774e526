use std::process::ExitCode;

use formport::{ClassVariant, FileKind, MigrationReport, ScannedFile, ViewKind};

use crate::commands::CommandResult;
use crate::error::CliError;
use crate::util::display_path;

pub enum OutputFormat {
    Text,
    Json,
}

/// Renders a `CommandResult` as human-readable text or a JSON document and
/// converts the outcome into an exit code.
pub fn emit_result(result: CommandResult, format: OutputFormat) -> Result<ExitCode, CliError> {
    match format {
        OutputFormat::Text => print_text(&result),
        OutputFormat::Json => print_json(&result)?,
    };
    Ok(ExitCode::from(result.exit_status().code()))
}

fn print_text(result: &CommandResult) {
    match result {
        CommandResult::Migrated {
            project,
            output,
            in_place,
            report,
        } => {
            let status = if report.is_clean() { "OK" } else { "FAIL" };
            if *in_place {
                println!("Migration {status}: {project} (in place)");
            } else {
                println!("Migration {status}: {project} -> {output}");
            }
            print_report(report);
        }
        CommandResult::Scanned { project, files } => {
            println!("Scanned {project} ({} files)", files.len());
            for file in files {
                print_scanned(file);
            }
        }
    }
}

fn print_report(report: &MigrationReport) {
    println!(
        "  files: {} discovered, {} converted, {} failed",
        report.discovered,
        report.converted,
        report.failed.len()
    );
    println!(
        "  output: {} written, {} deleted, {} write failures",
        report.written, report.deleted, report.write_failures
    );
    for failure in &report.failed {
        println!("  [ERR] {}: {}", display_path(&failure.path), failure.message);
    }
    for stalled in &report.stalled {
        println!("  [SLOW] {}", display_path(stalled));
    }
    if !report.packages.is_empty() {
        println!("  packages:");
        for package in &report.packages {
            println!("    - {package}");
        }
    }
    if !report.registry.is_empty() {
        println!("  registered controls:");
        for converter in report.registry.values() {
            println!("    - {} -> {}", converter.tag, converter.component);
        }
    }
}

fn print_scanned(file: &ScannedFile) {
    println!("  {} [{}]", display_path(&file.path), kind_label(file.kind));
    for class in &file.classes {
        println!(
            "    - {} ({}) -> {}",
            class.name,
            variant_label(class.variant),
            display_path(&class.output)
        );
    }
}

fn kind_label(kind: FileKind) -> &'static str {
    match kind {
        FileKind::Code => "code",
        FileKind::View(ViewKind::Page) => "page",
        FileKind::View(ViewKind::Control) => "control",
        FileKind::View(ViewKind::Master) => "master",
        FileKind::Static => "static",
        FileKind::Ignorable => "ignored",
    }
}

fn variant_label(variant: ClassVariant) -> &'static str {
    match variant {
        ClassVariant::RootApplication => "application",
        ClassVariant::PageBehind => "page code-behind",
        ClassVariant::ControlBehind => "control code-behind",
        ClassVariant::LayoutBehind => "layout code-behind",
        ClassVariant::RequestHandler => "handler",
        ClassVariant::RequestFilter => "module",
        ClassVariant::Unknown => "unchanged",
    }
}

fn print_json(result: &CommandResult) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(result)?);
    Ok(())
}
