use std::path::{Path, PathBuf};

use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};
use formport::{MigrationConfig, MigrationOptions, Migrator, OutputMode};

use crate::commands::CommandResult;
use crate::error::{CliError, ExitStatus};
use crate::util::{self, Verbosity};

pub fn command() -> Command {
    Command::new("migrate")
        .about("Convert a project and write the migrated tree")
        .arg(
            Arg::new("project")
                .value_name("PROJECT")
                .required(true)
                .help("Root directory of the project to migrate"),
        )
        .arg(
            Arg::new("output")
                .long("output")
                .short('o')
                .value_name("DIR")
                .conflicts_with("in-place")
                .help("Write into DIR. Defaults to a <PROJECT>.Migrated sibling"),
        )
        .arg(
            Arg::new("in-place")
                .long("in-place")
                .action(ArgAction::SetTrue)
                .help("Write into the project and remove migrated sources"),
        )
        .arg(
            Arg::new("namespace")
                .long("namespace")
                .value_name("NS")
                .help("Root namespace of generated code"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("FILE")
                .help("YAML run configuration"),
        )
        .arg(
            Arg::new("templates")
                .long("templates")
                .value_name("FILE")
                .help("JSON control-template catalog overriding the embedded one"),
        )
        .arg(
            Arg::new("stall-timeout")
                .long("stall-timeout")
                .value_name("SECS")
                .value_parser(value_parser!(u64))
                .help("Flag files that make no progress for SECS seconds"),
        )
}

pub fn run(verbosity: Verbosity, matches: &ArgMatches) -> Result<CommandResult, CliError> {
    let options = options_from(matches)?;
    let in_place = options.output == OutputMode::InPlace;
    let project = util::display_path(&options.project_root);
    let output = util::display_path(&options.output_root());
    if verbosity.verbose {
        tracing::info!(%project, %output, in_place, "resolved migration options");
    }

    let migrator = Migrator::new(options)?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let report = runtime.block_on(migrator.run())?;

    Ok(CommandResult::Migrated {
        project,
        output,
        in_place,
        report,
    })
}

/// Config file first, then flag overrides.
fn options_from(matches: &ArgMatches) -> Result<MigrationOptions, CliError> {
    let project = matches
        .get_one::<String>("project")
        .ok_or_else(|| CliError::new("PROJECT is required", ExitStatus::Usage))?;
    let project_root = util::project_dir(project)?;

    let mut config = match matches.get_one::<String>("config") {
        Some(path) => MigrationConfig::load(Path::new(path))?,
        None => MigrationConfig::default(),
    };
    if let Some(namespace) = matches.get_one::<String>("namespace") {
        config.root_namespace = Some(namespace.clone());
    }
    if let Some(templates) = matches.get_one::<String>("templates") {
        config.templates = Some(PathBuf::from(templates));
    }
    if let Some(secs) = matches.get_one::<u64>("stall-timeout") {
        config.watchdog.stall_timeout_ms = secs.saturating_mul(1000);
    }

    let mut options = MigrationOptions::new(project_root);
    options.config = config;
    if matches.get_flag("in-place") {
        options.output = OutputMode::InPlace;
    } else if let Some(dir) = matches.get_one::<String>("output") {
        options.output = OutputMode::Directory(PathBuf::from(dir));
    }
    Ok(options)
}
