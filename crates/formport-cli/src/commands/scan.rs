use clap::{Arg, ArgMatches, Command};
use formport::{MigrationOptions, Migrator};

use crate::commands::CommandResult;
use crate::error::{CliError, ExitStatus};
use crate::util;

pub fn command() -> Command {
    Command::new("scan")
        .about("List discovered files and code-behind classifications without writing")
        .arg(
            Arg::new("project")
                .value_name("PROJECT")
                .required(true)
                .help("Root directory of the project to inspect"),
        )
}

pub fn run(matches: &ArgMatches) -> Result<CommandResult, CliError> {
    let project = matches
        .get_one::<String>("project")
        .ok_or_else(|| CliError::new("PROJECT is required", ExitStatus::Usage))?;
    let project_root = util::project_dir(project)?;
    let files = Migrator::new(MigrationOptions::new(&project_root))?.scan()?;
    Ok(CommandResult::Scanned {
        project: util::display_path(&project_root),
        files,
    })
}
