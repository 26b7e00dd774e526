use formport::{MigrationReport, ScannedFile};
use serde::Serialize;

use crate::error::ExitStatus;

pub mod migrate;
pub mod scan;

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CommandResult {
    Migrated {
        project: String,
        output: String,
        in_place: bool,
        report: MigrationReport,
    },
    Scanned {
        project: String,
        files: Vec<ScannedFile>,
    },
}

impl CommandResult {
    pub fn exit_status(&self) -> ExitStatus {
        match self {
            CommandResult::Migrated { report, .. } => {
                if report.is_clean() {
                    ExitStatus::Ok
                } else {
                    ExitStatus::Data
                }
            }
            CommandResult::Scanned { .. } => ExitStatus::Ok,
        }
    }
}
