mod cli;
mod commands;
mod error;
mod formatter;
mod util;

pub use cli::{run, run_cli};
pub use error::CliError;
