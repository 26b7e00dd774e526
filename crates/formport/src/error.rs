use std::fmt;

use thiserror::Error;

/// High-level error type shared across formport components.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("template error: {0}")]
    Template(String),
    #[error("analysis error: {0}")]
    Analysis(String),
    #[error("conversion error: {0}")]
    Conversion(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("project error: {0}")]
    Project(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for MigrationError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for MigrationError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<handlebars::RenderError> for MigrationError {
    fn from(err: handlebars::RenderError) -> Self {
        Self::Template(err.to_string())
    }
}

impl From<handlebars::TemplateError> for MigrationError {
    fn from(err: handlebars::TemplateError) -> Self {
        Self::Template(err.to_string())
    }
}

impl MigrationError {
    pub fn context<T: fmt::Display>(self, ctx: T) -> Self {
        match self {
            MigrationError::Template(msg) => MigrationError::Template(format!("{ctx}: {msg}")),
            MigrationError::Analysis(msg) => MigrationError::Analysis(format!("{ctx}: {msg}")),
            MigrationError::Conversion(msg) => {
                MigrationError::Conversion(format!("{ctx}: {msg}"))
            }
            MigrationError::Config(msg) => MigrationError::Config(format!("{ctx}: {msg}")),
            MigrationError::Project(msg) => MigrationError::Project(format!("{ctx}: {msg}")),
            MigrationError::Serialization(msg) => {
                MigrationError::Serialization(format!("{ctx}: {msg}"))
            }
            MigrationError::Io(err) => {
                MigrationError::Io(std::io::Error::new(err.kind(), format!("{ctx}: {err}")))
            }
        }
    }
}
