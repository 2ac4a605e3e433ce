use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, BroError>;

#[derive(Error, Debug)]
pub enum BroError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("File does not exist: {0}")]
    MissingFile(PathBuf),

    #[error("Cannot run empty command")]
    EmptyCommand,

    #[error("Command not registered: {0}")]
    UnknownCommand(String),

    #[error("Module not registered: {0}")]
    UnknownModule(String),

    #[error("Stage not registered: {0}")]
    UnknownStage(String),

    #[error("Name already registered: {0}")]
    Duplicate(String),

    #[error("Rebuild command failed with status {0}")]
    Rebuild(i32),
}

impl BroError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BroError::Io {
            path: path.into(),
            source,
        }
    }

    /// Numeric status reported to callers that only deal in exit codes.
    pub fn code(&self) -> i32 {
        match self {
            BroError::Io { source, .. } => source.raw_os_error().filter(|c| *c != 0).unwrap_or(1),
            BroError::Rebuild(status) if *status != 0 => *status,
            _ => 1,
        }
    }
}
