use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Document error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Archiving error: {0}")]
    Archiving(String),

    #[error("Staged listing mismatch: {0}")]
    IntegrityMismatch(String),

    #[error("Command '{command}' exited with status {status}")]
    CommandFailure { command: String, status: i32 },

    #[error("Unparseable archive state output: {0}")]
    ProbeParse(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid document: {0}")]
    Record(String),

    #[error("Illegal data_deleted transition: {from} -> {to}")]
    Transition { from: String, to: String },

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
