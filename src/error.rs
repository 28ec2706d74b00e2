use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GitError {
    #[error("could not run git {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("git {command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("merge conflict in {}", .paths.join(", "))]
    Conflict { paths: Vec<String> },

    #[error("sync cancelled")]
    Cancelled,

    #[error("checkout IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0} is not a git checkout")]
    NotARepository(PathBuf),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error in {path}: {message}")]
    Json { path: PathBuf, message: String },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid input: {0}")]
    MalformedInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Repository sync failed: {0}")]
    Git(#[from] GitError),
}

impl StoreError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedInput(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn json(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        Self::Json {
            path: path.into(),
            message: err.to_string(),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Failures of dashboard-level operations.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Admin access required for {0}")]
    AdminRequired(crate::types::Team),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<GitError> for AppError {
    fn from(e: GitError) -> Self {
        Self::Store(StoreError::Git(e))
    }
}

pub type AppResult<T> = Result<T, AppError>;
