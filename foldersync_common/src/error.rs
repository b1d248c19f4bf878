use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FolderSyncError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Path error: {0}")]
    Path(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid, equal, or missing synchronization roots
    #[error("Invalid path: {0}")]
    Validation(String),

    /// A directory could not be enumerated during diffing
    #[error("Cannot list {}: {message}", .path.display())]
    Listing { path: PathBuf, message: String },

    /// A single copy or removal failed
    #[error("{action} failed for {}: {message}", .path.display())]
    Execution {
        action: &'static str,
        path: PathBuf,
        message: String,
    },

    #[error("Run instance error: {0}")]
    Instance(String),
}

pub type Result<T> = std::result::Result<T, FolderSyncError>;

impl FolderSyncError {
    pub fn listing(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        Self::Listing {
            path: path.into(),
            message: err.to_string(),
        }
    }

    pub fn execution(
        action: &'static str,
        path: impl Into<PathBuf>,
        err: impl std::fmt::Display,
    ) -> Self {
        Self::Execution {
            action,
            path: path.into(),
            message: err.to_string(),
        }
    }
}
