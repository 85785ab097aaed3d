use std::fmt::Display;
use std::path::PathBuf;

use thiserror::Error;

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("State not found: {0}")]
    NotFound(String),

    #[error("State already locked: {0}")]
    AlreadyLocked(String),

    #[error("State not locked: {0}")]
    NotLocked(String),

    #[error("Invalid state name: {0:?}")]
    InvalidName(String),

    #[error("Storage root is not a directory: {0:?}")]
    NotDirectory(PathBuf),

    #[error("Storage root {path:?} is not usable: {source}")]
    RootUnusable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Inconsistent storage: {0}")]
    Inconsistent(String),

    #[error("IO Error: {0}")]
    IOError(#[from] std::io::Error),

    #[error("Other Internal Error: {0}")]
    InternalError(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    pub fn internal(e: impl Display) -> StoreError {
        StoreError::InternalError(e.to_string())
    }

    /// True for the failures that are the server's fault rather than the caller's.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            StoreError::NotDirectory(_)
                | StoreError::RootUnusable { .. }
                | StoreError::Inconsistent(_)
                | StoreError::IOError(_)
                | StoreError::InternalError(_)
        )
    }
}

impl PartialEq for StoreError {
    fn eq(&self, other: &StoreError) -> bool {
        match (self, other) {
            (StoreError::NotFound(a), StoreError::NotFound(b))
            | (StoreError::AlreadyLocked(a), StoreError::AlreadyLocked(b))
            | (StoreError::NotLocked(a), StoreError::NotLocked(b))
            | (StoreError::InvalidName(a), StoreError::InvalidName(b)) => a == b,
            (e1, e2) => std::mem::discriminant(e1) == std::mem::discriminant(e2),
        }
    }
}
