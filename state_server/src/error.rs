use state_store::StoreError;
use thiserror::Error;

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Storage Error: {0}")]
    StoreError(#[from] StoreError),

    #[error("Configuration Error: {0}")]
    ConfigurationError(String),

    #[error("IO Error: {0}")]
    IOError(#[from] std::io::Error),

    #[error("Error : {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, ServerError>;
