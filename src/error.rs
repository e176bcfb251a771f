use thiserror::Error;
use std::io;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid location: {0}")]
    InvalidLocation(String),

    #[error("Corrupt persisted state: {0}")]
    CorruptPersistedState(String),

    #[error("Persistence write failed: {0}")]
    PersistenceWriteFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

// Type alias for Result
pub type Result<T> = std::result::Result<T, Error>;

// Helper functions for common error conversions
impl Error {
    pub fn invalid_location<S: Into<String>>(msg: S) -> Self {
        Error::InvalidLocation(msg.into())
    }

    pub fn corrupt<S: Into<String>>(msg: S) -> Self {
        Error::CorruptPersistedState(msg.into())
    }

    pub fn write_failed<S: Into<String>>(msg: S) -> Self {
        Error::PersistenceWriteFailed(msg.into())
    }

    pub fn storage<S: Into<String>>(msg: S) -> Self {
        Error::Storage(msg.into())
    }

    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<lmdb_rkv::Error> for Error {
    fn from(err: lmdb_rkv::Error) -> Self {
        Error::Database(err.to_string())
    }
}
