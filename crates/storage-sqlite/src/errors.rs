//! Storage error type and its mapping into the core error.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database connection error: {0}")]
    Connection(#[from] diesel::ConnectionError),

    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Query error: {0}")]
    Query(#[from] diesel::result::Error),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The writer thread is gone or dropped the reply.
    #[error("Database writer unavailable: {0}")]
    WriterUnavailable(String),

    /// A stored row no longer decodes into the domain model.
    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

impl From<StorageError> for devicelock_core::Error {
    fn from(err: StorageError) -> Self {
        devicelock_core::Error::Storage(err.to_string())
    }
}
