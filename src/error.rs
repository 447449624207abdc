use crate::domain::unit_of_work::UnitOfWorkId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransferError {
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Account not found: {0}")]
    AccountNotFound(String),
    #[error("Step '{step}' failed: {reason}")]
    StepFailed { step: String, reason: String },
    #[error("Timed out waiting for lock on account '{0}'")]
    LockTimeout(String),
    #[error("Queue '{queue}' is full (max depth {max_depth})")]
    QueueFull { queue: String, max_depth: usize },
    #[error("Unit of work {0} is not active")]
    InactiveUnitOfWork(UnitOfWorkId),
    #[error("Coordination failure for unit of work {uow}: committed [{committed}], failed [{failed}]")]
    CoordinationFailure {
        uow: UnitOfWorkId,
        committed: String,
        failed: String,
    },
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[cfg(feature = "storage-rocksdb")]
    #[error("Storage error: {0}")]
    StorageError(#[from] rocksdb::Error),
    #[error("Internal error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
}

impl TransferError {
    /// Whether the error should cause the in-flight message to be dead-lettered
    /// rather than surfaced to the operator.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, TransferError::CoordinationFailure { .. })
    }
}

pub type Result<T> = std::result::Result<T, TransferError>;
