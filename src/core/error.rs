use thiserror::Error;

#[derive(Error, Debug)]
pub enum CascadeError {
    #[error("Metadata error: {0}")]
    MetadataError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Entity type '{0}' not found")]
    EntityTypeNotFound(String),

    #[error("Field '{0}' not found on entity '{1}'")]
    FieldNotFound(String, String),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Store error: {0}")]
    StoreError(String),

    #[error("Lock error: {0}")]
    LockError(String),

    #[error("I/O error: {0}")]
    IoError(String),
}

pub type Result<T> = std::result::Result<T, CascadeError>;

impl<T> From<std::sync::PoisonError<T>> for CascadeError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

impl From<std::io::Error> for CascadeError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err.to_string())
    }
}

/// Wraps a JSON (de)serialization failure with the operation that caused it.
pub fn serde_to_cascade_error(context: &str, err: serde_json::Error) -> CascadeError {
    CascadeError::ConfigError(format!("{}: {}", context, err))
}
