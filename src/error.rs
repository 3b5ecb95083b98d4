/// Unified error types for the converter
use crate::validation::ValidationError;
use thiserror::Error;

/// Main error type for a conversion run
#[derive(Error, Debug)]
pub enum ConverterError {
    /// Malformed or inconsistent options
    #[error("Configuration error: {0}")]
    Config(String),

    /// A pre-flight check failed; nothing was resolved
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// The backing store became unusable while resolving identifiers
    #[error("Lookup failure: {0}")]
    Lookup(#[source] sqlx::Error),

    /// Database errors outside of identifier lookups
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConverterError {
    /// Process exit code for this failure
    pub fn exit_code(&self) -> u8 {
        match self {
            ConverterError::Validation(_) => 1,
            ConverterError::Config(_) => 2,
            ConverterError::Lookup(_) | ConverterError::Database(_) | ConverterError::Io(_) => 3,
        }
    }
}

/// Result type alias for converter operations
pub type ConverterResult<T> = Result<T, ConverterError>;
