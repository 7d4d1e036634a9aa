use crate::types::UserId;

pub type Result<T> = std::result::Result<T, SimilarityError>;

#[derive(Debug, thiserror::Error)]
pub enum SimilarityError {
    #[error("User {user_id} not found in feature matrix")]
    NotFound { user_id: UserId },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Schema mismatch: column {column} defined by more than one feature block")]
    SchemaMismatch { column: String },

    #[error("Empty dataset: no users present in any event table")]
    EmptyDataset,

    #[error("Ingestion error: {0}")]
    Ingestion(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        key: Option<String>,
    },
}

impl SimilarityError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        SimilarityError::InvalidArgument(message.into())
    }

    pub fn configuration(message: impl Into<String>, key: &str) -> Self {
        SimilarityError::Configuration {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }

    /// Machine-readable error code used in HTTP error bodies
    pub fn code(&self) -> &'static str {
        match self {
            SimilarityError::NotFound { .. } => "not_found",
            SimilarityError::InvalidArgument(_) => "invalid_argument",
            SimilarityError::SchemaMismatch { .. } => "schema_mismatch",
            SimilarityError::EmptyDataset => "empty_dataset",
            SimilarityError::Ingestion(_) => "ingestion_failed",
            SimilarityError::Internal(_) => "internal_error",
            SimilarityError::Configuration { .. } => "configuration_error",
        }
    }

    /// Whether the caller supplied a bad request rather than the service failing
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            SimilarityError::NotFound { .. } | SimilarityError::InvalidArgument(_)
        )
    }
}

impl From<csv::Error> for SimilarityError {
    fn from(err: csv::Error) -> Self {
        SimilarityError::Ingestion(err.to_string())
    }
}

impl From<config::ConfigError> for SimilarityError {
    fn from(err: config::ConfigError) -> Self {
        SimilarityError::Configuration {
            message: err.to_string(),
            key: None,
        }
    }
}
