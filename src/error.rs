//! Error types for Document Store operations

use thiserror::Error;

/// Errors that can occur during document store operations
#[derive(Debug, Error)]
pub enum DocumentStoreError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown criteria command: {0}")]
    UnknownCommand(String),

    #[error(
        "No index on table '{table}' can answer a query over {fields:?}{}",
        describe_indexes(.indexes)
    )]
    UnanswerableQuery {
        table: String,
        fields: Vec<String>,
        /// Declared index field lists, only populated with verbose diagnostics
        indexes: Option<Vec<Vec<String>>>,
    },

    #[error("Refusing to delete from '{0}' without a where-clause (use force to override)")]
    UnrestrictedDelete(String),

    #[error(
        "Parallel arrays are not supported: fields '{first}' and '{second}' of an index on '{table}' both hold arrays"
    )]
    ParallelArrays {
        table: String,
        first: String,
        second: String,
    },

    #[error("Field '{field}' holds a nested array; only one level of array expansion is supported")]
    MultiDimensionalArray { field: String },

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn describe_indexes(indexes: &Option<Vec<Vec<String>>>) -> String {
    match indexes {
        Some(indexes) if indexes.is_empty() => "; no indexes are declared".to_string(),
        Some(indexes) => format!("; declared indexes: {:?}", indexes),
        None => String::new(),
    }
}

impl DocumentStoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    pub fn document_not_found(msg: impl Into<String>) -> Self {
        Self::DocumentNotFound(msg.into())
    }

    pub fn codec(msg: impl Into<String>) -> Self {
        Self::Codec(msg.into())
    }

    /// Caller mistakes that must never be retried
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::UnknownCommand(_)
                | Self::UnanswerableQuery { .. }
                | Self::UnrestrictedDelete(_)
                | Self::ParallelArrays { .. }
                | Self::MultiDimensionalArray { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, DocumentStoreError>;
