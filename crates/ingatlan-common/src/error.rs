//! Error types for the ingatlan pipeline

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// Main error type for the normalization pipeline
#[derive(Error, Debug)]
pub enum IngestError {
    /// A parsed document carried an attribute outside the declared canonical
    /// feature set of its entity. Fatal for the whole batch; never repaired
    /// automatically. The offending column names are kept for the operator.
    #[error("schema drift in entity '{entity}': unexpected columns {columns:?}")]
    SchemaDrift {
        entity: String,
        columns: Vec<String>,
    },

    /// A single capture's content could not be decoded as the expected
    /// document shape. Recoverable per row: the row is skipped and counted.
    #[error("malformed document from {url}: {reason}")]
    MalformedDocument { url: String, reason: String },

    /// A row handed to the sink was missing a value in a key column.
    #[error("entity '{entity}' row has no value for key column '{column}'")]
    MissingKey { entity: String, column: String },

    #[error("unknown entity table: {0}")]
    UnknownEntity(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A batch error annotated with which stream and batch it came from,
    /// so callers see the failing batch without digging through logs.
    #[error("{stream} batch {batch_index} failed: {source}")]
    Batch {
        stream: String,
        batch_index: usize,
        #[source]
        source: Box<IngestError>,
    },
}

impl IngestError {
    /// Schema drift must never be swallowed, regardless of the run's
    /// failure policy.
    pub fn is_fatal(&self) -> bool {
        match self {
            IngestError::SchemaDrift { .. } => true,
            IngestError::Batch { source, .. } => source.is_fatal(),
            _ => false,
        }
    }

    /// Annotate an error with the batch it occurred in.
    pub fn in_batch(self, stream: impl Into<String>, batch_index: usize) -> IngestError {
        IngestError::Batch {
            stream: stream.into(),
            batch_index,
            source: Box::new(self),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_drift_is_fatal() {
        let err = IngestError::SchemaDrift {
            entity: "real_estate".to_string(),
            columns: vec!["mystery_field".to_string()],
        };
        assert!(err.is_fatal());
        assert!(err.to_string().contains("mystery_field"));
    }

    #[test]
    fn test_batch_annotation_keeps_fatality_and_index() {
        let drift = IngestError::SchemaDrift {
            entity: "real_estate".to_string(),
            columns: vec!["mystery_field".to_string()],
        };
        let wrapped = drift.in_batch("detail", 3);
        assert!(wrapped.is_fatal());
        assert!(wrapped.to_string().contains("detail batch 3"));

        let storage = IngestError::Storage("boom".to_string()).in_batch("listing", 0);
        assert!(!storage.is_fatal());
    }

    #[test]
    fn test_malformed_document_is_recoverable() {
        let err = IngestError::MalformedDocument {
            url: "https://example.com/123".to_string(),
            reason: "no listing element".to_string(),
        };
        assert!(!err.is_fatal());
    }
}
