//! Error types for unit-task exports

use thiserror::Error;

/// Result type alias for export operations
pub type Result<T> = std::result::Result<T, ExportError>;

/// Main error type for all export operations
#[derive(Error, Debug)]
pub enum ExportError {
    /// Backing store could not be reached, or the query failed before any
    /// row was delivered. Nothing was written to the sink.
    #[error("Row source unavailable: {0}")]
    SourceUnavailable(String),

    /// Streaming delivery failed partway. In disk mode the sink may already
    /// hold a partially written document; it is not cleaned up.
    #[error("Row stream interrupted after {delivered} rows: {reason}")]
    StreamInterrupted { delivered: u64, reason: String },

    /// The document serializer failed while building or finishing a workbook
    #[error("Failed to serialize workbook: {0}")]
    SerializationFailure(String),

    /// Column layout and row mapper disagree, or a setting is out of range
    #[error("Invalid export configuration: {0}")]
    ConfigurationError(String),

    /// IO error wrapper
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExportError {
    /// Only a source that failed before delivering anything is safe to retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ExportError::SourceUnavailable(_))
    }

    /// The worksheet already holds `limit` rows, header included.
    pub(crate) fn row_limit(limit: u32) -> Self {
        ExportError::SerializationFailure(format!("worksheet row limit of {} reached", limit))
    }

    /// Reclassify a lower-level failure raised while producing the document.
    ///
    /// Typed export errors pass through unchanged; raw IO errors become
    /// [`ExportError::SerializationFailure`].
    pub(crate) fn during_serialization(self) -> Self {
        match self {
            ExportError::Io(err) => ExportError::SerializationFailure(err.to_string()),
            other => other,
        }
    }
}

impl From<zip::result::ZipError> for ExportError {
    fn from(err: zip::result::ZipError) -> Self {
        ExportError::SerializationFailure(err.to_string())
    }
}
