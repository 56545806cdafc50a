use thiserror::Error;

#[derive(Debug, Error)]
/// Errors returned by bulk inference providers.
pub enum BatchError {
    /// The HTTP request could not be sent or its body could not be read.
    #[error("{operation} request failed: {message}")]
    Transport {
        /// Provider operation (e.g. `upload_file`).
        operation: &'static str,
        /// Error message.
        message: String,
    },

    /// The provider answered with a non-success status.
    #[error("{operation} rejected by provider (HTTP {status}): {message}")]
    Provider {
        /// Provider operation.
        operation: &'static str,
        /// HTTP status code.
        status: u16,
        /// Response body or provider message.
        message: String,
    },

    /// The provider response did not have the expected shape.
    #[error("unexpected {operation} response: {message}")]
    InvalidResponse {
        /// Provider operation.
        operation: &'static str,
        /// Error message.
        message: String,
    },

    /// Request records could not be serialized to JSONL.
    #[error("failed to serialize batch request: {0}")]
    Serialization(#[from] serde_json::Error),

    /// File id unknown to the provider.
    #[error("file not found: {file_id}")]
    FileNotFound {
        /// Provider file id.
        file_id: String,
    },

    /// Batch id unknown to the provider.
    #[error("batch not found: {batch_id}")]
    BatchNotFound {
        /// Provider batch id.
        batch_id: String,
    },
}

pub type BatchResult<T> = Result<T, BatchError>;
