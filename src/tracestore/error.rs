use thiserror::Error;

#[derive(Debug, Error)]
/// Errors returned by trace store backends and the adapter built on them.
pub enum TraceStoreError {
    /// The named run could not be resolved in the dataset.
    #[error("Run '{run_name}' not found in dataset '{dataset_name}'")]
    RunNotFound {
        dataset_name: String,
        run_name: String,
    },

    /// The HTTP request could not be sent or its body could not be read.
    #[error("{operation} request failed: {message}")]
    Transport {
        operation: &'static str,
        message: String,
    },

    /// The trace store answered with a non-success status.
    #[error("{operation} rejected by trace store (HTTP {status}): {message}")]
    Backend {
        operation: &'static str,
        status: u16,
        message: String,
    },

    /// The trace store response did not have the expected shape.
    #[error("unexpected {operation} response: {message}")]
    InvalidResponse {
        operation: &'static str,
        message: String,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type TraceStoreResult<T> = Result<T, TraceStoreError>;
