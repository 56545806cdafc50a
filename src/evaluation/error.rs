use thiserror::Error;

use super::types::RunStatus;
use crate::batch::BatchError;
use crate::tracestore::TraceStoreError;

#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error(transparent)]
    Batch(#[from] BatchError),

    #[error(transparent)]
    TraceStore(#[from] TraceStoreError),

    #[error("evaluation run '{run_id}' not found")]
    RunNotFound { run_id: String },

    #[error("evaluation run '{run_id}' is {status}, expected {expected}")]
    InvalidState {
        run_id: String,
        status: RunStatus,
        expected: RunStatus,
    },

    #[error("dataset '{dataset_name}' has no items")]
    EmptyDataset { dataset_name: String },

    #[error("batch {batch_id} completed without an output file")]
    MissingOutput { batch_id: String },

    #[error("no embeddable outputs for run '{run_name}'")]
    NothingToEmbed { run_name: String },

    #[error("run storage failed: {0}")]
    Storage(String),
}

pub type EvaluationResult<T> = Result<T, EvaluationError>;
