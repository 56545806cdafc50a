//! Bulk inference gateway.
//!
//! Many independent requests are serialized as JSONL, uploaded as one file and
//! registered as a provider-side bulk job. The job is then polled from outside
//! (via [`BatchProvider::get_batch_status`]) until it reaches a terminal state,
//! after which its output file is downloaded and decoded line by line.
//!
//! # Status lifecycle
//!
//! `validating -> in_progress -> finalizing -> {completed, failed, expired, cancelled}`.
//! Only `completed` carries an output file. The other terminal states carry a
//! synthesized `error_message` and, when the provider wrote one, an `error_file_id`.

pub mod error;
pub mod jsonl;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod openai;
pub mod provider;
pub mod types;

#[cfg(test)]
mod tests;

pub use error::{BatchError, BatchResult};
pub use jsonl::{decode_jsonl, encode_jsonl, parse_result_lines};
#[cfg(any(test, feature = "mock"))]
pub use mock::MockBatchProvider;
pub use openai::{DEFAULT_OPENAI_BASE_URL, OpenAiBatchProvider};
pub use provider::BatchProvider;
pub use types::{
    BatchConfig, BatchCreated, BatchOutcome, BatchRequest, BatchResultLine, BatchStatus,
    BatchStatusSnapshot, RequestCounts,
};
