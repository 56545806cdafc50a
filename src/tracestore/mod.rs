//! Trace store adapter.
//!
//! [`TraceStoreAdapter`] is the surface the pipeline and the orchestrator use:
//! upload a dataset, open one trace per model output under a named run,
//! attach similarity scores, and read the run's traces back with summaries.
//!
//! [`TraceStore`] implements it over a low-level [`TraceBackend`]
//! ([`LangfuseBackend`] in production). Per-item failures inside the write
//! operations are logged and skipped; each write operation ends with exactly
//! one `flush`, and writes the store rejects at that point count as item
//! failures too.

pub mod adapter;
pub mod backend;
pub mod error;
pub mod langfuse;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod summary;
pub mod types;


pub use adapter::{TraceStore, TraceStoreAdapter};
pub use backend::TraceBackend;
pub use error::{TraceStoreError, TraceStoreResult};
pub use langfuse::LangfuseBackend;
#[cfg(any(test, feature = "mock"))]
pub use mock::MockTraceBackend;
pub use summary::summarize_scores;
pub use types::{
    DatasetItem, DatasetItemInput, FlushReport, GenerationSpan, ReplicaMetadata, RunScores,
    RunTrace, ScoreDataType, ScoreSummary, ScoreValue, StoredDatasetItem, StoredTrace,
    SummaryStats, TraceRecord, TraceScore, UploadedDataset,
};
