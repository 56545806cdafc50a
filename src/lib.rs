//! Batch evaluation library crate (used by the CLI and integration tests).
//!
//! # Public API Surface
//!
//! ## Bulk Inference
//! - [`BatchProvider`], [`OpenAiBatchProvider`] - JSONL bulk jobs: upload, create, poll, download
//! - [`BatchRequest`], [`BatchResultLine`], [`BatchStatusSnapshot`] - Wire records
//!
//! ## Embedding Similarity
//! - [`build_embedding_jsonl`], [`parse_embedding_results`] - Embedding batch requests and results
//! - [`calculate_cosine_similarity`], [`calculate_average_similarity`] - Scoring
//!
//! ## Trace Store
//! - [`TraceStoreAdapter`], [`TraceStore`] - Datasets, runs, scores and summaries
//! - [`TraceBackend`], [`LangfuseBackend`] - Low-level store access
//!
//! ## Evaluation Runs
//! - [`EvaluationPipeline`] - Single-step run state machine
//! - [`EvaluationOrchestrator`] - Cached-or-refetched score reads
//! - [`RunRepository`] - Caller-owned run persistence
//!
//! ## Configuration
//! - [`Config`], [`ConfigError`] - `BATCHEVAL_*` environment configuration
//! - [`build_batch_provider`], [`build_trace_store`] - Adapter construction
//!
//! ## Test/Mock Support
//! Mock implementations are available behind `#[cfg(any(test, feature = "mock"))]`.

pub mod batch;
pub mod config;
pub mod constants;
pub mod embedding;
pub mod evaluation;
pub mod factory;
pub mod model;
pub mod tracestore;

pub use batch::{
    BatchConfig, BatchCreated, BatchError, BatchOutcome, BatchProvider, BatchRequest,
    BatchResult, BatchResultLine, BatchStatus, BatchStatusSnapshot, OpenAiBatchProvider,
    RequestCounts,
};
#[cfg(any(test, feature = "mock"))]
pub use batch::MockBatchProvider;

pub use config::{BatchProviderKind, Config, ConfigError, TraceStoreKind};
pub use embedding::{
    EmbeddingPair, ItemSimilarity, SimilarityStats, build_embedding_jsonl,
    calculate_average_similarity, calculate_cosine_similarity, parse_embedding_results,
};
pub use evaluation::{
    EvaluationError, EvaluationOrchestrator, EvaluationPipeline, EvaluationResult, EvaluationRun,
    PipelineSettings, RunRepository, RunStatus, ScoreBlob, ScoresOutcome,
};
#[cfg(any(test, feature = "mock"))]
pub use evaluation::InMemoryRunRepository;
pub use factory::{build_batch_provider, build_trace_store};
pub use model::{EvaluationOutput, QuestionId, TokenUsage};
pub use tracestore::{
    DatasetItem, DatasetItemInput, LangfuseBackend, RunScores, ScoreSummary, TraceBackend,
    TraceRecord, TraceScore, TraceStore, TraceStoreAdapter, TraceStoreError, TraceStoreResult,
    UploadedDataset,
};
#[cfg(any(test, feature = "mock"))]
pub use tracestore::MockTraceBackend;
