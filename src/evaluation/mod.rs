//! Evaluation runs.
//!
//! - [`EvaluationPipeline`] moves a run from `pending` through its response
//!   and embedding batches to `completed` or `failed`, one step per call.
//! - [`EvaluationOrchestrator`] serves a completed run's scores, deciding
//!   whether the persisted [`ScoreBlob`] can be trusted or must be refetched
//!   from the trace store and merged.
//!
//! Run records live in a caller-owned [`RunRepository`].

pub mod error;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod orchestrator;
pub mod pipeline;
pub mod repository;
pub mod types;


pub use error::{EvaluationError, EvaluationResult};
#[cfg(any(test, feature = "mock"))]
pub use mock::InMemoryRunRepository;
pub use orchestrator::EvaluationOrchestrator;
pub use pipeline::{
    EvaluationPipeline, PipelineSettings, build_response_jsonl, parse_response_outputs,
};
pub use repository::RunRepository;
pub use types::{EvaluationRun, RunStatus, ScoreBlob, ScoresOutcome};
