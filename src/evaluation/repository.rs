use async_trait::async_trait;

use super::error::EvaluationResult;
use super::types::{EvaluationRun, ScoreBlob};

#[async_trait]
/// Storage for evaluation run records, owned by the caller.
pub trait RunRepository: Send + Sync {
    async fn get_run(&self, run_id: &str) -> EvaluationResult<Option<EvaluationRun>>;

    /// Stores the whole run, replacing any previous version.
    async fn save_run(&self, run: &EvaluationRun) -> EvaluationResult<()>;

    /// Replaces only the score blob of a run and returns the updated run.
    async fn save_score(&self, run_id: &str, score: ScoreBlob) -> EvaluationResult<EvaluationRun>;
}
