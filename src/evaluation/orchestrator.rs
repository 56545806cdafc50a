use std::sync::Arc;

use tracing::{error, info, warn};

use super::error::EvaluationResult;
use super::repository::RunRepository;
use super::types::{EvaluationRun, RunStatus, ScoreBlob, ScoresOutcome};
use crate::tracestore::{TraceStoreAdapter, TraceStoreError};

/// Decides, on every read, whether a run's persisted scores can be served as
/// they are or must be refetched from the trace store and merged.
///
/// The run's persisted [`ScoreBlob`] is the cache and this type is its only
/// writer. Calls for the same run are not serialized here: two concurrent
/// resyncs both fetch and both write, and the later write wins.
pub struct EvaluationOrchestrator {
    trace_store: Arc<dyn TraceStoreAdapter>,
    runs: Arc<dyn RunRepository>,
}

impl EvaluationOrchestrator {
    pub fn new(trace_store: Arc<dyn TraceStoreAdapter>, runs: Arc<dyn RunRepository>) -> Self {
        Self { trace_store, runs }
    }

    /// Loads a run by id and applies [`get_scores`](Self::get_scores).
    ///
    /// Returns `Ok(None)` when the run does not exist.
    pub async fn get_run_with_scores(
        &self,
        run_id: &str,
        get_trace_info: bool,
        resync: bool,
    ) -> EvaluationResult<Option<ScoresOutcome>> {
        let Some(run) = self.runs.get_run(run_id).await? else {
            warn!(run_id, "Evaluation run not found");
            return Ok(None);
        };

        self.get_scores(run, get_trace_info, resync).await.map(Some)
    }

    /// Returns the run with its scores, refetching traces when needed.
    ///
    /// Trace store failures never touch the persisted blob; they come back as
    /// `ScoresOutcome::error` next to the unchanged run. `Err` is only
    /// returned when persisting a merged blob fails.
    pub async fn get_scores(
        &self,
        run: EvaluationRun,
        get_trace_info: bool,
        resync: bool,
    ) -> EvaluationResult<ScoresOutcome> {
        if run.status != RunStatus::Completed {
            if get_trace_info {
                let message = format!(
                    "Trace info is only available for completed evaluations. Current status: {}",
                    run.status
                );
                return Ok(ScoresOutcome::with_error(run, message));
            }
            return Ok(ScoresOutcome::ok(run));
        }

        if !get_trace_info {
            return Ok(ScoresOutcome::ok(run));
        }

        let cached = run.score.as_ref().is_some_and(ScoreBlob::has_cached_traces);
        if cached && !resync {
            return Ok(ScoresOutcome::ok(run));
        }

        let fresh = match self
            .trace_store
            .fetch_run_scores(&run.dataset_name, &run.run_name)
            .await
        {
            Ok(fresh) => fresh,
            Err(e @ TraceStoreError::RunNotFound { .. }) => {
                warn!(run_id = %run.id, error = %e, "Run not found in trace store");
                return Ok(ScoresOutcome::with_error(run, e.to_string()));
            }
            Err(e) => {
                error!(run_id = %run.id, error = %e, "Failed to fetch trace info");
                let message = format!("Failed to fetch trace info from trace store: {e}");
                return Ok(ScoresOutcome::with_error(run, message));
            }
        };

        let merged = run.score.clone().unwrap_or_default().merged_with(fresh);
        let summaries = merged.summary_scores.len();
        let traces = merged.traces.as_ref().map_or(0, Vec::len);

        let updated = self.runs.save_score(&run.id, merged).await?;

        info!(
            run_id = %updated.id,
            summaries,
            traces,
            resync,
            "Refreshed evaluation scores"
        );

        Ok(ScoresOutcome::ok(updated))
    }
}
