use serde::{Deserialize, Serialize};

use crate::tracestore::{RunScores, ScoreSummary, TraceRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
/// `pending -> processing -> {completed, failed}`.
pub enum RunStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Processing => "processing",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
/// The persisted score state of a run.
///
/// `traces` is `None` until traces were fetched once; `Some(vec![])` is a
/// cached empty run.
pub struct ScoreBlob {
    #[serde(default)]
    pub summary_scores: Vec<ScoreSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traces: Option<Vec<TraceRecord>>,
}

impl ScoreBlob {
    pub fn has_cached_traces(&self) -> bool {
        self.traces.is_some()
    }

    pub fn summary(&self, name: &str) -> Option<&ScoreSummary> {
        self.summary_scores.iter().find(|s| s.name == name)
    }

    /// Inserts or replaces a summary by name, keeping the position of a replaced one.
    pub fn upsert_summary(&mut self, summary: ScoreSummary) {
        match self.summary_scores.iter_mut().find(|s| s.name == summary.name) {
            Some(existing) => *existing = summary,
            None => self.summary_scores.push(summary),
        }
    }

    /// Combines this blob with a fresh fetch.
    ///
    /// Summaries are keyed by name and fresh ones win; traces are replaced.
    pub fn merged_with(&self, fresh: RunScores) -> ScoreBlob {
        let mut merged = ScoreBlob {
            summary_scores: self.summary_scores.clone(),
            traces: Some(fresh.traces),
        };
        for summary in fresh.summary_scores {
            merged.upsert_summary(summary);
        }
        merged
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Caller-owned record of one evaluation run.
pub struct EvaluationRun {
    pub id: String,
    pub run_name: String,
    pub dataset_name: String,
    pub status: RunStatus,
    /// Model used for the response batch, recorded on generation spans.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub batch_id: Option<String>,
    #[serde(default)]
    pub embedding_batch_id: Option<String>,
    #[serde(default)]
    pub total_items: usize,
    #[serde(default)]
    pub score: Option<ScoreBlob>,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl EvaluationRun {
    pub fn new(
        id: impl Into<String>,
        run_name: impl Into<String>,
        dataset_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            run_name: run_name.into(),
            dataset_name: dataset_name.into(),
            status: RunStatus::Pending,
            model: None,
            batch_id: None,
            embedding_batch_id: None,
            total_items: 0,
            score: None,
            error_message: None,
        }
    }

    pub fn with_status(mut self, status: RunStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_score(mut self, score: ScoreBlob) -> Self {
        self.score = Some(score);
        self
    }

    pub fn mark_failed(&mut self, message: impl Into<String>) {
        self.status = RunStatus::Failed;
        self.error_message = Some(message.into());
    }
}

#[derive(Debug, Clone, PartialEq)]
/// A run as returned by the orchestrator, with a user-facing error if the
/// requested trace info could not be produced.
pub struct ScoresOutcome {
    pub run: EvaluationRun,
    pub error: Option<String>,
}

impl ScoresOutcome {
    pub fn ok(run: EvaluationRun) -> Self {
        Self { run, error: None }
    }

    pub fn with_error(run: EvaluationRun, error: impl Into<String>) -> Self {
        Self {
            run,
            error: Some(error.into()),
        }
    }
}
