use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use super::error::{EvaluationError, EvaluationResult};
use super::repository::RunRepository;
use super::types::{EvaluationRun, RunStatus};
use crate::batch::{BatchConfig, BatchOutcome, BatchProvider, BatchRequest, BatchResultLine, BatchStatus};
use crate::constants::{
    COSINE_SIMILARITY_SCORE, DEFAULT_BATCH_ENDPOINT, DEFAULT_COMPLETION_WINDOW,
    DEFAULT_EMBEDDING_MODEL, EMBEDDINGS_ENDPOINT,
};
use crate::embedding::{build_embedding_jsonl, calculate_average_similarity, parse_embedding_results};
use crate::model::{EvaluationOutput, TokenUsage};
use crate::tracestore::{DatasetItem, ScoreSummary, TraceStoreAdapter};

/// Builds one `/v1/responses` request per dataset item.
///
/// The body is `params` with `input` set to the item's question; `custom_id`
/// is the item id.
pub fn build_response_jsonl(items: &[DatasetItem], params: &Map<String, Value>) -> Vec<BatchRequest> {
    items
        .iter()
        .map(|item| {
            let mut body = params.clone();
            body.insert("input".to_string(), Value::String(item.question.clone()));
            BatchRequest::post(item.id.clone(), DEFAULT_BATCH_ENDPOINT, Value::Object(body))
        })
        .collect()
}

#[derive(Deserialize)]
struct ResponseBody {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    output: Vec<ResponseOutputItem>,
    #[serde(default)]
    usage: Option<TokenUsage>,
}

#[derive(Deserialize)]
struct ResponseOutputItem {
    #[serde(default)]
    content: Vec<ResponseContent>,
}

#[derive(Deserialize)]
struct ResponseContent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

/// Joins response batch results with the dataset items they answer.
///
/// Errored lines, non-2xx responses and ids that match no item are dropped.
pub fn parse_response_outputs(
    raw_results: &[BatchResultLine],
    items: &[DatasetItem],
) -> Vec<EvaluationOutput> {
    let items_by_id: HashMap<&str, &DatasetItem> =
        items.iter().map(|item| (item.id.as_str(), item)).collect();

    let outputs: Vec<EvaluationOutput> = raw_results
        .iter()
        .filter_map(|line| {
            let Some(item) = items_by_id.get(line.custom_id.as_str()) else {
                warn!(custom_id = %line.custom_id, "Result does not match a dataset item");
                return None;
            };

            let body = match &line.outcome {
                BatchOutcome::Response { status_code, body } if *status_code < 300 => body,
                BatchOutcome::Response { status_code, .. } => {
                    warn!(custom_id = %line.custom_id, status_code, "Response request failed");
                    return None;
                }
                BatchOutcome::Error { message, .. } => {
                    warn!(custom_id = %line.custom_id, error = %message, "Response request failed");
                    return None;
                }
            };

            let response: ResponseBody = match serde_json::from_value(body.clone()) {
                Ok(response) => response,
                Err(e) => {
                    warn!(custom_id = %line.custom_id, error = %e, "Unreadable response body");
                    return None;
                }
            };

            let generated_output: String = response
                .output
                .iter()
                .flat_map(|output| output.content.iter())
                .filter(|content| content.kind == "output_text")
                .map(|content| content.text.as_str())
                .collect();

            let mut output =
                EvaluationOutput::new(&item.id, &item.question, generated_output, &item.answer);
            output.response_id = response.id;
            output.usage = response.usage;
            output.question_id = item.question_id.clone();
            Some(output)
        })
        .collect();

    info!(
        outputs = outputs.len(),
        lines = raw_results.len(),
        "Parsed response outputs"
    );

    outputs
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSettings {
    pub embedding_model: String,
    pub completion_window: String,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            completion_window: DEFAULT_COMPLETION_WINDOW.to_string(),
        }
    }
}

/// Drives a run through its response batch and its embedding batch.
///
/// Every call does at most one step and returns; an external scheduler calls
/// [`poll`](Self::poll) again until the run is terminal.
pub struct EvaluationPipeline {
    batches: Arc<dyn BatchProvider>,
    trace_store: Arc<dyn TraceStoreAdapter>,
    runs: Arc<dyn RunRepository>,
    settings: PipelineSettings,
}

impl EvaluationPipeline {
    pub fn new(
        batches: Arc<dyn BatchProvider>,
        trace_store: Arc<dyn TraceStoreAdapter>,
        runs: Arc<dyn RunRepository>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            batches,
            trace_store,
            runs,
            settings,
        }
    }

    /// Submits the response batch for a pending run.
    ///
    /// Stage failures mark the run `failed` and are returned inside the run.
    pub async fn start(
        &self,
        mut run: EvaluationRun,
        params: &Map<String, Value>,
    ) -> EvaluationResult<EvaluationRun> {
        if run.status != RunStatus::Pending {
            return Err(EvaluationError::InvalidState {
                run_id: run.id,
                status: run.status,
                expected: RunStatus::Pending,
            });
        }

        run.model = params.get("model").and_then(Value::as_str).map(str::to_string);

        if let Err(e) = self.submit_responses(&mut run, params).await {
            error!(run_id = %run.id, error = %e, "Failed to start evaluation");
            run.mark_failed(e.to_string());
        }

        self.runs.save_run(&run).await?;
        Ok(run)
    }

    async fn submit_responses(
        &self,
        run: &mut EvaluationRun,
        params: &Map<String, Value>,
    ) -> EvaluationResult<()> {
        let items = self.trace_store.dataset_items(&run.dataset_name).await?;
        if items.is_empty() {
            return Err(EvaluationError::EmptyDataset {
                dataset_name: run.dataset_name.clone(),
            });
        }

        let requests = build_response_jsonl(&items, params);
        let config = BatchConfig::for_endpoint(DEFAULT_BATCH_ENDPOINT)
            .with_description(format!("Evaluation: {}", run.run_name))
            .with_completion_window(&self.settings.completion_window);
        let created = self.batches.create_batch(&requests, &config).await?;

        info!(
            run_id = %run.id,
            batch_id = %created.provider_batch_id,
            total_items = created.total_items,
            "Submitted response batch"
        );

        run.batch_id = Some(created.provider_batch_id);
        run.total_items = created.total_items;
        run.status = RunStatus::Processing;
        Ok(())
    }

    /// Checks the outstanding batch once and advances the run if it finished.
    ///
    /// Runs that are not `processing` are returned unchanged. A failed status
    /// check is returned as an error without touching or saving the run; any
    /// later stage error marks it failed.
    pub async fn poll(&self, mut run: EvaluationRun) -> EvaluationResult<EvaluationRun> {
        if run.status != RunStatus::Processing {
            debug!(run_id = %run.id, status = %run.status, "Run not processing, nothing to poll");
            return Ok(run);
        }

        let (batch_id, embedding_stage) = match (&run.embedding_batch_id, &run.batch_id) {
            (Some(id), _) => (id.clone(), true),
            (None, Some(id)) => (id.clone(), false),
            (None, None) => {
                run.mark_failed("Run has no batch to poll");
                self.runs.save_run(&run).await?;
                return Ok(run);
            }
        };

        let snapshot = self
            .batches
            .get_batch_status(&batch_id)
            .await
            .inspect_err(|e| {
                warn!(run_id = %run.id, batch_id = %batch_id, error = %e, "Batch status check failed");
            })?;

        if snapshot.provider_status.is_failure() {
            let message = snapshot
                .error_message
                .unwrap_or_else(|| format!("Batch {}", snapshot.provider_status));
            warn!(run_id = %run.id, batch_id = %batch_id, error = %message, "Batch did not complete");
            run.mark_failed(message);
            self.runs.save_run(&run).await?;
            return Ok(run);
        }

        if snapshot.provider_status != BatchStatus::Completed {
            debug!(run_id = %run.id, batch_id = %batch_id, status = %snapshot.provider_status, "Batch still running");
            return Ok(run);
        }

        let Some(output_file_id) = snapshot.output_file_id else {
            run.mark_failed(EvaluationError::MissingOutput { batch_id }.to_string());
            self.runs.save_run(&run).await?;
            return Ok(run);
        };

        let step = if embedding_stage {
            self.finish_embeddings(&mut run, &output_file_id).await
        } else {
            self.submit_embeddings(&mut run, &output_file_id).await
        };

        if let Err(e) = step {
            error!(run_id = %run.id, error = %e, "Evaluation stage failed");
            run.mark_failed(e.to_string());
        }

        self.runs.save_run(&run).await?;
        Ok(run)
    }

    async fn submit_embeddings(
        &self,
        run: &mut EvaluationRun,
        output_file_id: &str,
    ) -> EvaluationResult<()> {
        let raw_results = self.batches.download_batch_results(output_file_id).await?;
        let items = self.trace_store.dataset_items(&run.dataset_name).await?;
        let outputs = parse_response_outputs(&raw_results, &items);

        let trace_ids = self
            .trace_store
            .create_dataset_run(&run.dataset_name, &run.run_name, &outputs, run.model.as_deref())
            .await?;

        let requests = build_embedding_jsonl(&outputs, &trace_ids, &self.settings.embedding_model);
        if requests.is_empty() {
            return Err(EvaluationError::NothingToEmbed {
                run_name: run.run_name.clone(),
            });
        }

        let config = BatchConfig::for_endpoint(EMBEDDINGS_ENDPOINT)
            .with_description(format!("Embeddings: {}", run.run_name))
            .with_completion_window(&self.settings.completion_window);
        let created = self.batches.create_batch(&requests, &config).await?;

        info!(
            run_id = %run.id,
            embedding_batch_id = %created.provider_batch_id,
            traces = trace_ids.len(),
            requests = requests.len(),
            "Submitted embedding batch"
        );

        run.embedding_batch_id = Some(created.provider_batch_id);
        Ok(())
    }

    async fn finish_embeddings(
        &self,
        run: &mut EvaluationRun,
        output_file_id: &str,
    ) -> EvaluationResult<()> {
        let raw_results = self.batches.download_batch_results(output_file_id).await?;
        let pairs = parse_embedding_results(&raw_results);
        let stats = calculate_average_similarity(&pairs);

        self.trace_store.attach_scores(&stats.per_item_scores).await?;

        let summary = ScoreSummary::numeric(
            COSINE_SIMILARITY_SCORE,
            stats.cosine_similarity_avg,
            stats.total_pairs,
        )
        .with_std(stats.cosine_similarity_std);

        let mut score = run.score.take().unwrap_or_default();
        score.upsert_summary(summary);
        run.score = Some(score);
        run.status = RunStatus::Completed;
        run.error_message = None;

        info!(
            run_id = %run.id,
            total_pairs = stats.total_pairs,
            avg = stats.cosine_similarity_avg,
            std = stats.cosine_similarity_std,
            "Evaluation completed"
        );

        Ok(())
    }
}
