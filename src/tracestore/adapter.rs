use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{StreamExt, stream};
use serde_json::{Map, Value, json};
use tracing::{debug, error, info, warn};

use super::backend::TraceBackend;
use super::error::{TraceStoreError, TraceStoreResult};
use super::summary::summarize_scores;
use super::types::{
    DatasetItem, DatasetItemInput, GenerationSpan, ReplicaMetadata, RunScores, RunTrace,
    StoredDatasetItem, StoredTrace, TraceRecord, TraceScore, UploadedDataset,
};
use crate::constants::{
    COSINE_SIMILARITY_COMMENT, COSINE_SIMILARITY_SCORE, DEFAULT_TRACE_FETCH_CONCURRENCY,
    GENERATION_SPAN_NAME,
};
use crate::embedding::ItemSimilarity;
use crate::model::{EvaluationOutput, QuestionId};

#[async_trait]
/// Trace store operations consumed by the evaluation pipeline and orchestrator.
pub trait TraceStoreAdapter: Send + Sync {
    /// Uploads every item `duplication_factor` times.
    ///
    /// Item failures are logged and skipped; they only reduce `total_items`.
    async fn upload_dataset(
        &self,
        items: &[DatasetItemInput],
        dataset_name: &str,
        duplication_factor: u32,
    ) -> TraceStoreResult<UploadedDataset>;

    /// Lists the items of a dataset.
    async fn dataset_items(&self, dataset_name: &str) -> TraceStoreResult<Vec<DatasetItem>>;

    /// Opens one trace per result under `run_name` and returns `item_id -> trace_id`.
    ///
    /// Results with no matching dataset item, or whose trace fails, are left
    /// out of the mapping.
    async fn create_dataset_run(
        &self,
        dataset_name: &str,
        run_name: &str,
        results: &[EvaluationOutput],
        model: Option<&str>,
    ) -> TraceStoreResult<HashMap<String, String>>;

    /// Attaches a `cosine_similarity` score to each trace.
    async fn attach_scores(&self, per_item_scores: &[ItemSimilarity]) -> TraceStoreResult<()>;

    /// Fetches the traces of a run and summarizes their scores.
    async fn fetch_run_scores(
        &self,
        dataset_name: &str,
        run_name: &str,
    ) -> TraceStoreResult<RunScores>;
}

/// [`TraceStoreAdapter`] over any [`TraceBackend`].
pub struct TraceStore<B> {
    backend: Arc<B>,
    fetch_concurrency: usize,
}

impl<B: TraceBackend> TraceStore<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            fetch_concurrency: DEFAULT_TRACE_FETCH_CONCURRENCY,
        }
    }

    /// Sets how many traces are fetched at once (minimum 1).
    pub fn with_fetch_concurrency(mut self, concurrency: usize) -> Self {
        self.fetch_concurrency = concurrency.max(1);
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}

#[async_trait]
impl<B: TraceBackend + 'static> TraceStoreAdapter for TraceStore<B> {
    async fn upload_dataset(
        &self,
        items: &[DatasetItemInput],
        dataset_name: &str,
        duplication_factor: u32,
    ) -> TraceStoreResult<UploadedDataset> {
        if duplication_factor == 0 {
            return Err(TraceStoreError::InvalidArgument(
                "duplication_factor must be at least 1".to_string(),
            ));
        }

        let dataset_id = self.backend.create_dataset(dataset_name).await?;

        let mut total_items = 0usize;
        for (index, item) in items.iter().enumerate() {
            let question_id = index as i64 + 1;

            for duplicate_number in 1..=duplication_factor {
                let metadata = ReplicaMetadata {
                    original_question: item.question.clone(),
                    duplication_factor,
                    duplicate_number,
                    question_id,
                };

                let created = self
                    .backend
                    .create_dataset_item(
                        dataset_name,
                        json!({ "question": item.question }),
                        json!({ "answer": item.answer }),
                        serde_json::to_value(&metadata)?,
                    )
                    .await;

                match created {
                    Ok(item_id) => {
                        debug!(item_id = %item_id, question_id, duplicate_number, "Created dataset item");
                        total_items += 1;
                    }
                    Err(e) => {
                        error!(
                            dataset_name,
                            question_id,
                            duplicate_number,
                            error = %e,
                            "Failed to create dataset item"
                        );
                    }
                }
            }
        }

        let report = self.backend.flush().await?;
        if !report.is_clean() {
            warn!(
                dataset_name,
                rejected = report.rejected_traces.len(),
                "Trace store rejected buffered writes during upload"
            );
        }

        info!(
            dataset_name,
            dataset_id = %dataset_id,
            total_items,
            duplication_factor,
            "Uploaded dataset"
        );

        Ok(UploadedDataset {
            dataset_id,
            total_items,
        })
    }

    async fn dataset_items(&self, dataset_name: &str) -> TraceStoreResult<Vec<DatasetItem>> {
        let items = self.backend.list_dataset_items(dataset_name).await?;
        Ok(items.into_iter().map(dataset_item_from_stored).collect())
    }

    async fn create_dataset_run(
        &self,
        dataset_name: &str,
        run_name: &str,
        results: &[EvaluationOutput],
        model: Option<&str>,
    ) -> TraceStoreResult<HashMap<String, String>> {
        let items = self.dataset_items(dataset_name).await?;
        let items_by_id: HashMap<&str, &DatasetItem> =
            items.iter().map(|item| (item.id.as_str(), item)).collect();

        let mut trace_ids = HashMap::with_capacity(results.len());
        for result in results {
            let Some(item) = items_by_id.get(result.item_id.as_str()) else {
                warn!(item_id = %result.item_id, run_name, "No dataset item for result, skipping");
                continue;
            };

            let mut metadata = Map::new();
            metadata.insert("ground_truth".into(), json!(result.ground_truth));
            metadata.insert("response_id".into(), json!(result.response_id));
            if let Some(question_id) = result.question_id.as_ref().or(item.question_id.as_ref()) {
                metadata.insert("question_id".into(), json!(question_id));
            }

            let generation = match (model, result.usage) {
                (Some(model), Some(usage)) => Some(GenerationSpan {
                    name: GENERATION_SPAN_NAME.to_string(),
                    model: model.to_string(),
                    usage,
                }),
                _ => None,
            };

            let trace = RunTrace {
                dataset_item_id: item.id.clone(),
                run_name: run_name.to_string(),
                input: json!({ "question": result.question }),
                output: json!({ "answer": result.generated_output }),
                metadata: Value::Object(metadata),
                generation,
            };

            match self.backend.record_run_trace(trace).await {
                Ok(trace_id) => {
                    trace_ids.insert(result.item_id.clone(), trace_id);
                }
                Err(e) => {
                    error!(item_id = %result.item_id, run_name, error = %e, "Failed to create trace");
                }
            }
        }

        let report = self.backend.flush().await?;
        trace_ids.retain(|item_id, trace_id| {
            let rejected = report.is_rejected(trace_id);
            if rejected {
                error!(item_id = %item_id, trace_id = %trace_id, run_name, "Trace rejected by trace store");
            }
            !rejected
        });

        info!(
            dataset_name,
            run_name,
            traces = trace_ids.len(),
            results = results.len(),
            "Created dataset run"
        );

        Ok(trace_ids)
    }

    async fn attach_scores(&self, per_item_scores: &[ItemSimilarity]) -> TraceStoreResult<()> {
        let mut recorded = Vec::with_capacity(per_item_scores.len());
        for item in per_item_scores {
            if item.trace_id.is_empty() {
                continue;
            }

            let score = TraceScore::numeric(COSINE_SIMILARITY_SCORE, item.cosine_similarity)
                .with_comment(COSINE_SIMILARITY_COMMENT);

            match self.backend.record_score(&item.trace_id, score).await {
                Ok(()) => recorded.push(item.trace_id.as_str()),
                Err(e) => {
                    error!(trace_id = %item.trace_id, error = %e, "Failed to attach score");
                }
            }
        }

        let report = self.backend.flush().await?;
        let mut attached = 0usize;
        for trace_id in recorded {
            if report.is_rejected(trace_id) {
                error!(trace_id = %trace_id, "Score rejected by trace store");
            } else {
                attached += 1;
            }
        }

        info!(attached, total = per_item_scores.len(), "Attached similarity scores");
        Ok(())
    }

    async fn fetch_run_scores(
        &self,
        dataset_name: &str,
        run_name: &str,
    ) -> TraceStoreResult<RunScores> {
        let trace_ids = self.backend.run_trace_ids(dataset_name, run_name).await?;
        let requested = trace_ids.len();

        let fetched: Vec<TraceStoreResult<StoredTrace>> = stream::iter(trace_ids.clone())
            .map(|trace_id| {
                let backend = Arc::clone(&self.backend);
                async move { backend.get_trace(&trace_id).await }
            })
            .buffered(self.fetch_concurrency)
            .collect()
            .await;

        let mut traces: Vec<TraceRecord> = fetched
            .into_iter()
            .zip(trace_ids.iter())
            .filter_map(|(result, trace_id)| match result {
                Ok(trace) => Some(trace_record_from_stored(trace)),
                Err(e) => {
                    warn!(trace_id = %trace_id, error = %e, "Failed to fetch trace, dropping");
                    None
                }
            })
            .collect();

        let summary_scores = summarize_scores(&mut traces);

        info!(
            dataset_name,
            run_name,
            requested,
            traces = traces.len(),
            summaries = summary_scores.len(),
            "Fetched run scores"
        );

        Ok(RunScores {
            traces,
            summary_scores,
        })
    }
}

/// Reads `field` from an object, or the whole value when it is a plain string.
fn text_field(value: &Value, field: &str) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Object(map) => map.get(field).map(value_to_text).unwrap_or_default(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn question_id_from_metadata(metadata: &Value) -> Option<QuestionId> {
    match metadata.get("question_id")? {
        Value::Number(n) => Some(
            n.as_i64()
                .map(QuestionId::Int)
                .unwrap_or_else(|| QuestionId::Number(n.clone())),
        ),
        Value::String(s) => Some(QuestionId::Text(s.clone())),
        _ => None,
    }
}

fn dataset_item_from_stored(item: StoredDatasetItem) -> DatasetItem {
    DatasetItem {
        question: text_field(&item.input, "question"),
        answer: text_field(&item.expected_output, "answer"),
        question_id: question_id_from_metadata(&item.metadata),
        id: item.id,
    }
}

fn trace_record_from_stored(trace: StoredTrace) -> TraceRecord {
    TraceRecord {
        question: text_field(&trace.input, "question"),
        llm_answer: text_field(&trace.output, "answer"),
        ground_truth_answer: trace
            .metadata
            .get("ground_truth")
            .map(value_to_text)
            .unwrap_or_default(),
        question_id: question_id_from_metadata(&trace.metadata).unwrap_or_default(),
        scores: trace.scores,
        trace_id: trace.id,
    }
}
