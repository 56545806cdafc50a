//! Langfuse public REST API implementation of [`TraceBackend`].
//!
//! Dataset calls go straight to the API. Traces, generations and scores are
//! buffered as ingestion events together with the dataset run links that
//! reference them, and sent on [`TraceBackend::flush`].

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use parking_lot::Mutex;
use reqwest::{Client as HttpClient, StatusCode, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::backend::TraceBackend;
use super::error::{TraceStoreError, TraceStoreResult};
use super::types::{
    FlushReport, RunTrace, ScoreDataType, ScoreValue, StoredDatasetItem, StoredTrace, TraceScore,
};
use crate::constants::DATASET_ITEMS_PAGE_LIMIT;

/// Langfuse-backed [`TraceBackend`].
///
/// All writes share one buffer, so a flush sends whatever any caller has
/// recorded since the previous flush. Concurrent write operations on the same
/// backend therefore flush each other's events; the [`FlushReport`] still
/// names every rejected trace, so each caller can filter its own. The buffer
/// is drained before sending: when the ingestion request fails outright, its
/// events are dropped and the error is returned.
pub struct LangfuseBackend {
    http: HttpClient,
    host: String,
    public_key: String,
    secret_key: String,
    pending: Mutex<PendingWrites>,
}

impl std::fmt::Debug for LangfuseBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LangfuseBackend")
            .field("host", &self.host)
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
struct PendingWrites {
    events: Vec<Value>,
    /// Ingestion event id -> trace the event writes to.
    event_traces: HashMap<String, String>,
    run_items: Vec<PendingRunItem>,
}

struct PendingRunItem {
    trace_id: String,
    body: Value,
}

#[derive(Deserialize)]
struct DatasetObject {
    id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DatasetItemObject {
    id: String,
    #[serde(default)]
    input: Value,
    #[serde(default)]
    expected_output: Value,
    #[serde(default)]
    metadata: Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageMeta {
    page: u32,
    total_pages: u32,
}

#[derive(Deserialize)]
struct DatasetItemsPage {
    data: Vec<DatasetItemObject>,
    meta: PageMeta,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DatasetRunObject {
    #[serde(default)]
    dataset_run_items: Vec<DatasetRunItemObject>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DatasetRunItemObject {
    trace_id: String,
}

#[derive(Deserialize)]
struct TraceObject {
    id: String,
    #[serde(default)]
    input: Value,
    #[serde(default)]
    output: Value,
    #[serde(default)]
    metadata: Value,
    #[serde(default)]
    scores: Vec<ScoreObject>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScoreObject {
    name: String,
    #[serde(default)]
    value: Value,
    #[serde(default)]
    string_value: Option<String>,
    data_type: ScoreDataType,
    #[serde(default)]
    comment: Option<String>,
}

impl ScoreObject {
    fn into_trace_score(self) -> Option<TraceScore> {
        let value = match (self.data_type, self.string_value) {
            (ScoreDataType::Categorical, Some(label)) => ScoreValue::Categorical(label),
            (data_type, _) => ScoreValue::from_json(data_type, &self.value)?,
        };
        Some(TraceScore {
            name: self.name,
            value,
            comment: self.comment,
        })
    }
}

#[derive(Deserialize)]
struct IngestionResponse {
    #[serde(default)]
    errors: Vec<IngestionError>,
}

#[derive(Deserialize)]
struct IngestionError {
    id: String,
    status: u16,
    #[serde(default)]
    message: Option<String>,
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn ingestion_event(kind: &str, body: Value) -> Value {
    json!({
        "id": Uuid::new_v4().to_string(),
        "type": kind,
        "timestamp": now_rfc3339(),
        "body": body,
    })
}

/// `trace-create` event for `trace`, followed by its `generation-create` event
/// when the trace carries a generation span.
fn run_trace_events(trace_id: &str, trace: &RunTrace, timestamp: &str) -> Vec<Value> {
    let mut events = vec![ingestion_event(
        "trace-create",
        json!({
            "id": trace_id,
            "name": trace.run_name,
            "timestamp": timestamp,
            "input": trace.input,
            "output": trace.output,
            "metadata": trace.metadata,
        }),
    )];

    if let Some(generation) = &trace.generation {
        events.push(ingestion_event(
            "generation-create",
            json!({
                "id": Uuid::new_v4().to_string(),
                "traceId": trace_id,
                "name": generation.name,
                "model": generation.model,
                "startTime": timestamp,
                "endTime": timestamp,
                "input": trace.input,
                "output": trace.output,
                "metadata": trace.metadata,
                "usage": {
                    "input": generation.usage.input_tokens,
                    "output": generation.usage.output_tokens,
                    "total": generation.usage.total_tokens,
                    "unit": "TOKENS",
                },
            }),
        ));
    }

    events
}

fn score_event(trace_id: &str, score: &TraceScore) -> Value {
    let value = match &score.value {
        ScoreValue::Numeric(v) | ScoreValue::Boolean(v) => json!(v),
        ScoreValue::Categorical(label) => json!(label),
    };

    ingestion_event(
        "score-create",
        json!({
            "id": Uuid::new_v4().to_string(),
            "traceId": trace_id,
            "name": score.name,
            "value": value,
            "dataType": score.data_type(),
            "comment": score.comment,
        }),
    )
}

fn event_id(event: &Value) -> Option<String> {
    event.get("id").and_then(Value::as_str).map(str::to_string)
}

impl LangfuseBackend {
    /// Creates a backend for `host` (e.g. `https://cloud.langfuse.com`).
    pub fn new(host: &str, public_key: &str, secret_key: &str, timeout: Duration) -> Self {
        Self {
            http: HttpClient::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| HttpClient::new()),
            host: host.trim_end_matches('/').to_string(),
            public_key: public_key.to_string(),
            secret_key: secret_key.to_string(),
            pending: Mutex::new(PendingWrites::default()),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Number of buffered writes not yet flushed.
    pub fn pending_writes(&self) -> usize {
        let pending = self.pending.lock();
        pending.events.len() + pending.run_items.len()
    }

    #[cfg(test)]
    fn pending_events(&self) -> Vec<Value> {
        self.pending.lock().events.clone()
    }

    /// Builds `{host}/api/public/{segments...}`, percent-encoding each segment.
    fn url(&self, segments: &[&str]) -> TraceStoreResult<Url> {
        let mut url = Url::parse(&self.host).map_err(|e| {
            TraceStoreError::InvalidArgument(format!("invalid Langfuse host '{}': {e}", self.host))
        })?;
        url.path_segments_mut()
            .map_err(|_| {
                TraceStoreError::InvalidArgument(format!(
                    "Langfuse host '{}' cannot be a base URL",
                    self.host
                ))
            })?
            .pop_if_empty()
            .extend(["api", "public"])
            .extend(segments);
        Ok(url)
    }

    async fn send(
        &self,
        operation: &'static str,
        request: reqwest::RequestBuilder,
    ) -> TraceStoreResult<reqwest::Response> {
        let resp = request
            .basic_auth(&self.public_key, Some(&self.secret_key))
            .send()
            .await
            .map_err(|e| TraceStoreError::Transport {
                operation,
                message: e.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            if status != StatusCode::NOT_FOUND {
                error!(operation, status = status.as_u16(), "Langfuse request rejected");
            }
            return Err(TraceStoreError::Backend {
                operation,
                status: status.as_u16(),
                message,
            });
        }

        Ok(resp)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        request: reqwest::RequestBuilder,
    ) -> TraceStoreResult<T> {
        let resp = self.send(operation, request).await?;
        let text = resp.text().await.map_err(|e| TraceStoreError::Transport {
            operation,
            message: e.to_string(),
        })?;

        serde_json::from_str(&text).map_err(|e| TraceStoreError::InvalidResponse {
            operation,
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl TraceBackend for LangfuseBackend {
    async fn create_dataset(&self, name: &str) -> TraceStoreResult<String> {
        let dataset: DatasetObject = self
            .send_json(
                "create_dataset",
                self.http
                    .post(self.url(&["v2", "datasets"])?)
                    .json(&json!({ "name": name })),
            )
            .await?;

        info!(dataset_name = name, dataset_id = %dataset.id, "Created Langfuse dataset");
        Ok(dataset.id)
    }

    async fn create_dataset_item(
        &self,
        dataset_name: &str,
        input: Value,
        expected_output: Value,
        metadata: Value,
    ) -> TraceStoreResult<String> {
        let body = json!({
            "datasetName": dataset_name,
            "input": input,
            "expectedOutput": expected_output,
            "metadata": metadata,
        });

        let item: DatasetItemObject = self
            .send_json(
                "create_dataset_item",
                self.http.post(self.url(&["dataset-items"])?).json(&body),
            )
            .await?;

        Ok(item.id)
    }

    async fn list_dataset_items(
        &self,
        dataset_name: &str,
    ) -> TraceStoreResult<Vec<StoredDatasetItem>> {
        let mut items = Vec::new();
        let mut page = 1u32;

        loop {
            let resp: DatasetItemsPage = self
                .send_json(
                    "list_dataset_items",
                    self.http.get(self.url(&["dataset-items"])?).query(&[
                        ("datasetName", dataset_name.to_string()),
                        ("page", page.to_string()),
                        ("limit", DATASET_ITEMS_PAGE_LIMIT.to_string()),
                    ]),
                )
                .await?;

            let fetched = resp.data.len();
            items.extend(resp.data.into_iter().map(|item| StoredDatasetItem {
                id: item.id,
                input: item.input,
                expected_output: item.expected_output,
                metadata: item.metadata,
            }));

            if fetched == 0 || resp.meta.page >= resp.meta.total_pages {
                break;
            }
            page += 1;
        }

        debug!(dataset_name, items = items.len(), "Listed dataset items");
        Ok(items)
    }

    async fn record_run_trace(&self, trace: RunTrace) -> TraceStoreResult<String> {
        let trace_id = Uuid::new_v4().to_string();
        let events = run_trace_events(&trace_id, &trace, &now_rfc3339());

        let mut pending = self.pending.lock();
        // Only the trace-create event decides whether the trace exists.
        if let Some(id) = events.first().and_then(event_id) {
            pending.event_traces.insert(id, trace_id.clone());
        }
        pending.events.extend(events);
        pending.run_items.push(PendingRunItem {
            trace_id: trace_id.clone(),
            body: json!({
                "runName": trace.run_name,
                "datasetItemId": trace.dataset_item_id,
                "traceId": trace_id,
            }),
        });

        Ok(trace_id)
    }

    async fn record_score(&self, trace_id: &str, score: TraceScore) -> TraceStoreResult<()> {
        let event = score_event(trace_id, &score);

        let mut pending = self.pending.lock();
        if let Some(id) = event_id(&event) {
            pending.event_traces.insert(id, trace_id.to_string());
        }
        pending.events.push(event);
        Ok(())
    }

    async fn flush(&self) -> TraceStoreResult<FlushReport> {
        let PendingWrites {
            events,
            event_traces,
            run_items,
        } = std::mem::take(&mut *self.pending.lock());
        let mut report = FlushReport::default();

        if !events.is_empty() {
            let sent = events.len();
            let resp: IngestionResponse = self
                .send_json(
                    "ingestion",
                    self.http
                        .post(self.url(&["ingestion"])?)
                        .json(&json!({ "batch": events })),
                )
                .await
                .inspect_err(|e| {
                    error!(events = sent, error = %e, "Ingestion failed, buffered events dropped");
                })?;

            for e in &resp.errors {
                let trace_id = event_traces.get(&e.id);
                warn!(
                    event_id = %e.id,
                    trace_id = trace_id.map(String::as_str).unwrap_or(""),
                    status = e.status,
                    message = e.message.as_deref().unwrap_or(""),
                    "Langfuse rejected ingestion event"
                );
                if let Some(trace_id) = trace_id {
                    report.rejected_traces.insert(trace_id.clone());
                }
            }
            debug!(events = sent, rejected = resp.errors.len(), "Flushed ingestion events");
        }

        let mut linked = 0usize;
        for run_item in &run_items {
            if report.is_rejected(&run_item.trace_id) {
                continue;
            }

            let request = self
                .http
                .post(self.url(&["dataset-run-items"])?)
                .json(&run_item.body);
            match self.send("create_dataset_run_item", request).await {
                Ok(_) => linked += 1,
                Err(e @ TraceStoreError::Backend { .. }) => {
                    warn!(trace_id = %run_item.trace_id, error = %e, "Failed to link trace to dataset run");
                    report.rejected_traces.insert(run_item.trace_id.clone());
                }
                Err(e) => return Err(e),
            }
        }
        if !run_items.is_empty() {
            debug!(run_items = run_items.len(), linked, "Linked traces to dataset runs");
        }

        Ok(report)
    }

    async fn run_trace_ids(
        &self,
        dataset_name: &str,
        run_name: &str,
    ) -> TraceStoreResult<Vec<String>> {
        let run: TraceStoreResult<DatasetRunObject> = self
            .send_json(
                "get_dataset_run",
                self.http
                    .get(self.url(&["datasets", dataset_name, "runs", run_name])?),
            )
            .await;

        match run {
            Ok(run) => Ok(run
                .dataset_run_items
                .into_iter()
                .map(|item| item.trace_id)
                .collect()),
            Err(e) => {
                warn!(dataset_name, run_name, error = %e, "Could not resolve dataset run");
                Err(TraceStoreError::RunNotFound {
                    dataset_name: dataset_name.to_string(),
                    run_name: run_name.to_string(),
                })
            }
        }
    }

    async fn get_trace(&self, trace_id: &str) -> TraceStoreResult<StoredTrace> {
        let trace: TraceObject = self
            .send_json("get_trace", self.http.get(self.url(&["traces", trace_id])?))
            .await?;

        let scores = trace
            .scores
            .into_iter()
            .filter_map(|score| {
                let name = score.name.clone();
                let parsed = score.into_trace_score();
                if parsed.is_none() {
                    debug!(trace_id, score = %name, "Skipping score with unusable value");
                }
                parsed
            })
            .collect();

        Ok(StoredTrace {
            id: trace.id,
            input: trace.input,
            output: trace.output,
            metadata: trace.metadata,
            scores,
        })
    }
}

#[cfg(test)]
mod tests;
