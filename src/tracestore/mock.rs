use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use super::backend::TraceBackend;
use super::error::{TraceStoreError, TraceStoreResult};
use super::types::{FlushReport, RunTrace, StoredDatasetItem, StoredTrace, TraceScore};

/// In-memory [`TraceBackend`] with failure injection.
///
/// Writes are applied immediately. `flush` is counted and reports the writes
/// marked with [`reject_on_flush`](MockTraceBackend::reject_on_flush).
#[derive(Default)]
pub struct MockTraceBackend {
    state: Mutex<MockState>,
}

#[derive(Default)]
struct MockState {
    next_id: u64,
    datasets: HashMap<String, MockDataset>,
    traces: HashMap<String, StoredTrace>,
    run_traces: HashMap<String, RunTrace>,
    runs: HashMap<(String, String), Vec<String>>,
    failing: HashSet<&'static str>,
    failing_questions: HashSet<String>,
    failing_traces: HashSet<String>,
    rejecting_questions: HashSet<String>,
    rejecting_traces: HashSet<String>,
    pending_rejections: HashSet<String>,
    calls: Vec<&'static str>,
}

struct MockDataset {
    id: String,
    items: Vec<StoredDatasetItem>,
}

impl MockState {
    fn record(&mut self, operation: &'static str) -> TraceStoreResult<()> {
        self.calls.push(operation);
        if self.failing.contains(operation) {
            return Err(injected(operation));
        }
        Ok(())
    }

    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }

    fn fails_for(&self, input: &Value) -> bool {
        input
            .get("question")
            .and_then(Value::as_str)
            .is_some_and(|q| self.failing_questions.contains(q))
    }

    fn rejects(&self, input: &Value) -> bool {
        input
            .get("question")
            .and_then(Value::as_str)
            .is_some_and(|q| self.rejecting_questions.contains(q))
    }
}

fn injected(operation: &'static str) -> TraceStoreError {
    TraceStoreError::Transport {
        operation,
        message: format!("injected {operation} failure"),
    }
}

impl MockTraceBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later call to `operation` fail.
    pub fn fail_operation(&self, operation: &'static str) {
        self.state.lock().failing.insert(operation);
    }

    /// Makes item and trace creation fail for inputs with this question.
    pub fn fail_question(&self, question: &str) {
        self.state.lock().failing_questions.insert(question.to_string());
    }

    /// Makes `get_trace` fail for one trace.
    pub fn fail_trace(&self, trace_id: &str) {
        self.state.lock().failing_traces.insert(trace_id.to_string());
    }

    /// Accepts trace writes for this question but rejects them at the next
    /// flush, the way a store rejects single events of a bulk write.
    pub fn reject_on_flush(&self, question: &str) {
        self.state.lock().rejecting_questions.insert(question.to_string());
    }

    /// Accepts score writes for this trace but rejects them at the next flush.
    pub fn reject_scores_on_flush(&self, trace_id: &str) {
        self.state.lock().rejecting_traces.insert(trace_id.to_string());
    }

    pub fn clear_failures(&self) {
        let mut state = self.state.lock();
        state.failing.clear();
        state.failing_questions.clear();
        state.failing_traces.clear();
        state.rejecting_questions.clear();
        state.rejecting_traces.clear();
    }

    /// Number of calls made to `operation` (including failed ones).
    pub fn call_count(&self, operation: &str) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|op| **op == operation)
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.state.lock().calls.len()
    }

    pub fn stored_items(&self, dataset_name: &str) -> Vec<StoredDatasetItem> {
        self.state
            .lock()
            .datasets
            .get(dataset_name)
            .map(|d| d.items.clone())
            .unwrap_or_default()
    }

    pub fn stored_trace(&self, trace_id: &str) -> Option<StoredTrace> {
        self.state.lock().traces.get(trace_id).cloned()
    }

    /// The full trace request recorded for `trace_id`, including its generation span.
    pub fn recorded_run_trace(&self, trace_id: &str) -> Option<RunTrace> {
        self.state.lock().run_traces.get(trace_id).cloned()
    }

    /// Adds a trace to a run directly, bypassing `record_run_trace`.
    pub fn insert_run_trace(&self, dataset_name: &str, run_name: &str, trace: StoredTrace) {
        let mut state = self.state.lock();
        state
            .runs
            .entry((dataset_name.to_string(), run_name.to_string()))
            .or_default()
            .push(trace.id.clone());
        state.traces.insert(trace.id.clone(), trace);
    }

    /// Registers a run with no traces.
    pub fn insert_empty_run(&self, dataset_name: &str, run_name: &str) {
        self.state
            .lock()
            .runs
            .entry((dataset_name.to_string(), run_name.to_string()))
            .or_default();
    }
}

#[async_trait]
impl TraceBackend for MockTraceBackend {
    async fn create_dataset(&self, name: &str) -> TraceStoreResult<String> {
        let mut state = self.state.lock();
        state.record("create_dataset")?;

        if let Some(dataset) = state.datasets.get(name) {
            return Ok(dataset.id.clone());
        }
        let id = state.next_id("dataset");
        state.datasets.insert(
            name.to_string(),
            MockDataset {
                id: id.clone(),
                items: Vec::new(),
            },
        );
        Ok(id)
    }

    async fn create_dataset_item(
        &self,
        dataset_name: &str,
        input: Value,
        expected_output: Value,
        metadata: Value,
    ) -> TraceStoreResult<String> {
        let mut state = self.state.lock();
        state.record("create_dataset_item")?;
        if state.fails_for(&input) {
            return Err(injected("create_dataset_item"));
        }

        let id = state.next_id("item");
        let dataset = state
            .datasets
            .get_mut(dataset_name)
            .ok_or_else(|| TraceStoreError::Backend {
                operation: "create_dataset_item",
                status: 404,
                message: format!("dataset '{dataset_name}' not found"),
            })?;
        dataset.items.push(StoredDatasetItem {
            id: id.clone(),
            input,
            expected_output,
            metadata,
        });
        Ok(id)
    }

    async fn list_dataset_items(
        &self,
        dataset_name: &str,
    ) -> TraceStoreResult<Vec<StoredDatasetItem>> {
        let mut state = self.state.lock();
        state.record("list_dataset_items")?;
        state
            .datasets
            .get(dataset_name)
            .map(|d| d.items.clone())
            .ok_or_else(|| TraceStoreError::Backend {
                operation: "list_dataset_items",
                status: 404,
                message: format!("dataset '{dataset_name}' not found"),
            })
    }

    async fn record_run_trace(&self, trace: RunTrace) -> TraceStoreResult<String> {
        let mut state = self.state.lock();
        state.record("record_run_trace")?;
        if state.fails_for(&trace.input) {
            return Err(injected("record_run_trace"));
        }

        let trace_id = state.next_id("trace");
        if state.rejects(&trace.input) {
            state.pending_rejections.insert(trace_id.clone());
            return Ok(trace_id);
        }

        let dataset_name = state
            .datasets
            .iter()
            .find(|(_, d)| d.items.iter().any(|i| i.id == trace.dataset_item_id))
            .map(|(name, _)| name.clone())
            .unwrap_or_default();

        state
            .runs
            .entry((dataset_name, trace.run_name.clone()))
            .or_default()
            .push(trace_id.clone());
        state.traces.insert(
            trace_id.clone(),
            StoredTrace {
                id: trace_id.clone(),
                input: trace.input.clone(),
                output: trace.output.clone(),
                metadata: trace.metadata.clone(),
                scores: Vec::new(),
            },
        );
        state.run_traces.insert(trace_id.clone(), trace);
        Ok(trace_id)
    }

    async fn record_score(&self, trace_id: &str, score: TraceScore) -> TraceStoreResult<()> {
        let mut state = self.state.lock();
        state.record("record_score")?;
        if state.rejecting_traces.contains(trace_id) {
            state.pending_rejections.insert(trace_id.to_string());
            return Ok(());
        }

        let trace = state
            .traces
            .get_mut(trace_id)
            .ok_or_else(|| TraceStoreError::Backend {
                operation: "record_score",
                status: 404,
                message: format!("trace '{trace_id}' not found"),
            })?;
        trace.scores.push(score);
        Ok(())
    }

    async fn flush(&self) -> TraceStoreResult<FlushReport> {
        let mut state = self.state.lock();
        state.record("flush")?;
        Ok(FlushReport {
            rejected_traces: std::mem::take(&mut state.pending_rejections),
        })
    }

    async fn run_trace_ids(
        &self,
        dataset_name: &str,
        run_name: &str,
    ) -> TraceStoreResult<Vec<String>> {
        let mut state = self.state.lock();
        state.record("run_trace_ids")?;
        state
            .runs
            .get(&(dataset_name.to_string(), run_name.to_string()))
            .cloned()
            .ok_or_else(|| TraceStoreError::RunNotFound {
                dataset_name: dataset_name.to_string(),
                run_name: run_name.to_string(),
            })
    }

    async fn get_trace(&self, trace_id: &str) -> TraceStoreResult<StoredTrace> {
        let mut state = self.state.lock();
        state.record("get_trace")?;
        if state.failing_traces.contains(trace_id) {
            return Err(injected("get_trace"));
        }
        state
            .traces
            .get(trace_id)
            .cloned()
            .ok_or_else(|| TraceStoreError::Backend {
                operation: "get_trace",
                status: 404,
                message: format!("trace '{trace_id}' not found"),
            })
    }
}
