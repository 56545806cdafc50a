use async_trait::async_trait;
use serde_json::Value;

use super::error::TraceStoreResult;
use super::types::{FlushReport, RunTrace, StoredDatasetItem, StoredTrace, TraceScore};

#[async_trait]
/// Low-level trace store operations.
///
/// Writes (`record_run_trace`, `record_score`) may be buffered by the backend;
/// they are only guaranteed durable after [`flush`](TraceBackend::flush)
/// returns `Ok` without listing their trace as rejected.
pub trait TraceBackend: Send + Sync {
    /// Creates (or reuses) a dataset and returns its id.
    async fn create_dataset(&self, name: &str) -> TraceStoreResult<String>;

    async fn create_dataset_item(
        &self,
        dataset_name: &str,
        input: Value,
        expected_output: Value,
        metadata: Value,
    ) -> TraceStoreResult<String>;

    /// All items of a dataset, in store order.
    async fn list_dataset_items(&self, dataset_name: &str)
    -> TraceStoreResult<Vec<StoredDatasetItem>>;

    /// Opens a trace linked to a dataset item under `trace.run_name`.
    ///
    /// Returns the new trace id.
    async fn record_run_trace(&self, trace: RunTrace) -> TraceStoreResult<String>;

    async fn record_score(&self, trace_id: &str, score: TraceScore) -> TraceStoreResult<()>;

    /// Durability barrier for buffered writes.
    ///
    /// Fails only when the store cannot be reached at all. Writes the store
    /// rejected one by one are reported by trace id.
    async fn flush(&self) -> TraceStoreResult<FlushReport>;

    /// Trace ids linked to a run, in run-item order.
    ///
    /// Fails with `RunNotFound` when the run cannot be resolved.
    async fn run_trace_ids(&self, dataset_name: &str, run_name: &str)
    -> TraceStoreResult<Vec<String>>;

    async fn get_trace(&self, trace_id: &str) -> TraceStoreResult<StoredTrace>;
}
