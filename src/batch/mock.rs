use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::error::{BatchError, BatchResult};
use super::jsonl::{decode_jsonl, encode_jsonl};
use super::provider::BatchProvider;
use super::types::{
    BatchConfig, BatchCreated, BatchRequest, BatchResultLine, BatchStatus, BatchStatusSnapshot,
    RequestCounts,
};
use crate::constants::BATCH_FILE_PURPOSE;

/// In-memory [`BatchProvider`] with manual status control and failure injection.
#[derive(Default)]
pub struct MockBatchProvider {
    state: Mutex<MockState>,
}

#[derive(Default)]
struct MockState {
    next_id: u64,
    files: HashMap<String, String>,
    batches: HashMap<String, MockBatch>,
    failing: HashSet<&'static str>,
    calls: Vec<&'static str>,
}

#[derive(Clone)]
struct MockBatch {
    input_file_id: String,
    config: BatchConfig,
    status: BatchStatus,
    output_file_id: Option<String>,
    error_file_id: Option<String>,
    counts: RequestCounts,
}

impl MockState {
    fn record(&mut self, operation: &'static str) -> BatchResult<()> {
        self.calls.push(operation);
        if self.failing.contains(operation) {
            return Err(BatchError::Transport {
                operation,
                message: format!("injected {operation} failure"),
            });
        }
        Ok(())
    }

    fn store_file(&mut self, content: String) -> String {
        self.next_id += 1;
        let file_id = format!("file-{}", self.next_id);
        self.files.insert(file_id.clone(), content);
        file_id
    }
}

impl MockBatchProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later call to `operation` fail with a transport error.
    pub fn fail_operation(&self, operation: &'static str) {
        self.state.lock().failing.insert(operation);
    }

    /// Clears injected failures.
    pub fn clear_failures(&self) {
        self.state.lock().failing.clear();
    }

    /// Number of calls made to `operation` (including failed ones).
    pub fn call_count(&self, operation: &str) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| **c == operation)
            .count()
    }

    /// Total number of provider calls.
    pub fn total_calls(&self) -> usize {
        self.state.lock().calls.len()
    }

    pub fn batch_count(&self) -> usize {
        self.state.lock().batches.len()
    }

    /// Raw content of an uploaded or generated file.
    pub fn file_content(&self, file_id: &str) -> Option<String> {
        self.state.lock().files.get(file_id).cloned()
    }

    /// Stores `content` as a provider file and returns its id.
    pub fn put_file(&self, content: impl Into<String>) -> String {
        self.state.lock().store_file(content.into())
    }

    /// Config the batch was created with.
    pub fn batch_config(&self, batch_id: &str) -> Option<BatchConfig> {
        self.state
            .lock()
            .batches
            .get(batch_id)
            .map(|b| b.config.clone())
    }

    /// Requests submitted for `batch_id`, decoded from its input file.
    pub fn batch_requests(&self, batch_id: &str) -> Vec<BatchRequest> {
        let state = self.state.lock();
        state
            .batches
            .get(batch_id)
            .and_then(|b| state.files.get(&b.input_file_id))
            .map(|content| decode_jsonl(content))
            .unwrap_or_default()
    }

    /// Sets a non-completed status (use [`complete_with`](Self::complete_with) for completion).
    pub fn set_status(&self, batch_id: &str, status: BatchStatus, error_file_id: Option<&str>) {
        if let Some(batch) = self.state.lock().batches.get_mut(batch_id) {
            batch.status = status;
            batch.error_file_id = error_file_id.map(str::to_string);
        }
    }

    /// Completes `batch_id`, producing one output line per submitted request via `respond`.
    pub fn complete_with<F>(&self, batch_id: &str, respond: F) -> Option<String>
    where
        F: Fn(&BatchRequest) -> BatchResultLine,
    {
        let requests = self.batch_requests(batch_id);
        let lines: Vec<BatchResultLine> = requests.iter().map(respond).collect();
        self.complete_with_lines(batch_id, &lines)
    }

    /// Completes `batch_id` with the given output lines; returns the output file id.
    pub fn complete_with_lines(&self, batch_id: &str, lines: &[BatchResultLine]) -> Option<String> {
        let content = encode_jsonl(lines).ok()?;
        self.complete_with_raw_output(batch_id, content)
    }

    /// Completes `batch_id` with a raw output file body.
    pub fn complete_with_raw_output(
        &self,
        batch_id: &str,
        content: impl Into<String>,
    ) -> Option<String> {
        let mut state = self.state.lock();
        if !state.batches.contains_key(batch_id) {
            return None;
        }
        let content = content.into();
        let completed = content.lines().filter(|l| !l.trim().is_empty()).count() as u64;
        let output_file_id = state.store_file(content);

        let batch = state.batches.get_mut(batch_id)?;
        batch.status = BatchStatus::Completed;
        batch.output_file_id = Some(output_file_id.clone());
        batch.counts.completed = completed;
        Some(output_file_id)
    }
}

#[async_trait]
impl BatchProvider for MockBatchProvider {
    async fn upload_file(&self, content: &str, _purpose: &str) -> BatchResult<String> {
        let mut state = self.state.lock();
        state.record("upload_file")?;
        Ok(state.store_file(content.to_string()))
    }

    async fn download_file(&self, file_id: &str) -> BatchResult<String> {
        let mut state = self.state.lock();
        state.record("download_file")?;
        state
            .files
            .get(file_id)
            .cloned()
            .ok_or_else(|| BatchError::FileNotFound {
                file_id: file_id.to_string(),
            })
    }

    async fn create_batch(
        &self,
        requests: &[BatchRequest],
        config: &BatchConfig,
    ) -> BatchResult<BatchCreated> {
        let content = encode_jsonl(requests)?;
        let file_id = self.upload_file(&content, BATCH_FILE_PURPOSE).await?;

        let mut state = self.state.lock();
        state.record("create_batch")?;
        state.next_id += 1;
        let batch_id = format!("batch-{}", state.next_id);

        state.batches.insert(
            batch_id.clone(),
            MockBatch {
                input_file_id: file_id.clone(),
                config: config.clone(),
                status: BatchStatus::Validating,
                output_file_id: None,
                error_file_id: None,
                counts: RequestCounts {
                    total: requests.len() as u64,
                    ..Default::default()
                },
            },
        );

        Ok(BatchCreated {
            provider_batch_id: batch_id,
            provider_file_id: file_id,
            provider_status: BatchStatus::Validating,
            total_items: requests.len(),
        })
    }

    async fn get_batch_status(&self, batch_id: &str) -> BatchResult<BatchStatusSnapshot> {
        let mut state = self.state.lock();
        state.record("get_batch_status")?;
        let batch = state
            .batches
            .get(batch_id)
            .cloned()
            .ok_or_else(|| BatchError::BatchNotFound {
                batch_id: batch_id.to_string(),
            })?;

        Ok(BatchStatusSnapshot::new(
            batch_id,
            batch.status,
            batch.output_file_id,
            batch.error_file_id,
            batch.counts,
        ))
    }
}
