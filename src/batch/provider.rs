use async_trait::async_trait;
use tracing::info;

use super::error::BatchResult;
use super::jsonl::parse_result_lines;
use super::types::{BatchConfig, BatchCreated, BatchRequest, BatchResultLine, BatchStatusSnapshot};

#[async_trait]
/// Bulk inference operations consumed by the evaluation pipeline.
///
/// Implementations are selected by configuration (see [`crate::factory`]) and
/// injected; nothing here polls or retries.
pub trait BatchProvider: Send + Sync {
    /// Uploads `content` and returns the provider file id.
    async fn upload_file(&self, content: &str, purpose: &str) -> BatchResult<String>;

    /// Downloads a file as UTF-8 text.
    async fn download_file(&self, file_id: &str) -> BatchResult<String>;

    /// Uploads `requests` as JSONL and registers a bulk job over them.
    ///
    /// Fails as a whole if either step fails; an uploaded file is not cleaned up.
    async fn create_batch(
        &self,
        requests: &[BatchRequest],
        config: &BatchConfig,
    ) -> BatchResult<BatchCreated>;

    /// Returns the current status of a bulk job.
    async fn get_batch_status(&self, batch_id: &str) -> BatchResult<BatchStatusSnapshot>;

    /// Downloads and decodes a completed job's output file.
    async fn download_batch_results(
        &self,
        output_file_id: &str,
    ) -> BatchResult<Vec<BatchResultLine>> {
        let content = self.download_file(output_file_id).await?;
        let results = parse_result_lines(&content);

        info!(
            output_file_id,
            results = results.len(),
            "Downloaded batch results"
        );

        Ok(results)
    }
}
