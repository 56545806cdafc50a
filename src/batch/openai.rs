//! OpenAI Files + Batches API implementation of [`BatchProvider`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, error, info};

use super::error::{BatchError, BatchResult};
use super::jsonl::encode_jsonl;
use super::provider::BatchProvider;
use super::types::{
    BatchConfig, BatchCreated, BatchRequest, BatchStatus, BatchStatusSnapshot, RequestCounts,
};
use crate::constants::{BATCH_FILE_PURPOSE, BATCH_INPUT_FILENAME};

/// Default OpenAI API base URL.
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Clone)]
pub struct OpenAiBatchProvider {
    http: HttpClient,
    base_url: String,
    api_key: String,
}

impl std::fmt::Debug for OpenAiBatchProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiBatchProvider")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct FileObject {
    id: String,
}

#[derive(Debug, Deserialize)]
/// Subset of the OpenAI batch object used here.
pub(crate) struct BatchObject {
    pub id: String,
    pub status: BatchStatus,
    #[serde(default)]
    pub output_file_id: Option<String>,
    #[serde(default)]
    pub error_file_id: Option<String>,
    #[serde(default)]
    pub request_counts: Option<RequestCounts>,
}

impl From<BatchObject> for BatchStatusSnapshot {
    fn from(batch: BatchObject) -> Self {
        BatchStatusSnapshot::new(
            batch.id,
            batch.status,
            batch.output_file_id,
            batch.error_file_id,
            batch.request_counts.unwrap_or_default(),
        )
    }
}

impl OpenAiBatchProvider {
    /// Creates a provider for `base_url` (e.g. `https://api.openai.com/v1`).
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Self {
        Self {
            http: HttpClient::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| HttpClient::new()),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    /// Returns the configured base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn send(
        &self,
        operation: &'static str,
        request: reqwest::RequestBuilder,
    ) -> BatchResult<reqwest::Response> {
        let resp = request
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| BatchError::Transport {
                operation,
                message: e.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            error!(operation, status = status.as_u16(), "OpenAI request rejected");
            return Err(BatchError::Provider {
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
    ) -> BatchResult<T> {
        let resp = self.send(operation, request).await?;
        let text = resp.text().await.map_err(|e| BatchError::Transport {
            operation,
            message: e.to_string(),
        })?;

        serde_json::from_str(&text).map_err(|e| BatchError::InvalidResponse {
            operation,
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl BatchProvider for OpenAiBatchProvider {
    async fn upload_file(&self, content: &str, purpose: &str) -> BatchResult<String> {
        let part = Part::bytes(content.as_bytes().to_vec())
            .file_name(BATCH_INPUT_FILENAME)
            .mime_str("application/jsonl")
            .map_err(|e| BatchError::Transport {
                operation: "upload_file",
                message: e.to_string(),
            })?;
        let form = Form::new()
            .text("purpose", purpose.to_string())
            .part("file", part);

        let file: FileObject = self
            .send_json(
                "upload_file",
                self.http.post(self.url("files")).multipart(form),
            )
            .await?;

        debug!(file_id = %file.id, bytes = content.len(), purpose, "Uploaded file");
        Ok(file.id)
    }

    async fn download_file(&self, file_id: &str) -> BatchResult<String> {
        let resp = self
            .send(
                "download_file",
                self.http.get(self.url(&format!("files/{file_id}/content"))),
            )
            .await?;

        let bytes = resp.bytes().await.map_err(|e| BatchError::Transport {
            operation: "download_file",
            message: e.to_string(),
        })?;

        String::from_utf8(bytes.to_vec()).map_err(|e| BatchError::InvalidResponse {
            operation: "download_file",
            message: e.to_string(),
        })
    }

    async fn create_batch(
        &self,
        requests: &[BatchRequest],
        config: &BatchConfig,
    ) -> BatchResult<BatchCreated> {
        let content = encode_jsonl(requests)?;
        let file_id = self.upload_file(&content, BATCH_FILE_PURPOSE).await?;

        let body = json!({
            "input_file_id": file_id,
            "endpoint": config.endpoint,
            "completion_window": config.completion_window,
            "metadata": { "description": config.description },
        });

        let batch: BatchObject = self
            .send_json(
                "create_batch",
                self.http.post(self.url("batches")).json(&body),
            )
            .await?;

        info!(
            batch_id = %batch.id,
            file_id = %file_id,
            endpoint = %config.endpoint,
            total_items = requests.len(),
            "Created batch job"
        );

        Ok(BatchCreated {
            provider_batch_id: batch.id,
            provider_file_id: file_id,
            provider_status: batch.status,
            total_items: requests.len(),
        })
    }

    async fn get_batch_status(&self, batch_id: &str) -> BatchResult<BatchStatusSnapshot> {
        let batch: BatchObject = self
            .send_json(
                "get_batch_status",
                self.http.get(self.url(&format!("batches/{batch_id}"))),
            )
            .await?;

        debug!(batch_id, status = %batch.status, "Fetched batch status");
        Ok(batch.into())
    }
}
