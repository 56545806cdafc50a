use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::{DEFAULT_BATCH_DESCRIPTION, DEFAULT_BATCH_ENDPOINT, DEFAULT_COMPLETION_WINDOW};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// One line of an uploaded bulk payload.
pub struct BatchRequest {
    /// Caller-chosen id echoed back on the matching result line.
    pub custom_id: String,
    /// HTTP method (always `POST` for the endpoints used here).
    pub method: String,
    /// Provider endpoint, e.g. `/v1/embeddings`.
    pub url: String,
    /// Endpoint request body.
    pub body: Value,
}

impl BatchRequest {
    /// Creates a `POST` request for `url`.
    pub fn post(custom_id: impl Into<String>, url: impl Into<String>, body: Value) -> Self {
        Self {
            custom_id: custom_id.into(),
            method: "POST".to_string(),
            url: url.into(),
            body,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Job-level settings for [`create_batch`](super::BatchProvider::create_batch).
pub struct BatchConfig {
    pub endpoint: String,
    pub description: String,
    pub completion_window: String,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_BATCH_ENDPOINT.to_string(),
            description: DEFAULT_BATCH_DESCRIPTION.to_string(),
            completion_window: DEFAULT_COMPLETION_WINDOW.to_string(),
        }
    }
}

impl BatchConfig {
    /// Default config targeting `endpoint`.
    pub fn for_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_completion_window(mut self, window: impl Into<String>) -> Self {
        self.completion_window = window.into();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Provider-side lifecycle of a bulk job.
pub enum BatchStatus {
    Validating,
    InProgress,
    Finalizing,
    Completed,
    Failed,
    Expired,
    Cancelling,
    Cancelled,
}

impl BatchStatus {
    /// Returns `true` once the provider will no longer change the status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BatchStatus::Completed
                | BatchStatus::Failed
                | BatchStatus::Expired
                | BatchStatus::Cancelled
        )
    }

    /// Returns `true` for terminal states that produced no usable output.
    pub fn is_failure(&self) -> bool {
        self.is_terminal() && *self != BatchStatus::Completed
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Validating => "validating",
            BatchStatus::InProgress => "in_progress",
            BatchStatus::Finalizing => "finalizing",
            BatchStatus::Completed => "completed",
            BatchStatus::Failed => "failed",
            BatchStatus::Expired => "expired",
            BatchStatus::Cancelling => "cancelling",
            BatchStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestCounts {
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub completed: u64,
    #[serde(default)]
    pub failed: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
/// Handle returned after a bulk job was registered.
pub struct BatchCreated {
    pub provider_batch_id: String,
    pub provider_file_id: String,
    pub provider_status: BatchStatus,
    pub total_items: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
/// Point-in-time view of a bulk job.
pub struct BatchStatusSnapshot {
    pub provider_batch_id: String,
    pub provider_status: BatchStatus,
    /// Present only once the job completed.
    pub output_file_id: Option<String>,
    pub error_file_id: Option<String>,
    pub request_counts: RequestCounts,
    /// Synthesized for failed, expired and cancelled jobs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl BatchStatusSnapshot {
    /// Builds a snapshot, synthesizing `error_message` for non-completed terminal states.
    pub fn new(
        provider_batch_id: impl Into<String>,
        provider_status: BatchStatus,
        output_file_id: Option<String>,
        error_file_id: Option<String>,
        request_counts: RequestCounts,
    ) -> Self {
        let error_message = provider_status
            .is_failure()
            .then(|| failure_message(provider_status, error_file_id.as_deref()));

        let output_file_id = if provider_status == BatchStatus::Completed {
            output_file_id
        } else {
            None
        };

        Self {
            provider_batch_id: provider_batch_id.into(),
            provider_status,
            output_file_id,
            error_file_id,
            request_counts,
            error_message,
        }
    }
}

fn failure_message(status: BatchStatus, error_file_id: Option<&str>) -> String {
    match error_file_id {
        Some(file_id) => format!("Batch {status}. Error details are in file {file_id}"),
        None => format!("Batch {status}"),
    }
}

#[derive(Debug, Clone, PartialEq)]
/// Outcome of one request inside a completed bulk job.
pub enum BatchOutcome {
    Response { status_code: u16, body: Value },
    Error { message: String, code: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawResultLine", into = "RawResultLine")]
/// One decoded line of a bulk job's output file.
pub struct BatchResultLine {
    pub custom_id: String,
    pub outcome: BatchOutcome,
}

impl BatchResultLine {
    pub fn response(custom_id: impl Into<String>, status_code: u16, body: Value) -> Self {
        Self {
            custom_id: custom_id.into(),
            outcome: BatchOutcome::Response { status_code, body },
        }
    }

    pub fn error(custom_id: impl Into<String>, message: impl Into<String>, code: Option<&str>) -> Self {
        Self {
            custom_id: custom_id.into(),
            outcome: BatchOutcome::Error {
                message: message.into(),
                code: code.map(str::to_string),
            },
        }
    }

    /// Response body for successful lines.
    pub fn body(&self) -> Option<&Value> {
        match &self.outcome {
            BatchOutcome::Response { body, .. } => Some(body),
            BatchOutcome::Error { .. } => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.outcome, BatchOutcome::Error { .. })
    }
}

#[derive(Serialize, Deserialize)]
struct RawResultLine {
    custom_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    response: Option<RawResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<RawError>,
}

#[derive(Serialize, Deserialize)]
struct RawResponse {
    #[serde(default)]
    status_code: u16,
    #[serde(default)]
    body: Value,
}

#[derive(Serialize, Deserialize)]
struct RawError {
    #[serde(default)]
    message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    code: Option<Value>,
}

impl TryFrom<RawResultLine> for BatchResultLine {
    type Error = String;

    fn try_from(raw: RawResultLine) -> Result<Self, Self::Error> {
        let outcome = match (raw.error, raw.response) {
            (Some(error), _) => BatchOutcome::Error {
                message: error.message,
                code: error.code.and_then(|code| match code {
                    Value::String(s) => Some(s),
                    Value::Null => None,
                    other => Some(other.to_string()),
                }),
            },
            (None, Some(response)) => BatchOutcome::Response {
                status_code: response.status_code,
                body: response.body,
            },
            (None, None) => {
                return Err(format!(
                    "result line '{}' has neither response nor error",
                    raw.custom_id
                ));
            }
        };

        Ok(Self {
            custom_id: raw.custom_id,
            outcome,
        })
    }
}

impl From<BatchResultLine> for RawResultLine {
    fn from(line: BatchResultLine) -> Self {
        match line.outcome {
            BatchOutcome::Response { status_code, body } => RawResultLine {
                custom_id: line.custom_id,
                response: Some(RawResponse { status_code, body }),
                error: None,
            },
            BatchOutcome::Error { message, code } => RawResultLine {
                custom_id: line.custom_id,
                response: None,
                error: Some(RawError {
                    message,
                    code: code.map(Value::String),
                }),
            },
        }
    }
}
