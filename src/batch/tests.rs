use serde_json::json;

use super::error::BatchError;
use super::jsonl::{encode_jsonl, parse_result_lines};
use super::mock::MockBatchProvider;
use super::openai::BatchObject;
use super::provider::BatchProvider;
use super::types::{
    BatchConfig, BatchOutcome, BatchRequest, BatchResultLine, BatchStatus, BatchStatusSnapshot,
    RequestCounts,
};

fn create_test_requests(n: usize) -> Vec<BatchRequest> {
    (1..=n)
        .map(|i| {
            BatchRequest::post(
                format!("req-{i}"),
                "/v1/responses",
                json!({ "model": "gpt-4o", "input": format!("question {i}") }),
            )
        })
        .collect()
}

#[test]
fn test_batch_config_defaults() {
    let config = BatchConfig::default();

    assert_eq!(config.endpoint, "/v1/responses");
    assert_eq!(config.completion_window, "24h");
    assert_eq!(config.description, "LLM batch job");
}

#[test]
fn test_encode_jsonl_one_object_per_line() {
    let requests = create_test_requests(2);

    let content = encode_jsonl(&requests).unwrap();
    let lines: Vec<&str> = content.split('\n').collect();

    assert_eq!(lines.len(), 2);
    let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(first["custom_id"], "req-1");
    assert_eq!(first["method"], "POST");
    assert_eq!(first["url"], "/v1/responses");
    let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
    assert_eq!(second["custom_id"], "req-2");
}

#[test]
fn test_parse_result_lines_drops_malformed_line() {
    let content = "{\"custom_id\":\"r1\",\"response\":{\"status_code\":200,\"body\":{}}}\n\
                   NOT JSON\n\
                   {\"custom_id\":\"r3\",\"response\":{\"status_code\":200,\"body\":{}}}";

    let results = parse_result_lines(content);

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].custom_id, "r1");
    assert_eq!(results[1].custom_id, "r3");
}

#[test]
fn test_parse_result_lines_empty_content() {
    assert!(parse_result_lines("").is_empty());
    assert!(parse_result_lines("\n\n").is_empty());
}

#[test]
fn test_parse_result_lines_with_errors() {
    let content = "{\"custom_id\":\"req-1\",\"response\":{\"status_code\":200,\"body\":{\"result\":\"success\"}}}\n\
                   {\"custom_id\":\"req-2\",\"error\":{\"message\":\"Invalid request\",\"code\":\"400\"}}";

    let results = parse_result_lines(content);

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].body().unwrap()["result"], "success");
    assert_eq!(
        results[1].outcome,
        BatchOutcome::Error {
            message: "Invalid request".to_string(),
            code: Some("400".to_string()),
        }
    );
}

#[test]
fn test_parse_result_line_without_body() {
    let results = parse_result_lines("{\"custom_id\":\"req-1\",\"response\":{\"status_code\":200}}");

    assert_eq!(results.len(), 1);
    assert_eq!(
        results[0].outcome,
        BatchOutcome::Response {
            status_code: 200,
            body: serde_json::Value::Null,
        }
    );
}

#[test]
fn test_parse_result_line_with_null_error_field() {
    let content = r#"{"id":"batch_req_1","custom_id":"req-1","response":{"status_code":200,"request_id":"x","body":{"ok":true}},"error":null}"#;

    let results = parse_result_lines(content);

    assert_eq!(results.len(), 1);
    assert!(!results[0].is_error());
}

#[test]
fn test_parse_result_line_missing_outcome_is_dropped() {
    let results = parse_result_lines("{\"custom_id\":\"req-1\"}");
    assert!(results.is_empty());
}

#[test]
fn test_snapshot_completed_has_no_error_message() {
    let snapshot = BatchStatusSnapshot::new(
        "batch-1",
        BatchStatus::Completed,
        Some("output-file-123".to_string()),
        None,
        RequestCounts {
            total: 100,
            completed: 100,
            failed: 0,
        },
    );

    assert_eq!(snapshot.output_file_id.as_deref(), Some("output-file-123"));
    assert!(snapshot.error_message.is_none());
    assert_eq!(snapshot.request_counts.completed, 100);
}

#[test]
fn test_snapshot_in_progress_has_no_output() {
    let snapshot = BatchStatusSnapshot::new(
        "batch-1",
        BatchStatus::InProgress,
        Some("stray-file".to_string()),
        None,
        RequestCounts::default(),
    );

    assert!(snapshot.output_file_id.is_none());
    assert!(snapshot.error_message.is_none());
}

#[test]
fn test_snapshot_failure_messages() {
    let failed = BatchStatusSnapshot::new(
        "batch-1",
        BatchStatus::Failed,
        None,
        Some("error-file-456".to_string()),
        RequestCounts::default(),
    );
    let message = failed.error_message.unwrap();
    assert!(message.contains("Batch failed"));
    assert!(message.contains("error-file-456"));

    let expired = BatchStatusSnapshot::new(
        "batch-1",
        BatchStatus::Expired,
        None,
        None,
        RequestCounts::default(),
    );
    assert_eq!(expired.error_message.as_deref(), Some("Batch expired"));

    let cancelled = BatchStatusSnapshot::new(
        "batch-1",
        BatchStatus::Cancelled,
        None,
        Some("error-file-789".to_string()),
        RequestCounts::default(),
    );
    let message = cancelled.error_message.unwrap();
    assert!(message.contains("Batch cancelled"));
    assert!(message.contains("error-file-789"));
}

#[test]
fn test_batch_status_terminal_states() {
    assert!(!BatchStatus::Validating.is_terminal());
    assert!(!BatchStatus::InProgress.is_terminal());
    assert!(!BatchStatus::Finalizing.is_terminal());
    assert!(!BatchStatus::Cancelling.is_terminal());
    assert!(BatchStatus::Completed.is_terminal());
    assert!(!BatchStatus::Completed.is_failure());
    assert!(BatchStatus::Failed.is_failure());
    assert!(BatchStatus::Expired.is_failure());
    assert!(BatchStatus::Cancelled.is_failure());
}

#[test]
fn test_openai_batch_object_into_snapshot() {
    let batch: BatchObject = serde_json::from_value(json!({
        "id": "batch_abc123",
        "object": "batch",
        "endpoint": "/v1/embeddings",
        "status": "failed",
        "output_file_id": null,
        "error_file_id": "file-err",
        "request_counts": { "total": 10, "completed": 4, "failed": 6 }
    }))
    .unwrap();

    let snapshot: BatchStatusSnapshot = batch.into();

    assert_eq!(snapshot.provider_batch_id, "batch_abc123");
    assert_eq!(snapshot.provider_status, BatchStatus::Failed);
    assert_eq!(snapshot.request_counts.failed, 6);
    assert!(snapshot.error_message.unwrap().contains("file-err"));
}

#[test]
fn test_openai_batch_object_without_counts() {
    let batch: BatchObject =
        serde_json::from_value(json!({ "id": "batch_1", "status": "validating" })).unwrap();

    let snapshot: BatchStatusSnapshot = batch.into();

    assert_eq!(snapshot.provider_status, BatchStatus::Validating);
    assert_eq!(snapshot.request_counts, RequestCounts::default());
}

#[tokio::test]
async fn test_mock_create_batch_uploads_jsonl() {
    let provider = MockBatchProvider::new();
    let requests = create_test_requests(2);
    let config = BatchConfig::default().with_description("Test batch");

    let created = provider.create_batch(&requests, &config).await.unwrap();

    assert_eq!(created.provider_status, BatchStatus::Validating);
    assert_eq!(created.total_items, 2);
    let uploaded = provider.file_content(&created.provider_file_id).unwrap();
    assert_eq!(uploaded.lines().count(), 2);
    assert_eq!(provider.batch_requests(&created.provider_batch_id), requests);
    assert_eq!(
        provider.batch_config(&created.provider_batch_id).unwrap().description,
        "Test batch"
    );
}

#[tokio::test]
async fn test_mock_create_batch_upload_failure_creates_nothing() {
    let provider = MockBatchProvider::new();
    provider.fail_operation("upload_file");

    let err = provider
        .create_batch(&create_test_requests(1), &BatchConfig::default())
        .await
        .unwrap_err();

    assert!(matches!(err, BatchError::Transport { operation: "upload_file", .. }));
    assert_eq!(provider.batch_count(), 0);
    assert_eq!(provider.call_count("create_batch"), 0);
}

#[tokio::test]
async fn test_mock_create_batch_registration_failure() {
    let provider = MockBatchProvider::new();
    provider.fail_operation("create_batch");

    let err = provider
        .create_batch(&create_test_requests(1), &BatchConfig::default())
        .await
        .unwrap_err();

    assert!(err.to_string().contains("create_batch"));
    assert_eq!(provider.batch_count(), 0);
}

#[tokio::test]
async fn test_mock_status_progression_and_results() {
    let provider = MockBatchProvider::new();
    let created = provider
        .create_batch(&create_test_requests(3), &BatchConfig::default())
        .await
        .unwrap();
    let batch_id = created.provider_batch_id;

    provider.set_status(&batch_id, BatchStatus::InProgress, None);
    let status = provider.get_batch_status(&batch_id).await.unwrap();
    assert_eq!(status.provider_status, BatchStatus::InProgress);
    assert!(status.output_file_id.is_none());

    provider.complete_with(&batch_id, |req| {
        BatchResultLine::response(req.custom_id.clone(), 200, json!({ "echo": req.body["input"] }))
    });

    let status = provider.get_batch_status(&batch_id).await.unwrap();
    assert_eq!(status.provider_status, BatchStatus::Completed);
    let output_file_id = status.output_file_id.unwrap();

    let results = provider.download_batch_results(&output_file_id).await.unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(results[2].custom_id, "req-3");
    assert_eq!(results[2].body().unwrap()["echo"], "question 3");
}

#[tokio::test]
async fn test_download_batch_results_tolerates_garbage_lines() {
    let provider = MockBatchProvider::new();
    let created = provider
        .create_batch(&create_test_requests(1), &BatchConfig::default())
        .await
        .unwrap();
    let output = provider
        .complete_with_raw_output(
            &created.provider_batch_id,
            "{\"custom_id\":\"r1\",\"response\":{\"status_code\":200,\"body\":{}}}\nNOT JSON\n",
        )
        .unwrap();

    let results = provider.download_batch_results(&output).await.unwrap();

    assert_eq!(results.len(), 1);
}

#[tokio::test]
async fn test_download_file_round_trips_unicode() {
    let provider = MockBatchProvider::new();
    let content = "{\"text\":\"Hello 世界 🌍\"}";
    let file_id = provider.upload_file(content, "batch").await.unwrap();

    let downloaded = provider.download_file(&file_id).await.unwrap();

    assert_eq!(downloaded, content);
    assert!(downloaded.contains("世界"));
    assert!(downloaded.contains("🌍"));
}

#[tokio::test]
async fn test_download_unknown_file() {
    let provider = MockBatchProvider::new();

    let err = provider.download_file("missing").await.unwrap_err();

    assert!(matches!(err, BatchError::FileNotFound { .. }));
}

#[tokio::test]
async fn test_status_of_unknown_batch() {
    let provider = MockBatchProvider::new();
    let err = provider.get_batch_status("batch-nope").await.unwrap_err();
    assert!(matches!(err, BatchError::BatchNotFound { .. }));
}
