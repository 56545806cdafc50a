use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use super::{LangfuseBackend, ScoreObject};
use crate::embedding::ItemSimilarity;
use crate::model::TokenUsage;
use crate::tracestore::{
    GenerationSpan, RunTrace, ScoreValue, TraceBackend, TraceScore, TraceStore, TraceStoreAdapter,
    TraceStoreError,
};

fn backend(host: &str) -> LangfuseBackend {
    LangfuseBackend::new(host, "pk-test", "sk-test", Duration::from_secs(5))
}

fn run_trace(question: &str, generation: Option<GenerationSpan>) -> RunTrace {
    RunTrace {
        dataset_item_id: format!("item-{question}"),
        run_name: "run_1".to_string(),
        input: json!({ "question": question }),
        output: json!({ "answer": "Paris" }),
        metadata: json!({ "ground_truth": "Paris", "response_id": "resp_1", "question_id": 1 }),
        generation,
    }
}

fn score_object(value: Value) -> ScoreObject {
    serde_json::from_value(value).unwrap()
}

/// Reads one HTTP/1.1 request and returns its target and body.
async fn read_request(socket: &mut TcpStream) -> (String, Vec<u8>) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            return (String::new(), Vec::new());
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let target = head.split_whitespace().nth(1).unwrap_or_default().to_string();
    let content_length = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < header_end + content_length {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    (target, buf[header_end..].to_vec())
}

/// Local stand-in for the Langfuse API.
///
/// Ingestion batches are answered with `207` and an error entry for every
/// event matched by `reject`. Every other request gets `200 {}`. Request
/// targets are recorded in arrival order.
async fn spawn_stub(reject: fn(&Value) -> bool) -> (String, Arc<Mutex<Vec<String>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let host = format!("http://{}", listener.local_addr().unwrap());
    let targets = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&targets);

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let (target, body) = read_request(&mut socket).await;
            seen.lock().push(target.clone());

            let (status, response) = if target.ends_with("/ingestion") {
                let request: Value = serde_json::from_slice(&body).unwrap();
                let errors: Vec<Value> = request["batch"]
                    .as_array()
                    .unwrap()
                    .iter()
                    .filter(|event| reject(event))
                    .map(|event| json!({ "id": event["id"], "status": 400, "message": "invalid" }))
                    .collect();
                let successes: Vec<Value> = request["batch"]
                    .as_array()
                    .unwrap()
                    .iter()
                    .filter(|event| !reject(event))
                    .map(|event| json!({ "id": event["id"], "status": 201 }))
                    .collect();
                (
                    "207 Multi-Status",
                    json!({ "successes": successes, "errors": errors }).to_string(),
                )
            } else {
                ("200 OK", "{}".to_string())
            };

            let reply = format!(
                "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{response}",
                response.len()
            );
            let _ = socket.write_all(reply.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    });

    (host, targets)
}

#[test]
fn test_score_object_categorical_uses_string_value() {
    let score = score_object(json!({
        "name": "verdict",
        "value": 0,
        "stringValue": "correct",
        "dataType": "CATEGORICAL"
    }))
    .into_trace_score()
    .unwrap();

    assert_eq!(score.name, "verdict");
    assert_eq!(score.value, ScoreValue::Categorical("correct".to_string()));
}

#[test]
fn test_score_object_boolean_value() {
    let score = score_object(json!({
        "name": "exact_match",
        "value": 1.0,
        "stringValue": "True",
        "dataType": "BOOLEAN",
        "comment": "matched"
    }))
    .into_trace_score()
    .unwrap();

    assert_eq!(score.value, ScoreValue::Boolean(1.0));
    assert_eq!(score.comment.as_deref(), Some("matched"));
}

#[test]
fn test_score_object_null_value_is_unusable() {
    let numeric = score_object(json!({
        "name": "cosine_similarity",
        "value": null,
        "dataType": "NUMERIC"
    }));
    let categorical = score_object(json!({ "name": "verdict", "dataType": "CATEGORICAL" }));

    assert!(numeric.into_trace_score().is_none());
    assert!(categorical.into_trace_score().is_none());
}

#[test]
fn test_url_percent_encodes_segments() {
    let backend = backend("https://cloud.langfuse.com/");

    let url = backend
        .url(&["datasets", "qa/capitals v2", "runs", "run 1"])
        .unwrap();

    assert_eq!(
        url.as_str(),
        "https://cloud.langfuse.com/api/public/datasets/qa%2Fcapitals%20v2/runs/run%201"
    );
}

#[test]
fn test_url_keeps_host_path_prefix() {
    let backend = backend("https://example.com/langfuse");

    let url = backend.url(&["traces", "t-1"]).unwrap();

    assert_eq!(url.as_str(), "https://example.com/langfuse/api/public/traces/t-1");
}

#[test]
fn test_url_rejects_invalid_host() {
    let err = backend("not a url").url(&["ingestion"]).unwrap_err();

    assert!(matches!(err, TraceStoreError::InvalidArgument(_)));
}

#[tokio::test]
async fn test_record_run_trace_buffers_trace_and_generation_events() {
    let backend = backend("https://cloud.langfuse.com");
    let generation = GenerationSpan {
        name: "evaluation-response".to_string(),
        model: "gpt-4o".to_string(),
        usage: TokenUsage {
            input_tokens: 12,
            output_tokens: 1,
            total_tokens: 13,
        },
    };

    let trace_id = backend
        .record_run_trace(run_trace("Capital of France?", Some(generation)))
        .await
        .unwrap();

    assert_eq!(backend.pending_writes(), 3);
    let events = backend.pending_events();
    assert_eq!(events.len(), 2);

    let trace = &events[0];
    assert_eq!(trace["type"], "trace-create");
    assert_eq!(trace["body"]["id"], json!(trace_id));
    assert_eq!(trace["body"]["name"], "run_1");
    assert_eq!(trace["body"]["input"], json!({ "question": "Capital of France?" }));
    assert_eq!(trace["body"]["metadata"]["response_id"], "resp_1");

    let generation = &events[1];
    assert_eq!(generation["type"], "generation-create");
    assert_eq!(generation["body"]["traceId"], json!(trace_id));
    assert_eq!(generation["body"]["model"], "gpt-4o");
    assert_eq!(
        generation["body"]["usage"],
        json!({ "input": 12, "output": 1, "total": 13, "unit": "TOKENS" })
    );
    assert_eq!(generation["body"]["metadata"], trace["body"]["metadata"]);
    assert_ne!(generation["id"], trace["id"]);
}

#[tokio::test]
async fn test_record_run_trace_without_generation() {
    let backend = backend("https://cloud.langfuse.com");

    backend
        .record_run_trace(run_trace("Capital of France?", None))
        .await
        .unwrap();

    let events = backend.pending_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["type"], "trace-create");
}

#[tokio::test]
async fn test_record_score_buffers_score_event() {
    let backend = backend("https://cloud.langfuse.com");

    backend
        .record_score(
            "trace-1",
            TraceScore::numeric("cosine_similarity", 0.93).with_comment("close"),
        )
        .await
        .unwrap();
    backend
        .record_score("trace-1", TraceScore::categorical("verdict", "correct"))
        .await
        .unwrap();

    let events = backend.pending_events();
    assert_eq!(events[0]["type"], "score-create");
    assert_eq!(events[0]["body"]["traceId"], "trace-1");
    assert_eq!(events[0]["body"]["value"], 0.93);
    assert_eq!(events[0]["body"]["dataType"], "NUMERIC");
    assert_eq!(events[0]["body"]["comment"], "close");
    assert_eq!(events[1]["body"]["value"], "correct");
    assert_eq!(events[1]["body"]["dataType"], "CATEGORICAL");
}

#[tokio::test]
async fn test_run_trace_ids_maps_any_failure_to_run_not_found() {
    let backend = backend("http://127.0.0.1:1");

    let err = backend.run_trace_ids("qa", "run_1").await.unwrap_err();

    assert!(matches!(
        err,
        TraceStoreError::RunNotFound { ref dataset_name, ref run_name }
            if dataset_name == "qa" && run_name == "run_1"
    ));
}

#[tokio::test]
async fn test_flush_reports_rejected_traces_and_skips_their_run_links() {
    let (host, targets) =
        spawn_stub(|event| event["body"]["input"]["question"] == "Capital of Japan?").await;
    let backend = backend(&host);

    let kept = backend
        .record_run_trace(run_trace("Capital of France?", None))
        .await
        .unwrap();
    let rejected = backend
        .record_run_trace(run_trace("Capital of Japan?", None))
        .await
        .unwrap();

    let report = backend.flush().await.unwrap();

    assert!(report.is_rejected(&rejected));
    assert!(!report.is_rejected(&kept));
    assert_eq!(report.rejected_traces.len(), 1);
    assert_eq!(backend.pending_writes(), 0);

    let targets = targets.lock().clone();
    assert_eq!(
        targets,
        vec![
            "/api/public/ingestion".to_string(),
            "/api/public/dataset-run-items".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_attach_scores_survives_partially_rejected_ingestion() {
    let (host, targets) = spawn_stub(|event| event["body"]["traceId"] == "b").await;
    let store = TraceStore::new(Arc::new(backend(&host)));

    store
        .attach_scores(&[
            ItemSimilarity {
                trace_id: "a".to_string(),
                cosine_similarity: 0.9,
            },
            ItemSimilarity {
                trace_id: "b".to_string(),
                cosine_similarity: 0.4,
            },
        ])
        .await
        .unwrap();

    assert_eq!(targets.lock().len(), 1);
}

#[tokio::test]
async fn test_flush_fails_when_store_is_unreachable() {
    let backend = backend("http://127.0.0.1:1");
    backend
        .record_score("trace-1", TraceScore::numeric("cosine_similarity", 0.5))
        .await
        .unwrap();

    let err = backend.flush().await.unwrap_err();

    assert!(matches!(err, TraceStoreError::Transport { operation: "ingestion", .. }));
    assert_eq!(backend.pending_writes(), 0);
}

#[tokio::test]
async fn test_flush_with_nothing_buffered_makes_no_requests() {
    let backend = backend("http://127.0.0.1:1");

    let report = backend.flush().await.unwrap();

    assert!(report.is_clean());
}
