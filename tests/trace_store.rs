//! Integration tests for the trace store adapter over the in-memory backend.

mod common;

use std::collections::HashSet;

use batcheval::embedding::ItemSimilarity;
use batcheval::model::QuestionId;
use batcheval::tracestore::{
    DatasetItemInput, ScoreDataType, StoredTrace, TraceScore, TraceStoreAdapter, TraceStoreError,
};
use common::fixtures::{DATASET_NAME, DEFAULT_MODEL, EvaluationOutputBuilder, RUN_NAME, TestEnv, capital_items};
use serde_json::json;

#[tokio::test]
async fn test_upload_replicates_items_with_shared_question_id() {
    let env = TestEnv::new();
    let items = vec![DatasetItemInput::new("Q1", "A1")];

    let uploaded = env.store.upload_dataset(&items, "single", 3).await.unwrap();

    assert_eq!(uploaded.total_items, 3);

    let stored = env.backend.stored_items("single");
    let question_ids: HashSet<i64> = stored
        .iter()
        .map(|i| i.metadata["question_id"].as_i64().unwrap())
        .collect();
    assert_eq!(question_ids, HashSet::from([1]));

    let mut duplicate_numbers: Vec<u64> = stored
        .iter()
        .map(|i| i.metadata["duplicate_number"].as_u64().unwrap())
        .collect();
    duplicate_numbers.sort_unstable();
    assert_eq!(duplicate_numbers, vec![1, 2, 3]);
    assert!(stored.iter().all(|i| i.metadata["original_question"] == "Q1"));
    assert!(stored.iter().all(|i| i.metadata["duplication_factor"] == 3));
}

#[tokio::test]
async fn test_upload_skips_failed_items_and_flushes_once() {
    let env = TestEnv::new();
    env.backend.fail_question("What is the capital of Japan?");

    let uploaded = env
        .store
        .upload_dataset(&capital_items(), DATASET_NAME, 2)
        .await
        .unwrap();

    assert_eq!(uploaded.total_items, 4);
    assert_eq!(env.backend.call_count("flush"), 1);

    let items = env.store.dataset_items(DATASET_NAME).await.unwrap();
    let canada = items
        .iter()
        .find(|i| i.question == "What is the capital of Canada?")
        .unwrap();
    assert_eq!(canada.question_id, Some(QuestionId::Int(3)));
    assert_eq!(canada.answer, "Ottawa");
}

#[tokio::test]
async fn test_run_write_then_read_back_with_scores() {
    let env = TestEnv::new();
    env.store
        .upload_dataset(&capital_items(), DATASET_NAME, 1)
        .await
        .unwrap();
    let items = env.store.dataset_items(DATASET_NAME).await.unwrap();

    let outputs: Vec<_> = items
        .iter()
        .map(|item| {
            EvaluationOutputBuilder::new()
                .item_id(&item.id)
                .question(&item.question)
                .generated_output(&item.answer)
                .ground_truth(&item.answer)
                .response_id(&format!("resp-{}", item.id))
                .with_usage()
                .build()
        })
        .collect();

    let trace_ids = env
        .store
        .create_dataset_run(DATASET_NAME, RUN_NAME, &outputs, Some(DEFAULT_MODEL))
        .await
        .unwrap();
    assert_eq!(trace_ids.len(), 3);

    let first_trace = &trace_ids[&items[0].id];
    let recorded = env.backend.recorded_run_trace(first_trace).unwrap();
    assert_eq!(recorded.metadata["question_id"], json!(1));
    assert_eq!(recorded.metadata["response_id"], json!(format!("resp-{}", items[0].id)));
    let generation = recorded.generation.unwrap();
    assert_eq!(generation.model, DEFAULT_MODEL);
    assert_eq!(generation.usage.total_tokens, 13);

    let similarities: Vec<ItemSimilarity> = items
        .iter()
        .zip([0.95, 0.87, 0.5])
        .map(|(item, score)| ItemSimilarity {
            trace_id: trace_ids[&item.id].clone(),
            cosine_similarity: score,
        })
        .collect();
    env.store.attach_scores(&similarities).await.unwrap();

    let scores = env.store.fetch_run_scores(DATASET_NAME, RUN_NAME).await.unwrap();

    assert_eq!(scores.traces.len(), 3);
    assert_eq!(scores.traces[0].question, "What is the capital of France?");
    assert_eq!(scores.traces[0].llm_answer, "Paris");
    assert_eq!(scores.traces[0].ground_truth_answer, "Paris");
    assert_eq!(scores.traces[0].question_id, QuestionId::Int(1));

    assert_eq!(scores.summary_scores.len(), 1);
    let summary = &scores.summary_scores[0];
    assert_eq!(summary.name, "cosine_similarity");
    assert_eq!(summary.data_type(), ScoreDataType::Numeric);
    assert_eq!(summary.total_pairs, 3);
    assert_eq!(summary.avg(), Some(0.77));
}

#[tokio::test]
async fn test_partially_covered_score_is_left_out_of_summary() {
    let env = TestEnv::new();
    let trace = |id: &str, scores: Vec<TraceScore>| StoredTrace {
        id: id.to_string(),
        input: json!("What is 2 + 2?"),
        output: json!("4"),
        metadata: json!({ "ground_truth": "4" }),
        scores,
    };

    env.backend.insert_run_trace(
        "math",
        "run-a",
        trace(
            "t1",
            vec![
                TraceScore::numeric("cosine_similarity", 0.9),
                TraceScore::categorical("verdict", "correct"),
            ],
        ),
    );
    env.backend.insert_run_trace(
        "math",
        "run-a",
        trace("t2", vec![TraceScore::numeric("cosine_similarity", 0.7)]),
    );

    let scores = env.store.fetch_run_scores("math", "run-a").await.unwrap();

    let names: Vec<&str> = scores.summary_scores.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["cosine_similarity"]);
    assert_eq!(scores.summary_scores[0].avg(), Some(0.8));
    assert!(scores.traces.iter().all(|t| t.scores.len() == 1));
    assert_eq!(scores.traces[0].question, "What is 2 + 2?");
    assert_eq!(scores.traces[0].question_id, QuestionId::default());
}

#[tokio::test]
async fn test_unknown_run_is_not_found() {
    let env = TestEnv::new();

    let err = env
        .store
        .fetch_run_scores("math", "missing-run")
        .await
        .unwrap_err();

    assert!(matches!(err, TraceStoreError::RunNotFound { .. }));
    assert_eq!(
        err.to_string(),
        "Run 'missing-run' not found in dataset 'math'"
    );
}
