use std::collections::HashMap;

use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use super::types::EmbeddingPair;
use crate::batch::{BatchOutcome, BatchRequest, BatchResultLine};
use crate::constants::EMBEDDINGS_ENDPOINT;
use crate::model::EvaluationOutput;

/// Index of the generated output inside each embedding request's `input`.
pub const OUTPUT_INDEX: usize = 0;
/// Index of the ground truth inside each embedding request's `input`.
pub const GROUND_TRUTH_INDEX: usize = 1;

#[derive(Deserialize)]
struct EmbeddingBody {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    index: usize,
    embedding: Vec<f64>,
}

/// Builds one `/v1/embeddings` request per result that has a trace.
///
/// `input` is always `[generated_output, ground_truth]`. Results without a
/// trace id, or with an empty output or ground truth, are skipped.
pub fn build_embedding_jsonl(
    results: &[EvaluationOutput],
    trace_id_mapping: &HashMap<String, String>,
    embedding_model: &str,
) -> Vec<BatchRequest> {
    let mut skipped = 0usize;

    let requests: Vec<BatchRequest> = results
        .iter()
        .filter_map(|result| {
            let Some(trace_id) = trace_id_mapping.get(&result.item_id) else {
                debug!(item_id = %result.item_id, "No trace for item, skipping embedding");
                skipped += 1;
                return None;
            };

            if result.generated_output.is_empty() || result.ground_truth.is_empty() {
                debug!(trace_id = %trace_id, "Empty output or ground truth, skipping embedding");
                skipped += 1;
                return None;
            }

            Some(BatchRequest::post(
                trace_id.clone(),
                EMBEDDINGS_ENDPOINT,
                json!({
                    "model": embedding_model,
                    // OUTPUT_INDEX, GROUND_TRUTH_INDEX
                    "input": [&result.generated_output, &result.ground_truth],
                    "encoding_format": "float",
                }),
            ))
        })
        .collect();

    info!(
        requests = requests.len(),
        skipped,
        model = embedding_model,
        "Built embedding batch requests"
    );

    requests
}

/// Extracts output/ground-truth embedding pairs from embedding batch results.
///
/// Errored lines, lines missing either embedding, and lines whose two
/// embeddings differ in length are skipped.
pub fn parse_embedding_results(raw_results: &[BatchResultLine]) -> Vec<EmbeddingPair> {
    let pairs: Vec<EmbeddingPair> = raw_results
        .iter()
        .filter_map(parse_embedding_line)
        .collect();

    info!(
        pairs = pairs.len(),
        lines = raw_results.len(),
        "Parsed embedding results"
    );

    pairs
}

fn parse_embedding_line(line: &BatchResultLine) -> Option<EmbeddingPair> {
    let body = match &line.outcome {
        BatchOutcome::Response { body, .. } => body,
        BatchOutcome::Error { message, .. } => {
            warn!(trace_id = %line.custom_id, error = %message, "Embedding request failed");
            return None;
        }
    };

    let parsed: EmbeddingBody = match serde_json::from_value(body.clone()) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!(trace_id = %line.custom_id, error = %e, "Embedding response has no data");
            return None;
        }
    };

    let mut output_embedding = None;
    let mut ground_truth_embedding = None;
    for datum in parsed.data {
        match datum.index {
            OUTPUT_INDEX => output_embedding = Some(datum.embedding),
            GROUND_TRUTH_INDEX => ground_truth_embedding = Some(datum.embedding),
            _ => {}
        }
    }

    let (Some(output_embedding), Some(ground_truth_embedding)) =
        (output_embedding, ground_truth_embedding)
    else {
        warn!(trace_id = %line.custom_id, "Missing embedding index, skipping");
        return None;
    };

    if output_embedding.len() != ground_truth_embedding.len() {
        warn!(
            trace_id = %line.custom_id,
            output_dim = output_embedding.len(),
            ground_truth_dim = ground_truth_embedding.len(),
            "Embedding dimensions differ, skipping"
        );
        return None;
    }

    Some(EmbeddingPair {
        trace_id: line.custom_id.clone(),
        output_embedding,
        ground_truth_embedding,
    })
}
