//! Test fixtures for integration tests.

use std::sync::Arc;

use serde_json::{Map, Value, json};

use batcheval::batch::{BatchRequest, BatchResultLine, MockBatchProvider};
use batcheval::evaluation::{
    EvaluationOrchestrator, EvaluationPipeline, InMemoryRunRepository, PipelineSettings,
};
use batcheval::model::{EvaluationOutput, QuestionId, TokenUsage};
use batcheval::tracestore::{DatasetItemInput, MockTraceBackend, TraceStore};

pub const DEFAULT_MODEL: &str = "gpt-4o";

pub const DATASET_NAME: &str = "capitals";

pub const RUN_NAME: &str = "capitals-gpt-4o";

/// Mock backends wired into a pipeline and an orchestrator.
pub struct TestEnv {
    pub batches: Arc<MockBatchProvider>,
    pub backend: Arc<MockTraceBackend>,
    pub store: Arc<TraceStore<MockTraceBackend>>,
    pub runs: Arc<InMemoryRunRepository>,
}

impl TestEnv {
    pub fn new() -> Self {
        let backend = Arc::new(MockTraceBackend::new());
        Self {
            batches: Arc::new(MockBatchProvider::new()),
            store: Arc::new(TraceStore::new(Arc::clone(&backend)).with_fetch_concurrency(3)),
            backend,
            runs: Arc::new(InMemoryRunRepository::new()),
        }
    }

    pub fn pipeline(&self) -> EvaluationPipeline {
        EvaluationPipeline::new(
            self.batches.clone(),
            self.store.clone(),
            self.runs.clone(),
            PipelineSettings::default(),
        )
    }

    pub fn orchestrator(&self) -> EvaluationOrchestrator {
        EvaluationOrchestrator::new(self.store.clone(), self.runs.clone())
    }
}

pub fn capital_items() -> Vec<DatasetItemInput> {
    vec![
        DatasetItemInput::new("What is the capital of France?", "Paris"),
        DatasetItemInput::new("What is the capital of Japan?", "Tokyo"),
        DatasetItemInput::new("What is the capital of Canada?", "Ottawa"),
    ]
}

pub fn response_params() -> Map<String, Value> {
    let mut params = Map::new();
    params.insert("model".to_string(), json!(DEFAULT_MODEL));
    params.insert("instructions".to_string(), json!("Answer with one word."));
    params
}

/// A Responses API body with a single `output_text` block.
pub fn response_body(text: &str, response_id: &str) -> Value {
    json!({
        "id": response_id,
        "object": "response",
        "output": [
            {
                "type": "message",
                "role": "assistant",
                "content": [{ "type": "output_text", "text": text }]
            }
        ],
        "usage": { "input_tokens": 12, "output_tokens": 1, "total_tokens": 13 }
    })
}

/// An embeddings API body carrying `output` at index 0 and `ground_truth` at index 1.
pub fn embedding_body(output: &[f64], ground_truth: &[f64]) -> Value {
    json!({
        "object": "list",
        "data": [
            { "object": "embedding", "index": 0, "embedding": output },
            { "object": "embedding", "index": 1, "embedding": ground_truth }
        ]
    })
}

/// Embeds identical texts to the same unit vector and different texts to orthogonal ones.
pub fn embed_by_text(request: &BatchRequest) -> BatchResultLine {
    let input = &request.body["input"];
    let ground_truth: &[f64] = if input[0] == input[1] {
        &[1.0, 0.0]
    } else {
        &[0.0, 1.0]
    };
    BatchResultLine::response(
        request.custom_id.clone(),
        200,
        embedding_body(&[1.0, 0.0], ground_truth),
    )
}

#[derive(Default)]
pub struct EvaluationOutputBuilder {
    item_id: Option<String>,
    question: Option<String>,
    generated_output: Option<String>,
    ground_truth: Option<String>,
    response_id: Option<String>,
    usage: Option<TokenUsage>,
    question_id: Option<QuestionId>,
}

impl EvaluationOutputBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn item_id(mut self, id: &str) -> Self {
        self.item_id = Some(id.to_string());
        self
    }

    pub fn question(mut self, text: &str) -> Self {
        self.question = Some(text.to_string());
        self
    }

    pub fn generated_output(mut self, text: &str) -> Self {
        self.generated_output = Some(text.to_string());
        self
    }

    pub fn ground_truth(mut self, text: &str) -> Self {
        self.ground_truth = Some(text.to_string());
        self
    }

    pub fn response_id(mut self, id: &str) -> Self {
        self.response_id = Some(id.to_string());
        self
    }

    pub fn with_usage(mut self) -> Self {
        self.usage = Some(TokenUsage {
            input_tokens: 12,
            output_tokens: 1,
            total_tokens: 13,
        });
        self
    }

    pub fn question_id(mut self, id: i64) -> Self {
        self.question_id = Some(QuestionId::Int(id));
        self
    }

    pub fn build(self) -> EvaluationOutput {
        let mut output = EvaluationOutput::new(
            self.item_id.unwrap_or_else(|| "item-1".to_string()),
            self.question
                .unwrap_or_else(|| "What is the capital of France?".to_string()),
            self.generated_output.unwrap_or_else(|| "Paris".to_string()),
            self.ground_truth.unwrap_or_else(|| "Paris".to_string()),
        );
        output.response_id = self.response_id;
        output.usage = self.usage;
        output.question_id = self.question_id;
        output
    }
}
