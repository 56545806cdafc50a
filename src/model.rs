//! Types shared by the embedding engine, the trace store and the pipeline.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
/// Stable per-question identifier carried in trace metadata.
///
/// Uploaded datasets use 1-based integers, but traces written by other tools
/// may carry floats, large unsigned numbers or strings. All are preserved as
/// stored.
pub enum QuestionId {
    Int(i64),
    /// Any number that does not fit `i64`.
    Number(serde_json::Number),
    Text(String),
}

impl Default for QuestionId {
    /// Value reported when a trace has no `question_id`.
    fn default() -> Self {
        QuestionId::Text(String::new())
    }
}

impl QuestionId {
    /// Returns `true` for the empty-string placeholder.
    pub fn is_empty(&self) -> bool {
        matches!(self, QuestionId::Text(s) if s.is_empty())
    }
}

impl From<i64> for QuestionId {
    fn from(value: i64) -> Self {
        QuestionId::Int(value)
    }
}

impl From<&str> for QuestionId {
    fn from(value: &str) -> Self {
        QuestionId::Text(value.to_string())
    }
}

impl std::fmt::Display for QuestionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QuestionId::Int(n) => write!(f, "{n}"),
            QuestionId::Number(n) => write!(f, "{n}"),
            QuestionId::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
/// Token usage reported by the inference provider for one response.
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// One model output joined with the dataset item it answers.
pub struct EvaluationOutput {
    /// Trace-store dataset item id (also the bulk request `custom_id`).
    pub item_id: String,
    pub question: String,
    pub generated_output: String,
    pub ground_truth: String,
    #[serde(default)]
    pub response_id: Option<String>,
    #[serde(default)]
    pub usage: Option<TokenUsage>,
    #[serde(default)]
    pub question_id: Option<QuestionId>,
}

impl EvaluationOutput {
    pub fn new(
        item_id: impl Into<String>,
        question: impl Into<String>,
        generated_output: impl Into<String>,
        ground_truth: impl Into<String>,
    ) -> Self {
        Self {
            item_id: item_id.into(),
            question: question.into(),
            generated_output: generated_output.into(),
            ground_truth: ground_truth.into(),
            response_id: None,
            usage: None,
            question_id: None,
        }
    }

    pub fn with_response_id(mut self, response_id: impl Into<String>) -> Self {
        self.response_id = Some(response_id.into());
        self
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn with_question_id(mut self, question_id: impl Into<QuestionId>) -> Self {
        self.question_id = Some(question_id.into());
        self
    }
}
