use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::{QuestionId, TokenUsage};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// One logical question/answer pair to upload.
pub struct DatasetItemInput {
    pub question: String,
    pub answer: String,
}

impl DatasetItemInput {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Metadata attached to every uploaded replica.
pub struct ReplicaMetadata {
    pub original_question: String,
    pub duplication_factor: u32,
    /// 1-based replica number.
    pub duplicate_number: u32,
    /// 1-based number of the distinct item this replica was copied from.
    pub question_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// A dataset item as stored in the trace store.
pub struct DatasetItem {
    pub id: String,
    pub question: String,
    pub answer: String,
    #[serde(default)]
    pub question_id: Option<QuestionId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Result of [`TraceStoreAdapter::upload_dataset`](super::TraceStoreAdapter::upload_dataset).
pub struct UploadedDataset {
    pub dataset_id: String,
    /// Replicas actually created; failed items are not counted.
    pub total_items: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ScoreDataType {
    Numeric,
    Categorical,
    Boolean,
}

impl ScoreDataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScoreDataType::Numeric => "NUMERIC",
            ScoreDataType::Categorical => "CATEGORICAL",
            ScoreDataType::Boolean => "BOOLEAN",
        }
    }

    /// Numeric and boolean scores are averaged; categorical ones are counted.
    pub fn is_numeric(&self) -> bool {
        !matches!(self, ScoreDataType::Categorical)
    }
}

#[derive(Debug, Clone, PartialEq)]
/// A score value tagged with its data type.
pub enum ScoreValue {
    Numeric(f64),
    Boolean(f64),
    Categorical(String),
}

impl ScoreValue {
    pub fn data_type(&self) -> ScoreDataType {
        match self {
            ScoreValue::Numeric(_) => ScoreDataType::Numeric,
            ScoreValue::Boolean(_) => ScoreDataType::Boolean,
            ScoreValue::Categorical(_) => ScoreDataType::Categorical,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ScoreValue::Numeric(v) | ScoreValue::Boolean(v) => Some(*v),
            ScoreValue::Categorical(_) => None,
        }
    }

    /// Distribution key of the value.
    pub fn label(&self) -> String {
        match self {
            ScoreValue::Numeric(v) | ScoreValue::Boolean(v) => v.to_string(),
            ScoreValue::Categorical(s) => s.clone(),
        }
    }

    /// Builds a value from a JSON scalar and the stored data type.
    pub fn from_json(data_type: ScoreDataType, value: &Value) -> Option<Self> {
        match data_type {
            ScoreDataType::Numeric => value.as_f64().map(ScoreValue::Numeric),
            ScoreDataType::Boolean => match value {
                Value::Bool(b) => Some(ScoreValue::Boolean(if *b { 1.0 } else { 0.0 })),
                other => other.as_f64().map(ScoreValue::Boolean),
            },
            ScoreDataType::Categorical => match value {
                Value::String(s) => Some(ScoreValue::Categorical(s.clone())),
                Value::Null => None,
                other => Some(ScoreValue::Categorical(other.to_string())),
            },
        }
    }

    fn to_json(&self) -> Value {
        match self {
            ScoreValue::Numeric(v) | ScoreValue::Boolean(v) => Value::from(*v),
            ScoreValue::Categorical(s) => Value::String(s.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTraceScore", into = "RawTraceScore")]
/// A score attached to a trace.
pub struct TraceScore {
    pub name: String,
    pub value: ScoreValue,
    pub comment: Option<String>,
}

impl TraceScore {
    pub fn numeric(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value: ScoreValue::Numeric(value),
            comment: None,
        }
    }

    pub fn categorical(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: ScoreValue::Categorical(value.into()),
            comment: None,
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn data_type(&self) -> ScoreDataType {
        self.value.data_type()
    }
}

#[derive(Serialize, Deserialize)]
struct RawTraceScore {
    name: String,
    value: Value,
    #[serde(default)]
    comment: Option<String>,
    data_type: ScoreDataType,
}

impl TryFrom<RawTraceScore> for TraceScore {
    type Error = String;

    fn try_from(raw: RawTraceScore) -> Result<Self, Self::Error> {
        let value = ScoreValue::from_json(raw.data_type, &raw.value).ok_or_else(|| {
            format!(
                "score '{}' has a value that is not {}",
                raw.name,
                raw.data_type.as_str()
            )
        })?;

        Ok(Self {
            name: raw.name,
            value,
            comment: raw.comment,
        })
    }
}

impl From<TraceScore> for RawTraceScore {
    fn from(score: TraceScore) -> Self {
        Self {
            data_type: score.value.data_type(),
            value: score.value.to_json(),
            name: score.name,
            comment: score.comment,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// One fetched trace of a run, flattened for display.
pub struct TraceRecord {
    pub trace_id: String,
    pub question: String,
    pub llm_answer: String,
    pub ground_truth_answer: String,
    #[serde(default)]
    pub question_id: QuestionId,
    #[serde(default)]
    pub scores: Vec<TraceScore>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "data_type", rename_all = "UPPERCASE")]
pub enum SummaryStats {
    Numeric {
        avg: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        std: Option<f64>,
    },
    Categorical {
        distribution: BTreeMap<String, u64>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Aggregate of one score name across a run's traces.
pub struct ScoreSummary {
    pub name: String,
    pub total_pairs: usize,
    #[serde(flatten)]
    pub stats: SummaryStats,
}

impl ScoreSummary {
    pub fn numeric(name: impl Into<String>, avg: f64, total_pairs: usize) -> Self {
        Self {
            name: name.into(),
            total_pairs,
            stats: SummaryStats::Numeric { avg, std: None },
        }
    }

    pub fn categorical(
        name: impl Into<String>,
        distribution: BTreeMap<String, u64>,
        total_pairs: usize,
    ) -> Self {
        Self {
            name: name.into(),
            total_pairs,
            stats: SummaryStats::Categorical { distribution },
        }
    }

    pub fn with_std(mut self, value: f64) -> Self {
        if let SummaryStats::Numeric { std, .. } = &mut self.stats {
            *std = Some(value);
        }
        self
    }

    pub fn avg(&self) -> Option<f64> {
        match &self.stats {
            SummaryStats::Numeric { avg, .. } => Some(*avg),
            SummaryStats::Categorical { .. } => None,
        }
    }

    pub fn data_type(&self) -> ScoreDataType {
        match self.stats {
            SummaryStats::Numeric { .. } => ScoreDataType::Numeric,
            SummaryStats::Categorical { .. } => ScoreDataType::Categorical,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
/// Traces of a run together with their summaries.
pub struct RunScores {
    pub traces: Vec<TraceRecord>,
    pub summary_scores: Vec<ScoreSummary>,
}

// Backend-level records.

#[derive(Debug, Clone, PartialEq)]
/// A dataset item exactly as the backend returns it.
pub struct StoredDatasetItem {
    pub id: String,
    pub input: Value,
    pub expected_output: Value,
    pub metadata: Value,
}

#[derive(Debug, Clone, PartialEq)]
/// Nested generation span recorded under a run trace.
pub struct GenerationSpan {
    pub name: String,
    pub model: String,
    pub usage: TokenUsage,
}

#[derive(Debug, Clone, PartialEq)]
/// A trace to open for one dataset item within a named run.
pub struct RunTrace {
    pub dataset_item_id: String,
    pub run_name: String,
    pub input: Value,
    pub output: Value,
    pub metadata: Value,
    pub generation: Option<GenerationSpan>,
}

#[derive(Debug, Clone, PartialEq)]
/// A trace exactly as the backend returns it.
pub struct StoredTrace {
    pub id: String,
    pub input: Value,
    pub output: Value,
    pub metadata: Value,
    pub scores: Vec<TraceScore>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// Outcome of a [`flush`](super::TraceBackend::flush) that reached the store.
///
/// Individual writes can still be rejected; the traces they belong to are
/// listed here.
pub struct FlushReport {
    pub rejected_traces: HashSet<String>,
}

impl FlushReport {
    pub fn is_rejected(&self, trace_id: &str) -> bool {
        self.rejected_traces.contains(trace_id)
    }

    pub fn is_clean(&self) -> bool {
        self.rejected_traces.is_empty()
    }
}
