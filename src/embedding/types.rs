use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq)]
/// Output and ground-truth embeddings returned for one trace.
pub struct EmbeddingPair {
    pub trace_id: String,
    pub output_embedding: Vec<f64>,
    pub ground_truth_embedding: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemSimilarity {
    pub trace_id: String,
    pub cosine_similarity: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
/// Aggregate similarity over a set of [`EmbeddingPair`]s.
pub struct SimilarityStats {
    pub total_pairs: usize,
    pub cosine_similarity_avg: f64,
    /// Population standard deviation of the per-pair similarities.
    pub cosine_similarity_std: f64,
    pub per_item_scores: Vec<ItemSimilarity>,
}
