use tracing::debug;

use super::types::{EmbeddingPair, ItemSimilarity, SimilarityStats};

/// Cosine similarity of two vectors.
///
/// Returns `0.0` when either vector has zero magnitude, or when the lengths differ.
pub fn calculate_cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f64 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f64 = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| x * x).sum::<f64>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot_product / (norm_a * norm_b)
    }
}

/// Scores every pair and reduces the scores to mean and population std.
pub fn calculate_average_similarity(pairs: &[EmbeddingPair]) -> SimilarityStats {
    if pairs.is_empty() {
        return SimilarityStats::default();
    }

    let per_item_scores: Vec<ItemSimilarity> = pairs
        .iter()
        .map(|pair| ItemSimilarity {
            trace_id: pair.trace_id.clone(),
            cosine_similarity: calculate_cosine_similarity(
                &pair.output_embedding,
                &pair.ground_truth_embedding,
            ),
        })
        .collect();

    let n = per_item_scores.len() as f64;
    let avg = per_item_scores.iter().map(|s| s.cosine_similarity).sum::<f64>() / n;
    let variance = per_item_scores
        .iter()
        .map(|s| (s.cosine_similarity - avg).powi(2))
        .sum::<f64>()
        / n;

    debug!(pairs = pairs.len(), avg, "Computed embedding similarity");

    SimilarityStats {
        total_pairs: per_item_scores.len(),
        cosine_similarity_avg: avg,
        cosine_similarity_std: variance.sqrt(),
        per_item_scores,
    }
}
