//! Embedding similarity engine.
//!
//! - [`requests`] turns evaluation outputs into embedding bulk requests and
//!   decodes the returned embeddings into [`EmbeddingPair`]s.
//! - [`similarity`] reduces pairs to cosine similarity statistics.
//!
//! Each request embeds exactly two strings and the order is fixed: index 0 is
//! the generated output, index 1 the ground truth. Result parsing relies on it.

pub mod requests;
pub mod similarity;
pub mod types;


pub use requests::{
    GROUND_TRUTH_INDEX, OUTPUT_INDEX, build_embedding_jsonl, parse_embedding_results,
};
pub use similarity::{calculate_average_similarity, calculate_cosine_similarity};
pub use types::{EmbeddingPair, ItemSimilarity, SimilarityStats};
