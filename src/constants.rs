//! Cross-cutting, shared constants.
//!
//! Wire-level defaults that more than one module (or a provider and its mock) must agree on.

/// Endpoint used for bulk jobs when the caller does not pick one.
pub const DEFAULT_BATCH_ENDPOINT: &str = "/v1/responses";

/// Endpoint for embedding bulk jobs.
pub const EMBEDDINGS_ENDPOINT: &str = "/v1/embeddings";

pub const DEFAULT_COMPLETION_WINDOW: &str = "24h";

pub const DEFAULT_BATCH_DESCRIPTION: &str = "LLM batch job";

/// File purpose for uploaded bulk payloads.
pub const BATCH_FILE_PURPOSE: &str = "batch";

/// File name attached to uploaded bulk payloads.
pub const BATCH_INPUT_FILENAME: &str = "batch_input.jsonl";

pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-large";

/// Score name attached to traces for embedding similarity.
pub const COSINE_SIMILARITY_SCORE: &str = "cosine_similarity";

pub const COSINE_SIMILARITY_COMMENT: &str =
    "Cosine similarity between output and ground truth embeddings";

/// Name of the nested generation span recorded under each trace.
pub const GENERATION_SPAN_NAME: &str = "evaluation-response";

/// Decimal places kept on numeric summary averages.
pub const SUMMARY_AVG_DECIMALS: i32 = 2;

/// Traces fetched at once when reading back a run.
pub const DEFAULT_TRACE_FETCH_CONCURRENCY: usize = 8;

pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 120;

pub const DEFAULT_LANGFUSE_HOST: &str = "https://cloud.langfuse.com";

/// Page size used when listing dataset items.
pub const DATASET_ITEMS_PAGE_LIMIT: u32 = 100;
