//! Newline-delimited JSON encoding shared by every provider.

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::error::BatchResult;
use super::types::BatchResultLine;

/// Serializes `records` one JSON object per line (no trailing newline).
pub fn encode_jsonl<T: Serialize>(records: &[T]) -> BatchResult<String> {
    let lines = records
        .iter()
        .map(serde_json::to_string)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(lines.join("\n"))
}

/// Decodes every line of `content` that parses as `T`.
///
/// Blank lines are ignored and unparseable lines are dropped with a warning;
/// neither aborts the rest of the file.
pub fn decode_jsonl<T: DeserializeOwned>(content: &str) -> Vec<T> {
    let mut records = Vec::new();
    let mut dropped = 0usize;

    for (line_no, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match serde_json::from_str::<T>(line) {
            Ok(record) => records.push(record),
            Err(e) => {
                dropped += 1;
                warn!(line = line_no + 1, error = %e, "Skipping malformed JSONL line");
            }
        }
    }

    debug!(parsed = records.len(), dropped, "Decoded JSONL content");
    records
}

/// Decodes a bulk job output file.
pub fn parse_result_lines(content: &str) -> Vec<BatchResultLine> {
    decode_jsonl(content)
}
