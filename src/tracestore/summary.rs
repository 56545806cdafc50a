use std::collections::{BTreeMap, HashSet};

use tracing::{debug, warn};

use super::types::{ScoreSummary, TraceRecord};
use crate::constants::SUMMARY_AVG_DECIMALS;

/// Summarizes score names present on every trace.
///
/// Score names missing from at least one trace are dropped from the summary
/// and stripped from every trace's `scores`. Summaries follow first-seen name
/// order. The data type of a summary is taken from the first occurrence of
/// its name.
pub fn summarize_scores(traces: &mut [TraceRecord]) -> Vec<ScoreSummary> {
    if traces.is_empty() {
        return Vec::new();
    }

    let mut names: Vec<String> = Vec::new();
    for trace in traces.iter() {
        for score in &trace.scores {
            if !names.contains(&score.name) {
                names.push(score.name.clone());
            }
        }
    }

    let complete: Vec<String> = names
        .into_iter()
        .filter(|name| {
            let everywhere = traces
                .iter()
                .all(|trace| trace.scores.iter().any(|s| &s.name == name));
            if !everywhere {
                warn!(score = %name, "Score missing on some traces, excluded from summary");
            }
            everywhere
        })
        .collect();

    let keep: HashSet<&str> = complete.iter().map(String::as_str).collect();
    for trace in traces.iter_mut() {
        trace.scores.retain(|s| keep.contains(s.name.as_str()));
    }

    complete
        .iter()
        .filter_map(|name| summarize_one(name, traces))
        .collect()
}

fn summarize_one(name: &str, traces: &[TraceRecord]) -> Option<ScoreSummary> {
    let values: Vec<_> = traces
        .iter()
        .flat_map(|trace| trace.scores.iter())
        .filter(|s| s.name == name)
        .map(|s| &s.value)
        .collect();

    let data_type = values.first()?.data_type();

    if data_type.is_numeric() {
        let numbers: Vec<f64> = values.iter().filter_map(|v| v.as_f64()).collect();
        if numbers.is_empty() {
            return None;
        }
        let avg = numbers.iter().sum::<f64>() / numbers.len() as f64;
        debug!(score = name, count = numbers.len(), avg, "Summarized numeric score");
        Some(ScoreSummary::numeric(name, round_avg(avg), numbers.len()))
    } else {
        let mut distribution: BTreeMap<String, u64> = BTreeMap::new();
        for value in &values {
            *distribution.entry(value.label()).or_default() += 1;
        }
        debug!(score = name, categories = distribution.len(), "Summarized categorical score");
        Some(ScoreSummary::categorical(name, distribution, values.len()))
    }
}

fn round_avg(value: f64) -> f64 {
    let factor = 10f64.powi(SUMMARY_AVG_DECIMALS);
    (value * factor).round() / factor
}
