//! Timing a rules document against sample payloads.

use std::time::Instant;

use acv_core::error::Diagnostic;
use acv_core::source::FragmentSource;
use acv_interchange::Value;
use serde::Serialize;
use thiserror::Error;

use crate::engine::{self, elapsed_micros};

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("rules do not compile ({} diagnostics)", .0.len())]
    Compile(Vec<Diagnostic>),
    #[error("no samples to profile against")]
    NoSamples,
    #[error("iterations must be at least 1")]
    ZeroIterations,
}

/// Per-run timings in microseconds. Compilation is measured once and kept
/// out of the per-run figures.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileReport {
    pub compile_micros: u64,
    pub iterations: usize,
    pub min_micros: u64,
    pub mean_micros: u64,
    pub p95_micros: u64,
    pub max_micros: u64,
    pub items_processed: usize,
    /// Runs that ended with at least one error diagnostic.
    pub failed_runs: usize,
}

/// Compile `text` once, then run it `iterations` times, cycling through
/// `samples`.
pub fn profile(
    text: &str,
    source: &dyn FragmentSource,
    samples: &[Value],
    iterations: usize,
) -> Result<ProfileReport, ProfileError> {
    if samples.is_empty() {
        return Err(ProfileError::NoSamples);
    }
    if iterations == 0 {
        return Err(ProfileError::ZeroIterations);
    }

    let start = Instant::now();
    let plan = acv_core::compile(text, source).map_err(ProfileError::Compile)?;
    let compile_micros = elapsed_micros(start);

    let mut timings = Vec::with_capacity(iterations);
    let mut failed_runs = 0;
    for sample in samples.iter().cycle().take(iterations) {
        let start = Instant::now();
        let result = engine::execute(&plan, sample);
        timings.push(elapsed_micros(start));
        if !result.is_success() {
            failed_runs += 1;
        }
    }

    let report = summarize(compile_micros, timings, failed_runs);
    tracing::debug!(
        iterations = report.iterations,
        mean_micros = report.mean_micros,
        p95_micros = report.p95_micros,
        failed_runs = report.failed_runs,
        "profile complete"
    );
    Ok(report)
}

/// `timings` must be non-empty.
fn summarize(compile_micros: u64, mut timings: Vec<u64>, failed_runs: usize) -> ProfileReport {
    timings.sort_unstable();
    let n = timings.len();
    let total: u128 = timings.iter().map(|&t| u128::from(t)).sum();
    let mean = u64::try_from(total / n.max(1) as u128).unwrap_or(u64::MAX);
    ProfileReport {
        compile_micros,
        iterations: n,
        min_micros: timings.first().copied().unwrap_or(0),
        mean_micros: mean,
        p95_micros: nearest_rank(&timings, 95),
        max_micros: timings.last().copied().unwrap_or(0),
        items_processed: n,
        failed_runs,
    }
}

/// Nearest-rank percentile of sorted `values`: the smallest value with at
/// least `pct`% of the values at or below it.
fn nearest_rank(sorted: &[u64], pct: usize) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let rank = (pct * sorted.len()).div_ceil(100).max(1);
    sorted[rank - 1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use acv_core::source::InMemorySource;

    const RULES: &str = r#"{ "schemaVersion": "1.2", "inputFormat": "json", "outputFormat": "json",
        "root": { "kind": "field", "source": "a", "target": "b" } }"#;

    #[test]
    fn nearest_rank_percentile() {
        let values: Vec<u64> = (1..=20).collect();
        assert_eq!(nearest_rank(&values, 95), 19);
        assert_eq!(nearest_rank(&values, 100), 20);
        assert_eq!(nearest_rank(&[7], 95), 7);
    }

    #[test]
    fn summary_statistics() {
        let report = summarize(5, vec![30, 10, 20], 1);
        assert_eq!(report.min_micros, 10);
        assert_eq!(report.mean_micros, 20);
        assert_eq!(report.max_micros, 30);
        assert_eq!(report.p95_micros, 30);
        assert_eq!(report.items_processed, 3);
        assert_eq!(report.failed_runs, 1);
    }

    #[test]
    fn cycles_samples_and_counts_failures() {
        let samples = vec![
            Value::from_json(serde_json::json!({ "a": 1 })),
            Value::from_json(serde_json::json!({})),
        ];
        let report = profile(RULES, &InMemorySource::new(), &samples, 5).unwrap();
        assert_eq!(report.iterations, 5);
        assert_eq!(report.items_processed, 5);
        // Samples 0, 2, 4 succeed; 1 and 3 miss the required source.
        assert_eq!(report.failed_runs, 2);
        assert!(report.min_micros <= report.p95_micros && report.p95_micros <= report.max_micros);
    }

    #[test]
    fn rejects_bad_arguments() {
        let source = InMemorySource::new();
        let sample = [Value::object()];
        assert!(matches!(profile(RULES, &source, &[], 3), Err(ProfileError::NoSamples)));
        assert!(matches!(profile(RULES, &source, &sample, 0), Err(ProfileError::ZeroIterations)));
        assert!(matches!(profile("{", &source, &sample, 1), Err(ProfileError::Compile(_))));
    }
}
