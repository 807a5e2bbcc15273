use std::path::Path;

use acv_core::FileSystemSource;
use acv_eval::ProfileError;
use acv_interchange::{CodecLimits, Value};

use super::diagnostics_json;
use crate::config::Config;
use crate::error::CliError;
use crate::{print_report, read_file};

pub(crate) fn cmd_benchmark(
    rules: &Path,
    input: &Path,
    iterations: Option<usize>,
    config: &Config,
) -> Result<bool, CliError> {
    let text = read_file(rules)?;
    let samples = read_samples(input, &config.limits())?;
    let iterations = iterations.unwrap_or_else(|| config.iterations());
    tracing::info!(samples = samples.len(), iterations, "benchmarking");

    match acv_eval::profile(&text, &FileSystemSource::beside(rules), &samples, iterations) {
        Ok(report) => {
            print_report(&serde_json::to_value(&report)?);
            Ok(true)
        }
        Err(ProfileError::Compile(errors)) => {
            print_report(&serde_json::json!({ "validationErrors": diagnostics_json(&errors) }));
            Ok(false)
        }
        Err(ProfileError::NoSamples) => Err(CliError::NoSamples {
            path: input.to_path_buf(),
        }),
        Err(ProfileError::ZeroIterations) => Err(CliError::ZeroIterations),
    }
}

/// One JSON document per non-blank line. Errors name the 1-based line.
fn read_samples(path: &Path, limits: &CodecLimits) -> Result<Vec<Value>, CliError> {
    let text = read_file(path)?;
    let mut samples = Vec::new();
    for (i, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let sample = acv_interchange::json::parse(line, limits).map_err(|source| CliError::Sample {
            path: path.to_path_buf(),
            line: i + 1,
            source,
        })?;
        samples.push(sample);
    }
    Ok(samples)
}
