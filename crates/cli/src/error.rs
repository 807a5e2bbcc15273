use std::path::PathBuf;

use acv_analyze::DoctorError;
use acv_interchange::ParseError;
use thiserror::Error;

/// Failures that stop a subcommand before it can produce a report.
#[derive(Debug, Error)]
pub(crate) enum CliError {
    #[error("error reading file '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("error writing file '{}': {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file '{}': {source}", path.display())]
    Config {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("input '{}': {source}", path.display())]
    Input { path: PathBuf, source: ParseError },
    #[error("{}:{line}: {source}", path.display())]
    Sample {
        path: PathBuf,
        line: usize,
        source: ParseError,
    },
    #[error("no samples in '{}'", path.display())]
    NoSamples { path: PathBuf },
    #[error("--iterations must be at least 1")]
    ZeroIterations,
    #[error(transparent)]
    Doctor(#[from] DoctorError),
    #[error("internal error: {0}")]
    Serialize(#[from] serde_json::Error),
}
