//! `acv.toml`: optional settings shared by every subcommand.
//!
//! ```toml
//! [limits]
//! max_bytes = 1048576
//! max_depth = 32
//!
//! [output]
//! pretty = true
//!
//! [benchmark]
//! iterations = 500
//! ```
//!
//! Every key is optional. A missing file yields the defaults.

use std::path::Path;

use acv_interchange::CodecLimits;
use serde::Deserialize;

use crate::error::CliError;

pub(crate) const DEFAULT_ITERATIONS: usize = 100;

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct Config {
    pub limits: LimitsConfig,
    pub output: OutputConfig,
    pub benchmark: BenchmarkConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct LimitsConfig {
    pub max_bytes: Option<usize>,
    pub max_depth: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct OutputConfig {
    /// Pretty-print converted payloads even without `--pretty`.
    pub pretty: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct BenchmarkConfig {
    pub iterations: Option<usize>,
}

impl Config {
    /// Load `path`, or the defaults when it does not exist.
    pub fn load(path: &Path) -> Result<Self, CliError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Config::default());
        }
        let contents = std::fs::read_to_string(path).map_err(|source| CliError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = toml::from_str(&contents).map_err(|source| CliError::Config {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!(path = %path.display(), "loaded config");
        Ok(config)
    }

    pub fn limits(&self) -> CodecLimits {
        let defaults = CodecLimits::default();
        CodecLimits {
            max_bytes: self.limits.max_bytes.unwrap_or(defaults.max_bytes),
            max_depth: self.limits.max_depth.unwrap_or(defaults.max_depth),
        }
    }

    pub fn iterations(&self) -> usize {
        self.benchmark.iterations.unwrap_or(DEFAULT_ITERATIONS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_gives_defaults() {
        let config = Config::load(Path::new("/nonexistent/acv.toml")).unwrap();
        assert_eq!(config.limits(), CodecLimits::default());
        assert_eq!(config.iterations(), DEFAULT_ITERATIONS);
        assert!(!config.output.pretty);
    }

    #[test]
    fn partial_file_overrides_only_what_it_names() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[limits]\nmax_depth = 8\n\n[benchmark]\niterations = 7").unwrap();
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.limits().max_depth, 8);
        assert_eq!(config.limits().max_bytes, CodecLimits::DEFAULT_MAX_BYTES);
        assert_eq!(config.iterations(), 7);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[limits]\nmax_size = 8").unwrap();
        assert!(matches!(
            Config::load(file.path()),
            Err(CliError::Config { .. })
        ));
    }
}
