use std::path::Path;

use acv_core::FileSystemSource;
use acv_interchange::Format;

use super::diagnostics_json;
use crate::config::Config;
use crate::error::CliError;
use crate::{print_report, read_file, write_file};

/// Convert `input` and write the payload to `output`. Codecs follow the
/// file extensions; a path without a known extension uses the format the
/// rules declare. Stdout gets `{outputPath, warnings}` on success and
/// `{errors, warnings}` when the output was withheld.
pub(crate) fn cmd_convert(
    rules: &Path,
    input: &Path,
    output: &Path,
    pretty: bool,
    config: &Config,
) -> Result<bool, CliError> {
    let text = read_file(rules)?;
    let plan = match acv_core::compile(&text, &FileSystemSource::beside(rules)) {
        Ok(plan) => plan,
        Err(errors) => {
            print_report(&serde_json::json!({ "validationErrors": diagnostics_json(&errors) }));
            return Ok(false);
        }
    };

    let input_format = Format::from_extension(input).unwrap_or(plan.input_format);
    let output_format = Format::from_extension(output).unwrap_or(plan.output_format);
    let payload = read_file(input)?;
    let converted = acv_eval::convert(
        &plan,
        &payload,
        input_format,
        output_format,
        pretty || config.output.pretty,
        &config.limits(),
    )
    .map_err(|source| CliError::Input {
        path: input.to_path_buf(),
        source,
    })?;

    let warnings = diagnostics_json(&converted.result.warnings);
    match &converted.text {
        Some(formatted) => {
            write_file(output, formatted)?;
            print_report(&serde_json::json!({
                "outputPath": output.display().to_string(),
                "warnings": warnings,
            }));
            Ok(true)
        }
        None => {
            print_report(&serde_json::json!({
                "errors": diagnostics_json(&converted.result.errors),
                "warnings": warnings,
            }));
            Ok(false)
        }
    }
}
