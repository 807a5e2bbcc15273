//! `acv rules ...`: everything that works on a rules document without
//! converting a payload.

use std::path::{Path, PathBuf};

use acv_analyze::DoctorOptions;
use acv_core::{FileSystemSource, SchemaVersion};
use acv_interchange::Format;

use super::diagnostics_json;
use crate::config::Config;
use crate::error::CliError;
use crate::{print_report, read_file, write_file};

pub(crate) fn cmd_validate(file: &Path) -> Result<bool, CliError> {
    let text = read_file(file)?;
    let report = acv_core::validate(&text, &FileSystemSource::beside(file));
    print_report(&report.to_json_value());
    Ok(report.is_valid)
}

pub(crate) fn cmd_lint(file: &Path) -> Result<bool, CliError> {
    let text = read_file(file)?;
    let report = acv_analyze::lint(&text, &FileSystemSource::beside(file));
    print_report(&report.to_json_value());
    Ok(!report.has_errors)
}

pub(crate) struct DoctorArgs {
    pub rules: PathBuf,
    pub input: Option<PathBuf>,
    pub format: Option<Format>,
    pub apply_safe_fixes: bool,
    pub out: Option<PathBuf>,
}

pub(crate) fn cmd_doctor(args: &DoctorArgs, config: &Config) -> Result<bool, CliError> {
    let text = read_file(&args.rules)?;
    let sample = args.input.as_deref().map(read_file).transpose()?;
    // An explicit --format wins; otherwise the sample's extension, then the
    // document's declared input format.
    let sample_format = args
        .format
        .or_else(|| args.input.as_deref().and_then(Format::from_extension));
    let options = DoctorOptions {
        sample,
        sample_format,
        apply_safe_fixes: args.apply_safe_fixes,
        limits: config.limits(),
    };

    let report = acv_analyze::doctor(&text, &FileSystemSource::beside(&args.rules), &options)?;
    if let (Some(out), Some(fixed)) = (&args.out, &report.fixed_rules) {
        write_file(out, &format!("{:#}\n", fixed))?;
    }
    print_report(&serde_json::to_value(&report)?);
    Ok(!report.has_unresolved_errors)
}

pub(crate) fn cmd_compatibility(rules: &Path, target: SchemaVersion) -> Result<bool, CliError> {
    let text = read_file(rules)?;
    let document = match acv_core::parse_rules(&text) {
        Ok(document) => document,
        Err(errors) => {
            print_report(&serde_json::json!({
                "isCompatible": false,
                "reasons": [],
                "errors": diagnostics_json(&errors),
            }));
            return Ok(false);
        }
    };
    let report = acv_analyze::check_compatibility(&document, target);
    print_report(&serde_json::to_value(&report)?);
    Ok(report.is_compatible)
}

/// Write the inlined document with its diagnostics under
/// `validationErrors`. The file is written even when there are errors so
/// that the problems can be inspected in context.
pub(crate) fn cmd_bundle(rules: &Path, out: &Path) -> Result<bool, CliError> {
    let text = read_file(rules)?;
    let outcome = match acv_core::bundle(&text, &FileSystemSource::beside(rules)) {
        Ok(outcome) => outcome,
        Err(errors) => {
            print_report(&serde_json::json!({ "validationErrors": diagnostics_json(&errors) }));
            return Ok(false);
        }
    };

    let mut diagnostics = outcome.diagnostics;
    diagnostics.extend(acv_core::compile::check_resolved(&outcome.document));
    let mut bundled = acv_core::document_to_json(&outcome.document);
    if let Some(obj) = bundled.as_object_mut() {
        obj.insert("validationErrors".to_string(), diagnostics_json(&diagnostics));
    }
    write_file(out, &format!("{:#}\n", bundled))?;

    print_report(&serde_json::json!({
        "out": out.display().to_string(),
        "validationErrors": diagnostics_json(&diagnostics),
    }));
    Ok(!acv_core::has_errors(&diagnostics))
}
