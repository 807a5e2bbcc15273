//! The doctor: diagnose a rules document and propose safe fixes.
//!
//! Only three repairs are ever made:
//! 1. `normalizePath`: a malformed path that [`acv_core::path::repair`]
//!    can fix without guessing.
//! 2. `canonicalTransformName`: a transform name that only differs from a
//!    catalog name in case or surrounding whitespace.
//! 3. `insertConversion`: with a sample, a transform that fails on the
//!    wrong input kind gets `toNumber` / `toString` inserted in front of it,
//!    provided that conversion succeeds on the sample value.
//!
//! The first two only fire on documents that fail to compile and the third
//! only on conversions that fail, so output for inputs that already
//! converted is unchanged. Running the doctor on its own fixed output
//! proposes nothing.

use acv_core::ast::*;
use acv_core::error::Diagnostic;
use acv_core::path::{self, TargetPath};
use acv_core::plan::PlanTransform;
use acv_core::source::FragmentSource;
use acv_core::transform::{build_op, TransformKind};
use acv_core::walk;
use acv_eval::scope::Scope;
use acv_eval::{transforms, TransformFailure};
use acv_interchange::{CodecLimits, Format, ParseError, Value, ValueKind};
use indexmap::IndexSet;
use serde::Serialize;
use thiserror::Error;

use crate::lint;

#[derive(Debug, Error)]
pub enum DoctorError {
    #[error("sample input: {0}")]
    Sample(#[from] ParseError),
}

#[derive(Debug, Clone, Default)]
pub struct DoctorOptions {
    /// Sample input text used to find runtime failures.
    pub sample: Option<String>,
    /// Format of `sample`; defaults to the document's input format.
    pub sample_format: Option<Format>,
    pub apply_safe_fixes: bool,
    pub limits: CodecLimits,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FixKind {
    NormalizePath,
    CanonicalTransformName,
    InsertConversion,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fix {
    pub kind: FixKind,
    /// Location of the repaired field, e.g. `root.steps[1].source`.
    pub path: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DoctorReport {
    pub fixes: Vec<Fix>,
    pub applied_fixes: Vec<Fix>,
    pub remaining_errors: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
    pub runtime_diagnostics: Vec<Diagnostic>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fixed_rules: Option<serde_json::Value>,
    pub has_unresolved_errors: bool,
}

impl DoctorReport {
    fn unparsable(errors: Vec<Diagnostic>) -> Self {
        DoctorReport {
            fixes: Vec::new(),
            applied_fixes: Vec::new(),
            remaining_errors: errors,
            warnings: Vec::new(),
            runtime_diagnostics: Vec::new(),
            fixed_rules: None,
            has_unresolved_errors: true,
        }
    }
}

pub fn doctor(
    text: &str,
    source: &dyn FragmentSource,
    options: &DoctorOptions,
) -> Result<DoctorReport, DoctorError> {
    let original = match acv_core::parse_rules(text) {
        Ok(document) => document,
        Err(errors) => return Ok(DoctorReport::unparsable(errors)),
    };
    let sample = match &options.sample {
        Some(sample) => {
            let format = options.sample_format.unwrap_or(original.input_format);
            Some(acv_interchange::parse(sample, format, &options.limits)?)
        }
        None => None,
    };

    // Step 1: static repairs, on a working copy.
    let mut fixed = original.clone();
    let mut fixes = Vec::new();
    fix_node(&mut fixed.root, "root", &mut fixes);
    for (name, node) in fixed.fragments.iter_mut() {
        fix_node(node, &format!("fragments.{}", name), &mut fixes);
    }

    // Step 2: runtime repairs, driven by the sample.
    if let Some(sample) = &sample {
        fixes.extend(insert_conversions(&mut fixed, source, sample));
    }

    // Step 3: diagnose whichever document the caller ends up with.
    let final_doc = if options.apply_safe_fixes { &fixed } else { &original };
    let lint = lint::lint_document(final_doc, source);
    let (remaining_errors, warnings): (Vec<Diagnostic>, Vec<Diagnostic>) =
        lint.issues.into_iter().partition(Diagnostic::is_error);

    let mut runtime_diagnostics = Vec::new();
    if let Some(sample) = &sample {
        if let Ok(plan) = acv_core::compile_document(final_doc, source) {
            let result = acv_eval::execute(&plan, sample);
            runtime_diagnostics.extend(result.errors);
            runtime_diagnostics.extend(result.warnings);
        }
    }

    let has_unresolved_errors =
        !remaining_errors.is_empty() || acv_core::has_errors(&runtime_diagnostics);
    let (applied_fixes, fixed_rules) = if options.apply_safe_fixes {
        (fixes.clone(), Some(acv_core::document_to_json(&fixed)))
    } else {
        (Vec::new(), None)
    };
    Ok(DoctorReport {
        fixes,
        applied_fixes,
        remaining_errors,
        warnings,
        runtime_diagnostics,
        fixed_rules,
        has_unresolved_errors,
    })
}

// ── Static repairs ──────────────────────────────────────────────────────

fn repair_source(text: &mut String, at: String, fixes: &mut Vec<Fix>) {
    if let Some(repaired) = path::repair(text) {
        record_path_fix(text, repaired, at, fixes);
    }
}

fn repair_target(text: &mut String, at: String, fixes: &mut Vec<Fix>) {
    if TargetPath::parse(text).is_ok() {
        return;
    }
    if let Some(repaired) = path::repair(text).filter(|r| TargetPath::parse(r).is_ok()) {
        record_path_fix(text, repaired, at, fixes);
    }
}

fn record_path_fix(text: &mut String, repaired: String, at: String, fixes: &mut Vec<Fix>) {
    fixes.push(Fix {
        kind: FixKind::NormalizePath,
        path: at,
        message: format!("'{}' \u{2192} '{}'", text, repaired),
    });
    *text = repaired;
}

fn fix_node(node: &mut RuleNode, at: &str, fixes: &mut Vec<Fix>) {
    match node {
        RuleNode::Field(field) => {
            if let FieldSource::Path(source) = &mut field.source {
                repair_source(source, format!("{}.source", at), fixes);
            }
            for (i, spec) in field.transforms.iter_mut().enumerate() {
                if TransformKind::from_name(&spec.name).is_some() {
                    continue;
                }
                if let Some(kind) = TransformKind::from_loose_name(&spec.name) {
                    fixes.push(Fix {
                        kind: FixKind::CanonicalTransformName,
                        path: format!("{}.transforms[{}]", at, i),
                        message: format!("'{}' \u{2192} '{}'", spec.name, kind.name()),
                    });
                    spec.name = kind.name().to_string();
                }
            }
            repair_target(&mut field.target, format!("{}.target", at), fixes);
        }
        RuleNode::Condition(cond) => {
            fix_condition(&mut cond.when, &format!("{}.when", at), fixes);
            fix_node(&mut cond.then, &format!("{}.then", at), fixes);
            if let Some(otherwise) = &mut cond.otherwise {
                fix_node(otherwise, &format!("{}.else", at), fixes);
            }
        }
        RuleNode::Merge(merge) => {
            for (i, input) in merge.inputs.iter_mut().enumerate() {
                fix_node(input, &format!("{}.inputs[{}]", at, i), fixes);
            }
            repair_target(&mut merge.target, format!("{}.target", at), fixes);
        }
        RuleNode::Split(split) => {
            repair_source(&mut split.source, format!("{}.source", at), fixes);
            fix_node(&mut split.item, &format!("{}.item", at), fixes);
            repair_target(&mut split.target, format!("{}.target", at), fixes);
        }
        RuleNode::Sequence(seq) => {
            for (i, step) in seq.steps.iter_mut().enumerate() {
                fix_node(step, &format!("{}.steps[{}]", at, i), fixes);
            }
        }
        RuleNode::Fragment(_) => {}
    }
}

fn fix_condition(expr: &mut ConditionExpr, at: &str, fixes: &mut Vec<Fix>) {
    match expr {
        ConditionExpr::Equals { source, .. }
        | ConditionExpr::Exists { source }
        | ConditionExpr::Matches { source, .. }
        | ConditionExpr::GreaterThan { source, .. }
        | ConditionExpr::LessThan { source, .. } => {
            repair_source(source, format!("{}.source", at), fixes)
        }
        ConditionExpr::And { conditions } | ConditionExpr::Or { conditions } => {
            for (i, c) in conditions.iter_mut().enumerate() {
                fix_condition(c, &format!("{}.conditions[{}]", at, i), fixes);
            }
        }
        ConditionExpr::Not { condition } => {
            fix_condition(condition, &format!("{}.condition", at), fixes)
        }
        ConditionExpr::Literal { .. } => {}
    }
}

// ── Runtime repairs ─────────────────────────────────────────────────────

/// The conversion that makes `failure` go away, if one is safe.
fn conversion_for(failure: &TransformFailure, sample: &Value) -> Option<TransformKind> {
    let input_kind = failure.input.kind();
    if failure.kind.accepts_kind(input_kind) {
        // Wrong value, right kind: no conversion helps.
        return None;
    }
    let conversion = match input_kind {
        ValueKind::String if failure.kind.accepts_kind(ValueKind::Number) => TransformKind::ToNumber,
        ValueKind::Number | ValueKind::Bool if failure.kind.accepts_kind(ValueKind::String) => {
            TransformKind::ToString
        }
        _ => return None,
    };
    let step = PlanTransform {
        kind: conversion,
        op: build_op(conversion, &[]).ok()?,
    };
    transforms::apply(&step, failure.input.clone(), &Scope::new(sample)).ok()?;
    Some(conversion)
}

fn insert_conversions(
    document: &mut RulesDocument,
    source: &dyn FragmentSource,
    sample: &Value,
) -> Vec<Fix> {
    let Ok(plan) = acv_core::compile_document(document, source) else {
        return Vec::new();
    };
    let (_, failures) = acv_eval::execute_traced(&plan, sample);

    // One fix per transform even when many split items fail on it.
    let mut seen: IndexSet<(String, usize)> = IndexSet::new();
    let mut planned: Vec<(String, usize, TransformKind, ValueKind)> = Vec::new();
    for failure in &failures {
        let node_path = walk::static_path(&failure.path);
        if !seen.insert((node_path.clone(), failure.index)) {
            continue;
        }
        if let Some(conversion) = conversion_for(failure, sample) {
            planned.push((node_path, failure.index, conversion, failure.input.kind()));
        }
    }
    // Later indices first, so earlier insertions do not shift them.
    planned.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)));

    let mut fixes = Vec::new();
    for (node_path, index, conversion, failed_on) in planned {
        // Nodes inlined from fragments have no place in the entry document.
        let Some(RuleNode::Field(field)) = walk::find_mut(&mut document.root, &node_path) else {
            continue;
        };
        let Some(before) = field.transforms.get(index).map(|t| t.name.clone()) else {
            continue;
        };
        field.transforms.insert(index, TransformSpec::named(conversion.name()));
        fixes.push(Fix {
            kind: FixKind::InsertConversion,
            path: format!("{}.transforms[{}]", node_path, index),
            message: format!(
                "insert '{}' before '{}': the sample gave it a {}; the conversion applies to every scalar kind",
                conversion.name(),
                before,
                failed_on
            ),
        });
    }
    fixes
}

#[cfg(test)]
mod tests {
    use super::*;
    use acv_core::source::InMemorySource;

    fn doc(root: &str) -> String {
        format!(
            r#"{{ "schemaVersion": "1.2", "inputFormat": "json", "outputFormat": "json", "root": {} }}"#,
            root
        )
    }

    fn run(text: &str, sample: Option<&str>, apply: bool) -> DoctorReport {
        let options = DoctorOptions {
            sample: sample.map(str::to_string),
            apply_safe_fixes: apply,
            ..DoctorOptions::default()
        };
        doctor(text, &InMemorySource::new(), &options).unwrap()
    }

    fn kinds(fixes: &[Fix]) -> Vec<FixKind> {
        fixes.iter().map(|f| f.kind).collect()
    }

    #[test]
    fn repairs_paths_and_names() {
        let text = doc(
            r#"{ "kind": "sequence", "steps": [
                { "kind": "field", "source": "customer..id", "transforms": [" Trim "], "target": "user.[0]" },
                { "kind": "condition", "when": { "op": "exists", "source": "a. b" },
                  "then": { "kind": "field", "source": "b", "transforms": ["UPPERCASE"], "target": "c" } } ] }"#,
        );
        let report = run(&text, None, true);
        assert_eq!(
            kinds(&report.fixes),
            vec![
                FixKind::NormalizePath,
                FixKind::CanonicalTransformName,
                FixKind::NormalizePath,
                FixKind::NormalizePath,
                FixKind::CanonicalTransformName,
            ]
        );
        assert_eq!(report.fixes[0].path, "root.steps[0].source");
        assert_eq!(report.fixes[3].path, "root.steps[1].when.source");
        assert!(!report.has_unresolved_errors);
        assert_eq!(report.applied_fixes, report.fixes);
        let fixed = report.fixed_rules.unwrap();
        assert_eq!(fixed["root"]["steps"][0]["source"], "customer.id");
        assert_eq!(fixed["root"]["steps"][0]["target"], "user[0]");
        assert_eq!(fixed["root"]["steps"][0]["transforms"][0], "trim");
    }

    #[test]
    fn proposes_without_applying() {
        let text = doc(r#"{ "kind": "field", "source": "a..b", "target": "x" }"#);
        let report = run(&text, None, false);
        assert_eq!(report.fixes.len(), 1);
        assert!(report.applied_fixes.is_empty());
        assert!(report.fixed_rules.is_none());
        assert!(report.has_unresolved_errors);
        assert_eq!(report.remaining_errors[0].code.as_str(), "ACV-STR-004");
    }

    #[test]
    fn inserts_conversion_from_sample() {
        let text = doc(
            r#"{ "kind": "split", "source": "rows", "target": "out", "item": {
                "kind": "field", "source": "price", "transforms": [{ "name": "round", "args": [1] }], "target": "" } }"#,
        );
        let sample = r#"{ "rows": [{ "price": "1.25" }, { "price": "2" }] }"#;
        let report = run(&text, Some(sample), true);
        assert_eq!(kinds(&report.fixes), vec![FixKind::InsertConversion]);
        assert_eq!(report.fixes[0].path, "root.item.transforms[0]");
        assert!(report.fixes[0].message.contains("gave it a string"), "{}", report.fixes[0].message);
        assert!(report.fixes[0].message.contains("every scalar kind"));
        assert!(report.runtime_diagnostics.is_empty());
        assert!(!report.has_unresolved_errors);
        let fixed = report.fixed_rules.unwrap();
        assert_eq!(fixed["root"]["item"]["transforms"][0], "toNumber");
    }

    #[test]
    fn leaves_unconvertible_failures_alone() {
        let text = doc(
            r#"{ "kind": "field", "source": "price", "transforms": [{ "name": "round", "args": [1] }], "target": "p" }"#,
        );
        let report = run(&text, Some(r#"{ "price": "cheap" }"#), true);
        assert!(report.fixes.is_empty());
        assert!(report.has_unresolved_errors);
        assert_eq!(report.runtime_diagnostics[0].code.as_str(), "ACV-RUN-003");
    }

    #[test]
    fn working_rules_are_untouched() {
        let text = doc(r#"{ "kind": "field", "source": "n", "transforms": ["toString"], "target": "s" }"#);
        let report = run(&text, Some(r#"{ "n": 4 }"#), true);
        assert!(report.fixes.is_empty());
        assert!(!report.has_unresolved_errors);
    }

    #[test]
    fn fixing_twice_proposes_nothing() {
        let text = doc(
            r#"{ "kind": "sequence", "steps": [
                { "kind": "field", "source": " qty ", "transforms": ["UpperCase", "Trim"], "target": "q" },
                { "kind": "field", "source": "n", "transforms": ["uppercase"], "target": "n" } ] }"#,
        );
        let sample = r#"{ "qty": "x", "n": 12 }"#;
        let first = run(&text, Some(sample), true);
        assert!(!first.fixes.is_empty());
        let fixed_text = serde_json::to_string(first.fixed_rules.as_ref().unwrap()).unwrap();
        let second = run(&fixed_text, Some(sample), true);
        assert!(second.fixes.is_empty(), "{:#?}", second.fixes);
        assert_eq!(second.fixed_rules, first.fixed_rules);
    }

    #[test]
    fn bad_sample_is_an_error() {
        let options = DoctorOptions {
            sample: Some("{".to_string()),
            ..DoctorOptions::default()
        };
        let text = doc(r#"{ "kind": "field", "source": "a", "target": "b" }"#);
        assert!(matches!(
            doctor(&text, &InMemorySource::new(), &options),
            Err(DoctorError::Sample(_))
        ));
    }

    #[test]
    fn unparsable_rules_report_errors() {
        let report = run("[]", None, true);
        assert!(report.has_unresolved_errors);
        assert!(report.fixes.is_empty());
        assert_eq!(report.remaining_errors[0].code.as_str(), "ACV-STR-002");
    }
}
