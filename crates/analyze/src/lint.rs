//! The linter: compiler diagnostics plus advisory warnings.
//!
//! Warnings never block compilation. They point at rules that compile but
//! probably do not do what their author meant:
//! - STR-019 a branch behind a condition that is constant
//! - STR-020 a node that does nothing (empty sequence, one-input merge)
//! - STR-021 a fragment the document defines but never references
//! - STR-022 a transform fed a kind it does not accept by the one before it

use std::collections::HashSet;

use acv_core::ast::{FieldSource, RuleNode, RulesDocument};
use acv_core::error::{Diagnostic, DiagnosticCode};
use acv_core::pass1_bundle::{self, FragmentEntry};
use acv_core::source::FragmentSource;
use acv_core::transform::TransformKind;
use acv_core::walk;
use acv_interchange::ValueKind;
use indexmap::IndexMap;
use serde::Serialize;

/// Result of `rules lint`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LintReport {
    pub has_errors: bool,
    pub issues: Vec<Diagnostic>,
}

impl LintReport {
    fn new(issues: Vec<Diagnostic>) -> Self {
        LintReport {
            has_errors: acv_core::has_errors(&issues),
            issues,
        }
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.issues.iter().filter(|d| d.is_error())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.issues.iter().filter(|d| !d.is_error())
    }

    pub fn to_json_value(&self) -> serde_json::Value {
        serde_json::json!({
            "hasErrors": self.has_errors,
            "issues": self.issues.iter().map(Diagnostic::to_json_value).collect::<Vec<_>>(),
        })
    }
}

/// Lint rules text. A document that does not parse reports its parse
/// errors and nothing else.
pub fn lint(text: &str, source: &dyn FragmentSource) -> LintReport {
    match acv_core::parse_rules(text) {
        Ok(document) => lint_document(&document, source),
        Err(errors) => LintReport::new(errors),
    }
}

pub fn lint_document(document: &RulesDocument, source: &dyn FragmentSource) -> LintReport {
    let outcome = pass1_bundle::bundle_document(document, source);
    let mut issues = outcome.diagnostics;
    issues.extend(unused_fragments(document, source));

    let mut indexed = acv_core::compile::check_resolved_indexed(&outcome.document);
    indexed.extend(node_warnings(&outcome.document.root));
    indexed.sort_by_key(|(index, _)| *index);
    issues.extend(indexed.into_iter().map(|(_, d)| d));
    LintReport::new(issues)
}

// ── STR-021 ─────────────────────────────────────────────────────────────

/// Fragments defined in the document itself that nothing reaches from
/// `root`. Library fragments are offered for reuse and are not reported.
fn unused_fragments(document: &RulesDocument, source: &dyn FragmentSource) -> Vec<Diagnostic> {
    if document.fragments.is_empty() {
        return Vec::new();
    }
    // Load problems are already reported by the bundler.
    let table: IndexMap<String, FragmentEntry> =
        pass1_bundle::collect_fragments(document, source, &mut Vec::new());

    let mut reached: HashSet<&str> = HashSet::new();
    let mut stack: Vec<&str> = pass1_bundle::references(&document.root);
    while let Some(name) = stack.pop() {
        if !reached.insert(name) {
            continue;
        }
        if let Some(entry) = table.get(name) {
            stack.extend(pass1_bundle::references(&entry.node));
        }
    }

    document
        .fragments
        .keys()
        .filter(|name| !reached.contains(name.as_str()))
        .map(|name| {
            Diagnostic::new(
                DiagnosticCode::UnusedFragment,
                format!("fragments.{}", name),
                format!("fragment '{}' is never referenced", name),
            )
        })
        .collect()
}

// ── Per-node warnings ───────────────────────────────────────────────────

fn node_warnings(root: &RuleNode) -> Vec<(usize, Diagnostic)> {
    let mut out = Vec::new();
    for visit in walk::preorder(root, "root") {
        let mut warn = |code, path: String, message: String| {
            out.push((visit.index, Diagnostic::new(code, path, message)));
        };
        match visit.node {
            RuleNode::Condition(cond) => match cond.when.constant_value() {
                Some(true) if cond.otherwise.is_some() => warn(
                    DiagnosticCode::UnreachableBranch,
                    format!("{}.else", visit.path),
                    "condition is always true; 'else' never runs".to_string(),
                ),
                Some(false) => warn(
                    DiagnosticCode::UnreachableBranch,
                    format!("{}.then", visit.path),
                    "condition is always false; 'then' never runs".to_string(),
                ),
                _ => {}
            },
            RuleNode::Sequence(seq) if seq.steps.is_empty() => warn(
                DiagnosticCode::NoOpNode,
                visit.path.clone(),
                "empty sequence does nothing".to_string(),
            ),
            RuleNode::Merge(merge) if merge.inputs.len() == 1 => warn(
                DiagnosticCode::NoOpNode,
                visit.path.clone(),
                "merge of a single input; use the input directly".to_string(),
            ),
            RuleNode::Field(field) => {
                for (path, message) in chain_mismatches(field, &visit.path) {
                    warn(DiagnosticCode::TransformKindMismatch, path, message);
                }
            }
            _ => {}
        }
    }
    out
}

/// Follow the statically known value kind through a transform chain.
/// A source path has no known kind until a transform fixes one.
fn chain_mismatches(field: &acv_core::ast::FieldMapping, at: &str) -> Vec<(String, String)> {
    let mut known: Option<ValueKind> = match &field.source {
        FieldSource::Constant(value) => Some(value.kind()),
        FieldSource::Path(_) => None,
    };
    let mut produced_by: Option<&str> = None;
    let mut out = Vec::new();
    for (i, spec) in field.transforms.iter().enumerate() {
        // Unknown names are compiler errors.
        let Some(kind) = TransformKind::from_name(&spec.name) else {
            known = None;
            continue;
        };
        if let Some(input) = known {
            if !kind.accepts_kind(input) {
                let from = produced_by.map_or_else(|| "the constant value".to_string(), |p| format!("'{}'", p));
                out.push((
                    format!("{}.transforms[{}]", at, i),
                    format!("'{}' does not accept the {} produced by {}", kind.name(), input, from),
                ));
            }
        }
        known = match kind {
            TransformKind::Default => match (known, spec.args.first().map(|v| v.kind())) {
                (Some(a), Some(b)) if a == b => Some(a),
                _ => None,
            },
            _ => kind.output(),
        };
        produced_by = Some(kind.name());
    }
    out
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

    fn codes(report: &LintReport) -> Vec<&'static str> {
        report.issues.iter().map(|d| d.code.as_str()).collect()
    }

    #[test]
    fn clean_rules_have_no_issues() {
        let report = lint(
            &doc(r#"{ "kind": "field", "source": "a", "transforms": ["trim"], "target": "b" }"#),
            &InMemorySource::new(),
        );
        assert_eq!(report, LintReport { has_errors: false, issues: Vec::new() });
    }

    #[test]
    fn constant_conditions_hide_branches() {
        let report = lint(
            &doc(
                r#"{ "kind": "sequence", "steps": [
                    { "kind": "condition", "when": { "op": "literal", "value": true },
                      "then": { "kind": "field", "value": 1, "target": "a" },
                      "else": { "kind": "field", "value": 2, "target": "a" } },
                    { "kind": "condition",
                      "when": { "op": "and", "conditions": [
                        { "op": "exists", "source": "x" }, { "op": "literal", "value": false } ] },
                      "then": { "kind": "field", "value": 3, "target": "b" } } ] }"#,
            ),
            &InMemorySource::new(),
        );
        assert!(!report.has_errors);
        assert_eq!(codes(&report), vec!["ACV-STR-019", "ACV-STR-019"]);
        assert_eq!(report.issues[0].path, "root.steps[0].else");
        assert_eq!(report.issues[1].path, "root.steps[1].then");
    }

    #[test]
    fn no_op_nodes() {
        let report = lint(
            &doc(
                r#"{ "kind": "sequence", "steps": [
                    { "kind": "sequence", "steps": [] },
                    { "kind": "merge", "target": "m", "inputs": [
                        { "kind": "field", "source": "a", "target": "a" } ] } ] }"#,
            ),
            &InMemorySource::new(),
        );
        assert_eq!(codes(&report), vec!["ACV-STR-020", "ACV-STR-020"]);
        assert_eq!(report.issues[1].path, "root.steps[1]");
    }

    #[test]
    fn unused_document_fragment() {
        let text = r#"{ "schemaVersion": "1.2", "inputFormat": "json", "outputFormat": "json",
            "fragments": {
                "used": { "kind": "fragment", "name": "inner" },
                "inner": { "kind": "field", "source": "a", "target": "a" },
                "orphan": { "kind": "field", "source": "b", "target": "b" } },
            "root": { "kind": "fragment", "name": "used" } }"#;
        let report = lint(text, &InMemorySource::new());
        assert_eq!(codes(&report), vec!["ACV-STR-021"]);
        assert_eq!(report.issues[0].path, "fragments.orphan");
    }

    #[test]
    fn chain_kind_mismatch() {
        let report = lint(
            &doc(
                r#"{ "kind": "sequence", "steps": [
                    { "kind": "field", "source": "price", "transforms": ["trim", { "name": "round", "args": [2] }], "target": "p" },
                    { "kind": "field", "value": 5, "transforms": ["uppercase"], "target": "q" },
                    { "kind": "field", "source": "n", "transforms": ["toNumber", { "name": "round", "args": [0] }], "target": "r" } ] }"#,
            ),
            &InMemorySource::new(),
        );
        assert!(!report.has_errors);
        assert_eq!(codes(&report), vec!["ACV-STR-022", "ACV-STR-022"]);
        assert_eq!(report.issues[0].path, "root.steps[0].transforms[1]");
        assert!(report.issues[0].message.contains("'trim'"));
        assert_eq!(report.issues[1].path, "root.steps[1].transforms[0]");
    }

    #[test]
    fn errors_and_warnings_follow_tree_order() {
        let report = lint(
            &doc(
                r#"{ "kind": "sequence", "steps": [
                    { "kind": "sequence", "steps": [] },
                    { "kind": "field", "source": "a..b", "target": "x" } ] }"#,
            ),
            &InMemorySource::new(),
        );
        assert!(report.has_errors);
        assert_eq!(codes(&report), vec!["ACV-STR-020", "ACV-STR-004"]);
        assert_eq!(report.errors().count(), 1);
        assert_eq!(report.warnings().count(), 1);
    }

    #[test]
    fn parse_errors_only() {
        let report = lint("{", &InMemorySource::new());
        assert!(report.has_errors);
        assert_eq!(codes(&report), vec!["ACV-STR-001"]);
    }
}
