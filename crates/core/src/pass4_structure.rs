//! Pass 4: structural checks over the inlined tree.
//!
//! - target collisions between steps of one sequence (merge steps exempt;
//!   the two branches of a condition count as one step)
//! - malformed condition expressions
//! - merges without inputs

use std::collections::HashMap;

use acv_interchange::Value;
use indexmap::IndexSet;
use regex::Regex;

use crate::ast::*;
use crate::error::{Diagnostic, DiagnosticCode};
use crate::path::TargetPath;
use crate::walk;

pub fn check_structure(document: &RulesDocument) -> Vec<(usize, Diagnostic)> {
    let visits = walk::preorder(&document.root, "root");
    let index_of: HashMap<&str, usize> = visits
        .iter()
        .map(|v| (v.path.as_str(), v.index))
        .collect();

    let mut out = Vec::new();
    for visit in &visits {
        match visit.node {
            RuleNode::Sequence(seq) => {
                check_collisions(seq, &visit.path, &index_of, &mut out);
            }
            RuleNode::Condition(cond) => {
                let mut found = Vec::new();
                check_condition(&cond.when, &format!("{}.when", visit.path), &mut found);
                out.extend(found.into_iter().map(|d| (visit.index, d)));
            }
            RuleNode::Merge(merge) if merge.inputs.is_empty() => {
                out.push((
                    visit.index,
                    Diagnostic::new(
                        DiagnosticCode::EmptyMerge,
                        visit.path.clone(),
                        "merge has no inputs",
                    ),
                ));
            }
            _ => {}
        }
    }
    out
}

// ── Collisions ──────────────────────────────────────────────────────

/// Canonical targets a step writes directly into its sequence's scope.
/// Merges are exempt and fragments are unresolved, so both write nothing.
pub fn step_targets(node: &RuleNode) -> IndexSet<String> {
    let mut out = IndexSet::new();
    let mut stack = vec![node];
    while let Some(node) = stack.pop() {
        match node {
            RuleNode::Field(f) => {
                out.extend(canonical_target(&f.target));
            }
            RuleNode::Split(s) => {
                out.extend(canonical_target(&s.target));
            }
            RuleNode::Condition(c) => {
                if let Some(otherwise) = &c.otherwise {
                    stack.push(otherwise);
                }
                stack.push(&c.then);
            }
            RuleNode::Sequence(s) => stack.extend(s.steps.iter().rev()),
            RuleNode::Merge(_) | RuleNode::Fragment(_) => {}
        }
    }
    out
}

/// Malformed targets are reported by the path pass and never collide.
fn canonical_target(text: &str) -> Option<String> {
    TargetPath::parse(text).ok().map(|t| t.to_string())
}

fn check_collisions(
    seq: &SequenceNode,
    seq_path: &str,
    index_of: &HashMap<&str, usize>,
    out: &mut Vec<(usize, Diagnostic)>,
) {
    let mut claimed: HashMap<String, usize> = HashMap::new();
    for (i, step) in seq.steps.iter().enumerate() {
        let step_path = format!("{}.steps[{}]", seq_path, i);
        let index = index_of.get(step_path.as_str()).copied().unwrap_or_default();
        for target in step_targets(step) {
            match claimed.get(&target) {
                Some(&earlier) => out.push((
                    index,
                    Diagnostic::new(
                        DiagnosticCode::TargetCollision,
                        step_path.clone(),
                        format!(
                            "target '{}' is already written by {}.steps[{}]; combine the writers in a merge",
                            target, seq_path, earlier
                        ),
                    ),
                )),
                None => {
                    claimed.insert(target, i);
                }
            }
        }
    }
}

// ── Conditions ──────────────────────────────────────────────────────

fn check_condition(expr: &ConditionExpr, path: &str, out: &mut Vec<Diagnostic>) {
    let mut stack: Vec<(&ConditionExpr, String)> = vec![(expr, path.to_string())];
    while let Some((expr, path)) = stack.pop() {
        match expr {
            ConditionExpr::And { conditions } | ConditionExpr::Or { conditions } => {
                if conditions.is_empty() {
                    out.push(Diagnostic::new(
                        DiagnosticCode::InvalidCondition,
                        path.clone(),
                        format!("'{}' needs at least one condition", expr.op()),
                    ));
                }
                for (i, c) in conditions.iter().enumerate().rev() {
                    stack.push((c, format!("{}.conditions[{}]", path, i)));
                }
            }
            ConditionExpr::Not { condition } => {
                stack.push((condition.as_ref(), format!("{}.condition", path)));
            }
            ConditionExpr::Matches { pattern, .. } => {
                if let Err(e) = Regex::new(pattern) {
                    out.push(Diagnostic::new(
                        DiagnosticCode::InvalidCondition,
                        path,
                        format!("invalid pattern '{}': {}", pattern, e),
                    ));
                }
            }
            ConditionExpr::GreaterThan { value, .. } | ConditionExpr::LessThan { value, .. } => {
                if !matches!(value, Value::Number(_) | Value::String(_)) {
                    out.push(Diagnostic::new(
                        DiagnosticCode::InvalidCondition,
                        path,
                        format!(
                            "'{}' compares against a number or a string, not {}",
                            expr.op(),
                            value.kind().as_str()
                        ),
                    ));
                }
            }
            ConditionExpr::Equals { .. }
            | ConditionExpr::Exists { .. }
            | ConditionExpr::Literal { .. } => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_rules;

    fn check(root: &str) -> Vec<Diagnostic> {
        let text = format!(
            r#"{{ "schemaVersion": "1.2", "inputFormat": "json", "outputFormat": "json", "root": {} }}"#,
            root
        );
        check_structure(&parse_rules(&text).unwrap())
            .into_iter()
            .map(|(_, d)| d)
            .collect()
    }

    #[test]
    fn duplicate_targets_collide_once() {
        let found = check(
            r#"{ "kind": "sequence", "steps": [
                { "kind": "field", "source": "a", "target": "status" },
                { "kind": "field", "source": "b", "target": "status" } ] }"#,
        );
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].code, DiagnosticCode::TargetCollision);
        assert_eq!(found[0].path, "root.steps[1]");
        assert!(found[0].message.contains("'status'"));
    }

    #[test]
    fn equivalent_spellings_collide() {
        let found = check(
            r#"{ "kind": "sequence", "steps": [
                { "kind": "field", "source": "a", "target": "x[\"y\"]" },
                { "kind": "field", "source": "b", "target": "x.y" } ] }"#,
        );
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn merges_and_condition_branches_are_exempt() {
        let found = check(
            r#"{ "kind": "sequence", "steps": [
                { "kind": "merge", "target": "status", "inputs": [
                    { "kind": "field", "source": "a", "target": "" },
                    { "kind": "field", "source": "b", "target": "" } ] },
                { "kind": "merge", "target": "status", "inputs": [
                    { "kind": "field", "source": "c", "target": "" } ] },
                { "kind": "condition", "when": { "op": "exists", "source": "x" },
                  "then": { "kind": "field", "source": "x", "target": "flag" },
                  "else": { "kind": "field", "value": false, "target": "flag" } } ] }"#,
        );
        assert!(found.is_empty(), "{:?}", found);
    }

    #[test]
    fn nested_sequence_targets_count_for_the_step() {
        let found = check(
            r#"{ "kind": "sequence", "steps": [
                { "kind": "field", "source": "a", "target": "x" },
                { "kind": "sequence", "steps": [ { "kind": "field", "source": "b", "target": "x" } ] } ] }"#,
        );
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].path, "root.steps[1]");
    }

    #[test]
    fn malformed_conditions() {
        let found = check(
            r#"{ "kind": "condition",
                 "when": { "op": "or", "conditions": [
                     { "op": "and", "conditions": [] },
                     { "op": "matches", "source": "s", "pattern": "(" },
                     { "op": "not", "condition": { "op": "greaterThan", "source": "n", "value": true } } ] },
                 "then": { "kind": "field", "value": 1, "target": "x" } }"#,
        );
        let paths: Vec<&str> = found.iter().map(|d| d.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "root.when.conditions[0]",
                "root.when.conditions[1]",
                "root.when.conditions[2].condition",
            ]
        );
        assert!(found.iter().all(|d| d.code == DiagnosticCode::InvalidCondition));
    }

    #[test]
    fn empty_merge() {
        let found = check(r#"{ "kind": "merge", "inputs": [] }"#);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].code, DiagnosticCode::EmptyMerge);
    }
}
